//! SDK Validator
//!
//! Caller-facing gate run before any module talks to the management cloud:
//! the client library must be present and its version must be on the
//! allow-list.

use super::version::is_sdk_compatible;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Client library the modules depend on
pub const DEFAULT_SDK_LIBRARY: &str = "nebpyclient";

/// Versions of the client library known to work
pub const DEFAULT_SDK_VERSIONS: &[&str] = &["2.0.*", "2.1.*"];

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for SDK validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Name of the client library, used in error messages
    pub library: String,
    /// Default allow-list of version patterns
    pub allowed_versions: Vec<String>,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            library: DEFAULT_SDK_LIBRARY.to_string(),
            allowed_versions: DEFAULT_SDK_VERSIONS.iter().map(|v| v.to_string()).collect(),
        }
    }
}

// =============================================================================
// Validator
// =============================================================================

/// Validates an installed client-library version against an allow-list
#[derive(Debug, Clone)]
pub struct SdkValidator {
    config: SdkConfig,
}

impl SdkValidator {
    /// Create a new validator
    pub fn new(config: SdkConfig) -> Self {
        Self { config }
    }

    /// The default allow-list
    pub fn allowed_versions(&self) -> &[String] {
        &self.config.allowed_versions
    }

    /// Validate against the configured allow-list
    ///
    /// `installed` is `None` when the library could not be loaded.
    pub fn validate(&self, installed: Option<&str>) -> Result<()> {
        self.validate_with(installed, None)
    }

    /// Validate against an explicit allow-list, falling back to the configured one
    pub fn validate_with(&self, installed: Option<&str>, ok_versions: Option<&[String]>) -> Result<()> {
        let version = installed.ok_or_else(|| Error::MissingDependency {
            library: self.config.library.clone(),
        })?;

        let allowed = ok_versions.unwrap_or(&self.config.allowed_versions);
        debug!(
            "Checking {} {} against [{}]",
            self.config.library,
            version,
            allowed.join(", ")
        );

        if !is_sdk_compatible(version, allowed)? {
            return Err(Error::IncompatibleVersion {
                library: self.config.library.clone(),
                version: version.to_string(),
                allowed: allowed.to_vec(),
            });
        }

        info!("{} {} is supported", self.config.library, version);
        Ok(())
    }
}

impl Default for SdkValidator {
    fn default() -> Self {
        Self::new(SdkConfig::default())
    }
}
