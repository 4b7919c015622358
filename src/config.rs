//! Control Plane Configuration
//!
//! Everything that used to be a module-level default: the SDK allow-list,
//! the revocation backoff schedule and the SPU interface pool. Loaded from
//! YAML or JSON; every field falls back to its built-in value.

use crate::access::RevocationSchedule;
use crate::error::{Error, Result};
use crate::inventory::NetworkConfig;
use crate::sdk::{SdkConfig, VersionPattern};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Configuration for the control plane components
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// SDK compatibility checking
    pub sdk: SdkConfig,
    /// Wait schedule for confirming LUN revocation, in seconds
    pub revocation: RevocationSchedule,
    /// SPU network lookup
    pub network: NetworkConfig,
}

impl ControlPlaneConfig {
    /// Parse a YAML (or JSON) document and validate it
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Check the configuration for values that can never work
    pub fn validate(&self) -> Result<()> {
        if self.sdk.library.trim().is_empty() {
            return Err(Error::Configuration("sdk.library must not be empty".into()));
        }
        for pattern in &self.sdk.allowed_versions {
            VersionPattern::parse(pattern)?;
        }

        if self.revocation.waits().is_empty() {
            return Err(Error::Configuration(
                "revocation schedule needs at least one poll".into(),
            ));
        }

        if self.network.interface_pool.is_empty() {
            return Err(Error::Configuration(
                "network.interface_pool must not be empty".into(),
            ));
        }
        if let Some(blank) = self
            .network
            .interface_pool
            .iter()
            .position(|name| name.trim().is_empty())
        {
            return Err(Error::Configuration(format!(
                "network.interface_pool[{}] is blank",
                blank
            )));
        }

        Ok(())
    }
}
