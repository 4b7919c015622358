//! Error types for npod-control
//!
//! Provides structured error types for SDK gating, volume access
//! reconciliation, inventory lookups and the backing store.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the control plane
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // SDK Compatibility Errors
    // =========================================================================
    #[error("Invalid version format: '{value}'")]
    InvalidVersionFormat { value: String },

    #[error("Required client library {library} is not installed")]
    MissingDependency { library: String },

    #[error("{library} version {version} is not compatible; supported versions: {}", allowed.join(", "))]
    IncompatibleVersion {
        library: String,
        version: String,
        allowed: Vec<String>,
    },

    // =========================================================================
    // Inventory Lookup Errors
    // =========================================================================
    #[error("Host group not provided")]
    NoHostGroups,

    #[error("Host group {group} not found in inventory")]
    GroupNotFound { group: String },

    #[error("Host {host} not found in hostvars")]
    HostNotFound { host: String },

    #[error("Host {host} lists {count} unbonded addresses but only {available} interfaces exist")]
    TooManyUnbondedAddresses {
        host: String,
        count: usize,
        available: usize,
    },

    #[error("Host {host} is missing required variable {key}")]
    MissingHostVariable { host: String, key: String },

    // =========================================================================
    // Backing Store Errors
    // =========================================================================
    #[error("Backing store operation failed: {operation}: {reason}")]
    BackingStore { operation: String, reason: String },

    #[error("{kind} '{name}' not identified")]
    ResourceNotFound { kind: String, name: String },

    #[error("Found {count} {kind} resources named '{name}'")]
    AmbiguousResource {
        kind: String,
        name: String,
        count: usize,
    },

    #[error("Export of volume {volume} to host {host} could not be established")]
    ExportNotEstablished { volume: String, host: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action a caller should take after a failed reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Retry with exponential backoff
    RetryWithBackoff,
    /// Retry after a specific duration
    RetryAfter(Duration),
    /// Don't retry, the input has to change first
    Abort,
}

impl Error {
    /// Shorthand for a failed call against the backing store
    pub fn backing_store(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::BackingStore {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::BackingStore { .. } | Error::Io(_) => ErrorAction::RetryWithBackoff,

            // A grant vanished while we were reconciling; let the store settle
            Error::ExportNotEstablished { .. } => {
                ErrorAction::RetryAfter(Duration::from_secs(30))
            }

            // Input, inventory and configuration errors - don't retry
            Error::Configuration(_)
            | Error::InvalidVersionFormat { .. }
            | Error::MissingDependency { .. }
            | Error::IncompatibleVersion { .. }
            | Error::NoHostGroups
            | Error::GroupNotFound { .. }
            | Error::HostNotFound { .. }
            | Error::TooManyUnbondedAddresses { .. }
            | Error::MissingHostVariable { .. }
            | Error::AmbiguousResource { .. }
            | Error::JsonParse(_)
            | Error::YamlParse(_) => ErrorAction::Abort,

            // All other errors - retry with backoff
            _ => ErrorAction::RetryWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::Abort)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::BackingStore { .. } | Error::Io(_))
    }
}

/// Result type alias for the control plane
pub type Result<T> = std::result::Result<T, Error>;
