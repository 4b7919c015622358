//! Declarative Resources
//!
//! Present/absent reconcilers for cloud resources:
//! - nPod groups: created, updated in place, or deleted
//! - nPods: created from SPU network configuration or deleted, drift reported only
//! - Volumes: created or deleted, drift reported only

pub mod diff;
pub mod npod;
pub mod npod_group;
pub mod volume;

pub use diff::*;
pub use npod::*;
pub use npod_group::*;
pub use volume::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Desired existence of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    Present,
    Absent,
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceState::Present => write!(f, "present"),
            ResourceState::Absent => write!(f, "absent"),
        }
    }
}

impl FromStr for ResourceState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "present" => Ok(ResourceState::Present),
            "absent" => Ok(ResourceState::Absent),
            other => Err(Error::Configuration(format!(
                "Unknown resource state '{}', expected present or absent",
                other
            ))),
        }
    }
}

/// Result of reconciling one resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileOutcome<T> {
    /// Whether the cloud was modified
    pub changed: bool,
    /// The resource after reconciliation, `None` once deleted or never present
    pub resource: Option<T>,
    /// Differences found on an existing resource
    pub diff: Diff,
}

impl<T> ReconcileOutcome<T> {
    fn unchanged(resource: Option<T>) -> Self {
        Self {
            changed: false,
            resource,
            diff: Diff::new(),
        }
    }

    fn changed(resource: Option<T>) -> Self {
        Self {
            changed: true,
            resource,
            diff: Diff::new(),
        }
    }

    fn with_diff(mut self, diff: Diff) -> Self {
        self.diff = diff;
        self
    }
}

/// Exactly one match, none, or an ambiguity error
fn single<T>(mut found: Vec<T>, kind: &str, name: &str) -> Result<Option<T>> {
    match found.len() {
        0 => Ok(None),
        1 => Ok(found.pop()),
        count => Err(Error::AmbiguousResource {
            kind: kind.to_string(),
            name: name.to_string(),
            count,
        }),
    }
}
