//! Field Diffs
//!
//! Explicit per-field comparison between a resource as the cloud reports it
//! and the settings the caller asked for.

use serde::Serialize;
use std::fmt;

/// A single field whose current value differs from the desired one
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: &'static str,
    pub current: Option<String>,
    pub desired: String,
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.current {
            Some(current) => write!(f, "{}: {} -> {}", self.field, current, self.desired),
            None => write!(f, "{}: (unset) -> {}", self.field, self.desired),
        }
    }
}

/// Changes needed to bring a resource to its desired settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diff {
    changes: Vec<FieldChange>,
}

impl Diff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare one field
    ///
    /// A `desired` of `None` means the caller did not set the field, so it
    /// never produces a change.
    pub fn compare<T>(mut self, field: &'static str, current: Option<&T>, desired: Option<&T>) -> Self
    where
        T: PartialEq + fmt::Display + ?Sized,
    {
        if let Some(desired) = desired {
            if current != Some(desired) {
                self.changes.push(FieldChange {
                    field,
                    current: current.map(ToString::to_string),
                    desired: desired.to_string(),
                });
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn changes(&self) -> &[FieldChange] {
        &self.changes
    }

    /// Names of the changed fields
    pub fn fields(&self) -> Vec<&'static str> {
        self.changes.iter().map(|c| c.field).collect()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.changes.iter().any(|c| c.field == field)
    }
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let changes: Vec<String> = self.changes.iter().map(ToString::to_string).collect();
        write!(f, "{}", changes.join(", "))
    }
}
