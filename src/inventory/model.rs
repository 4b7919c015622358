//! Inventory Model
//!
//! The three variable scopes a playbook run exposes: group membership,
//! per-host variables, and global/play variables.

use crate::error::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Variables of one host or of the play
pub type Variables = Map<String, Value>;

/// An inventory snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    /// Group name to member hosts, in inventory order
    #[serde(default)]
    pub groups: IndexMap<String, Vec<String>>,
    /// Host name to host variables
    #[serde(default)]
    pub hostvars: IndexMap<String, Variables>,
    /// Global and play variables
    #[serde(default)]
    pub vars: Variables,
}

impl Inventory {
    /// Parse an inventory from YAML (or JSON, which is valid YAML)
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load an inventory document from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Add a group with its member hosts
    pub fn with_group<S: Into<String>>(mut self, name: &str, hosts: impl IntoIterator<Item = S>) -> Self {
        self.groups
            .insert(name.to_string(), hosts.into_iter().map(Into::into).collect());
        self
    }

    /// Add variables for a host
    pub fn with_host(mut self, host: &str, vars: Variables) -> Self {
        self.hostvars.insert(host.to_string(), vars);
        self
    }

    /// Add a global variable
    pub fn with_var(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    /// Member hosts of a group
    pub fn group_hosts(&self, group: &str) -> Option<&[String]> {
        self.groups.get(group).map(Vec::as_slice)
    }

    /// Variables of a host
    pub fn host_vars(&self, host: &str) -> Option<&Variables> {
        self.hostvars.get(host)
    }
}
