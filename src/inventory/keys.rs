//! Lookup Keys
//!
//! The eight per-host settings read from the inventory, each of which can
//! be renamed by the caller.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::trace;

/// A configuration setting resolved from inventory variables
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKey {
    BondLacpTransmitRate,
    BondMode,
    BondTransmitHashPolicy,
    Dhcp,
    Mtu,
    NetmaskBits,
    SpuAddress,
    SpuSerial,
}

impl LookupKey {
    pub const ALL: [LookupKey; 8] = [
        LookupKey::BondLacpTransmitRate,
        LookupKey::BondMode,
        LookupKey::BondTransmitHashPolicy,
        LookupKey::Dhcp,
        LookupKey::Mtu,
        LookupKey::NetmaskBits,
        LookupKey::SpuAddress,
        LookupKey::SpuSerial,
    ];

    /// Canonical name, also the default variable name
    pub fn name(&self) -> &'static str {
        match self {
            LookupKey::BondLacpTransmitRate => "bond_lacp_transmit_rate",
            LookupKey::BondMode => "bond_mode",
            LookupKey::BondTransmitHashPolicy => "bond_transmit_hash_policy",
            LookupKey::Dhcp => "dhcp",
            LookupKey::Mtu => "mtu",
            LookupKey::NetmaskBits => "netmask_bits",
            LookupKey::SpuAddress => "spu_address",
            LookupKey::SpuSerial => "spu_serial",
        }
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for LookupKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        LookupKey::ALL
            .into_iter()
            .find(|key| key.name() == s)
            .ok_or_else(|| Error::Configuration(format!("Unknown lookup key: {}", s)))
    }
}

/// Variable name used for each lookup key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupKeys {
    aliases: BTreeMap<LookupKey, String>,
}

impl Default for LookupKeys {
    fn default() -> Self {
        let aliases = LookupKey::ALL
            .into_iter()
            .map(|key| (key, key.name().to_string()))
            .collect();
        Self { aliases }
    }
}

impl LookupKeys {
    /// Look `key` up under `variable` instead of its own name
    pub fn with_alias(mut self, key: LookupKey, variable: impl Into<String>) -> Self {
        self.aliases.insert(key, variable.into());
        self
    }

    /// Build from `key name -> variable name` overrides
    ///
    /// Keys not mentioned keep their default. Unknown key names are rejected.
    pub fn from_overrides<K, V>(overrides: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut keys = Self::default();
        for (name, variable) in overrides {
            let key: LookupKey = name.as_ref().parse()?;
            keys = keys.with_alias(key, variable);
        }
        for (key, variable) in &keys.aliases {
            trace!(key = %key, variable = %variable, "Lookup key resolved");
        }
        Ok(keys)
    }

    /// Variable name to read for `key`
    pub fn variable(&self, key: LookupKey) -> &str {
        self.aliases
            .get(&key)
            .map(String::as_str)
            .unwrap_or_else(|| key.name())
    }

    pub fn iter(&self) -> impl Iterator<Item = (LookupKey, &str)> {
        self.aliases.iter().map(|(key, variable)| (*key, variable.as_str()))
    }
}
