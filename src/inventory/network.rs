//! SPU Network Configuration Types
//!
//! The structures the nPod creation call expects for each SPU's data
//! interfaces.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bonding mode of an SPU's data interfaces
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BondMode {
    /// No bonding: one IP configuration per interface
    None,
    /// IEEE 802.3ad link aggregation (LACP)
    Lacp,
    /// Adaptive load balancing
    BalanceAlb,
    /// Any other mode, passed through unchanged
    Other(String),
}

impl BondMode {
    pub fn as_str(&self) -> &str {
        match self {
            BondMode::None => "BondModeNone",
            BondMode::Lacp => "BondMode8023ad",
            BondMode::BalanceAlb => "BondModeBalanceALB",
            BondMode::Other(mode) => mode,
        }
    }

    /// Whether the interfaces are bonded into one logical link
    pub fn is_bonded(&self) -> bool {
        !matches!(self, BondMode::None)
    }
}

impl From<String> for BondMode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "BondModeNone" => BondMode::None,
            "BondMode8023ad" => BondMode::Lacp,
            "BondModeBalanceALB" => BondMode::BalanceAlb,
            _ => BondMode::Other(value),
        }
    }
}

impl From<BondMode> for String {
    fn from(mode: BondMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for BondMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One IP configuration bound to one or more physical interfaces
///
/// Optional settings are omitted from the serialized form when unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Physical interface names, in pool order
    pub interfaces: Vec<String>,
    /// IP address; bonded configurations carry the raw, possibly comma-separated value
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bond_mode: Option<BondMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bond_lacp_transmit_rate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bond_transmit_hash_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask_bits: Option<u8>,
}

/// Network configuration for one SPU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostNetworkEntry {
    pub spu_serial: Option<String>,
    pub ip_info_config: Vec<InterfaceConfig>,
}
