//! SPU Network Lookup
//!
//! Builds the per-SPU network configuration list for the hosts of one or
//! more inventory groups.

use super::keys::{LookupKey, LookupKeys};
use super::model::{Inventory, Variables};
use super::network::{BondMode, HostNetworkEntry, InterfaceConfig};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Physical data interfaces of an SPU, in assignment order
pub const DEFAULT_INTERFACE_POOL: &[&str] = &["enP8p1s0f0np0", "enP8p1s0f1np1"];

/// Network lookup configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Interface names assigned to unbonded addresses, and bound together when bonded
    pub interface_pool: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interface_pool: DEFAULT_INTERFACE_POOL.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Settings resolved for one host
#[derive(Debug, Default)]
struct HostSettings {
    bond_mode: Option<BondMode>,
    bond_lacp_transmit_rate: Option<String>,
    bond_transmit_hash_policy: Option<String>,
    dhcp: Option<bool>,
    mtu: Option<u32>,
    netmask_bits: Option<u8>,
    spu_address: Option<String>,
    spu_serial: Option<String>,
}

impl HostSettings {
    fn interface(&self, interfaces: Vec<String>, address: Option<String>) -> InterfaceConfig {
        InterfaceConfig {
            interfaces,
            address,
            bond_mode: self.bond_mode.clone(),
            bond_lacp_transmit_rate: self.bond_lacp_transmit_rate.clone(),
            bond_transmit_hash_policy: self.bond_transmit_hash_policy.clone(),
            dhcp: self.dhcp,
            mtu: self.mtu,
            netmask_bits: self.netmask_bits,
        }
    }
}

/// Inventory to SPU network configuration lookup
#[derive(Debug, Clone, Default)]
pub struct SpuLookup {
    config: NetworkConfig,
    keys: LookupKeys,
}

impl SpuLookup {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            keys: LookupKeys::default(),
        }
    }

    /// Use custom variable names for the lookup keys
    pub fn with_keys(mut self, keys: LookupKeys) -> Self {
        self.keys = keys;
        self
    }

    pub fn keys(&self) -> &LookupKeys {
        &self.keys
    }

    /// Network configuration of every host in the requested groups
    ///
    /// Groups are visited in inventory order, hosts in group order. All
    /// requested groups must exist before any host is processed.
    ///
    /// Under `BondModeNone` the address variable is a comma-separated list;
    /// each address is trimmed of surrounding whitespace after splitting.
    pub fn build_network_configs<S: AsRef<str>>(
        &self,
        groups: &[S],
        inventory: &Inventory,
    ) -> Result<Vec<HostNetworkEntry>> {
        if groups.is_empty() {
            return Err(Error::NoHostGroups);
        }
        for group in groups {
            if inventory.group_hosts(group.as_ref()).is_none() {
                return Err(Error::GroupNotFound {
                    group: group.as_ref().to_string(),
                });
            }
        }

        let mut entries = Vec::new();
        for (group, hosts) in &inventory.groups {
            if !groups.iter().any(|g| g.as_ref() == group.as_str()) {
                continue;
            }
            debug!(group = %group, hosts = hosts.len(), "Processing host group");

            for host in hosts {
                let host_vars = inventory
                    .host_vars(host)
                    .ok_or_else(|| Error::HostNotFound { host: host.clone() })?;
                let settings = self.resolve(host, host_vars, &inventory.vars);
                entries.push(self.entry(host, settings)?);
            }
        }

        Ok(entries)
    }

    fn entry(&self, host: &str, settings: HostSettings) -> Result<HostNetworkEntry> {
        let pool = &self.config.interface_pool;

        let ip_info_config = if settings.bond_mode == Some(BondMode::None) {
            let address = settings
                .spu_address
                .as_deref()
                .ok_or_else(|| Error::MissingHostVariable {
                    host: host.to_string(),
                    key: self.keys.variable(LookupKey::SpuAddress).to_string(),
                })?;
            let addresses: Vec<&str> = address.split(',').map(str::trim).collect();
            if addresses.len() > pool.len() {
                return Err(Error::TooManyUnbondedAddresses {
                    host: host.to_string(),
                    count: addresses.len(),
                    available: pool.len(),
                });
            }

            addresses
                .into_iter()
                .zip(pool)
                .map(|(address, interface)| {
                    settings.interface(vec![interface.clone()], Some(address.to_string()))
                })
                .collect()
        } else {
            vec![settings.interface(pool.clone(), settings.spu_address.clone())]
        };

        Ok(HostNetworkEntry {
            spu_serial: settings.spu_serial,
            ip_info_config,
        })
    }

    fn resolve(&self, host: &str, host_vars: &Variables, global: &Variables) -> HostSettings {
        let mut settings = HostSettings::default();

        for (key, variable) in self.keys.iter() {
            let value = match host_vars.get(variable).or_else(|| global.get(variable)) {
                Some(value) if !value.is_null() => value,
                _ => continue,
            };
            debug!(host = %host, variable = %variable, value = %value, "Resolved lookup key");

            let converted = match key {
                LookupKey::BondMode => as_string(value).map(|s| settings.bond_mode = Some(s.into())),
                LookupKey::BondLacpTransmitRate => {
                    as_string(value).map(|s| settings.bond_lacp_transmit_rate = Some(s))
                }
                LookupKey::BondTransmitHashPolicy => {
                    as_string(value).map(|s| settings.bond_transmit_hash_policy = Some(s))
                }
                LookupKey::Dhcp => as_bool(value).map(|b| settings.dhcp = Some(b)),
                LookupKey::Mtu => as_unsigned(value).map(|n| settings.mtu = Some(n)),
                LookupKey::NetmaskBits => as_unsigned(value).map(|n| settings.netmask_bits = Some(n)),
                LookupKey::SpuAddress => as_string(value).map(|s| settings.spu_address = Some(s)),
                LookupKey::SpuSerial => as_string(value).map(|s| settings.spu_serial = Some(s)),
            };

            if converted.is_none() {
                warn!(
                    host = %host,
                    variable = %variable,
                    value = %value,
                    "Ignoring lookup value with unexpected type"
                );
            }
        }

        settings
    }
}

/// Network configuration for `groups` using the default interface pool
pub fn build_network_configs<S: AsRef<str>>(
    groups: &[S],
    inventory: &Inventory,
    keys: LookupKeys,
) -> Result<Vec<HostNetworkEntry>> {
    SpuLookup::default()
        .with_keys(keys)
        .build_network_configs(groups, inventory)
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_unsigned<T: TryFrom<u64>>(value: &Value) -> Option<T> {
    let n = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    T::try_from(n).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn vars(value: Value) -> Variables {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn server_nobond() -> Variables {
        vars(json!({
            "bond_mode": "BondModeNone",
            "dhcp": false,
            "mtu": 1500,
            "netmask_bits": 22,
            "spu_address": "10.100.10.11,10.100.10.12",
            "spu_serial": "SPUSERIALSPUSERIAL"
        }))
    }

    fn server_lacp() -> Variables {
        vars(json!({
            "bond_lacp_transmit_rate": "LACPTransmitRateFast",
            "bond_mode": "BondMode8023ad",
            "bond_transmit_hash_policy": "TransmitHashPolicyLayer34",
            "dhcp": false,
            "mtu": 1500,
            "netmask_bits": 22,
            "spu_address": "10.100.10.11",
            "spu_serial": "SPUSERIALSPUSERIAL"
        }))
    }

    fn inventory() -> Inventory {
        let mut inventory = Inventory::default()
            .with_group("lacp", ["host1", "host2", "host3"])
            .with_group("nobond", ["host4", "host5", "host6"]);
        for host in ["host1", "host2", "host3"] {
            inventory = inventory.with_host(host, server_lacp());
        }
        for host in ["host4", "host5", "host6"] {
            inventory = inventory.with_host(host, server_nobond());
        }
        inventory
    }

    #[test]
    fn test_host_group_not_provided() {
        let groups: [&str; 0] = [];
        let result = SpuLookup::default().build_network_configs(&groups, &inventory());
        assert_matches!(result, Err(Error::NoHostGroups));
    }

    #[test]
    fn test_invalid_host_group() {
        let result =
            SpuLookup::default().build_network_configs(&["lacp", "invalid_host_group"], &inventory());
        assert_matches!(result, Err(Error::GroupNotFound { group }) if group == "invalid_host_group");
    }

    #[test]
    fn test_host_without_vars() {
        let inventory = inventory().with_group("extra", ["ghost"]);
        let result = SpuLookup::default().build_network_configs(&["extra"], &inventory);
        assert_matches!(result, Err(Error::HostNotFound { host }) if host == "ghost");
    }

    #[test]
    fn test_nobond_configuration() {
        let result = SpuLookup::default()
            .build_network_configs(&["nobond"], &inventory())
            .unwrap();

        assert_eq!(result.len(), 3);
        for entry in &result {
            assert_eq!(entry.spu_serial.as_deref(), Some("SPUSERIALSPUSERIAL"));
            assert_eq!(entry.ip_info_config.len(), 2);

            let first = &entry.ip_info_config[0];
            assert_eq!(first.interfaces, vec!["enP8p1s0f0np0"]);
            assert_eq!(first.address.as_deref(), Some("10.100.10.11"));
            assert_eq!(first.bond_mode, Some(BondMode::None));
            assert_eq!(first.dhcp, Some(false));
            assert_eq!(first.mtu, Some(1500));
            assert_eq!(first.netmask_bits, Some(22));
            assert_eq!(first.bond_lacp_transmit_rate, None);

            let second = &entry.ip_info_config[1];
            assert_eq!(second.interfaces, vec!["enP8p1s0f1np1"]);
            assert_eq!(second.address.as_deref(), Some("10.100.10.12"));
        }
    }

    #[test]
    fn test_lacp_configuration() {
        let result = SpuLookup::default()
            .build_network_configs(&["lacp"], &inventory())
            .unwrap();

        assert_eq!(result.len(), 3);
        for entry in &result {
            assert_eq!(entry.ip_info_config.len(), 1);
            let net = &entry.ip_info_config[0];
            assert_eq!(net.interfaces, vec!["enP8p1s0f0np0", "enP8p1s0f1np1"]);
            assert_eq!(net.address.as_deref(), Some("10.100.10.11"));
            assert_eq!(net.bond_mode, Some(BondMode::Lacp));
            assert_eq!(net.bond_lacp_transmit_rate.as_deref(), Some("LACPTransmitRateFast"));
            assert_eq!(
                net.bond_transmit_hash_policy.as_deref(),
                Some("TransmitHashPolicyLayer34")
            );
        }
    }

    #[test]
    fn test_groups_follow_inventory_order() {
        let result = SpuLookup::default()
            .build_network_configs(&["nobond", "lacp"], &inventory())
            .unwrap();

        assert_eq!(result.len(), 6);
        assert_eq!(result[0].ip_info_config.len(), 1);
        assert_eq!(result[5].ip_info_config.len(), 2);
    }

    #[test]
    fn test_global_vars_fallback() {
        let inventory = Inventory::default()
            .with_group("g", ["h"])
            .with_host("h", vars(json!({"spu_serial": "S1", "mtu": null})))
            .with_var("bond_mode", "BondMode8023ad")
            .with_var("spu_address", "10.0.0.5")
            .with_var("mtu", 9000);

        let result = SpuLookup::default().build_network_configs(&["g"], &inventory).unwrap();
        let net = &result[0].ip_info_config[0];
        assert_eq!(net.bond_mode, Some(BondMode::Lacp));
        assert_eq!(net.address.as_deref(), Some("10.0.0.5"));
        assert_eq!(net.mtu, None);
    }

    #[test]
    fn test_unset_bond_mode_is_bonded() {
        let inventory = Inventory::default()
            .with_group("g", ["h"])
            .with_host("h", vars(json!({"spu_address": "10.0.0.1,10.0.0.2"})));

        let result = SpuLookup::default().build_network_configs(&["g"], &inventory).unwrap();
        assert_eq!(result[0].spu_serial, None);
        assert_eq!(result[0].ip_info_config.len(), 1);

        let net = &result[0].ip_info_config[0];
        assert_eq!(net.address.as_deref(), Some("10.0.0.1,10.0.0.2"));
        assert_eq!(net.bond_mode, None);
        assert_eq!(
            serde_json::to_value(net).unwrap(),
            json!({
                "interfaces": ["enP8p1s0f0np0", "enP8p1s0f1np1"],
                "address": "10.0.0.1,10.0.0.2"
            })
        );
    }

    #[test]
    fn test_too_many_unbonded_addresses() {
        let inventory = Inventory::default().with_group("g", ["h"]).with_host(
            "h",
            vars(json!({"bond_mode": "BondModeNone", "spu_address": "10.0.0.1,10.0.0.2,10.0.0.3"})),
        );

        let result = SpuLookup::default().build_network_configs(&["g"], &inventory);
        assert_matches!(
            result,
            Err(Error::TooManyUnbondedAddresses { count: 3, available: 2, .. })
        );
    }

    #[test]
    fn test_unbonded_without_address() {
        let inventory = Inventory::default()
            .with_group("g", ["h"])
            .with_host("h", vars(json!({"bond_mode": "BondModeNone"})));

        let result = SpuLookup::default().build_network_configs(&["g"], &inventory);
        assert_matches!(result, Err(Error::MissingHostVariable { key, .. }) if key == "spu_address");
    }

    #[test]
    fn test_custom_pool_and_aliases() {
        let inventory = Inventory::default().with_group("g", ["h"]).with_host(
            "h",
            vars(json!({
                "bond_mode": "BondModeNone",
                "data_ips": "10.0.0.1, 10.0.0.2, 10.0.0.3",
                "my_mtu": "9000"
            })),
        );
        let keys = LookupKeys::from_overrides([("spu_address", "data_ips"), ("mtu", "my_mtu")]).unwrap();
        let lookup = SpuLookup::new(NetworkConfig {
            interface_pool: vec!["eth0".into(), "eth1".into(), "eth2".into()],
        })
        .with_keys(keys);

        let result = lookup.build_network_configs(&["g"], &inventory).unwrap();
        let configs = &result[0].ip_info_config;
        assert_eq!(configs.len(), 3);
        assert_eq!(configs[2].interfaces, vec!["eth2"]);
        assert_eq!(configs[1].address.as_deref(), Some("10.0.0.2"));
        assert_eq!(configs[2].address.as_deref(), Some("10.0.0.3"));
        assert_eq!(configs[0].mtu, Some(9000));
    }

    #[test]
    fn test_unconvertible_value_degrades_to_none() {
        let inventory = Inventory::default().with_group("g", ["h"]).with_host(
            "h",
            vars(json!({"spu_address": "10.0.0.1", "mtu": "jumbo", "netmask_bits": 300, "dhcp": [1]})),
        );

        let result = build_network_configs(&["g"], &inventory, LookupKeys::default()).unwrap();
        let net = &result[0].ip_info_config[0];
        assert_eq!(net.mtu, None);
        assert_eq!(net.netmask_bits, None);
        assert_eq!(net.dhcp, None);
        assert_eq!(net.address.as_deref(), Some("10.0.0.1"));
    }
}
