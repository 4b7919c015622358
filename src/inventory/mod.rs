//! Inventory Network Lookup
//!
//! Turns inventory variables into SPU network configuration:
//! - Model: groups, per-host variables and global variables
//! - Keys: the eight settings read per host, each renameable
//! - Lookup: bonded and unbonded interface assignment

pub mod keys;
pub mod lookup;
pub mod model;
pub mod network;

pub use keys::*;
pub use lookup::*;
pub use model::*;
pub use network::*;
