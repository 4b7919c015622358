//! nPod Control - Storage Control Plane Core
//!
//! The decision logic behind declarative management of nPods, volumes and
//! their exports on a cloud-managed storage platform.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                           Control Plane                             │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌───────────────┐  ┌────────────────────┐  ┌────────────────────┐  │
//! │  │  SDK Version  │  │   Volume Access    │  │  SPU Network       │  │
//! │  │  Matcher      │  │   Reconciliation   │  │  Lookup            │  │
//! │  └───────────────┘  └─────────┬──────────┘  └────────────────────┘  │
//! │                               │                                     │
//! │  ┌────────────────────────────┴──────────────────────────────────┐  │
//! │  │      Resource Reconcilers (volumes, nPods, nPod groups)       │  │
//! │  └────────────────────────────┬──────────────────────────────────┘  │
//! ├───────────────────────────────┼─────────────────────────────────────┤
//! │                       Store Ports (domain)                          │
//! │     LunStore  ·  VolumeStore  ·  NpodStore  ·  NpodGroupStore       │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                     Management Cloud Backends                       │
//! │                          (in-memory)                                │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`sdk`]: Version pattern matching and SDK validation
//! - [`access`]: Volume visibility intents and LUN reconciliation
//! - [`inventory`]: Inventory to SPU network configuration
//! - [`resources`]: Declarative volume, nPod and nPod group reconcilers
//! - [`controlplane`]: Component wiring and backends
//! - [`config`]: Configuration loading
//! - [`domain`]: Core records and store ports
//! - [`error`]: Error types and handling

pub mod access;
pub mod config;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod inventory;
pub mod resources;
pub mod sdk;

// Re-export commonly used types
pub use access::{
    AccessOutcome, AccessReconciler, Revocation, RevocationSchedule, RevocationStatus,
    VisibilityIntent,
};

pub use config::ControlPlaneConfig;

pub use controlplane::{ControlPlane, InMemoryCloud, InMemoryConfig};

pub use domain::ports::{
    CreateLunRequest, CreateNpod, CreateNpodGroup, CreateVolume, Lun, LunScope, LunStore,
    ManagementCloud, Npod, NpodGroup, NpodGroupStore, NpodStore, UpdateNpodGroup, Volume,
    VolumeStore,
};

pub use error::{Error, ErrorAction, Result};

pub use inventory::{
    BondMode, HostNetworkEntry, InterfaceConfig, Inventory, LookupKey, LookupKeys, NetworkConfig,
    SpuLookup,
};

pub use resources::{
    Diff, FieldChange, NpodGroupReconciler, NpodGroupSpec, NpodReconciler, NpodSpec,
    ReconcileOutcome, ResourceState, VolumeReconciler, VolumeSpec,
};

pub use sdk::{is_sdk_compatible, SdkConfig, SdkValidator, SdkVersion, VersionPattern};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
