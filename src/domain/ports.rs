//! Domain Ports - Core trait definitions for the nPod control plane
//!
//! These traits define the boundary between the reconciliation logic and the
//! remote management cloud. The cloud itself (connection, authentication,
//! pagination, filtering) is opaque; adapters implement these traits to
//! provide concrete functionality.

use crate::error::Result;
use crate::inventory::HostNetworkEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Volumes and nPods
// =============================================================================

/// A volume as reported by the management cloud
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Unique identifier of the volume
    pub uuid: String,
    /// Human readable name, unique within its nPod
    pub name: String,
    /// nPod the volume lives in
    pub npod_uuid: String,
    /// Host that owns the volume
    pub natural_owner_host_uuid: String,
    /// Volume size in bytes
    pub size_bytes: u64,
    /// Whether the volume is mirrored to a backup SPU
    pub mirrored: bool,
    /// SPU serving the volume
    pub owner_spu_serial: Option<String>,
    /// SPU holding the mirror
    pub backup_spu_serial: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// An nPod: a named group of hosts and SPUs sharing a volume namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Npod {
    pub uuid: String,
    pub name: String,
    /// Hosts that are members of the nPod, in the order the cloud reports them
    pub host_uuids: Vec<String>,
    #[serde(default)]
    pub spu_serials: Vec<String>,
    #[serde(default)]
    pub npod_group_uuid: Option<String>,
    #[serde(default)]
    pub npod_template_uuid: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Input for creating a new nPod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateNpod {
    pub name: String,
    pub npod_group_uuid: Option<String>,
    /// Network configuration of every SPU joining the nPod
    pub spus: Vec<HostNetworkEntry>,
    pub npod_template_uuid: Option<String>,
    pub note: Option<String>,
    /// Timezone configured on all SPUs
    pub timezone: Option<String>,
    /// Proceed even if the cloud reports warnings
    pub ignore_warnings: bool,
}

/// Input for creating a new volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateVolume {
    pub name: String,
    pub npod_uuid: String,
    pub size_bytes: u64,
    pub mirrored: bool,
    pub owner_spu_serial: Option<String>,
    pub backup_spu_serial: Option<String>,
    /// Skip capacity and placement safety checks
    pub force: bool,
}

// =============================================================================
// LUNs (export grants)
// =============================================================================

/// One volume made visible to one host
///
/// All LUNs created by a single export request share a `definition_uuid`.
/// Deleting a definition removes every host's LUN that belongs to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lun {
    /// Unique identifier of this per-host LUN
    pub uuid: String,
    /// Identifier of the export definition this LUN belongs to
    pub definition_uuid: String,
    /// Exported volume
    pub volume_uuid: String,
    /// Host that can see the volume
    pub host_uuid: String,
    /// SPU that serves the export
    pub spu_serial: Option<String>,
    /// Export-group id, identical for every LUN of the same export
    pub lun_id: u32,
}

/// Which hosts a new export targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LunScope {
    /// Every host in the volume's nPod
    Npod,
    /// Exactly one host, exported locally
    Host { host_uuid: String },
}

/// Request for a new export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLunRequest {
    pub volume_uuid: String,
    /// Requested export-group id; the store assigns one when absent
    pub lun_id: Option<u32>,
    pub scope: LunScope,
}

// =============================================================================
// nPod Groups
// =============================================================================

/// A named collection of nPods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpodGroup {
    pub uuid: String,
    pub name: String,
    pub note: Option<String>,
    pub npod_uuids: Vec<String>,
}

/// Input for creating an nPod group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateNpodGroup {
    pub name: String,
    pub note: Option<String>,
}

/// Input for updating an nPod group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateNpodGroup {
    pub name: Option<String>,
    pub note: Option<String>,
}

// =============================================================================
// LUN Store Port
// =============================================================================

/// Port for the parts of the management cloud that volume access needs
#[async_trait]
pub trait LunStore: Send + Sync {
    /// Get the volume with the given UUID; fails unless exactly one matches
    async fn get_volume(&self, volume_uuid: &str) -> Result<Volume>;

    /// Get the nPod with the given UUID; fails unless exactly one matches
    async fn get_npod(&self, npod_uuid: &str) -> Result<Npod>;

    /// List every LUN currently exporting a volume
    async fn list_luns(&self, volume_uuid: &str) -> Result<Vec<Lun>>;

    /// List every LUN that belongs to one of the given export definitions
    async fn find_luns(&self, definition_uuids: &[String]) -> Result<Vec<Lun>>;

    /// Create a new export and return one of its LUNs
    async fn create_lun(&self, request: CreateLunRequest) -> Result<Lun>;

    /// Request removal of an export definition
    ///
    /// Removal is asynchronous: the LUNs may still be listed for a while.
    async fn delete_lun(&self, definition_uuid: &str) -> Result<()>;

    /// Get the backend name
    fn backend_name(&self) -> &str;
}

// =============================================================================
// Volume Store Port
// =============================================================================

/// Port for volume lifecycle management
#[async_trait]
pub trait VolumeStore: Send + Sync {
    /// Find volumes by name within an nPod
    async fn find_volumes(&self, name: &str, npod_uuid: &str) -> Result<Vec<Volume>>;

    /// Create a volume
    async fn create_volume(&self, input: CreateVolume) -> Result<Volume>;

    /// Delete a volume
    async fn delete_volume(&self, volume_uuid: &str) -> Result<()>;
}

// =============================================================================
// nPod Store Port
// =============================================================================

/// Port for nPod lifecycle management
#[async_trait]
pub trait NpodStore: Send + Sync {
    /// Find nPods by name
    async fn find_npods(&self, name: &str) -> Result<Vec<Npod>>;

    /// Create an nPod from a set of SPUs
    async fn create_npod(&self, input: CreateNpod) -> Result<Npod>;

    /// Delete an nPod, releasing its SPUs
    async fn delete_npod(&self, npod_uuid: &str) -> Result<()>;
}

// =============================================================================
// nPod Group Store Port
// =============================================================================

/// Port for nPod group management
#[async_trait]
pub trait NpodGroupStore: Send + Sync {
    /// Find nPod groups by name
    async fn find_npod_groups(&self, name: &str) -> Result<Vec<NpodGroup>>;

    /// Create an nPod group
    async fn create_npod_group(&self, input: CreateNpodGroup) -> Result<NpodGroup>;

    /// Update an nPod group
    async fn update_npod_group(&self, uuid: &str, input: UpdateNpodGroup) -> Result<NpodGroup>;

    /// Delete an nPod group
    async fn delete_npod_group(&self, uuid: &str) -> Result<()>;
}

/// A management cloud implementing every store port
pub trait ManagementCloud: LunStore + VolumeStore + NpodStore + NpodGroupStore {}

impl<T: LunStore + VolumeStore + NpodStore + NpodGroupStore> ManagementCloud for T {}
