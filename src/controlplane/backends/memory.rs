//! In-Memory Management Cloud
//!
//! An in-process implementation of every store port. It keeps volumes,
//! nPods, nPod groups and LUNs in memory and models the asynchronous LUN
//! deletion of the real cloud: deleted exports stay visible for a
//! configurable number of confirmation polls.

use crate::domain::ports::{
    CreateLunRequest, CreateNpod, CreateNpodGroup, CreateVolume, Lun, LunScope, LunStore, Npod,
    NpodGroup, NpodGroupStore, NpodStore, UpdateNpodGroup, Volume, VolumeStore,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the in-memory cloud
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// Confirmation polls that still see a deleted export
    pub deletion_lag_polls: u32,
    /// LUN id assigned to the first export of a volume
    pub first_lun_id: u32,
    /// Size given to volumes added with [`InMemoryCloud::add_volume`]
    pub default_volume_size_bytes: u64,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            deletion_lag_polls: 0,
            first_lun_id: 1,
            default_volume_size_bytes: 10 * 1024 * 1024 * 1024, // 10GB
        }
    }
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug)]
struct PendingDeletion {
    luns: Vec<Lun>,
    polls_remaining: u32,
}

#[derive(Debug, Default)]
struct CloudState {
    volumes: BTreeMap<String, Volume>,
    npods: BTreeMap<String, Npod>,
    npod_groups: BTreeMap<String, NpodGroup>,
    /// Active LUNs in creation order
    luns: Vec<Lun>,
    /// Deleted definitions that are still listed
    pending: BTreeMap<String, PendingDeletion>,
    failures: HashSet<String>,
    calls: Vec<String>,
}

impl CloudState {
    fn visible_luns(&self) -> impl Iterator<Item = &Lun> {
        self.luns
            .iter()
            .chain(self.pending.values().flat_map(|p| p.luns.iter()))
    }

    fn next_lun_id(&self, volume_uuid: &str, first: u32) -> u32 {
        self.luns
            .iter()
            .filter(|l| l.volume_uuid == volume_uuid)
            .map(|l| l.lun_id + 1)
            .max()
            .unwrap_or(first)
    }
}

// =============================================================================
// In-Memory Cloud
// =============================================================================

/// In-process management cloud implementing all store ports
pub struct InMemoryCloud {
    config: InMemoryConfig,
    state: RwLock<CloudState>,
}

impl InMemoryCloud {
    /// Create a new, empty cloud
    pub fn new(config: InMemoryConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: RwLock::new(CloudState::default()),
        })
    }

    /// Add an nPod with the given member hosts
    pub fn add_npod(&self, name: &str, host_uuids: &[&str]) -> Npod {
        let npod = Npod {
            uuid: generate_id(),
            name: name.to_string(),
            host_uuids: host_uuids.iter().map(|h| h.to_string()).collect(),
            spu_serials: Vec::new(),
            npod_group_uuid: None,
            npod_template_uuid: None,
            note: None,
        };
        self.state.write().npods.insert(npod.uuid.clone(), npod.clone());
        npod
    }

    /// Add a volume owned by `owner_host_uuid`
    pub fn add_volume(&self, npod_uuid: &str, name: &str, owner_host_uuid: &str) -> Volume {
        let volume = Volume {
            uuid: generate_id(),
            name: name.to_string(),
            npod_uuid: npod_uuid.to_string(),
            natural_owner_host_uuid: owner_host_uuid.to_string(),
            size_bytes: self.config.default_volume_size_bytes,
            mirrored: false,
            owner_spu_serial: None,
            backup_spu_serial: None,
            created_at: chrono::Utc::now(),
        };
        self.state.write().volumes.insert(volume.uuid.clone(), volume.clone());
        volume
    }

    /// Make every subsequent call of `operation` fail
    pub fn fail_operation(&self, operation: &str) {
        self.state.write().failures.insert(operation.to_string());
    }

    /// Stop failing calls
    pub fn clear_failures(&self) {
        self.state.write().failures.clear();
    }

    /// Names of the store operations called so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.read().calls.clone()
    }

    /// Record a call and apply injected failures
    fn enter(&self, operation: &str) -> Result<()> {
        let mut state = self.state.write();
        state.calls.push(operation.to_string());
        if state.failures.contains(operation) {
            return Err(Error::backing_store(operation, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl LunStore for InMemoryCloud {
    async fn get_volume(&self, volume_uuid: &str) -> Result<Volume> {
        self.enter("get_volume")?;
        self.state
            .read()
            .volumes
            .get(volume_uuid)
            .cloned()
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "Volume".into(),
                name: volume_uuid.into(),
            })
    }

    async fn get_npod(&self, npod_uuid: &str) -> Result<Npod> {
        self.enter("get_npod")?;
        self.state
            .read()
            .npods
            .get(npod_uuid)
            .cloned()
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "nPod".into(),
                name: npod_uuid.into(),
            })
    }

    async fn list_luns(&self, volume_uuid: &str) -> Result<Vec<Lun>> {
        self.enter("list_luns")?;
        let state = self.state.read();
        Ok(state
            .visible_luns()
            .filter(|l| l.volume_uuid == volume_uuid)
            .cloned()
            .collect())
    }

    async fn find_luns(&self, definition_uuids: &[String]) -> Result<Vec<Lun>> {
        self.enter("find_luns")?;
        let mut state = self.state.write();

        let mut found: Vec<Lun> = state
            .luns
            .iter()
            .filter(|l| definition_uuids.contains(&l.definition_uuid))
            .cloned()
            .collect();

        for (uuid, pending) in state.pending.iter_mut() {
            if definition_uuids.contains(uuid) && pending.polls_remaining > 0 {
                found.extend(pending.luns.iter().cloned());
                pending.polls_remaining -= 1;
            }
        }
        state.pending.retain(|_, p| p.polls_remaining > 0);

        Ok(found)
    }

    async fn create_lun(&self, request: CreateLunRequest) -> Result<Lun> {
        self.enter("create_lun")?;
        let mut state = self.state.write();

        let volume = state
            .volumes
            .get(&request.volume_uuid)
            .cloned()
            .ok_or_else(|| Error::backing_store("create_lun", format!("volume {} not found", request.volume_uuid)))?;
        let npod = state
            .npods
            .get(&volume.npod_uuid)
            .cloned()
            .ok_or_else(|| Error::backing_store("create_lun", format!("nPod {} not found", volume.npod_uuid)))?;

        let lun_id = request
            .lun_id
            .unwrap_or_else(|| state.next_lun_id(&volume.uuid, self.config.first_lun_id));

        let hosts: Vec<String> = match &request.scope {
            LunScope::Npod => npod
                .host_uuids
                .iter()
                .filter(|h| {
                    !state
                        .luns
                        .iter()
                        .any(|l| l.volume_uuid == volume.uuid && &l.host_uuid == *h && l.lun_id == lun_id)
                })
                .cloned()
                .collect(),
            LunScope::Host { host_uuid } => {
                if !npod.host_uuids.contains(host_uuid) {
                    return Err(Error::backing_store(
                        "create_lun",
                        format!("host {} is not a member of nPod {}", host_uuid, npod.uuid),
                    ));
                }
                vec![host_uuid.clone()]
            }
        };

        if hosts.is_empty() {
            return Err(Error::backing_store(
                "create_lun",
                format!("no hosts to export volume {} to", volume.uuid),
            ));
        }

        let definition_uuid = generate_id();
        let luns: Vec<Lun> = hosts
            .into_iter()
            .map(|host_uuid| Lun {
                uuid: generate_id(),
                definition_uuid: definition_uuid.clone(),
                volume_uuid: volume.uuid.clone(),
                host_uuid,
                spu_serial: volume.owner_spu_serial.clone(),
                lun_id,
            })
            .collect();

        info!(
            "Created LUN definition {} for volume {} ({} hosts, LUN id {})",
            definition_uuid,
            volume.uuid,
            luns.len(),
            lun_id
        );

        let first = luns[0].clone();
        state.luns.extend(luns);
        Ok(first)
    }

    async fn delete_lun(&self, definition_uuid: &str) -> Result<()> {
        self.enter("delete_lun")?;
        let mut state = self.state.write();

        let (removed, kept): (Vec<Lun>, Vec<Lun>) = std::mem::take(&mut state.luns)
            .into_iter()
            .partition(|l| l.definition_uuid == definition_uuid);
        state.luns = kept;

        if removed.is_empty() {
            if state.pending.contains_key(definition_uuid) {
                debug!("LUN definition {} is already being removed", definition_uuid);
                return Ok(());
            }
            return Err(Error::ResourceNotFound {
                kind: "LUN".into(),
                name: definition_uuid.into(),
            });
        }

        debug!(
            "Scheduled removal of LUN definition {} ({} LUNs)",
            definition_uuid,
            removed.len()
        );

        if self.config.deletion_lag_polls > 0 {
            state.pending.insert(
                definition_uuid.to_string(),
                PendingDeletion {
                    luns: removed,
                    polls_remaining: self.config.deletion_lag_polls,
                },
            );
        }
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl VolumeStore for InMemoryCloud {
    async fn find_volumes(&self, name: &str, npod_uuid: &str) -> Result<Vec<Volume>> {
        self.enter("find_volumes")?;
        Ok(self
            .state
            .read()
            .volumes
            .values()
            .filter(|v| v.name == name && v.npod_uuid == npod_uuid)
            .cloned()
            .collect())
    }

    async fn create_volume(&self, input: CreateVolume) -> Result<Volume> {
        self.enter("create_volume")?;
        let mut state = self.state.write();

        let npod = state.npods.get(&input.npod_uuid).ok_or_else(|| {
            Error::backing_store("create_volume", format!("nPod {} not found", input.npod_uuid))
        })?;
        let owner = npod.host_uuids.first().cloned().ok_or_else(|| {
            Error::backing_store("create_volume", format!("nPod {} has no hosts", npod.uuid))
        })?;

        let volume = Volume {
            uuid: generate_id(),
            name: input.name,
            npod_uuid: input.npod_uuid,
            natural_owner_host_uuid: owner,
            size_bytes: input.size_bytes,
            mirrored: input.mirrored,
            owner_spu_serial: input.owner_spu_serial,
            backup_spu_serial: input.backup_spu_serial,
            created_at: chrono::Utc::now(),
        };

        info!("Created volume {} ({})", volume.name, volume.uuid);
        state.volumes.insert(volume.uuid.clone(), volume.clone());
        Ok(volume)
    }

    async fn delete_volume(&self, volume_uuid: &str) -> Result<()> {
        self.enter("delete_volume")?;
        let mut state = self.state.write();

        if state.luns.iter().any(|l| l.volume_uuid == volume_uuid) {
            return Err(Error::backing_store(
                "delete_volume",
                format!("volume {} is still exported", volume_uuid),
            ));
        }

        state
            .volumes
            .remove(volume_uuid)
            .map(|_| ())
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "Volume".into(),
                name: volume_uuid.into(),
            })
    }
}

#[async_trait]
impl NpodStore for InMemoryCloud {
    async fn find_npods(&self, name: &str) -> Result<Vec<Npod>> {
        self.enter("find_npods")?;
        Ok(self
            .state
            .read()
            .npods
            .values()
            .filter(|n| n.name == name)
            .cloned()
            .collect())
    }

    async fn create_npod(&self, input: CreateNpod) -> Result<Npod> {
        self.enter("create_npod")?;
        let mut state = self.state.write();

        if input.spus.is_empty() {
            return Err(Error::backing_store(
                "create_npod",
                format!("nPod {} has no SPUs", input.name),
            ));
        }

        let mut spu_serials = Vec::with_capacity(input.spus.len());
        for spu in &input.spus {
            let serial = spu.spu_serial.clone().ok_or_else(|| {
                Error::backing_store("create_npod", "SPU configuration without serial")
            })?;
            if spu.ip_info_config.is_empty() {
                return Err(Error::backing_store(
                    "create_npod",
                    format!("SPU {} has no network configuration", serial),
                ));
            }
            let claimed = state.npods.values().any(|n| n.spu_serials.contains(&serial));
            if claimed || spu_serials.contains(&serial) {
                return Err(Error::backing_store(
                    "create_npod",
                    format!("SPU {} already belongs to an nPod", serial),
                ));
            }
            spu_serials.push(serial);
        }

        if let Some(group_uuid) = &input.npod_group_uuid {
            if !state.npod_groups.contains_key(group_uuid) {
                return Err(Error::backing_store(
                    "create_npod",
                    format!("nPod group {} not found", group_uuid),
                ));
            }
        }

        // every SPU sits in its own server
        let npod = Npod {
            uuid: generate_id(),
            name: input.name,
            host_uuids: spu_serials.iter().map(|_| generate_id()).collect(),
            spu_serials,
            npod_group_uuid: input.npod_group_uuid,
            npod_template_uuid: input.npod_template_uuid,
            note: input.note,
        };

        if let Some(group) = npod
            .npod_group_uuid
            .as_ref()
            .and_then(|uuid| state.npod_groups.get_mut(uuid))
        {
            group.npod_uuids.push(npod.uuid.clone());
        }

        info!(
            "Created nPod {} ({}) with {} SPUs",
            npod.name,
            npod.uuid,
            npod.spu_serials.len()
        );
        state.npods.insert(npod.uuid.clone(), npod.clone());
        Ok(npod)
    }

    async fn delete_npod(&self, npod_uuid: &str) -> Result<()> {
        self.enter("delete_npod")?;
        let mut state = self.state.write();

        if state.volumes.values().any(|v| v.npod_uuid == npod_uuid) {
            return Err(Error::backing_store(
                "delete_npod",
                format!("nPod {} still has volumes", npod_uuid),
            ));
        }

        let npod = state
            .npods
            .remove(npod_uuid)
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "nPod".into(),
                name: npod_uuid.into(),
            })?;
        for group in state.npod_groups.values_mut() {
            group.npod_uuids.retain(|uuid| uuid != &npod.uuid);
        }
        Ok(())
    }
}

#[async_trait]
impl NpodGroupStore for InMemoryCloud {
    async fn find_npod_groups(&self, name: &str) -> Result<Vec<NpodGroup>> {
        self.enter("find_npod_groups")?;
        Ok(self
            .state
            .read()
            .npod_groups
            .values()
            .filter(|g| g.name == name)
            .cloned()
            .collect())
    }

    async fn create_npod_group(&self, input: CreateNpodGroup) -> Result<NpodGroup> {
        self.enter("create_npod_group")?;
        let group = NpodGroup {
            uuid: generate_id(),
            name: input.name,
            note: input.note,
            npod_uuids: Vec::new(),
        };
        self.state
            .write()
            .npod_groups
            .insert(group.uuid.clone(), group.clone());
        Ok(group)
    }

    async fn update_npod_group(&self, uuid: &str, input: UpdateNpodGroup) -> Result<NpodGroup> {
        self.enter("update_npod_group")?;
        let mut state = self.state.write();
        let group = state
            .npod_groups
            .get_mut(uuid)
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "nPod group".into(),
                name: uuid.into(),
            })?;

        if let Some(name) = input.name {
            group.name = name;
        }
        if input.note.is_some() {
            group.note = input.note;
        }
        Ok(group.clone())
    }

    async fn delete_npod_group(&self, uuid: &str) -> Result<()> {
        self.enter("delete_npod_group")?;
        self.state
            .write()
            .npod_groups
            .remove(uuid)
            .map(|_| ())
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "nPod group".into(),
                name: uuid.into(),
            })
    }
}

/// Generate a unique ID
fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
