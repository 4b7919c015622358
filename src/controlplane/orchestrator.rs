//! Control Plane
//!
//! Wires the components to one management cloud and one configuration:
//! - SDK compatibility checks
//! - Volume access reconciliation
//! - Volume, nPod and nPod group lifecycle
//! - SPU network lookups

use crate::access::{AccessOutcome, AccessReconciler, VisibilityIntent};
use crate::config::ControlPlaneConfig;
use crate::domain::ports::{ManagementCloud, Npod, NpodGroup, Volume};
use crate::error::Result;
use crate::inventory::{HostNetworkEntry, Inventory, LookupKeys, SpuLookup};
use crate::resources::{
    NpodGroupReconciler, NpodGroupSpec, NpodReconciler, NpodSpec, ReconcileOutcome, ResourceState,
    VolumeReconciler, VolumeSpec,
};
use crate::sdk::SdkValidator;
use std::sync::Arc;
use tracing::{debug, info};

/// Entry point bundling every component behind one configuration
pub struct ControlPlane {
    config: ControlPlaneConfig,
    backend: String,
    sdk: SdkValidator,
    access: AccessReconciler,
    volumes: VolumeReconciler,
    npods: NpodReconciler,
    npod_groups: NpodGroupReconciler,
    lookup: SpuLookup,
}

impl ControlPlane {
    /// Validate `config` and build every component on top of `cloud`
    pub fn new<C>(config: ControlPlaneConfig, cloud: Arc<C>) -> Result<Self>
    where
        C: ManagementCloud + 'static,
    {
        config.validate()?;
        let backend = cloud.backend_name().to_string();
        info!("Initializing control plane on backend {}", backend);

        Ok(Self {
            sdk: SdkValidator::new(config.sdk.clone()),
            access: AccessReconciler::new(cloud.clone(), config.revocation.clone()),
            volumes: VolumeReconciler::new(cloud.clone()),
            npods: NpodReconciler::new(cloud.clone()),
            npod_groups: NpodGroupReconciler::new(cloud),
            lookup: SpuLookup::new(config.network.clone()),
            backend,
            config,
        })
    }

    pub fn config(&self) -> &ControlPlaneConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        &self.backend
    }

    /// Check an installed SDK version against the configured allow-list
    pub fn check_sdk(&self, installed: Option<&str>) -> Result<()> {
        self.sdk.validate(installed)
    }

    /// Check an installed SDK version against an explicit allow-list
    pub fn check_sdk_with(&self, installed: Option<&str>, allowed: &[String]) -> Result<()> {
        self.sdk.validate_with(installed, Some(allowed))
    }

    /// Reconcile volume visibility from a user-facing state name
    ///
    /// `state` is one of `present`, `all`, `host`, `local` or `absent`;
    /// `host` requires `host_uuid`.
    pub async fn set_volume_access(
        &self,
        volume_uuid: &str,
        state: &str,
        host_uuid: Option<&str>,
        lun_id: Option<u32>,
    ) -> Result<AccessOutcome> {
        let intent = VisibilityIntent::from_state(state, host_uuid)?;
        self.reconcile_access(volume_uuid, &intent, lun_id).await
    }

    pub async fn reconcile_access(
        &self,
        volume_uuid: &str,
        intent: &VisibilityIntent,
        lun_id: Option<u32>,
    ) -> Result<AccessOutcome> {
        self.access.reconcile_access(volume_uuid, intent, lun_id).await
    }

    pub async fn apply_volume(
        &self,
        spec: &VolumeSpec,
        state: ResourceState,
    ) -> Result<ReconcileOutcome<Volume>> {
        self.volumes.apply(spec, state).await
    }

    pub async fn apply_npod(&self, spec: &NpodSpec, state: ResourceState) -> Result<ReconcileOutcome<Npod>> {
        self.npods.apply(spec, state).await
    }

    pub async fn apply_npod_group(
        &self,
        spec: &NpodGroupSpec,
        state: ResourceState,
    ) -> Result<ReconcileOutcome<NpodGroup>> {
        self.npod_groups.apply(spec, state).await
    }

    /// SPU network configuration for the hosts of `groups`
    pub fn spu_network_configs<S: AsRef<str>>(
        &self,
        groups: &[S],
        inventory: &Inventory,
        keys: LookupKeys,
    ) -> Result<Vec<HostNetworkEntry>> {
        debug!("Building SPU network configuration for {} groups", groups.len());
        self.lookup
            .clone()
            .with_keys(keys)
            .build_network_configs(groups, inventory)
    }
}
