//! Volume Reconciler
//!
//! Volumes are identified by name within an nPod. They cannot be modified
//! after creation, so differences on an existing volume are reported but
//! never applied.

use super::{single, Diff, ReconcileOutcome, ResourceState};
use crate::domain::ports::{CreateVolume, Volume, VolumeStore};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

fn default_mirrored() -> bool {
    true
}

/// Desired settings of a volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub name: String,
    pub npod_uuid: String,
    /// Required for creation
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default = "default_mirrored")]
    pub mirrored: bool,
    #[serde(default)]
    pub owner_spu_serial: Option<String>,
    #[serde(default)]
    pub backup_spu_serial: Option<String>,
    #[serde(default)]
    pub force: bool,
}

impl VolumeSpec {
    pub fn new(name: impl Into<String>, npod_uuid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            npod_uuid: npod_uuid.into(),
            size_bytes: None,
            mirrored: default_mirrored(),
            owner_spu_serial: None,
            backup_spu_serial: None,
            force: false,
        }
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    pub fn with_mirrored(mut self, mirrored: bool) -> Self {
        self.mirrored = mirrored;
        self
    }

    /// Fields of `volume` that differ from this spec
    pub fn diff(&self, volume: &Volume) -> Diff {
        Diff::new()
            .compare("size_bytes", Some(&volume.size_bytes), self.size_bytes.as_ref())
            .compare("mirrored", Some(&volume.mirrored), Some(&self.mirrored))
            .compare(
                "owner_spu_serial",
                volume.owner_spu_serial.as_deref(),
                self.owner_spu_serial.as_deref(),
            )
            .compare(
                "backup_spu_serial",
                volume.backup_spu_serial.as_deref(),
                self.backup_spu_serial.as_deref(),
            )
    }

    fn create_input(&self) -> Result<CreateVolume> {
        let size_bytes = self.size_bytes.ok_or_else(|| {
            Error::Configuration(format!("Volume {} needs a size to be created", self.name))
        })?;

        Ok(CreateVolume {
            name: self.name.clone(),
            npod_uuid: self.npod_uuid.clone(),
            size_bytes,
            mirrored: self.mirrored,
            owner_spu_serial: self.owner_spu_serial.clone(),
            backup_spu_serial: self.backup_spu_serial.clone(),
            force: self.force,
        })
    }
}

/// Creates and deletes volumes
pub struct VolumeReconciler {
    store: Arc<dyn VolumeStore>,
}

impl VolumeReconciler {
    pub fn new(store: Arc<dyn VolumeStore>) -> Self {
        Self { store }
    }

    pub async fn apply(&self, spec: &VolumeSpec, state: ResourceState) -> Result<ReconcileOutcome<Volume>> {
        let found = self.store.find_volumes(&spec.name, &spec.npod_uuid).await?;
        let existing = single(found, "volume", &spec.name)?;

        match (state, existing) {
            (ResourceState::Absent, None) => Ok(ReconcileOutcome::unchanged(None)),
            (ResourceState::Absent, Some(volume)) => {
                self.store.delete_volume(&volume.uuid).await?;
                info!("Deleted volume {} ({})", volume.name, volume.uuid);
                Ok(ReconcileOutcome::changed(None))
            }
            (ResourceState::Present, None) => {
                let volume = self.store.create_volume(spec.create_input()?).await?;
                info!(
                    "Created volume {} ({}) in nPod {}",
                    volume.name, volume.uuid, volume.npod_uuid
                );
                Ok(ReconcileOutcome::changed(Some(volume)))
            }
            (ResourceState::Present, Some(volume)) => {
                let diff = spec.diff(&volume);
                if diff.is_empty() {
                    debug!("Volume {} is up to date", volume.name);
                } else {
                    warn!("Volume {} differs from requested settings: {}", volume.name, diff);
                }
                Ok(ReconcileOutcome::unchanged(Some(volume)).with_diff(diff))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::memory::{InMemoryCloud, InMemoryConfig};
    use assert_matches::assert_matches;

    const GIB: u64 = 1 << 30;

    fn setup() -> (Arc<InMemoryCloud>, String, VolumeReconciler) {
        let cloud = InMemoryCloud::new(InMemoryConfig::default());
        let npod = cloud.add_npod("pod", &["h1", "h2"]);
        let reconciler = VolumeReconciler::new(cloud.clone());
        (cloud, npod.uuid, reconciler)
    }

    #[tokio::test]
    async fn test_create_and_repeat() {
        let (cloud, npod, reconciler) = setup();
        let spec = VolumeSpec::new("data", &npod).with_size(4 * GIB);

        let outcome = reconciler.apply(&spec, ResourceState::Present).await.unwrap();
        assert!(outcome.changed);
        let volume = outcome.resource.unwrap();
        assert_eq!(volume.size_bytes, 4 * GIB);
        assert!(volume.mirrored);

        let outcome = reconciler.apply(&spec, ResourceState::Present).await.unwrap();
        assert!(!outcome.changed);
        assert!(outcome.diff.is_empty());
        assert_eq!(cloud.find_volumes("data", &npod).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_requires_size() {
        let (_cloud, npod, reconciler) = setup();
        let result = reconciler
            .apply(&VolumeSpec::new("data", &npod), ResourceState::Present)
            .await;
        assert_matches!(result, Err(Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_drift_is_reported_not_applied() {
        let (cloud, npod, reconciler) = setup();
        reconciler
            .apply(&VolumeSpec::new("data", &npod).with_size(GIB), ResourceState::Present)
            .await
            .unwrap();

        let spec = VolumeSpec::new("data", &npod)
            .with_size(2 * GIB)
            .with_mirrored(false);
        let outcome = reconciler.apply(&spec, ResourceState::Present).await.unwrap();

        assert!(!outcome.changed);
        assert_eq!(outcome.diff.fields(), vec!["size_bytes", "mirrored"]);
        let volume = &cloud.find_volumes("data", &npod).await.unwrap()[0];
        assert_eq!(volume.size_bytes, GIB);
    }

    #[tokio::test]
    async fn test_delete() {
        let (cloud, npod, reconciler) = setup();
        let spec = VolumeSpec::new("data", &npod).with_size(GIB);
        reconciler.apply(&spec, ResourceState::Present).await.unwrap();

        let outcome = reconciler.apply(&spec, ResourceState::Absent).await.unwrap();
        assert!(outcome.changed);
        assert!(outcome.resource.is_none());
        assert!(cloud.find_volumes("data", &npod).await.unwrap().is_empty());

        let outcome = reconciler.apply(&spec, ResourceState::Absent).await.unwrap();
        assert!(!outcome.changed);
    }

    #[tokio::test]
    async fn test_same_name_in_other_npod_is_distinct() {
        let (cloud, npod, reconciler) = setup();
        let other = cloud.add_npod("other", &["h3"]);
        cloud.add_volume(&other.uuid, "data", "h3");

        let outcome = reconciler
            .apply(&VolumeSpec::new("data", &npod).with_size(GIB), ResourceState::Present)
            .await
            .unwrap();
        assert!(outcome.changed);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let (cloud, npod, reconciler) = setup();
        cloud.fail_operation("find_volumes");

        let result = reconciler
            .apply(&VolumeSpec::new("data", &npod), ResourceState::Absent)
            .await;
        assert_matches!(result, Err(Error::BackingStore { .. }));
    }
}
