//! nPod Reconciler
//!
//! nPods are identified by name and built from the SPU network configuration
//! the inventory lookup produces. An existing nPod is never modified, so
//! differences are reported only.

use super::{single, Diff, ReconcileOutcome, ResourceState};
use crate::domain::ports::{CreateNpod, Npod, NpodStore};
use crate::error::{Error, Result};
use crate::inventory::HostNetworkEntry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Desired settings of an nPod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpodSpec {
    pub name: String,
    #[serde(default)]
    pub npod_group_uuid: Option<String>,
    /// Required for creation
    #[serde(default)]
    pub spus: Vec<HostNetworkEntry>,
    #[serde(default)]
    pub npod_template_uuid: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub ignore_warnings: bool,
}

impl NpodSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            npod_group_uuid: None,
            spus: Vec::new(),
            npod_template_uuid: None,
            note: None,
            timezone: None,
            ignore_warnings: false,
        }
    }

    pub fn with_spus(mut self, spus: Vec<HostNetworkEntry>) -> Self {
        self.spus = spus;
        self
    }

    pub fn with_group(mut self, npod_group_uuid: impl Into<String>) -> Self {
        self.npod_group_uuid = Some(npod_group_uuid.into());
        self
    }

    pub fn with_template(mut self, npod_template_uuid: impl Into<String>) -> Self {
        self.npod_template_uuid = Some(npod_template_uuid.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Fields of `npod` that differ from this spec
    ///
    /// SPUs are compared by serial, ignoring order.
    pub fn diff(&self, npod: &Npod) -> Diff {
        let desired_serials = (!self.spus.is_empty())
            .then(|| serial_list(self.spus.iter().filter_map(|s| s.spu_serial.as_deref())));
        let current_serials = serial_list(npod.spu_serials.iter().map(String::as_str));

        Diff::new()
            .compare(
                "npod_group_uuid",
                npod.npod_group_uuid.as_deref(),
                self.npod_group_uuid.as_deref(),
            )
            .compare(
                "spu_serials",
                Some(current_serials.as_str()),
                desired_serials.as_deref(),
            )
            .compare(
                "npod_template_uuid",
                npod.npod_template_uuid.as_deref(),
                self.npod_template_uuid.as_deref(),
            )
            .compare("note", npod.note.as_deref(), self.note.as_deref())
    }

    fn create_input(&self) -> Result<CreateNpod> {
        if self.spus.is_empty() {
            return Err(Error::Configuration(format!(
                "nPod {} needs at least one SPU to be created",
                self.name
            )));
        }
        if self.spus.iter().any(|s| s.spu_serial.is_none()) {
            return Err(Error::Configuration(format!(
                "Every SPU of nPod {} needs a serial number",
                self.name
            )));
        }

        Ok(CreateNpod {
            name: self.name.clone(),
            npod_group_uuid: self.npod_group_uuid.clone(),
            spus: self.spus.clone(),
            npod_template_uuid: self.npod_template_uuid.clone(),
            note: self.note.clone(),
            timezone: self.timezone.clone(),
            ignore_warnings: self.ignore_warnings,
        })
    }
}

fn serial_list<'a>(serials: impl Iterator<Item = &'a str>) -> String {
    let mut serials: Vec<&str> = serials.collect();
    serials.sort_unstable();
    serials.join(",")
}

/// Creates and deletes nPods
pub struct NpodReconciler {
    store: Arc<dyn NpodStore>,
}

impl NpodReconciler {
    pub fn new(store: Arc<dyn NpodStore>) -> Self {
        Self { store }
    }

    /// Bring the nPod named in `spec` to `state`
    pub async fn apply(&self, spec: &NpodSpec, state: ResourceState) -> Result<ReconcileOutcome<Npod>> {
        let found = self.store.find_npods(&spec.name).await?;
        let existing = single(found, "nPod", &spec.name)?;

        match (state, existing) {
            (ResourceState::Absent, None) => {
                debug!("nPod {} already absent", spec.name);
                Ok(ReconcileOutcome::unchanged(None))
            }
            (ResourceState::Absent, Some(npod)) => {
                self.store.delete_npod(&npod.uuid).await?;
                info!("Deleted nPod {} ({})", npod.name, npod.uuid);
                Ok(ReconcileOutcome::changed(None))
            }
            (ResourceState::Present, None) => {
                let npod = self.store.create_npod(spec.create_input()?).await?;
                info!(
                    "Created nPod {} ({}) with SPUs [{}]",
                    npod.name,
                    npod.uuid,
                    npod.spu_serials.join(", ")
                );
                Ok(ReconcileOutcome::changed(Some(npod)))
            }
            (ResourceState::Present, Some(npod)) => {
                let diff = spec.diff(&npod);
                if diff.is_empty() {
                    debug!("nPod {} is up to date", npod.name);
                } else {
                    warn!("nPod {} differs from requested settings: {}", npod.name, diff);
                }
                Ok(ReconcileOutcome::unchanged(Some(npod)).with_diff(diff))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::memory::{InMemoryCloud, InMemoryConfig};
    use crate::domain::ports::{CreateNpodGroup, NpodGroupStore};
    use crate::inventory::{build_network_configs, Inventory, LookupKeys};
    use assert_matches::assert_matches;
    use serde_json::json;

    fn reconciler() -> (Arc<InMemoryCloud>, NpodReconciler) {
        let cloud = InMemoryCloud::new(InMemoryConfig::default());
        let reconciler = NpodReconciler::new(cloud.clone());
        (cloud, reconciler)
    }

    fn spus(serials: &[&str]) -> Vec<HostNetworkEntry> {
        let mut inventory = Inventory::default().with_group("servers", serials.iter().copied());
        for (i, serial) in serials.iter().enumerate() {
            let vars = json!({
                "spu_serial": serial,
                "spu_address": format!("10.0.0.{}", i + 1),
                "netmask_bits": 24,
            });
            match vars {
                serde_json::Value::Object(map) => inventory = inventory.with_host(serial, map),
                _ => panic!("expected an object"),
            }
        }
        build_network_configs(&["servers"], &inventory, LookupKeys::default()).unwrap()
    }

    #[tokio::test]
    async fn test_create_from_inventory_lookup() {
        let (cloud, reconciler) = reconciler();
        let spec = NpodSpec::new("pod").with_spus(spus(&["S1", "S2"])).with_note("rack 4");

        let outcome = reconciler.apply(&spec, ResourceState::Present).await.unwrap();
        assert!(outcome.changed);
        let npod = outcome.resource.unwrap();
        assert_eq!(npod.spu_serials, vec!["S1", "S2"]);
        assert_eq!(npod.note.as_deref(), Some("rack 4"));
        assert_eq!(cloud.find_npods("pod").await.unwrap().len(), 1);

        let again = reconciler.apply(&spec, ResourceState::Present).await.unwrap();
        assert!(!again.changed);
        assert!(again.diff.is_empty());
        assert_eq!(cloud.calls().iter().filter(|c| *c == "create_npod").count(), 1);
    }

    #[tokio::test]
    async fn test_create_joins_group() {
        let (cloud, reconciler) = reconciler();
        let group = cloud
            .create_npod_group(CreateNpodGroup {
                name: "edge".into(),
                note: None,
            })
            .await
            .unwrap();

        let spec = NpodSpec::new("pod").with_spus(spus(&["S1"])).with_group(&group.uuid);
        let npod = reconciler
            .apply(&spec, ResourceState::Present)
            .await
            .unwrap()
            .resource
            .unwrap();

        assert_eq!(npod.npod_group_uuid.as_deref(), Some(group.uuid.as_str()));
        assert_eq!(cloud.find_npod_groups("edge").await.unwrap()[0].npod_uuids, vec![npod.uuid]);
    }

    #[tokio::test]
    async fn test_create_requires_spus() {
        let (cloud, reconciler) = reconciler();
        let result = reconciler.apply(&NpodSpec::new("pod"), ResourceState::Present).await;
        assert_matches!(result, Err(Error::Configuration(_)));

        let mut unnamed = spus(&["S1"]);
        unnamed[0].spu_serial = None;
        let result = reconciler
            .apply(&NpodSpec::new("pod").with_spus(unnamed), ResourceState::Present)
            .await;
        assert_matches!(result, Err(Error::Configuration(_)));
        assert!(cloud.calls().iter().all(|c| c != "create_npod"));
    }

    #[tokio::test]
    async fn test_drift_is_reported_not_applied() {
        let (cloud, reconciler) = reconciler();
        reconciler
            .apply(&NpodSpec::new("pod").with_spus(spus(&["S1", "S2"])), ResourceState::Present)
            .await
            .unwrap();

        // same SPUs in another order are not drift
        let reordered = NpodSpec::new("pod").with_spus(spus(&["S2", "S1"]));
        let outcome = reconciler.apply(&reordered, ResourceState::Present).await.unwrap();
        assert!(outcome.diff.is_empty());

        let spec = NpodSpec::new("pod")
            .with_spus(spus(&["S1", "S3"]))
            .with_template("tmpl-1");
        let outcome = reconciler.apply(&spec, ResourceState::Present).await.unwrap();
        assert!(!outcome.changed);
        assert_eq!(outcome.diff.fields(), vec!["spu_serials", "npod_template_uuid"]);
        assert_eq!(cloud.find_npods("pod").await.unwrap()[0].spu_serials, vec!["S1", "S2"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let (cloud, reconciler) = reconciler();
        let spec = NpodSpec::new("pod").with_spus(spus(&["S1"]));
        reconciler.apply(&spec, ResourceState::Present).await.unwrap();

        // SPUs are not needed to delete
        let outcome = reconciler
            .apply(&NpodSpec::new("pod"), ResourceState::Absent)
            .await
            .unwrap();
        assert!(outcome.changed);
        assert!(outcome.resource.is_none());
        assert!(cloud.find_npods("pod").await.unwrap().is_empty());

        let outcome = reconciler.apply(&spec, ResourceState::Absent).await.unwrap();
        assert!(!outcome.changed);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let (cloud, reconciler) = reconciler();
        cloud.fail_operation("create_npod");

        let result = reconciler
            .apply(&NpodSpec::new("pod").with_spus(spus(&["S1"])), ResourceState::Present)
            .await;
        assert_matches!(result, Err(Error::BackingStore { ref operation, .. }) if operation == "create_npod");
    }
}
