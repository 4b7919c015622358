//! nPod Group Reconciler

use super::{single, Diff, ReconcileOutcome, ResourceState};
use crate::domain::ports::{CreateNpodGroup, NpodGroup, NpodGroupStore, UpdateNpodGroup};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Desired settings of an nPod group, identified by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpodGroupSpec {
    pub name: String,
    #[serde(default)]
    pub note: Option<String>,
}

impl NpodGroupSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Fields of `group` that differ from this spec
    pub fn diff(&self, group: &NpodGroup) -> Diff {
        Diff::new()
            .compare("name", Some(group.name.as_str()), Some(self.name.as_str()))
            .compare("note", group.note.as_deref(), self.note.as_deref())
    }
}

/// Creates, updates and deletes nPod groups
pub struct NpodGroupReconciler {
    store: Arc<dyn NpodGroupStore>,
}

impl NpodGroupReconciler {
    pub fn new(store: Arc<dyn NpodGroupStore>) -> Self {
        Self { store }
    }

    /// Bring the group named in `spec` to `state`
    pub async fn apply(
        &self,
        spec: &NpodGroupSpec,
        state: ResourceState,
    ) -> Result<ReconcileOutcome<NpodGroup>> {
        let found = self.store.find_npod_groups(&spec.name).await?;
        let existing = single(found, "nPod group", &spec.name)?;

        match (state, existing) {
            (ResourceState::Absent, None) => {
                debug!("nPod group {} already absent", spec.name);
                Ok(ReconcileOutcome::unchanged(None))
            }
            (ResourceState::Absent, Some(group)) => {
                self.store.delete_npod_group(&group.uuid).await?;
                info!("Deleted nPod group {} ({})", group.name, group.uuid);
                Ok(ReconcileOutcome::changed(None))
            }
            (ResourceState::Present, None) => {
                let group = self
                    .store
                    .create_npod_group(CreateNpodGroup {
                        name: spec.name.clone(),
                        note: spec.note.clone(),
                    })
                    .await?;
                info!("Created nPod group {} ({})", group.name, group.uuid);
                Ok(ReconcileOutcome::changed(Some(group)))
            }
            (ResourceState::Present, Some(group)) => {
                let diff = spec.diff(&group);
                if diff.is_empty() {
                    return Ok(ReconcileOutcome::unchanged(Some(group)));
                }

                let updated = self
                    .store
                    .update_npod_group(
                        &group.uuid,
                        UpdateNpodGroup {
                            name: Some(spec.name.clone()),
                            note: spec.note.clone(),
                        },
                    )
                    .await?;
                info!("Updated nPod group {} ({})", updated.name, diff);
                Ok(ReconcileOutcome::changed(Some(updated)).with_diff(diff))
            }
        }
    }
}
