//! Volume Access Reconciler
//!
//! Computes and applies the LUN creations and deletions needed to move a
//! volume's host visibility from its current state to a [`VisibilityIntent`].
//!
//! Existing LUNs are only ever trusted from a fresh read of the store:
//! deleting a shared export definition can take the target host's LUN with
//! it, so the host branches re-read after revoking.

use super::intent::VisibilityIntent;
use super::revocation::{revoke_luns, Revocation, RevocationSchedule};
use crate::domain::ports::{CreateLunRequest, Lun, LunScope, LunStore, Volume};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

// =============================================================================
// Outcome
// =============================================================================

/// Result of reconciling a volume's host visibility
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessOutcome {
    /// Whether any LUN was created or deleted
    pub changed: bool,
    /// LUNs created by this reconciliation
    pub created: Vec<Lun>,
    /// Export definitions deleted by this reconciliation
    pub revoked: Vec<String>,
    /// Hosts that can see the volume afterwards
    pub host_uuids: Vec<String>,
    /// LUN id the volume is exported with, if any
    pub lun_id: Option<u32>,
    /// Definition UUID of the export serving the target hosts, if known
    pub lun_uuid: Option<String>,
    /// False when a revocation ran out of confirmation polls
    pub revocation_confirmed: bool,
}

impl AccessOutcome {
    fn new() -> Self {
        Self {
            revocation_confirmed: true,
            ..Default::default()
        }
    }

    fn record_revocation(&mut self, revocation: Revocation) {
        if revocation.definition_uuids.is_empty() {
            return;
        }
        self.changed = true;
        self.revocation_confirmed &= revocation.is_confirmed();
        self.revoked.extend(revocation.definition_uuids);
    }

    fn record_export(&mut self, lun: &Lun) {
        self.lun_id = Some(lun.lun_id);
        self.lun_uuid = Some(lun.definition_uuid.clone());
    }

    fn record_creation(&mut self, lun: Lun) {
        self.changed = true;
        self.record_export(&lun);
        self.created.push(lun);
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// Reconciles volume exports against a [`LunStore`]
///
/// Calls for the same volume must be serialized by the caller.
pub struct AccessReconciler {
    store: Arc<dyn LunStore>,
    schedule: RevocationSchedule,
}

impl AccessReconciler {
    /// Create a new reconciler
    pub fn new(store: Arc<dyn LunStore>, schedule: RevocationSchedule) -> Self {
        Self { store, schedule }
    }

    /// Confirmation schedule used after deletes
    pub fn schedule(&self) -> &RevocationSchedule {
        &self.schedule
    }

    /// Look up a volume and its exports, then reconcile them
    pub async fn reconcile_access(
        &self,
        volume_uuid: &str,
        intent: &VisibilityIntent,
        lun_id: Option<u32>,
    ) -> Result<AccessOutcome> {
        let volume = self.store.get_volume(volume_uuid).await?;
        let existing = self.store.list_luns(&volume.uuid).await?;

        self.reconcile(&volume, existing, intent, lun_id).await
    }

    /// Reconcile a volume whose current exports are already known
    pub async fn reconcile(
        &self,
        volume: &Volume,
        existing: Vec<Lun>,
        intent: &VisibilityIntent,
        lun_id: Option<u32>,
    ) -> Result<AccessOutcome> {
        info!(
            "Reconciling access for volume {} ({} existing LUNs) -> {}",
            volume.uuid,
            existing.len(),
            intent
        );

        match intent {
            VisibilityIntent::NoAccess => self.revoke_all(existing).await,
            VisibilityIntent::AllPodHosts => self.export_to_npod(volume, existing, lun_id).await,
            VisibilityIntent::SpecificHost(host_uuid) => {
                self.export_to_host(volume, existing, host_uuid, lun_id).await
            }
            VisibilityIntent::OwnerOnly => {
                self.export_to_host(volume, existing, &volume.natural_owner_host_uuid, lun_id)
                    .await
            }
        }
    }

    /// Remove every export of the volume
    async fn revoke_all(&self, existing: Vec<Lun>) -> Result<AccessOutcome> {
        let mut outcome = AccessOutcome::new();
        if existing.is_empty() {
            debug!("Volume has no exports, nothing to revoke");
            return Ok(outcome);
        }

        let revocation = self.revoke(existing.into_iter().map(|l| l.definition_uuid)).await?;
        outcome.record_revocation(revocation);
        Ok(outcome)
    }

    /// Export the volume to every host in its nPod under one LUN id
    async fn export_to_npod(
        &self,
        volume: &Volume,
        existing: Vec<Lun>,
        lun_id: Option<u32>,
    ) -> Result<AccessOutcome> {
        let mut outcome = AccessOutcome::new();

        // without an explicit id the first existing export decides
        let mut desired_lun_id = lun_id;
        let mut unwanted = Vec::new();
        let mut kept: Vec<Lun> = Vec::new();

        for lun in existing {
            let target = *desired_lun_id.get_or_insert(lun.lun_id);
            if lun.lun_id == target {
                kept.push(lun);
            } else {
                unwanted.push(lun.definition_uuid);
            }
        }

        if !unwanted.is_empty() {
            warn!("Unexporting volume {} from some hosts", volume.uuid);
            let revocation = self.revoke(unwanted).await?;
            outcome.record_revocation(revocation);
        }

        let npod = self.store.get_npod(&volume.npod_uuid).await?;
        let exported: HashSet<&str> = kept.iter().map(|l| l.host_uuid.as_str()).collect();

        if npod.host_uuids.iter().all(|h| exported.contains(h.as_str())) {
            debug!(
                "Volume {} already exported to all {} hosts in nPod {}",
                volume.uuid,
                npod.host_uuids.len(),
                npod.uuid
            );
            outcome.lun_id = desired_lun_id;
            outcome.lun_uuid = kept.first().map(|l| l.definition_uuid.clone());
            outcome.host_uuids = npod.host_uuids;
            return Ok(outcome);
        }

        let lun = self
            .store
            .create_lun(CreateLunRequest {
                volume_uuid: volume.uuid.clone(),
                lun_id: desired_lun_id,
                scope: LunScope::Npod,
            })
            .await?;

        info!(
            "Exported volume {} to nPod {} with LUN id {}",
            volume.uuid, npod.uuid, lun.lun_id
        );

        outcome.record_creation(lun);
        outcome.host_uuids = npod.host_uuids;
        Ok(outcome)
    }

    /// Export the volume to exactly one host
    async fn export_to_host(
        &self,
        volume: &Volume,
        existing: Vec<Lun>,
        target_host_uuid: &str,
        lun_id: Option<u32>,
    ) -> Result<AccessOutcome> {
        let mut outcome = AccessOutcome::new();
        let wanted = |lun: &Lun| {
            lun.host_uuid == target_host_uuid && lun_id.map_or(true, |id| lun.lun_id == id)
        };

        let mut exported_to_host = false;
        let mut unwanted = Vec::new();

        for lun in existing {
            if wanted(&lun) {
                exported_to_host = true;
            } else {
                unwanted.push(lun.definition_uuid);
            }
        }

        if !unwanted.is_empty() {
            warn!("Volume {} export removed for some hosts", volume.uuid);
            let revocation = self.revoke(unwanted).await?;
            outcome.record_revocation(revocation);
        }

        // a shared export definition may have taken the target host's LUN with it;
        // definitions revoked above can still be listed until removal completes
        let retained = if exported_to_host {
            let current = self.store.list_luns(&volume.uuid).await?;
            let retained = current
                .into_iter()
                .find(|l| wanted(l) && !outcome.revoked.contains(&l.definition_uuid));
            if retained.is_none() {
                warn!(
                    "Volume {} export deleted for target host {} during change",
                    volume.uuid, target_host_uuid
                );
            }
            retained
        } else {
            None
        };

        let lun = match retained {
            Some(lun) => {
                debug!(
                    "Volume {} already exported to host {} with LUN id {}",
                    volume.uuid, target_host_uuid, lun.lun_id
                );
                outcome.record_export(&lun);
                lun
            }
            None => {
                let lun = self
                    .store
                    .create_lun(CreateLunRequest {
                        volume_uuid: volume.uuid.clone(),
                        lun_id,
                        scope: LunScope::Host {
                            host_uuid: target_host_uuid.to_string(),
                        },
                    })
                    .await?;

                info!(
                    "Exported volume {} to host {} with LUN id {}",
                    volume.uuid, target_host_uuid, lun.lun_id
                );
                outcome.record_creation(lun.clone());
                lun
            }
        };

        if lun.host_uuid != target_host_uuid {
            return Err(Error::ExportNotEstablished {
                volume: volume.uuid.clone(),
                host: target_host_uuid.to_string(),
            });
        }

        outcome.host_uuids = vec![lun.host_uuid];
        Ok(outcome)
    }

    async fn revoke<I>(&self, definition_uuids: I) -> Result<Revocation>
    where
        I: IntoIterator<Item = String>,
    {
        revoke_luns(self.store.as_ref(), definition_uuids, &self.schedule).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::{InMemoryCloud, InMemoryConfig};
    use assert_matches::assert_matches;

    struct Fixture {
        cloud: Arc<InMemoryCloud>,
        reconciler: AccessReconciler,
        volume: Volume,
    }

    fn fixture(hosts: &[&str]) -> Fixture {
        fixture_with(hosts, InMemoryConfig::default())
    }

    fn fixture_with(hosts: &[&str], config: InMemoryConfig) -> Fixture {
        let cloud = InMemoryCloud::new(config);
        let npod = cloud.add_npod("pod-a", hosts);
        let owner = hosts.first().copied().unwrap_or("h-owner");
        let volume = cloud.add_volume(&npod.uuid, "vol-a", owner);
        let reconciler = AccessReconciler::new(cloud.clone(), RevocationSchedule::immediate(3));
        Fixture {
            cloud,
            reconciler,
            volume,
        }
    }

    impl Fixture {
        async fn export(&self, scope: LunScope, lun_id: Option<u32>) -> Lun {
            self.cloud
                .create_lun(CreateLunRequest {
                    volume_uuid: self.volume.uuid.clone(),
                    lun_id,
                    scope,
                })
                .await
                .unwrap()
        }

        async fn apply(&self, intent: VisibilityIntent, lun_id: Option<u32>) -> AccessOutcome {
            self.reconciler
                .reconcile_access(&self.volume.uuid, &intent, lun_id)
                .await
                .unwrap()
        }

        async fn exported_hosts(&self) -> Vec<String> {
            let mut hosts: Vec<String> = self
                .cloud
                .list_luns(&self.volume.uuid)
                .await
                .unwrap()
                .into_iter()
                .map(|l| l.host_uuid)
                .collect();
            hosts.sort();
            hosts
        }
    }

    fn host(uuid: &str) -> LunScope {
        LunScope::Host {
            host_uuid: uuid.to_string(),
        }
    }

    // -------------------------------------------------------------------------
    // NoAccess
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_no_access_without_exports_is_noop() {
        let f = fixture(&["h1", "h2"]);
        let outcome = f.apply(VisibilityIntent::NoAccess, None).await;

        assert!(!outcome.changed);
        assert!(outcome.created.is_empty());
        assert!(outcome.revoked.is_empty());
        assert!(outcome.host_uuids.is_empty());
        assert!(f.cloud.calls().iter().all(|c| c != "delete_lun"));
    }

    #[tokio::test]
    async fn test_no_access_revokes_everything() {
        let f = fixture(&["h1", "h2"]);
        let pod_lun = f.export(LunScope::Npod, None).await;

        let outcome = f.apply(VisibilityIntent::NoAccess, None).await;

        assert!(outcome.changed);
        // two host LUNs share one definition, deleted once
        assert_eq!(outcome.revoked, vec![pod_lun.definition_uuid]);
        assert!(outcome.host_uuids.is_empty());
        assert!(outcome.revocation_confirmed);
        assert!(f.exported_hosts().await.is_empty());
    }

    #[tokio::test]
    async fn test_no_access_repeats_after_unconfirmed_revocation() {
        let f = fixture_with(
            &["h1", "h2"],
            InMemoryConfig {
                deletion_lag_polls: 10,
                ..Default::default()
            },
        );
        let pod_lun = f.export(LunScope::Npod, None).await;

        let first = f.apply(VisibilityIntent::NoAccess, None).await;
        assert!(!first.revocation_confirmed);

        // the definition is still listed, so it is requested again
        let second = f.apply(VisibilityIntent::NoAccess, None).await;
        assert_eq!(second.revoked, vec![pod_lun.definition_uuid]);
        assert!(second.host_uuids.is_empty());
    }

    // -------------------------------------------------------------------------
    // AllPodHosts
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_all_pod_hosts_creates_one_export_and_is_idempotent() {
        let f = fixture(&["h1", "h2"]);

        let outcome = f.apply(VisibilityIntent::AllPodHosts, None).await;
        assert!(outcome.changed);
        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.host_uuids, vec!["h1", "h2"]);
        assert!(outcome.lun_id.is_some());
        assert_eq!(f.exported_hosts().await, vec!["h1", "h2"]);

        let again = f.apply(VisibilityIntent::AllPodHosts, None).await;
        assert!(!again.changed);
        assert!(again.created.is_empty());
        assert!(again.revoked.is_empty());
        assert_eq!(again.host_uuids, vec!["h1", "h2"]);
        assert_eq!(again.lun_id, outcome.lun_id);
        assert_eq!(again.lun_uuid, outcome.lun_uuid);
    }

    #[tokio::test]
    async fn test_all_pod_hosts_uses_requested_lun_id() {
        let f = fixture(&["h1", "h2"]);
        let outcome = f.apply(VisibilityIntent::AllPodHosts, Some(20)).await;

        assert_eq!(outcome.lun_id, Some(20));
        assert_eq!(outcome.created[0].lun_id, 20);
    }

    #[tokio::test]
    async fn test_all_pod_hosts_adopts_existing_lun_id() {
        let f = fixture(&["h1", "h2", "h3"]);
        f.export(host("h1"), Some(7)).await;

        let outcome = f.apply(VisibilityIntent::AllPodHosts, None).await;

        assert!(outcome.revoked.is_empty());
        assert_eq!(outcome.lun_id, Some(7));
        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.host_uuids, vec!["h1", "h2", "h3"]);
    }

    #[tokio::test]
    async fn test_all_pod_hosts_revokes_mismatched_lun_ids() {
        let f = fixture(&["h1", "h2"]);
        f.export(host("h1"), Some(3)).await;
        let stray = f.export(host("h2"), Some(9)).await;

        let outcome = f.apply(VisibilityIntent::AllPodHosts, None).await;

        assert!(outcome.changed);
        assert_eq!(outcome.revoked, vec![stray.definition_uuid]);
        assert_eq!(outcome.lun_id, Some(3));
        assert!(f.cloud.list_luns(&f.volume.uuid).await.unwrap().iter().all(|l| l.lun_id == 3));
    }

    #[tokio::test]
    async fn test_all_pod_hosts_explicit_id_replaces_existing_exports() {
        let f = fixture(&["h1", "h2"]);
        let old = f.export(LunScope::Npod, Some(5)).await;

        let outcome = f.apply(VisibilityIntent::AllPodHosts, Some(6)).await;

        assert_eq!(outcome.revoked, vec![old.definition_uuid]);
        assert_eq!(outcome.lun_id, Some(6));
        assert_eq!(f.exported_hosts().await, vec!["h1", "h2"]);
    }

    #[tokio::test]
    async fn test_all_pod_hosts_with_empty_npod() {
        let f = fixture(&[]);
        let outcome = f.apply(VisibilityIntent::AllPodHosts, None).await;

        assert!(!outcome.changed);
        assert!(outcome.created.is_empty());
        assert!(outcome.host_uuids.is_empty());
    }

    // -------------------------------------------------------------------------
    // SpecificHost / OwnerOnly
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_specific_host_moves_export() {
        let f = fixture(&["h1", "h2"]);
        let old = f.export(host("h1"), None).await;

        let outcome = f
            .apply(VisibilityIntent::SpecificHost("h2".into()), None)
            .await;

        assert!(outcome.changed);
        assert_eq!(outcome.revoked, vec![old.definition_uuid]);
        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.created[0].host_uuid, "h2");
        assert_eq!(outcome.host_uuids, vec!["h2"]);
        assert_eq!(f.exported_hosts().await, vec!["h2"]);
    }

    #[tokio::test]
    async fn test_specific_host_already_exported() {
        let f = fixture(&["h1", "h2"]);
        let existing = f.export(host("h2"), Some(4)).await;

        let outcome = f
            .apply(VisibilityIntent::SpecificHost("h2".into()), None)
            .await;

        assert!(!outcome.changed);
        assert_eq!(outcome.host_uuids, vec!["h2"]);
        assert_eq!(outcome.lun_id, Some(4));
        assert_eq!(outcome.lun_uuid, Some(existing.definition_uuid));
    }

    #[tokio::test]
    async fn test_specific_host_lun_id_conflict_recreates() {
        let f = fixture(&["h1", "h2"]);
        let existing = f.export(host("h2"), Some(4)).await;

        let outcome = f
            .apply(VisibilityIntent::SpecificHost("h2".into()), Some(8))
            .await;

        assert!(outcome.changed);
        assert_eq!(outcome.revoked, vec![existing.definition_uuid]);
        assert_eq!(outcome.lun_id, Some(8));
        assert_eq!(outcome.host_uuids, vec!["h2"]);
    }

    #[tokio::test]
    async fn test_specific_host_recreates_after_shared_definition_deleted() {
        let f = fixture(&["h1", "h2"]);
        let pod_lun = f.export(LunScope::Npod, None).await;

        let outcome = f
            .apply(VisibilityIntent::SpecificHost("h1".into()), None)
            .await;

        // h2's LUN shares the definition with h1's, so h1 loses its LUN too
        assert_eq!(outcome.revoked, vec![pod_lun.definition_uuid]);
        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.host_uuids, vec!["h1"]);
        assert_eq!(f.exported_hosts().await, vec!["h1"]);
    }

    #[tokio::test]
    async fn test_specific_host_ignores_lingering_revoked_definition() {
        let f = fixture_with(
            &["h1", "h2"],
            InMemoryConfig {
                deletion_lag_polls: 5,
                ..Default::default()
            },
        );
        let pod_lun = f.export(LunScope::Npod, None).await;

        let outcome = f
            .apply(VisibilityIntent::SpecificHost("h1".into()), None)
            .await;

        assert_eq!(outcome.revoked, vec![pod_lun.definition_uuid.clone()]);
        assert!(!outcome.revocation_confirmed);
        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.created[0].host_uuid, "h1");
        assert_ne!(outcome.lun_uuid, Some(pod_lun.definition_uuid.clone()));
        assert_eq!(outcome.host_uuids, vec!["h1"]);

        // drain the lingering definition
        let ids = vec![pod_lun.definition_uuid];
        while !f.cloud.find_luns(&ids).await.unwrap().is_empty() {}
        assert_eq!(f.exported_hosts().await, vec!["h1"]);
    }

    #[tokio::test]
    async fn test_owner_only_targets_natural_owner() {
        let f = fixture(&["h1", "h2"]);
        f.export(LunScope::Npod, None).await;

        let outcome = f.apply(VisibilityIntent::OwnerOnly, None).await;

        assert!(outcome.changed);
        assert_eq!(outcome.host_uuids, vec![f.volume.natural_owner_host_uuid.clone()]);
        assert_eq!(f.exported_hosts().await, vec!["h1"]);
    }

    #[tokio::test]
    async fn test_owner_only_is_idempotent() {
        let f = fixture(&["h1", "h2"]);
        f.apply(VisibilityIntent::OwnerOnly, None).await;

        let again = f.apply(VisibilityIntent::OwnerOnly, None).await;
        assert!(!again.changed);
        assert_eq!(again.host_uuids, vec!["h1"]);
    }

    #[tokio::test]
    async fn test_unconfirmed_revocation_is_reported() {
        let f = fixture_with(
            &["h1", "h2"],
            InMemoryConfig {
                deletion_lag_polls: u32::MAX,
                ..Default::default()
            },
        );
        f.export(host("h1"), None).await;

        let outcome = f
            .apply(VisibilityIntent::SpecificHost("h2".into()), None)
            .await;

        assert!(outcome.changed);
        assert!(!outcome.revocation_confirmed);
        assert_eq!(outcome.host_uuids, vec!["h2"]);
    }

    // -------------------------------------------------------------------------
    // Errors
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_unknown_volume() {
        let f = fixture(&["h1"]);
        let err = f
            .reconciler
            .reconcile_access("missing", &VisibilityIntent::AllPodHosts, None)
            .await
            .unwrap_err();
        assert_matches!(err, Error::ResourceNotFound { .. });
    }

    #[tokio::test]
    async fn test_create_failure_propagates() {
        let f = fixture(&["h1", "h2"]);
        f.cloud.fail_operation("create_lun");

        let err = f
            .reconciler
            .reconcile_access(&f.volume.uuid, &VisibilityIntent::AllPodHosts, None)
            .await
            .unwrap_err();
        assert_matches!(err, Error::BackingStore { ref operation, .. } if operation == "create_lun");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_host_outside_npod_is_rejected_by_store() {
        let f = fixture(&["h1"]);
        let err = f
            .reconciler
            .reconcile_access(&f.volume.uuid, &VisibilityIntent::SpecificHost("h9".into()), None)
            .await
            .unwrap_err();
        assert_matches!(err, Error::BackingStore { .. });
    }
}
