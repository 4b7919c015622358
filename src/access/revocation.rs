//! LUN Revocation
//!
//! Deleting an export only requests removal; the management cloud removes
//! the LUNs asynchronously. After issuing the deletes we poll for the same
//! definitions on a fixed backoff schedule until they are gone.
//!
//! Running out of schedule is not an error. The revocation is reported as
//! [`RevocationStatus::Unconfirmed`] and the caller decides what to do.

use crate::domain::ports::LunStore;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Waits between confirmation polls, in seconds
pub const DEFAULT_REVOCATION_SCHEDULE_SECS: &[u64] = &[1, 1, 2, 3, 5, 8, 11];

// =============================================================================
// Schedule
// =============================================================================

/// Backoff schedule for revocation confirmation
///
/// Serialized as a list of whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<u64>", into = "Vec<u64>")]
pub struct RevocationSchedule {
    waits: Vec<Duration>,
}

impl RevocationSchedule {
    pub fn new(waits: Vec<Duration>) -> Self {
        Self { waits }
    }

    pub fn from_secs(secs: &[u64]) -> Self {
        Self::new(secs.iter().map(|s| Duration::from_secs(*s)).collect())
    }

    /// `attempts` polls with no wait in between
    pub fn immediate(attempts: usize) -> Self {
        Self::new(vec![Duration::ZERO; attempts])
    }

    pub fn waits(&self) -> &[Duration] {
        &self.waits
    }

    /// Worst-case time spent waiting
    pub fn total(&self) -> Duration {
        self.waits.iter().sum()
    }
}

impl Default for RevocationSchedule {
    fn default() -> Self {
        Self::from_secs(DEFAULT_REVOCATION_SCHEDULE_SECS)
    }
}

impl From<Vec<u64>> for RevocationSchedule {
    fn from(secs: Vec<u64>) -> Self {
        Self::from_secs(&secs)
    }
}

impl From<RevocationSchedule> for Vec<u64> {
    fn from(schedule: RevocationSchedule) -> Self {
        schedule.waits.iter().map(|d| d.as_secs()).collect()
    }
}

// =============================================================================
// Revocation
// =============================================================================

/// Whether the store confirmed the removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationStatus {
    /// None of the definitions are listed anymore
    Confirmed,
    /// The schedule ran out while some definitions were still listed
    Unconfirmed { remaining: Vec<String> },
}

/// Result of revoking a batch of exports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revocation {
    /// Definitions a delete was issued for, de-duplicated, in request order
    pub definition_uuids: Vec<String>,
    pub status: RevocationStatus,
}

impl Revocation {
    pub fn is_confirmed(&self) -> bool {
        self.status == RevocationStatus::Confirmed
    }
}

/// De-duplicate definition UUIDs, keeping the first occurrence
pub fn unique_definitions<I>(definition_uuids: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut unique: Vec<String> = Vec::new();
    for uuid in definition_uuids {
        if !unique.contains(&uuid) {
            unique.push(uuid);
        }
    }
    unique
}

/// Delete a batch of export definitions and wait for the store to drop them
///
/// Delete failures propagate immediately. Failed confirmation polls count as
/// "still present" and the schedule continues.
pub async fn revoke_luns<I>(
    store: &dyn LunStore,
    definition_uuids: I,
    schedule: &RevocationSchedule,
) -> Result<Revocation>
where
    I: IntoIterator<Item = String>,
{
    let definition_uuids = unique_definitions(definition_uuids);
    if definition_uuids.is_empty() {
        return Ok(Revocation {
            definition_uuids,
            status: RevocationStatus::Confirmed,
        });
    }

    for uuid in &definition_uuids {
        info!("Deleting LUN definition {} via {}", uuid, store.backend_name());
        store.delete_lun(uuid).await?;
    }

    let status = wait_for_removal(store, &definition_uuids, schedule).await;

    Ok(Revocation {
        definition_uuids,
        status,
    })
}

/// Poll until none of the definitions are listed or the schedule runs out
pub async fn wait_for_removal(
    store: &dyn LunStore,
    definition_uuids: &[String],
    schedule: &RevocationSchedule,
) -> RevocationStatus {
    let mut remaining = definition_uuids.to_vec();

    for (attempt, wait) in schedule.waits().iter().enumerate() {
        tokio::time::sleep(*wait).await;

        match store.find_luns(definition_uuids).await {
            Ok(luns) if luns.is_empty() => {
                debug!("LUN removal confirmed after {} polls", attempt + 1);
                return RevocationStatus::Confirmed;
            }
            Ok(luns) => {
                remaining = unique_definitions(luns.into_iter().map(|l| l.definition_uuid));
                debug!(
                    "Poll {}: {} LUN definitions still present",
                    attempt + 1,
                    remaining.len()
                );
            }
            Err(e) => {
                warn!("Poll {} for LUN removal failed: {}", attempt + 1, e);
            }
        }
    }

    warn!(
        "LUN removal not confirmed after {:?}: [{}]",
        schedule.total(),
        remaining.join(", ")
    );
    RevocationStatus::Unconfirmed { remaining }
}
