use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use helmsman_core::{AppError, AppResult};
use helmsman_domain::{LeaderStatus, ReleaseOutcome, ResourceId};
use tokio::sync::watch;
use tracing::info;

use crate::status_report::{LeaderStatusReport, ResourceStatusReport};

use super::LeaderService;

impl LeaderService {
    /// Returns whether this instance currently leads `resource_id`.
    ///
    /// A leader whose lease already lapsed locally reports `false` even if the
    /// next tick has not run yet.
    #[must_use]
    pub fn is_leader_of(&self, resource_id: &ResourceId) -> bool {
        self.registry
            .get(resource_id)
            .is_some_and(|slot| slot.status().is_leader_at(self.clock.now()))
    }

    /// Returns the latest status of `resource_id`, `Unknown` when unregistered.
    #[must_use]
    pub fn status_of(&self, resource_id: &ResourceId) -> LeaderStatus {
        self.registry
            .get(resource_id)
            .map_or_else(|| LeaderStatus::unknown(self.clock.now()), |slot| slot.status())
    }

    /// Returns a snapshot of every registered resource's status.
    #[must_use]
    pub fn all_statuses(&self) -> BTreeMap<ResourceId, LeaderStatus> {
        self.registry
            .slots()
            .into_iter()
            .map(|slot| (slot.resource_id().clone(), slot.status()))
            .collect()
    }

    /// Returns whether this instance leads every registered resource.
    #[must_use]
    pub fn has_leadership(&self) -> bool {
        let slots = self.registry.slots();
        let now = self.clock.now();
        !slots.is_empty() && slots.iter().all(|slot| slot.status().is_leader_at(now))
    }

    /// Returns the registered resources.
    #[must_use]
    pub fn resources(&self) -> BTreeSet<ResourceId> {
        self.registry.resource_ids().into_iter().collect()
    }

    /// Registers `resource_id`; it takes part in elections from the next tick.
    pub fn add_resource(&self, resource_id: ResourceId) -> bool {
        let added = self.registry.add(resource_id.clone(), self.clock.now());
        if added {
            info!(resource_id = %resource_id, "registered resource for election");
        }

        added
    }

    /// Unregisters `resource_id` without releasing a lease it may hold.
    ///
    /// Waits for a running cycle of the resource to finish first.
    pub async fn remove_resource(&self, resource_id: &ResourceId) -> bool {
        let Some(slot) = self.registry.get(resource_id) else {
            return false;
        };

        let _guard = slot.claim().await;
        if !self.registry.remove(&slot) {
            return false;
        }

        self.metrics.set_leadership(resource_id, false);
        info!(resource_id = %resource_id, "unregistered resource from election");
        true
    }

    /// Subscribes to status changes of `resource_id`.
    #[must_use]
    pub fn subscribe(&self, resource_id: &ResourceId) -> Option<watch::Receiver<LeaderStatus>> {
        self.registry.get(resource_id).map(|slot| slot.subscribe())
    }

    /// Returns when the most recent election cycle completed.
    #[must_use]
    pub fn last_election_at(&self) -> Option<DateTime<Utc>> {
        self.registry.last_election_at()
    }

    /// Returns whether the election loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.registry.is_running()
    }

    /// Steps down from `resource_id` if this instance holds its lease.
    ///
    /// Waits for an in-flight cycle of the same resource to finish first.
    pub async fn release_leadership(&self, resource_id: &ResourceId) -> AppResult<ReleaseOutcome> {
        let not_registered =
            || AppError::NotFound(format!("resource '{resource_id}' is not registered"));
        let slot = self.registry.get(resource_id).ok_or_else(not_registered)?;

        let guard = slot.claim().await;
        self.runner()
            .release(&slot, guard)
            .await
            .ok_or_else(not_registered)
    }

    /// Builds a serializable snapshot of the service state.
    #[must_use]
    pub fn status_report(&self) -> LeaderStatusReport {
        let now = self.clock.now();
        let resources: Vec<ResourceStatusReport> = self
            .all_statuses()
            .into_iter()
            .map(|(resource_id, status)| ResourceStatusReport::from_status(resource_id, &status, now))
            .collect();

        LeaderStatusReport {
            leader_id: self.leader_id.clone(),
            running: self.is_running(),
            last_election_at: self.last_election_at(),
            has_leadership: !resources.is_empty()
                && resources.iter().all(|resource| resource.is_leader),
            resources,
        }
    }
}
