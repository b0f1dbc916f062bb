use std::sync::Arc;
use std::time::Duration;

use helmsman_domain::{ElectionRole, LeaderStatus, ReleaseOutcome};
use tokio::sync::OwnedMutexGuard;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::election_core::{ElectionCore, ElectionCycle, ReleaseCycle};
use crate::election_ports::{Clock, ElectionMetrics};

use super::registry::{ResourceRegistry, ResourceSlot};

/// Handle of a running scheduler loop.
pub(super) struct SchedulerHandle {
    pub(super) cancel: CancellationToken,
    pub(super) task: JoinHandle<JoinSet<()>>,
}

/// Runs election cycles and publishes their results.
pub(super) struct ElectionRunner {
    pub(super) core: ElectionCore,
    pub(super) registry: Arc<ResourceRegistry>,
    pub(super) metrics: Arc<dyn ElectionMetrics>,
    pub(super) clock: Arc<dyn Clock>,
}

impl ElectionRunner {
    /// Starts one cycle per registered resource whose previous cycle finished.
    pub(super) fn spawn_tick(self: &Arc<Self>, in_flight: &mut JoinSet<()>) {
        for slot in self.registry.slots() {
            let Some(guard) = slot.try_claim() else {
                debug!(
                    resource_id = %slot.resource_id(),
                    "previous election cycle still running, skipping tick"
                );
                continue;
            };

            let runner = Arc::clone(self);
            in_flight.spawn(async move {
                runner.run_cycle(&slot, guard).await;
            });
        }
    }

    /// Runs one cycle for every registered resource and waits for all of them.
    pub(super) async fn run_all(self: &Arc<Self>) {
        let mut in_flight = JoinSet::new();
        for slot in self.registry.slots() {
            let runner = Arc::clone(self);
            in_flight.spawn(async move {
                let guard = slot.claim().await;
                runner.run_cycle(&slot, guard).await;
            });
        }

        while let Some(joined) = in_flight.join_next().await {
            self.reap(joined);
        }
    }

    pub(super) async fn run_cycle(&self, slot: &Arc<ResourceSlot>, _guard: OwnedMutexGuard<()>) {
        if !self.registry.is_registered(slot) {
            debug!(resource_id = %slot.resource_id(), "resource unregistered, skipping cycle");
            return;
        }

        let current = slot.status();
        let ElectionCycle { status, outcome } =
            self.core.run_cycle(slot.resource_id(), &current).await;
        if !self.registry.is_registered(slot) {
            debug!(
                resource_id = %slot.resource_id(),
                outcome = outcome.as_str(),
                "resource unregistered during cycle, discarding result"
            );
            return;
        }

        self.log_transition(slot, &current, &status);
        self.publish(slot, status);

        let resource_id = slot.resource_id();
        self.metrics.record_election_outcome(resource_id, outcome);
        let completed_at = self.clock.now();
        self.registry.mark_election_completed(completed_at);
        self.metrics.record_election_completed(completed_at);
    }

    /// Releases the lease of `slot`; none when the slot is no longer registered.
    pub(super) async fn release(
        &self,
        slot: &Arc<ResourceSlot>,
        _guard: OwnedMutexGuard<()>,
    ) -> Option<ReleaseOutcome> {
        if !self.registry.is_registered(slot) {
            return None;
        }

        let current = slot.status();
        let ReleaseCycle { status, outcome } =
            self.core.release(slot.resource_id(), &current).await;
        self.metrics.record_release(slot.resource_id(), outcome);
        if self.registry.is_registered(slot) {
            self.publish(slot, status);
        }

        match outcome {
            ReleaseOutcome::Released => info!(
                resource_id = %slot.resource_id(),
                leader_id = %self.core.leader_id(),
                "released leadership"
            ),
            ReleaseOutcome::NotLeader => debug!(
                resource_id = %slot.resource_id(),
                "release skipped, not the recorded leader"
            ),
            ReleaseOutcome::StoreUnavailable => warn!(
                resource_id = %slot.resource_id(),
                "could not release leadership, leader store unavailable"
            ),
        }

        Some(outcome)
    }

    pub(super) fn reap(&self, joined: Result<(), tokio::task::JoinError>) {
        if let Err(error) = joined
            && !error.is_cancelled()
        {
            self.metrics.record_election_failure();
            warn!(error = %error, "election task failed");
        }
    }

    fn publish(&self, slot: &ResourceSlot, status: LeaderStatus) {
        let resource_id = slot.resource_id();
        self.metrics.set_leadership(resource_id, status.is_leader());
        self.metrics
            .set_resource_without_leader(resource_id, status.current_leader().is_no_leader());
        slot.publish(status);
    }

    fn log_transition(&self, slot: &ResourceSlot, previous: &LeaderStatus, status: &LeaderStatus) {
        let resource_id = slot.resource_id();
        match (previous.role(), status.role()) {
            (ElectionRole::Leader, ElectionRole::Leader) => debug!(
                resource_id = %resource_id,
                lease_version = ?status.lease_version(),
                "renewed leadership"
            ),
            (_, ElectionRole::Leader) => info!(
                resource_id = %resource_id,
                leader_id = %self.core.leader_id(),
                "acquired leadership"
            ),
            (ElectionRole::Leader, _) => warn!(
                resource_id = %resource_id,
                current_leader = %status.current_leader(),
                "lost leadership"
            ),
            _ if previous.current_leader() != status.current_leader() => info!(
                resource_id = %resource_id,
                current_leader = %status.current_leader(),
                "observed leader changed"
            ),
            _ => {}
        }
    }
}

/// Drives ticks until `cancel` fires and hands back the cycles still running.
pub(super) async fn run_scheduler(
    runner: Arc<ElectionRunner>,
    election_interval: Duration,
    cancel: CancellationToken,
) -> JoinSet<()> {
    let mut ticker = tokio::time::interval(election_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => runner.spawn_tick(&mut in_flight),
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => runner.reap(joined),
        }
    }

    in_flight
}
