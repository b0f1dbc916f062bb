//! Per-resource election decision and its classification.
//!
//! One call reads the lease, decides between acquiring, renewing and
//! yielding, performs at most one conditional write and classifies the
//! result. Ties are settled by the store's conditional write alone.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use helmsman_core::{AppError, AppResult};
use helmsman_domain::{
    ElectionOutcome, LeaderId, LeaderStatus, LeaseRecord, ReleaseOutcome, ResourceId,
};
use tracing::{debug, warn};

use crate::election_ports::{Clock, LeaderStore};

/// Result of one election cycle for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionCycle {
    /// Status replacing the previous local status.
    pub status: LeaderStatus,
    /// Classification of the cycle.
    pub outcome: ElectionOutcome,
}

/// Result of one explicit release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseCycle {
    /// Status replacing the previous local status.
    pub status: LeaderStatus,
    /// Classification of the release.
    pub outcome: ReleaseOutcome,
}

/// Stateless election logic for one candidate.
#[derive(Clone)]
pub struct ElectionCore {
    store: Arc<dyn LeaderStore>,
    clock: Arc<dyn Clock>,
    leader_id: LeaderId,
    lease_duration: Duration,
    store_call_timeout: Duration,
}

impl ElectionCore {
    /// Creates the election logic for `leader_id`.
    #[must_use]
    pub fn new(
        store: Arc<dyn LeaderStore>,
        clock: Arc<dyn Clock>,
        leader_id: LeaderId,
        lease_duration: Duration,
        store_call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            leader_id,
            lease_duration,
            store_call_timeout,
        }
    }

    /// Returns the candidate identity this core competes with.
    #[must_use]
    pub fn leader_id(&self) -> &LeaderId {
        &self.leader_id
    }

    /// Runs one election cycle for `resource_id` starting from `current`.
    pub async fn run_cycle(&self, resource_id: &ResourceId, current: &LeaderStatus) -> ElectionCycle {
        let lease = match self.bounded("read", self.store.read(resource_id)).await {
            Ok(lease) => lease,
            Err(error) => return self.unavailable(resource_id, current, &error),
        };

        let now = self.clock.now();
        let live_lease = lease.filter(|lease| !lease.is_expired_at(now));

        let observed_version = match &live_lease {
            Some(lease) if lease.is_held_by(&self.leader_id) => Some(lease.version),
            Some(lease) if !lease.leader_id.is_sentinel() => {
                debug!(
                    resource_id = %resource_id,
                    leader_id = %lease.leader_id,
                    "resource is held by another instance"
                );
                return ElectionCycle {
                    status: current.contended(lease.leader_id.clone(), now),
                    outcome: ElectionOutcome::LostRace,
                };
            }
            _ => None,
        };

        let attempt = self
            .bounded(
                "acquire",
                self.store.try_acquire_or_renew(
                    resource_id,
                    &self.leader_id,
                    observed_version,
                    self.lease_duration,
                ),
            )
            .await;

        match attempt {
            Ok(Some(granted)) => {
                let outcome = if observed_version.is_some() {
                    ElectionOutcome::Renewed
                } else {
                    ElectionOutcome::Acquired
                };
                self.confirmed(resource_id, current, &granted, outcome)
            }
            Ok(None) => self.lost_race(resource_id, current).await,
            Err(AppError::Conflict(message)) => {
                warn!(
                    resource_id = %resource_id,
                    error = %message,
                    "leader store reported an unexpected version conflict"
                );
                ElectionCycle {
                    status: current.contended(LeaderId::unknown(), self.clock.now()),
                    outcome: ElectionOutcome::LostRace,
                }
            }
            Err(error) => self.unavailable(resource_id, current, &error),
        }
    }

    /// Gives up the lease held for `resource_id`, if any.
    ///
    /// Without a locally observed version the store is read first. Whenever
    /// this instance turns out not to be the holder, the status becomes a
    /// follower of whoever holds the lease.
    pub async fn release(&self, resource_id: &ResourceId, current: &LeaderStatus) -> ReleaseCycle {
        let observed_version = match current.lease_version() {
            Some(version) => version,
            None => match self.bounded("read", self.store.read(resource_id)).await {
                Ok(Some(lease)) if lease.is_held_by(&self.leader_id) => lease.version,
                Ok(lease) => {
                    let now = self.clock.now();
                    let holder = lease
                        .filter(|lease| !lease.is_expired_at(now) && !lease.leader_id.is_sentinel())
                        .map_or_else(LeaderId::no_leader, |lease| lease.leader_id);
                    return ReleaseCycle {
                        status: current.following(holder, now),
                        outcome: ReleaseOutcome::NotLeader,
                    };
                }
                Err(error) => return self.release_unavailable(resource_id, current, &error),
            },
        };

        let released = self
            .bounded(
                "release",
                self.store
                    .release(resource_id, &self.leader_id, observed_version),
            )
            .await;

        let now = self.clock.now();
        match released {
            Ok(true) => ReleaseCycle {
                status: current.released(now),
                outcome: ReleaseOutcome::Released,
            },
            Ok(false) => ReleaseCycle {
                status: current.following(LeaderId::unknown(), now),
                outcome: ReleaseOutcome::NotLeader,
            },
            Err(error) => self.release_unavailable(resource_id, current, &error),
        }
    }

    fn confirmed(
        &self,
        resource_id: &ResourceId,
        current: &LeaderStatus,
        granted: &LeaseRecord,
        outcome: ElectionOutcome,
    ) -> ElectionCycle {
        let now = self.clock.now();
        if !granted.is_held_by(&self.leader_id) {
            warn!(
                resource_id = %resource_id,
                leader_id = %granted.leader_id,
                "leader store granted a lease to a different holder"
            );
            return ElectionCycle {
                status: current.contended(granted.leader_id.clone(), now),
                outcome: ElectionOutcome::LostRace,
            };
        }

        match current.confirmed(granted, outcome, now) {
            Ok(status) => ElectionCycle { status, outcome },
            Err(error) => {
                warn!(resource_id = %resource_id, error = %error, "rejected granted lease");
                ElectionCycle {
                    status: current.contended(LeaderId::unknown(), now),
                    outcome: ElectionOutcome::LostRace,
                }
            }
        }
    }

    async fn lost_race(&self, resource_id: &ResourceId, current: &LeaderStatus) -> ElectionCycle {
        let winner = match self.bounded("read", self.store.read(resource_id)).await {
            Ok(Some(lease)) => lease.leader_id,
            Ok(None) => LeaderId::no_leader(),
            Err(error) => {
                debug!(
                    resource_id = %resource_id,
                    error = %error,
                    "could not read winner after lost race"
                );
                LeaderId::unknown()
            }
        };

        debug!(resource_id = %resource_id, leader_id = %winner, "lost leadership race");
        ElectionCycle {
            status: current.contended(winner, self.clock.now()),
            outcome: ElectionOutcome::LostRace,
        }
    }

    fn unavailable(
        &self,
        resource_id: &ResourceId,
        current: &LeaderStatus,
        error: &AppError,
    ) -> ElectionCycle {
        warn!(
            resource_id = %resource_id,
            leader_id = %self.leader_id,
            error = %error,
            "leader store unavailable during election"
        );
        ElectionCycle {
            status: current.store_unavailable(self.clock.now()),
            outcome: ElectionOutcome::StoreUnavailable,
        }
    }

    fn release_unavailable(
        &self,
        resource_id: &ResourceId,
        current: &LeaderStatus,
        error: &AppError,
    ) -> ReleaseCycle {
        warn!(
            resource_id = %resource_id,
            leader_id = %self.leader_id,
            error = %error,
            "leader store unavailable during release"
        );
        ReleaseCycle {
            status: current.store_unavailable(self.clock.now()),
            outcome: ReleaseOutcome::StoreUnavailable,
        }
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = AppResult<T>>,
    ) -> AppResult<T> {
        match tokio::time::timeout(self.store_call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Unavailable(format!(
                "leader store {operation} timed out after {:?}",
                self.store_call_timeout
            ))),
        }
    }
}
