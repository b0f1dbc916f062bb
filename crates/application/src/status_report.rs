use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use helmsman_domain::{ElectionOutcome, ElectionRole, LeaderId, LeaderStatus, ResourceId};
use serde::Serialize;

/// Serializable snapshot of one service instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderStatusReport {
    /// Identity this instance competes with.
    pub leader_id: LeaderId,
    /// Whether the election loop is running.
    pub running: bool,
    /// Completion time of the latest election cycle.
    pub last_election_at: Option<DateTime<Utc>>,
    /// Whether this instance leads every registered resource.
    pub has_leadership: bool,
    /// Per-resource status, ordered by resource id.
    pub resources: Vec<ResourceStatusReport>,
}

impl LeaderStatusReport {
    /// Returns whether the loop runs and elections are not older than `max_staleness`.
    #[must_use]
    pub fn is_healthy_at(&self, now: DateTime<Utc>, max_staleness: Duration) -> bool {
        if !self.running {
            return false;
        }

        let Ok(max_staleness) = TimeDelta::from_std(max_staleness) else {
            return true;
        };

        self.last_election_at
            .is_some_and(|last_election_at| now - last_election_at <= max_staleness)
    }
}

/// Serializable status of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceStatusReport {
    /// Resource the status belongs to.
    pub resource_id: ResourceId,
    /// Locally believed role.
    pub role: ElectionRole,
    /// Whether this instance leads the resource at report time.
    pub is_leader: bool,
    /// Leader as last observed, possibly a sentinel.
    pub current_leader: LeaderId,
    /// Time of the last status transition.
    pub last_update: DateTime<Utc>,
    /// Expiry of the lease this instance holds.
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Classification of the latest election cycle.
    pub last_outcome: Option<ElectionOutcome>,
}

impl ResourceStatusReport {
    pub(crate) fn from_status(
        resource_id: ResourceId,
        status: &LeaderStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            resource_id,
            role: status.role(),
            is_leader: status.is_leader_at(now),
            current_leader: status.current_leader().clone(),
            last_update: status.last_update(),
            lease_expires_at: status.lease_expires_at(),
            last_outcome: status.last_outcome(),
        }
    }
}
