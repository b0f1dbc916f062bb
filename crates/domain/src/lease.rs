//! Lease records as held by the shared leader store.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{LeaderId, ResourceId};

/// Monotonic optimistic-concurrency token of one lease record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseVersion(u64);

impl LeaseVersion {
    /// Version assigned to the first lease ever written for a resource.
    pub const INITIAL: Self = Self(1);

    /// Creates a version from its raw value.
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the version that follows this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns the raw value.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl Display for LeaseVersion {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// One lease as stored for a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Resource the lease grants.
    pub resource_id: ResourceId,
    /// Current holder.
    pub leader_id: LeaderId,
    /// Instant after which the lease no longer grants leadership.
    pub expires_at: DateTime<Utc>,
    /// Concurrency token bumped on every successful write.
    pub version: LeaseVersion,
}

impl LeaseRecord {
    /// Returns true once `now` reached the expiry instant.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Returns true when `leader_id` is the recorded holder.
    #[must_use]
    pub fn is_held_by(&self, leader_id: &LeaderId) -> bool {
        &self.leader_id == leader_id
    }
}
