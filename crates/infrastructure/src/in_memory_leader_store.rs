//! In-process lease store for single-process deployments and tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use helmsman_application::{Clock, LeaderStore, SystemClock};
use helmsman_core::{AppError, AppResult};
use helmsman_domain::{LeaderId, LeaseRecord, LeaseVersion, ResourceId};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct LeaseEntry {
    lease: Option<LeaseRecord>,
    last_version: Option<LeaseVersion>,
}

/// Linearizable lease store kept in process memory.
///
/// Every operation runs under one lock. Versions keep increasing per
/// resource across holders and releases.
pub struct InMemoryLeaderStore {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<ResourceId, LeaseEntry>>,
    unavailable: AtomicBool,
}

impl InMemoryLeaderStore {
    /// Creates an empty store using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store judging expiry with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent call fail with [`AppError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable(
                "in-memory leader store is marked unavailable".to_owned(),
            ));
        }

        Ok(())
    }
}

impl Default for InMemoryLeaderStore {
    fn default() -> Self {
        Self::new()
    }
}

fn expiry(now: DateTime<Utc>, lease_duration: Duration) -> AppResult<DateTime<Utc>> {
    TimeDelta::from_std(lease_duration)
        .ok()
        .and_then(|lease_duration| now.checked_add_signed(lease_duration))
        .ok_or_else(|| {
            AppError::Validation(format!("lease duration {lease_duration:?} is out of range"))
        })
}

#[async_trait]
impl LeaderStore for InMemoryLeaderStore {
    async fn read(&self, resource_id: &ResourceId) -> AppResult<Option<LeaseRecord>> {
        self.ensure_available()?;
        let now = self.clock.now();
        Ok(self
            .entries
            .lock()
            .get(resource_id)
            .and_then(|entry| entry.lease.as_ref())
            .filter(|lease| !lease.is_expired_at(now))
            .cloned())
    }

    async fn try_acquire_or_renew(
        &self,
        resource_id: &ResourceId,
        candidate_id: &LeaderId,
        observed_version: Option<LeaseVersion>,
        lease_duration: Duration,
    ) -> AppResult<Option<LeaseRecord>> {
        self.ensure_available()?;
        let now = self.clock.now();
        let expires_at = expiry(now, lease_duration)?;

        let mut entries = self.entries.lock();
        let entry = entries.entry(resource_id.clone()).or_default();
        let writable = match &entry.lease {
            None => true,
            Some(lease) if lease.is_expired_at(now) => true,
            Some(lease) => {
                lease.is_held_by(candidate_id) && observed_version == Some(lease.version)
            }
        };
        if !writable {
            return Ok(None);
        }

        let version = entry
            .last_version
            .map_or(LeaseVersion::INITIAL, LeaseVersion::next);
        let lease = LeaseRecord {
            resource_id: resource_id.clone(),
            leader_id: candidate_id.clone(),
            expires_at,
            version,
        };
        entry.last_version = Some(version);
        entry.lease = Some(lease.clone());

        Ok(Some(lease))
    }

    async fn release(
        &self,
        resource_id: &ResourceId,
        candidate_id: &LeaderId,
        observed_version: LeaseVersion,
    ) -> AppResult<bool> {
        self.ensure_available()?;
        let now = self.clock.now();

        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(resource_id) else {
            return Ok(false);
        };

        let held = entry.lease.as_ref().is_some_and(|lease| {
            !lease.is_expired_at(now)
                && lease.is_held_by(candidate_id)
                && lease.version == observed_version
        });
        if held {
            entry.lease = None;
        }

        Ok(held)
    }
}
