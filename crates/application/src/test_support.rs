use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use helmsman_core::{AppError, AppResult};
use helmsman_domain::{
    ElectionOutcome, LeaderId, LeaseRecord, LeaseVersion, ReleaseOutcome, ResourceId,
};
use parking_lot::Mutex;

use crate::election_ports::{Clock, ElectionMetrics, LeaderStore};

/// Wall clock that follows tokio time, so paused tests see leases expire.
pub(crate) struct TokioClock {
    origin: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl TokioClock {
    pub(crate) fn new() -> Self {
        Self {
            origin: Utc::now(),
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.started.elapsed()).unwrap_or(TimeDelta::MAX);
        self.origin
            .checked_add_signed(elapsed)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Linearizable store: every call runs under one lock.
pub(crate) struct FakeLeaderStore {
    clock: Arc<dyn Clock>,
    leases: Mutex<HashMap<ResourceId, LeaseRecord>>,
    versions: Mutex<HashMap<ResourceId, LeaseVersion>>,
    unavailable: AtomicBool,
    conflicting: AtomicBool,
    delays: Mutex<HashMap<ResourceId, Duration>>,
    calls: Arc<Mutex<HashMap<ResourceId, CallCounter>>>,
    initialized: AtomicBool,
}

#[derive(Debug, Default, Clone, Copy)]
struct CallCounter {
    running: usize,
    max_running: usize,
}

/// Marks one store call of a resource as running until dropped.
struct RunningCall {
    calls: Arc<Mutex<HashMap<ResourceId, CallCounter>>>,
    resource_id: ResourceId,
}

impl RunningCall {
    fn start(calls: &Arc<Mutex<HashMap<ResourceId, CallCounter>>>, resource_id: &ResourceId) -> Self {
        let mut counters = calls.lock();
        let counter = counters.entry(resource_id.clone()).or_default();
        counter.running += 1;
        counter.max_running = counter.max_running.max(counter.running);
        Self {
            calls: calls.clone(),
            resource_id: resource_id.clone(),
        }
    }
}

impl Drop for RunningCall {
    fn drop(&mut self) {
        if let Some(counter) = self.calls.lock().get_mut(&self.resource_id) {
            counter.running = counter.running.saturating_sub(1);
        }
    }
}

fn is_live(lease: &LeaseRecord, now: DateTime<Utc>) -> bool {
    !lease.is_expired_at(now) && !lease.leader_id.is_no_leader()
}

impl FakeLeaderStore {
    pub(crate) fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            leases: Mutex::new(HashMap::new()),
            versions: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
            conflicting: AtomicBool::new(false),
            delays: Mutex::new(HashMap::new()),
            calls: Arc::new(Mutex::new(HashMap::new())),
            initialized: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub(crate) fn set_conflicting(&self, conflicting: bool) {
        self.conflicting.store(conflicting, Ordering::SeqCst);
    }

    pub(crate) fn delay(&self, resource_id: &ResourceId, delay: Duration) {
        self.delays.lock().insert(resource_id.clone(), delay);
    }

    /// Highest number of store calls of `resource_id` that overlapped in time.
    pub(crate) fn max_concurrent_calls(&self, resource_id: &ResourceId) -> usize {
        self.calls
            .lock()
            .get(resource_id)
            .map_or(0, |counter| counter.max_running)
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub(crate) fn holder(&self, resource_id: &ResourceId) -> Option<LeaderId> {
        let now = self.clock.now();
        self.leases
            .lock()
            .get(resource_id)
            .filter(|lease| is_live(lease, now))
            .map(|lease| lease.leader_id.clone())
    }

    pub(crate) fn insert(&self, lease: LeaseRecord) {
        self.versions
            .lock()
            .insert(lease.resource_id.clone(), lease.version);
        self.leases.lock().insert(lease.resource_id.clone(), lease);
    }

    async fn enter(&self, resource_id: &ResourceId) -> AppResult<()> {
        let delay = self.delays.lock().get(resource_id).copied();
        if let Some(delay) = delay {
            let _running = RunningCall::start(&self.calls, resource_id);
            tokio::time::sleep(delay).await;
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable("simulated store outage".to_owned()));
        }

        Ok(())
    }
}

#[async_trait]
impl LeaderStore for FakeLeaderStore {
    async fn initialize(&self) -> AppResult<()> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn read(&self, resource_id: &ResourceId) -> AppResult<Option<LeaseRecord>> {
        self.enter(resource_id).await?;
        let now = self.clock.now();
        Ok(self
            .leases
            .lock()
            .get(resource_id)
            .filter(|lease| is_live(lease, now))
            .cloned())
    }

    async fn try_acquire_or_renew(
        &self,
        resource_id: &ResourceId,
        candidate_id: &LeaderId,
        observed_version: Option<LeaseVersion>,
        lease_duration: Duration,
    ) -> AppResult<Option<LeaseRecord>> {
        self.enter(resource_id).await?;
        if self.conflicting.load(Ordering::SeqCst) {
            return Err(AppError::Conflict("simulated version conflict".to_owned()));
        }

        let now = self.clock.now();
        let mut leases = self.leases.lock();
        let allowed = match leases.get(resource_id) {
            None => true,
            Some(lease) if !is_live(lease, now) => true,
            Some(lease) => lease.is_held_by(candidate_id) && observed_version == Some(lease.version),
        };

        if !allowed {
            return Ok(None);
        }

        let mut versions = self.versions.lock();
        let version = versions
            .get(resource_id)
            .map_or(LeaseVersion::INITIAL, |version| version.next());
        versions.insert(resource_id.clone(), version);

        let lease = LeaseRecord {
            resource_id: resource_id.clone(),
            leader_id: candidate_id.clone(),
            expires_at: now
                .checked_add_signed(TimeDelta::from_std(lease_duration).unwrap_or(TimeDelta::MAX))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            version,
        };
        leases.insert(resource_id.clone(), lease.clone());
        Ok(Some(lease))
    }

    async fn release(
        &self,
        resource_id: &ResourceId,
        candidate_id: &LeaderId,
        observed_version: LeaseVersion,
    ) -> AppResult<bool> {
        self.enter(resource_id).await?;
        let mut leases = self.leases.lock();
        let matches = leases
            .get(resource_id)
            .is_some_and(|lease| lease.is_held_by(candidate_id) && lease.version == observed_version);
        if matches {
            leases.remove(resource_id);
        }

        Ok(matches)
    }
}

#[derive(Default)]
pub(crate) struct RecordingMetrics {
    pub(crate) outcomes: Mutex<Vec<(ResourceId, ElectionOutcome)>>,
    pub(crate) leadership: Mutex<HashMap<ResourceId, bool>>,
    pub(crate) without_leader: Mutex<HashMap<ResourceId, bool>>,
    pub(crate) releases: Mutex<Vec<(ResourceId, ReleaseOutcome)>>,
    pub(crate) failures: Mutex<u64>,
    pub(crate) last_completed: Mutex<Option<DateTime<Utc>>>,
}

impl RecordingMetrics {
    pub(crate) fn outcome_count(&self, resource_id: &ResourceId, outcome: ElectionOutcome) -> usize {
        self.outcomes
            .lock()
            .iter()
            .filter(|(recorded_id, recorded)| recorded_id == resource_id && *recorded == outcome)
            .count()
    }
}

impl ElectionMetrics for RecordingMetrics {
    fn record_election_outcome(&self, resource_id: &ResourceId, outcome: ElectionOutcome) {
        self.outcomes.lock().push((resource_id.clone(), outcome));
    }

    fn set_leadership(&self, resource_id: &ResourceId, is_leader: bool) {
        self.leadership.lock().insert(resource_id.clone(), is_leader);
    }

    fn set_resource_without_leader(&self, resource_id: &ResourceId, without_leader: bool) {
        self.without_leader
            .lock()
            .insert(resource_id.clone(), without_leader);
    }

    fn record_release(&self, resource_id: &ResourceId, outcome: ReleaseOutcome) {
        self.releases.lock().push((resource_id.clone(), outcome));
    }

    fn record_election_failure(&self) {
        *self.failures.lock() += 1;
    }

    fn record_election_completed(&self, completed_at: DateTime<Utc>) {
        *self.last_completed.lock() = Some(completed_at);
    }
}

pub(crate) fn resource(id: &str) -> ResourceId {
    ResourceId::new(id).unwrap_or_else(|_| unreachable!())
}

pub(crate) fn node(id: &str) -> LeaderId {
    LeaderId::candidate(id).unwrap_or_else(|_| unreachable!())
}
