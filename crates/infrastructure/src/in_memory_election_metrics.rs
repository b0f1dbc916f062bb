//! Election metrics kept in process memory for inspection.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use helmsman_application::ElectionMetrics;
use helmsman_domain::{ElectionOutcome, ReleaseOutcome, ResourceId};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Recorded {
    outcomes: HashMap<(ResourceId, ElectionOutcome), u64>,
    releases: HashMap<(ResourceId, ReleaseOutcome), u64>,
    is_leader: HashMap<ResourceId, bool>,
    without_leader: HashMap<ResourceId, bool>,
    failures: u64,
    last_election_at: Option<DateTime<Utc>>,
}

/// Metrics sink holding counters and gauges in memory.
#[derive(Debug, Default)]
pub struct InMemoryElectionMetrics {
    recorded: Mutex<Recorded>,
}

impl InMemoryElectionMetrics {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many cycles of `resource_id` ended with `outcome`.
    #[must_use]
    pub fn outcome_count(&self, resource_id: &ResourceId, outcome: ElectionOutcome) -> u64 {
        self.recorded
            .lock()
            .outcomes
            .get(&(resource_id.clone(), outcome))
            .copied()
            .unwrap_or_default()
    }

    /// Returns how many releases of `resource_id` ended with `outcome`.
    #[must_use]
    pub fn release_count(&self, resource_id: &ResourceId, outcome: ReleaseOutcome) -> u64 {
        self.recorded
            .lock()
            .releases
            .get(&(resource_id.clone(), outcome))
            .copied()
            .unwrap_or_default()
    }

    /// Returns the is-leader gauge, `false` when never set.
    #[must_use]
    pub fn is_leader(&self, resource_id: &ResourceId) -> bool {
        self.recorded
            .lock()
            .is_leader
            .get(resource_id)
            .copied()
            .unwrap_or_default()
    }

    /// Returns the without-leader gauge, `false` when never set.
    #[must_use]
    pub fn is_without_leader(&self, resource_id: &ResourceId) -> bool {
        self.recorded
            .lock()
            .without_leader
            .get(resource_id)
            .copied()
            .unwrap_or_default()
    }

    /// Returns the number of abnormally terminated election tasks.
    #[must_use]
    pub fn failure_count(&self) -> u64 {
        self.recorded.lock().failures
    }

    /// Returns the last published election completion time.
    #[must_use]
    pub fn last_election_at(&self) -> Option<DateTime<Utc>> {
        self.recorded.lock().last_election_at
    }
}

impl ElectionMetrics for InMemoryElectionMetrics {
    fn record_election_outcome(&self, resource_id: &ResourceId, outcome: ElectionOutcome) {
        *self
            .recorded
            .lock()
            .outcomes
            .entry((resource_id.clone(), outcome))
            .or_default() += 1;
    }

    fn set_leadership(&self, resource_id: &ResourceId, is_leader: bool) {
        self.recorded
            .lock()
            .is_leader
            .insert(resource_id.clone(), is_leader);
    }

    fn set_resource_without_leader(&self, resource_id: &ResourceId, without_leader: bool) {
        self.recorded
            .lock()
            .without_leader
            .insert(resource_id.clone(), without_leader);
    }

    fn record_release(&self, resource_id: &ResourceId, outcome: ReleaseOutcome) {
        *self
            .recorded
            .lock()
            .releases
            .entry((resource_id.clone(), outcome))
            .or_default() += 1;
    }

    fn record_election_failure(&self) {
        self.recorded.lock().failures += 1;
    }

    fn record_election_completed(&self, completed_at: DateTime<Utc>) {
        self.recorded.lock().last_election_at = Some(completed_at);
    }
}

#[cfg(test)]
mod tests;
