use chrono::{DateTime, Utc};
use helmsman_domain::{ElectionOutcome, ReleaseOutcome, ResourceId};

/// Sink for election counters and gauges.
pub trait ElectionMetrics: Send + Sync {
    /// Counts one classified election cycle.
    fn record_election_outcome(&self, resource_id: &ResourceId, outcome: ElectionOutcome);

    /// Sets the is-leader gauge of one resource.
    fn set_leadership(&self, resource_id: &ResourceId, is_leader: bool);

    /// Sets the gauge flagging a resource the store reports as unheld.
    fn set_resource_without_leader(&self, resource_id: &ResourceId, without_leader: bool);

    /// Counts one explicit release attempt.
    fn record_release(&self, resource_id: &ResourceId, outcome: ReleaseOutcome);

    /// Counts one election task that terminated abnormally.
    fn record_election_failure(&self);

    /// Publishes the completion time of the latest election cycle.
    fn record_election_completed(&self, completed_at: DateTime<Utc>);
}

/// Metrics sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopElectionMetrics;

impl ElectionMetrics for NoopElectionMetrics {
    fn record_election_outcome(&self, _resource_id: &ResourceId, _outcome: ElectionOutcome) {}

    fn set_leadership(&self, _resource_id: &ResourceId, _is_leader: bool) {}

    fn set_resource_without_leader(&self, _resource_id: &ResourceId, _without_leader: bool) {}

    fn record_release(&self, _resource_id: &ResourceId, _outcome: ReleaseOutcome) {}

    fn record_election_failure(&self) {}

    fn record_election_completed(&self, _completed_at: DateTime<Utc>) {}
}
