//! Election metrics published through the `metrics` facade.
//!
//! All names follow `helmsman_leader_{name}`; counters carry a `_total`
//! suffix.

use chrono::{DateTime, Utc};
use helmsman_application::ElectionMetrics;
use helmsman_domain::{ElectionOutcome, ReleaseOutcome, ResourceId};
use metrics::{counter, gauge};

const ELECTION_OUTCOMES_TOTAL: &str = "helmsman_leader_election_outcomes_total";
const IS_LEADER: &str = "helmsman_leader_is_leader";
const RESOURCE_WITHOUT_LEADER: &str = "helmsman_leader_resource_without_leader";
const RELEASES_TOTAL: &str = "helmsman_leader_releases_total";
const ELECTION_FAILURES_TOTAL: &str = "helmsman_leader_election_failures_total";
const LAST_ELECTION_TIMESTAMP: &str = "helmsman_leader_last_election_timestamp_seconds";

/// Metrics sink forwarding to the globally installed `metrics` recorder.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsElectionMetrics;

impl MetricsElectionMetrics {
    /// Creates the sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn flag(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

impl ElectionMetrics for MetricsElectionMetrics {
    fn record_election_outcome(&self, resource_id: &ResourceId, outcome: ElectionOutcome) {
        counter!(
            ELECTION_OUTCOMES_TOTAL,
            "resource" => resource_id.to_string(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
    }

    fn set_leadership(&self, resource_id: &ResourceId, is_leader: bool) {
        gauge!(IS_LEADER, "resource" => resource_id.to_string()).set(flag(is_leader));
    }

    fn set_resource_without_leader(&self, resource_id: &ResourceId, without_leader: bool) {
        gauge!(RESOURCE_WITHOUT_LEADER, "resource" => resource_id.to_string())
            .set(flag(without_leader));
    }

    fn record_release(&self, resource_id: &ResourceId, outcome: ReleaseOutcome) {
        counter!(
            RELEASES_TOTAL,
            "resource" => resource_id.to_string(),
            "result" => outcome.as_str()
        )
        .increment(1);
    }

    fn record_election_failure(&self) {
        counter!(ELECTION_FAILURES_TOTAL).increment(1);
    }

    fn record_election_completed(&self, completed_at: DateTime<Utc>) {
        gauge!(LAST_ELECTION_TIMESTAMP).set(completed_at.timestamp_millis() as f64 / 1_000.0);
    }
}
