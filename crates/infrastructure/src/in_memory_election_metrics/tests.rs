use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use helmsman_application::{Clock, ElectionConfig, LeaderService, ManualClock};
use helmsman_domain::{ElectionOutcome, LeaderId, ReleaseOutcome, ResourceId};

use super::InMemoryElectionMetrics;
use crate::InMemoryLeaderStore;

fn resource(id: &str) -> ResourceId {
    ResourceId::new(id).unwrap_or_else(|_| unreachable!())
}

fn node(id: &str) -> LeaderId {
    LeaderId::candidate(id).unwrap_or_else(|_| unreachable!())
}

#[tokio::test]
async fn service_cycles_are_counted_per_outcome() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let store = Arc::new(InMemoryLeaderStore::with_clock(clock.clone()));
    let metrics = Arc::new(InMemoryElectionMetrics::new());
    let r1 = resource("r1");
    let service = LeaderService::new(
        store.clone(),
        node("a"),
        ElectionConfig::new(Duration::from_millis(100), Duration::from_millis(500))
            .with_resources([r1.clone()]),
    )
    .unwrap_or_else(|_| unreachable!())
    .with_clock(clock.clone())
    .with_metrics(metrics.clone());

    service.run_election().await;
    clock.advance(Duration::from_millis(100));
    service.run_election().await;

    assert_eq!(metrics.outcome_count(&r1, ElectionOutcome::Acquired), 1);
    assert_eq!(metrics.outcome_count(&r1, ElectionOutcome::Renewed), 1);
    assert!(metrics.is_leader(&r1));
    assert!(!metrics.is_without_leader(&r1));
    assert_eq!(metrics.last_election_at(), Some(clock.now()));

    store.set_unavailable(true);
    service.run_election().await;

    assert_eq!(metrics.outcome_count(&r1, ElectionOutcome::StoreUnavailable), 1);
    assert!(!metrics.is_leader(&r1));
}

#[tokio::test]
async fn releases_are_counted_per_result() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let store = Arc::new(InMemoryLeaderStore::with_clock(clock.clone()));
    let metrics = Arc::new(InMemoryElectionMetrics::new());
    let r1 = resource("r1");
    let service = LeaderService::new(
        store,
        node("a"),
        ElectionConfig::new(Duration::from_millis(100), Duration::from_millis(500))
            .with_resources([r1.clone()]),
    )
    .unwrap_or_else(|_| unreachable!())
    .with_clock(clock)
    .with_metrics(metrics.clone());

    service.run_election().await;
    let first = service.release_leadership(&r1).await;
    let second = service.release_leadership(&r1).await;

    assert!(matches!(first, Ok(ReleaseOutcome::Released)));
    assert!(matches!(second, Ok(ReleaseOutcome::NotLeader)));
    assert_eq!(metrics.release_count(&r1, ReleaseOutcome::Released), 1);
    assert_eq!(metrics.release_count(&r1, ReleaseOutcome::NotLeader), 1);
    assert!(metrics.is_without_leader(&r1));
    assert_eq!(metrics.failure_count(), 0);
}
