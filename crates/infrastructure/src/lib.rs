//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_election_metrics;
mod in_memory_leader_store;
mod metrics_election_metrics;
mod postgres_leader_store;
mod redis_leader_store;

pub use in_memory_election_metrics::InMemoryElectionMetrics;
pub use in_memory_leader_store::InMemoryLeaderStore;
pub use metrics_election_metrics::MetricsElectionMetrics;
pub use postgres_leader_store::{DEFAULT_LEADER_LEASE_TABLE, PostgresLeaderStore};
pub use redis_leader_store::RedisLeaderStore;
