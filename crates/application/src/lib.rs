//! Leader election services and ports.

#![forbid(unsafe_code)]

mod election_config;
mod election_core;
mod election_ports;
mod leader_service;
mod status_report;

#[cfg(test)]
mod test_support;

pub use election_config::{
    DEFAULT_ELECTION_INTERVAL, DEFAULT_LEASE_DURATION, DEFAULT_MIN_LEASE_TO_INTERVAL_RATIO,
    DEFAULT_SHUTDOWN_GRACE_PERIOD, ElectionConfig,
};
pub use election_core::{ElectionCore, ElectionCycle, ReleaseCycle};
pub use election_ports::{
    Clock, ElectionMetrics, LeaderStore, ManualClock, NoopElectionMetrics, SystemClock,
};
pub use leader_service::LeaderService;
pub use status_report::{LeaderStatusReport, ResourceStatusReport};
