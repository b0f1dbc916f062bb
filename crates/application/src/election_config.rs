//! Election timing policy and the resources contended at startup.

use std::collections::BTreeSet;
use std::time::Duration;

use helmsman_core::{AppError, AppResult};
use helmsman_domain::ResourceId;

/// Default tick period.
pub const DEFAULT_ELECTION_INTERVAL: Duration = Duration::from_secs(5);

/// Default lease duration.
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(20);

/// Default minimum lease-to-interval ratio.
pub const DEFAULT_MIN_LEASE_TO_INTERVAL_RATIO: u32 = 3;

/// Default deadline for draining ticks and releasing leases on stop.
pub const DEFAULT_SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Configuration of one leader service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionConfig {
    /// Period between two election ticks.
    pub election_interval: Duration,
    /// Lifetime granted by each successful acquisition or renewal.
    pub lease_duration: Duration,
    /// Lower bound for `lease_duration / election_interval`.
    pub min_lease_to_interval_ratio: u32,
    /// Upper bound for one store call; elapsed calls count as unavailable.
    pub store_call_timeout: Duration,
    /// Whether `stop` releases the leases this instance holds.
    pub release_on_shutdown: bool,
    /// Deadline for draining in-flight ticks and releasing leases on stop.
    pub shutdown_grace_period: Duration,
    /// Resources registered when the service is built.
    pub resource_ids: Vec<ResourceId>,
}

impl ElectionConfig {
    /// Creates a configuration with the given timing and default policy.
    #[must_use]
    pub fn new(election_interval: Duration, lease_duration: Duration) -> Self {
        Self {
            election_interval,
            lease_duration,
            min_lease_to_interval_ratio: DEFAULT_MIN_LEASE_TO_INTERVAL_RATIO,
            store_call_timeout: election_interval,
            release_on_shutdown: true,
            shutdown_grace_period: DEFAULT_SHUTDOWN_GRACE_PERIOD,
            resource_ids: Vec::new(),
        }
    }

    /// Sets the resources registered at construction.
    #[must_use]
    pub fn with_resources(mut self, resource_ids: impl IntoIterator<Item = ResourceId>) -> Self {
        self.resource_ids = resource_ids.into_iter().collect();
        self
    }

    /// Sets the store call timeout.
    #[must_use]
    pub fn with_store_call_timeout(mut self, store_call_timeout: Duration) -> Self {
        self.store_call_timeout = store_call_timeout;
        self
    }

    /// Sets whether held leases are released on stop.
    #[must_use]
    pub fn with_release_on_shutdown(mut self, release_on_shutdown: bool) -> Self {
        self.release_on_shutdown = release_on_shutdown;
        self
    }

    /// Sets the shutdown grace period.
    #[must_use]
    pub fn with_shutdown_grace_period(mut self, shutdown_grace_period: Duration) -> Self {
        self.shutdown_grace_period = shutdown_grace_period;
        self
    }

    /// Sets the minimum lease-to-interval ratio.
    #[must_use]
    pub fn with_min_lease_to_interval_ratio(mut self, ratio: u32) -> Self {
        self.min_lease_to_interval_ratio = ratio;
        self
    }

    /// Checks the timing invariants.
    pub fn validate(&self) -> AppResult<()> {
        if self.election_interval.is_zero() {
            return Err(AppError::Validation(
                "election_interval must be greater than zero".to_owned(),
            ));
        }

        if self.lease_duration.is_zero() {
            return Err(AppError::Validation(
                "lease_duration must be greater than zero".to_owned(),
            ));
        }

        if self.store_call_timeout.is_zero() {
            return Err(AppError::Validation(
                "store_call_timeout must be greater than zero".to_owned(),
            ));
        }

        if self.min_lease_to_interval_ratio < 2 {
            return Err(AppError::Validation(
                "min_lease_to_interval_ratio must be at least 2".to_owned(),
            ));
        }

        let min_lease = self
            .election_interval
            .checked_mul(self.min_lease_to_interval_ratio)
            .ok_or_else(|| {
                AppError::Validation("election_interval is too large".to_owned())
            })?;
        if self.lease_duration < min_lease {
            return Err(AppError::Validation(format!(
                "lease_duration {:?} must be at least {} times election_interval {:?}",
                self.lease_duration, self.min_lease_to_interval_ratio, self.election_interval
            )));
        }

        if self.store_call_timeout >= self.lease_duration {
            return Err(AppError::Validation(
                "store_call_timeout must be shorter than lease_duration".to_owned(),
            ));
        }

        let mut seen = BTreeSet::new();
        for resource_id in &self.resource_ids {
            if !seen.insert(resource_id) {
                return Err(AppError::Validation(format!(
                    "resource '{resource_id}' is listed more than once"
                )));
            }
        }

        Ok(())
    }
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ELECTION_INTERVAL, DEFAULT_LEASE_DURATION)
    }
}
