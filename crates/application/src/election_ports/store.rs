use std::time::Duration;

use async_trait::async_trait;
use helmsman_core::AppResult;
use helmsman_domain::{LeaderId, LeaseRecord, LeaseVersion, ResourceId};

/// Shared, strongly consistent store holding one lease per resource.
///
/// Implementations must be linearizable per resource. Transient failures are
/// reported as `AppError::Unavailable`; a lost conditional write is not an
/// error and is reported through the `Ok` value.
#[async_trait]
pub trait LeaderStore: Send + Sync {
    /// Prepares the backing storage before the first election.
    async fn initialize(&self) -> AppResult<()> {
        Ok(())
    }

    /// Returns the current lease, or none when unheld or logically expired.
    async fn read(&self, resource_id: &ResourceId) -> AppResult<Option<LeaseRecord>>;

    /// Acquires or renews the lease for `candidate_id`.
    ///
    /// Succeeds when the resource is unheld, when the current lease expired,
    /// or when `candidate_id` is the holder and `observed_version` matches.
    /// On success the expiry is pushed `lease_duration` into the future, the
    /// version advances and the new record is returned. Returns none when the
    /// condition does not hold.
    async fn try_acquire_or_renew(
        &self,
        resource_id: &ResourceId,
        candidate_id: &LeaderId,
        observed_version: Option<LeaseVersion>,
        lease_duration: Duration,
    ) -> AppResult<Option<LeaseRecord>>;

    /// Clears the lease when `candidate_id` still holds it at `observed_version`.
    async fn release(
        &self,
        resource_id: &ResourceId,
        candidate_id: &LeaderId,
        observed_version: LeaseVersion,
    ) -> AppResult<bool>;
}
