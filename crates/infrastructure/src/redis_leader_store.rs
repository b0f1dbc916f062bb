//! Redis-backed lease store.
//!
//! Each lease is a hash `{prefix}:{resource}` expiring with `PEXPIRE`; the
//! version comes from the counter `{prefix}:{resource}:version`, which
//! outlives the lease so versions never repeat.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use helmsman_application::LeaderStore;
use helmsman_core::{AppError, AppResult};
use helmsman_domain::{LeaderId, LeaseRecord, LeaseVersion, ResourceId};
use redis::{AsyncCommands, Script};
use tracing::info;

const ACQUIRE_OR_RENEW_SCRIPT: &str = r#"
local holder = redis.call('HGET', KEYS[1], 'leader_id')
if holder then
  if holder ~= ARGV[1] then
    return false
  end
  if redis.call('HGET', KEYS[1], 'version') ~= ARGV[2] then
    return false
  end
end
local version = redis.call('INCR', KEYS[2])
redis.call('HSET', KEYS[1], 'leader_id', ARGV[1], 'version', version, 'expires_at_ms', ARGV[4])
redis.call('PEXPIRE', KEYS[1], ARGV[3])
return version
"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'leader_id') == ARGV[1]
  and redis.call('HGET', KEYS[1], 'version') == ARGV[2] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

/// Redis implementation of the leader store port.
#[derive(Clone)]
pub struct RedisLeaderStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisLeaderStore {
    /// Creates one store adapter.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn lease_key(&self, resource_id: &ResourceId) -> String {
        format!("{}:{resource_id}", self.key_prefix)
    }

    fn version_key(&self, resource_id: &ResourceId) -> String {
        format!("{}:{resource_id}:version", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to connect to redis: {error}")))
    }
}

fn lease_millis(lease_duration: Duration) -> AppResult<i64> {
    i64::try_from(lease_duration.as_millis())
        .ok()
        .filter(|millis| *millis > 0)
        .ok_or_else(|| {
            AppError::Validation(format!(
                "lease duration {lease_duration:?} must be between 1ms and i64::MAX ms"
            ))
        })
}

fn lease_from_hash(
    resource_id: &ResourceId,
    fields: &HashMap<String, String>,
) -> AppResult<Option<LeaseRecord>> {
    let (Some(leader_id), Some(version), Some(expires_at_ms)) = (
        fields.get("leader_id"),
        fields.get("version"),
        fields.get("expires_at_ms"),
    ) else {
        return Ok(None);
    };

    let version = version.parse::<u64>().map_err(|error| {
        AppError::Internal(format!(
            "invalid lease version '{version}' for resource '{resource_id}': {error}"
        ))
    })?;
    let expires_at = expires_at_ms
        .parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or_else(|| {
            AppError::Internal(format!(
                "invalid lease expiry '{expires_at_ms}' for resource '{resource_id}'"
            ))
        })?;

    Ok(Some(LeaseRecord {
        resource_id: resource_id.clone(),
        leader_id: LeaderId::new(leader_id.as_str())?,
        expires_at,
        version: LeaseVersion::new(version),
    }))
}

#[async_trait]
impl LeaderStore for RedisLeaderStore {
    async fn initialize(&self) -> AppResult<()> {
        let mut connection = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut connection)
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to ping redis: {error}")))?;

        info!(key_prefix = %self.key_prefix, "redis leader store ready");
        Ok(())
    }

    async fn read(&self, resource_id: &ResourceId) -> AppResult<Option<LeaseRecord>> {
        let mut connection = self.connection().await?;
        let fields: HashMap<String, String> = connection
            .hgetall(self.lease_key(resource_id))
            .await
            .map_err(|error| {
                AppError::Unavailable(format!(
                    "failed to read lease for resource '{resource_id}': {error}"
                ))
            })?;

        lease_from_hash(resource_id, &fields)
    }

    async fn try_acquire_or_renew(
        &self,
        resource_id: &ResourceId,
        candidate_id: &LeaderId,
        observed_version: Option<LeaseVersion>,
        lease_duration: Duration,
    ) -> AppResult<Option<LeaseRecord>> {
        let lease_ms = lease_millis(lease_duration)?;
        // Expiry counts from before the request so the local view never outlives the key.
        let expires_at = Utc::now() + TimeDelta::milliseconds(lease_ms);
        let observed_version = observed_version
            .map(|version| version.value().to_string())
            .unwrap_or_default();

        let mut connection = self.connection().await?;
        let version = Script::new(ACQUIRE_OR_RENEW_SCRIPT)
            .key(self.lease_key(resource_id))
            .key(self.version_key(resource_id))
            .arg(candidate_id.as_str())
            .arg(observed_version)
            .arg(lease_ms)
            .arg(expires_at.timestamp_millis())
            .invoke_async::<Option<u64>>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!(
                    "failed to acquire lease for resource '{resource_id}': {error}"
                ))
            })?;

        Ok(version.map(|version| LeaseRecord {
            resource_id: resource_id.clone(),
            leader_id: candidate_id.clone(),
            expires_at,
            version: LeaseVersion::new(version),
        }))
    }

    async fn release(
        &self,
        resource_id: &ResourceId,
        candidate_id: &LeaderId,
        observed_version: LeaseVersion,
    ) -> AppResult<bool> {
        let mut connection = self.connection().await?;
        let released = Script::new(RELEASE_SCRIPT)
            .key(self.lease_key(resource_id))
            .arg(candidate_id.as_str())
            .arg(observed_version.value().to_string())
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!(
                    "failed to release lease for resource '{resource_id}': {error}"
                ))
            })?;

        Ok(released > 0)
    }
}
