//! PostgreSQL-backed lease store.
//!
//! Leases live in one row per resource. Acquisition and renewal are a single
//! conditional upsert judged against the database clock. A release keeps the
//! row and its version and marks the holder as `NO_LEADER`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use helmsman_application::LeaderStore;
use helmsman_core::{AppError, AppResult};
use helmsman_domain::{LeaderId, LeaseRecord, LeaseVersion, ResourceId};
use sqlx::PgPool;
use tracing::info;

/// Default name of the lease table.
pub const DEFAULT_LEADER_LEASE_TABLE: &str = "leader_leases";

#[derive(Debug, Clone)]
struct LeaseQueries {
    create_table: String,
    read: String,
    acquire_or_renew: String,
    release: String,
}

impl LeaseQueries {
    fn for_table(table: &str) -> Self {
        let no_leader = LeaderId::no_leader();
        let no_leader = no_leader.as_str();
        Self {
            create_table: format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    resource_id TEXT PRIMARY KEY,
                    leader_id TEXT NOT NULL,
                    version BIGINT NOT NULL,
                    expires_at TIMESTAMPTZ NOT NULL
                )
                "#
            ),
            read: format!(
                r#"
                SELECT leader_id, version, expires_at
                FROM {table}
                WHERE resource_id = $1
                  AND leader_id <> '{no_leader}'
                  AND expires_at > now()
                "#
            ),
            acquire_or_renew: format!(
                r#"
                INSERT INTO {table} (resource_id, leader_id, version, expires_at)
                VALUES ($1, $2, 1, now() + make_interval(secs => $4::float8))
                ON CONFLICT (resource_id) DO UPDATE
                SET
                    leader_id = EXCLUDED.leader_id,
                    version = {table}.version + 1,
                    expires_at = EXCLUDED.expires_at
                WHERE {table}.expires_at <= now()
                   OR {table}.leader_id = '{no_leader}'
                   OR ({table}.leader_id = $2 AND {table}.version = $3)
                RETURNING leader_id, version, expires_at
                "#
            ),
            release: format!(
                r#"
                UPDATE {table}
                SET leader_id = '{no_leader}', expires_at = now()
                WHERE resource_id = $1
                  AND leader_id = $2
                  AND version = $3
                  AND expires_at > now()
                "#
            ),
        }
    }
}

/// PostgreSQL implementation of the leader store port.
#[derive(Clone)]
pub struct PostgresLeaderStore {
    pool: PgPool,
    table_name: String,
    queries: LeaseQueries,
}

impl PostgresLeaderStore {
    /// Creates a store over `table_name` with the provided connection pool.
    pub fn new(pool: PgPool, table_name: &str) -> AppResult<Self> {
        validate_table_name(table_name)?;
        Ok(Self {
            pool,
            table_name: table_name.to_owned(),
            queries: LeaseQueries::for_table(table_name),
        })
    }
}

fn validate_table_name(table_name: &str) -> AppResult<()> {
    let mut characters = table_name.chars();
    let valid_start = characters
        .next()
        .is_some_and(|first| first.is_ascii_lowercase() || first == '_');
    let valid_rest = characters.all(|character| {
        character.is_ascii_lowercase() || character.is_ascii_digit() || character == '_'
    });

    if !valid_start || !valid_rest || table_name.len() > 63 {
        return Err(AppError::Validation(format!(
            "lease table name '{table_name}' must be a lowercase SQL identifier"
        )));
    }

    Ok(())
}

#[derive(Debug, sqlx::FromRow)]
struct LeaseRow {
    leader_id: String,
    version: i64,
    expires_at: DateTime<Utc>,
}

impl LeaseRow {
    fn into_lease(self, resource_id: &ResourceId) -> AppResult<LeaseRecord> {
        let version = u64::try_from(self.version).map_err(|error| {
            AppError::Internal(format!(
                "invalid lease version {} for resource '{resource_id}': {error}",
                self.version
            ))
        })?;

        Ok(LeaseRecord {
            resource_id: resource_id.clone(),
            leader_id: LeaderId::new(self.leader_id)?,
            expires_at: self.expires_at,
            version: LeaseVersion::new(version),
        })
    }
}

fn version_param(version: LeaseVersion) -> AppResult<i64> {
    i64::try_from(version.value()).map_err(|error| {
        AppError::Validation(format!("lease version {version} is out of range: {error}"))
    })
}

#[async_trait]
impl LeaderStore for PostgresLeaderStore {
    async fn initialize(&self) -> AppResult<()> {
        sqlx::query(&self.queries.create_table)
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!(
                    "failed to create lease table '{}': {error}",
                    self.table_name
                ))
            })?;

        info!(table_name = %self.table_name, "postgres leader store ready");
        Ok(())
    }

    async fn read(&self, resource_id: &ResourceId) -> AppResult<Option<LeaseRecord>> {
        let row = sqlx::query_as::<_, LeaseRow>(&self.queries.read)
            .bind(resource_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!(
                    "failed to read lease for resource '{resource_id}': {error}"
                ))
            })?;

        row.map(|row| row.into_lease(resource_id)).transpose()
    }

    async fn try_acquire_or_renew(
        &self,
        resource_id: &ResourceId,
        candidate_id: &LeaderId,
        observed_version: Option<LeaseVersion>,
        lease_duration: Duration,
    ) -> AppResult<Option<LeaseRecord>> {
        let local_deadline = TimeDelta::from_std(lease_duration)
            .ok()
            .and_then(|lease_duration| Utc::now().checked_add_signed(lease_duration))
            .ok_or_else(|| {
                AppError::Validation(format!("lease duration {lease_duration:?} is out of range"))
            })?;
        let observed_version = observed_version.map(version_param).transpose()?;

        let row = sqlx::query_as::<_, LeaseRow>(&self.queries.acquire_or_renew)
            .bind(resource_id.as_str())
            .bind(candidate_id.as_str())
            .bind(observed_version)
            .bind(lease_duration.as_secs_f64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!(
                    "failed to acquire lease for resource '{resource_id}': {error}"
                ))
            })?;

        row.map(|row| {
            // Never trust a database expiry past the locally measured lease.
            let mut lease = row.into_lease(resource_id)?;
            lease.expires_at = lease.expires_at.min(local_deadline);
            Ok(lease)
        })
        .transpose()
    }

    async fn release(
        &self,
        resource_id: &ResourceId,
        candidate_id: &LeaderId,
        observed_version: LeaseVersion,
    ) -> AppResult<bool> {
        let result = sqlx::query(&self.queries.release)
            .bind(resource_id.as_str())
            .bind(candidate_id.as_str())
            .bind(version_param(observed_version)?)
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!(
                    "failed to release lease for resource '{resource_id}': {error}"
                ))
            })?;

        Ok(result.rows_affected() > 0)
    }
}
