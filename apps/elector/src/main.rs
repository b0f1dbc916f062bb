//! Helmsman leader election daemon.

#![forbid(unsafe_code)]

mod config;

use std::sync::Arc;

use helmsman_application::{LeaderService, LeaderStore};
use helmsman_core::{AppError, AppResult};
use helmsman_infrastructure::{
    InMemoryLeaderStore, MetricsElectionMetrics, PostgresLeaderStore, RedisLeaderStore,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{ElectorConfig, StoreConfig};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ElectorConfig::load()?;
    let store = build_store(&config.store).await?;
    let service = LeaderService::new(store, config.leader_id.clone(), config.election.clone())?
        .with_metrics(Arc::new(MetricsElectionMetrics::new()));

    let shutdown = install_shutdown_handler()?;
    service.start().await?;

    info!(
        leader_id = %config.leader_id,
        store = config.store.kind(),
        resources = config.election.resource_ids.len(),
        "helmsman-elector started"
    );

    let mut status_log = tokio::time::interval(config.status_log_interval);
    status_log.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = status_log.tick() => log_status(&service),
        }
    }

    service.stop().await?;
    log_status(&service);
    info!(leader_id = %config.leader_id, "helmsman-elector stopped");

    Ok(())
}

async fn build_store(store: &StoreConfig) -> AppResult<Arc<dyn LeaderStore>> {
    match store {
        StoreConfig::Memory => {
            warn!("using the in-memory leader store, leadership is local to this process");
            Ok(Arc::new(InMemoryLeaderStore::new()))
        }
        StoreConfig::Redis { url, key_prefix } => {
            let client = redis::Client::open(url.as_str()).map_err(|error| {
                AppError::Validation(format!("invalid REDIS_URL '{url}': {error}"))
            })?;
            Ok(Arc::new(RedisLeaderStore::new(client, key_prefix.as_str())))
        }
        StoreConfig::Postgres {
            database_url,
            table_name,
        } => {
            let pool = connect_pool(database_url).await?;
            Ok(Arc::new(PostgresLeaderStore::new(pool, table_name)?))
        }
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Unavailable(format!("failed to connect to database: {error}")))
}

fn log_status(service: &LeaderService) {
    match serde_json::to_string(&service.status_report()) {
        Ok(report) => info!(report = %report, "leader status"),
        Err(error) => warn!(error = %error, "failed to serialize leader status"),
    }
}

fn install_shutdown_handler() -> AppResult<CancellationToken> {
    let mut sigterm = signal(SignalKind::terminate()).map_err(|error| {
        AppError::Internal(format!("failed to install SIGTERM handler: {error}"))
    })?;
    let mut sigint = signal(SignalKind::interrupt()).map_err(|error| {
        AppError::Internal(format!("failed to install SIGINT handler: {error}"))
    })?;

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, stopping"),
            _ = sigint.recv() => info!("received SIGINT, stopping"),
        }

        cancel.cancel();
    });

    Ok(token)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
