//! Scheduled leader election over a set of resources.
//!
//! The service owns the local status table. A single periodic timer starts
//! one election cycle per resource and tick; cycles for different resources
//! run concurrently while cycles for the same resource never overlap.

use std::sync::Arc;

use helmsman_core::{AppError, AppResult};
use helmsman_domain::LeaderId;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::election_config::ElectionConfig;
use crate::election_core::ElectionCore;
use crate::election_ports::{Clock, ElectionMetrics, LeaderStore, NoopElectionMetrics, SystemClock};

mod queries;
mod registry;
mod scheduler;

use registry::ResourceRegistry;
use scheduler::{ElectionRunner, SchedulerHandle, run_scheduler};

/// Leader election service for one candidate identity.
pub struct LeaderService {
    leader_id: LeaderId,
    config: ElectionConfig,
    store: Arc<dyn LeaderStore>,
    metrics: Arc<dyn ElectionMetrics>,
    clock: Arc<dyn Clock>,
    registry: Arc<ResourceRegistry>,
    scheduler: Mutex<Option<SchedulerHandle>>,
}

impl LeaderService {
    /// Creates a service competing as `leader_id` for the configured resources.
    ///
    /// Fails when the configuration is invalid or `leader_id` is a sentinel.
    pub fn new(
        store: Arc<dyn LeaderStore>,
        leader_id: LeaderId,
        config: ElectionConfig,
    ) -> AppResult<Self> {
        config.validate()?;
        if leader_id.is_sentinel() {
            return Err(AppError::Validation(format!(
                "leader id '{leader_id}' is reserved and cannot compete"
            )));
        }

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let registry = Arc::new(ResourceRegistry::default());
        let now = clock.now();
        for resource_id in &config.resource_ids {
            registry.add(resource_id.clone(), now);
        }

        Ok(Self {
            leader_id,
            config,
            store,
            metrics: Arc::new(NoopElectionMetrics),
            clock,
            registry,
            scheduler: Mutex::new(None),
        })
    }

    /// Replaces the no-op metrics sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn ElectionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replaces the system clock used for lease expiry decisions.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns this instance's candidate identity.
    #[must_use]
    pub fn leader_id(&self) -> &LeaderId {
        &self.leader_id
    }

    /// Returns the configuration the service was built with.
    #[must_use]
    pub fn config(&self) -> &ElectionConfig {
        &self.config
    }

    /// Initializes the store and starts the periodic election loop.
    pub async fn start(&self) -> AppResult<()> {
        let mut scheduler = self.scheduler.lock().await;
        if scheduler.is_some() {
            return Err(AppError::Conflict(
                "leader service is already running".to_owned(),
            ));
        }

        self.store.initialize().await?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_scheduler(
            self.runner(),
            self.config.election_interval,
            cancel.clone(),
        ));
        self.registry.set_running(true);
        *scheduler = Some(SchedulerHandle { cancel, task });

        info!(
            leader_id = %self.leader_id,
            election_interval_ms = self.config.election_interval.as_millis(),
            lease_duration_ms = self.config.lease_duration.as_millis(),
            resources = self.registry.resource_ids().len(),
            "leader service started"
        );

        Ok(())
    }

    /// Stops the election loop and, when configured, releases held leases.
    ///
    /// Waiting for in-flight cycles and releasing share one deadline of
    /// `shutdown_grace_period`; work still pending at the deadline is
    /// abandoned.
    pub async fn stop(&self) -> AppResult<()> {
        let Some(handle) = self.scheduler.lock().await.take() else {
            return Ok(());
        };

        self.registry.set_running(false);
        handle.cancel.cancel();
        let deadline = Instant::now() + self.config.shutdown_grace_period;

        let drained = tokio::time::timeout_at(deadline, async {
            match handle.task.await {
                Ok(mut in_flight) => while in_flight.join_next().await.is_some() {},
                Err(error) => warn!(error = %error, "election scheduler terminated abnormally"),
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                leader_id = %self.leader_id,
                "in-flight election cycles did not finish before the shutdown deadline"
            );
        }

        if self.config.release_on_shutdown {
            let released = tokio::time::timeout_at(deadline, self.release_all()).await;
            if released.is_err() {
                warn!(
                    leader_id = %self.leader_id,
                    "releasing leadership did not finish before the shutdown deadline"
                );
            }
        }

        info!(leader_id = %self.leader_id, "leader service stopped");
        Ok(())
    }

    /// Runs one election cycle for every registered resource and waits for it.
    pub async fn run_election(&self) {
        self.runner().run_all().await;
    }

    async fn release_all(&self) {
        let runner = self.runner();
        let mut releases = tokio::task::JoinSet::new();
        for slot in self.registry.slots() {
            if !slot.status().is_leader() {
                continue;
            }

            let runner = Arc::clone(&runner);
            releases.spawn(async move {
                let guard = slot.claim().await;
                let _ = runner.release(&slot, guard).await;
            });
        }

        while let Some(joined) = releases.join_next().await {
            runner.reap(joined);
        }
    }

    fn runner(&self) -> Arc<ElectionRunner> {
        Arc::new(ElectionRunner {
            core: ElectionCore::new(
                self.store.clone(),
                self.clock.clone(),
                self.leader_id.clone(),
                self.config.lease_duration,
                self.config.store_call_timeout,
            ),
            registry: self.registry.clone(),
            metrics: self.metrics.clone(),
            clock: self.clock.clone(),
        })
    }
}
