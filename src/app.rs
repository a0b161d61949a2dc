//! Wires the ten components (C1-C10) into one running process: the
//! scheduling engine and stuck-job recovery on their periodic tasks, a
//! bounded worker pool draining the publish queue, and an optional metrics
//! flush task. Mirrors the teacher's habit of a thin composition point
//! separate from each pattern's own crate.

use std::sync::Arc;
use std::time::Duration;

use publisher_cache::{CacheConfig, CacheCoordinator};
use publisher_circuitbreaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
use publisher_contracts::ports::{AlertSink, BlobStore, Clock, InMemoryPersistence, Persistence, SystemClock};
use publisher_executor::{PublishExecutor, ReqwestUpstreamClient};
use publisher_metrics::{spawn_flush_task, MetricsCollector};
use publisher_queue::MemoryJobQueue;
use publisher_ratelimiter::{RateLimiterConfig, RateLimiterRegistry};
use publisher_scheduler::{
    spawn_scheduler_tick_task, spawn_stuck_job_recovery_task, SchedulingEngine, StuckJobRecovery,
    DEFAULT_RECOVERY_INTERVAL, DEFAULT_STARTUP_DELAY, DEFAULT_TICK_INTERVAL,
};
use publisher_tokens::{ReqwestOAuthClient, TokenManager};
use serde_json::Value as JsonValue;
use tokio::sync::watch;

use crate::config::PublisherConfig;
use crate::stores::{NoopCircuitStateStore, NoopMetricsStore};
use crate::worker::WorkerPool;

/// A running instance of the publisher core. Holds every shared handle the
/// periodic tasks and worker pool need, plus the `JoinHandle`s for graceful
/// shutdown.
pub struct App {
    pub metrics: Arc<MetricsCollector>,
    pub cache: Arc<CacheCoordinator<String, JsonValue>>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

/// Collaborators the embedding deployment must supply: persistence, blob
/// storage, and alerting are explicitly out of this core's scope
/// (spec.md §1 Non-goals), so [`App::build`] takes them as trait objects
/// rather than constructing a concrete backend itself.
pub struct Collaborators {
    pub persistence: Arc<dyn Persistence>,
    pub blob_store: Arc<dyn BlobStore>,
    pub alerts: Arc<dyn AlertSink>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// In-memory collaborators, useful for local runs and integration
    /// tests. A production deployment supplies its own `Persistence`/
    /// `BlobStore`/`AlertSink` implementations over the same trait seams.
    pub fn in_memory() -> Self {
        Self {
            persistence: Arc::new(InMemoryPersistence::new()),
            blob_store: Arc::new(publisher_contracts::ports::InMemoryBlobStore::new()),
            alerts: Arc::new(publisher_contracts::ports::RecordingAlertSink::new()),
            clock: Arc::new(SystemClock),
        }
    }
}

impl App {
    /// Builds every component from `config` and `collaborators` and spawns
    /// the periodic tasks, but does not block; callers await [`App::join`]
    /// (or select on a shutdown signal) to keep the process alive.
    pub fn build(config: &PublisherConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            persistence,
            blob_store,
            alerts,
            clock,
        } = collaborators;

        let metrics = Arc::new(MetricsCollector::new());

        let breaker_config = CircuitBreakerConfig::builder()
            .failure_threshold(config.circuit_breaker_threshold)
            .open_duration(config.circuit_breaker_open_duration)
            .build();
        let mut breaker_registry = CircuitBreakerRegistry::new(breaker_config);
        if config.circuit_breaker_persist_to_redis {
            breaker_registry = breaker_registry.with_store(Arc::new(NoopCircuitStateStore));
        }
        let breaker = Arc::new(breaker_registry);

        let limiter_config = RateLimiterConfig::builder()
            .base_delay_ms(config.rate_limiter_base_delay_ms)
            .max_delay_ms(config.rate_limiter_max_delay_ms)
            .jitter_percent(config.rate_limiter_jitter_percent)
            .success_decrease_factor(config.rate_limiter_success_decrease_factor)
            .failure_increase_factor(config.rate_limiter_failure_increase_factor)
            .build();
        let limiter = Arc::new(RateLimiterRegistry::new(limiter_config));

        let cache_config = CacheConfig::builder()
            .ttl(config.cache_default_ttl)
            .stale_ttl(config.cache_stale_ttl)
            .build();
        let cache = Arc::new(CacheCoordinator::new(cache_config));

        let oauth_client = Arc::new(ReqwestOAuthClient::new(
            config.upstream_base_url.clone(),
            config.oauth_client_id.clone(),
            config.oauth_client_secret.clone(),
            Duration::from_secs(10),
        ));
        let token_manager = Arc::new(TokenManager::new(
            oauth_client,
            Arc::clone(&persistence),
            Arc::clone(&alerts),
            Arc::clone(&clock),
        ));

        let upstream = Arc::new(ReqwestUpstreamClient::new(
            format!("{}/api/v1/oauth2", config.upstream_base_url),
            Duration::from_secs(10),
        ));

        let executor = Arc::new(PublishExecutor::new(
            Arc::clone(&persistence),
            Arc::clone(&blob_store),
            Arc::clone(&alerts),
            Arc::clone(&clock),
            Arc::clone(&token_manager),
            Arc::clone(&breaker),
            Arc::clone(&limiter),
            upstream,
        ));

        let queue: Arc<MemoryJobQueue<publisher_contracts::model::PublishJobPayload>> =
            Arc::new(MemoryJobQueue::new());

        let scheduling_engine = Arc::new(SchedulingEngine::new(
            Arc::clone(&persistence),
            Arc::clone(&queue),
            Arc::clone(&clock),
        ));
        let recovery = Arc::new(StuckJobRecovery::new(
            Arc::clone(&persistence),
            Arc::clone(&queue),
            Arc::clone(&alerts),
            Arc::clone(&clock),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut tasks = vec![
            spawn_scheduler_tick_task(
                scheduling_engine,
                DEFAULT_TICK_INTERVAL,
                DEFAULT_STARTUP_DELAY,
                shutdown_rx.clone(),
            ),
            spawn_stuck_job_recovery_task(recovery, DEFAULT_RECOVERY_INTERVAL, shutdown_rx.clone()),
        ];

        if config.metrics_enabled {
            tasks.push(spawn_flush_task(
                Arc::clone(&metrics),
                Arc::new(NoopMetricsStore),
                config.metrics_flush_interval,
                || chrono::Utc::now().timestamp(),
                shutdown_rx.clone(),
            ));
        }

        let worker_pool = WorkerPool::new(
            queue,
            executor,
            Arc::clone(&metrics),
            config.publisher_concurrency,
            config.publisher_job_timeout,
        );
        tasks.push(worker_pool.spawn(shutdown_rx));

        Self {
            metrics,
            cache,
            tasks,
            shutdown_tx,
        }
    }

    /// Signals every periodic task and the worker pool to stop, then waits
    /// for them to finish their current iteration.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}
