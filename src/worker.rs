//! Publish worker pool: dequeues jobs claimed off C7, runs each through the
//! publish executor (C6) bounded by `publisherConcurrency` concurrent
//! in-flight jobs, and reports outcomes back to the queue's retry policy and
//! the metrics collector (C4).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use publisher_contracts::model::PublishJobPayload;
use publisher_executor::PublishExecutor;
use publisher_metrics::MetricsCollector;
use publisher_queue::{JobQueue, MemoryJobQueue};
use tokio::sync::{watch, Semaphore};

/// How often the pool polls the queue for newly-ready jobs.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct WorkerPool {
    queue: Arc<MemoryJobQueue<PublishJobPayload>>,
    executor: Arc<PublishExecutor>,
    metrics: Arc<MetricsCollector>,
    concurrency: usize,
    job_timeout: Duration,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<MemoryJobQueue<PublishJobPayload>>,
        executor: Arc<PublishExecutor>,
        metrics: Arc<MetricsCollector>,
        concurrency: usize,
        job_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            executor,
            metrics,
            concurrency: concurrency.max(1),
            job_timeout,
        }
    }

    /// Spawns the polling loop as a background task, bounded to
    /// `concurrency` in-flight jobs via a semaphore. Exits once `shutdown`
    /// signals `true` and every in-flight job has finished.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let semaphore = Arc::new(Semaphore::new(self.concurrency));
            let mut ticker = tokio::time::interval(POLL_INTERVAL);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.dispatch_ready_jobs(&semaphore).await;
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            // Drain outstanding permits so in-flight jobs finish before the
            // process exits.
            let _ = semaphore.acquire_many(self.concurrency as u32).await;
        })
    }

    async fn dispatch_ready_jobs(&self, semaphore: &Arc<Semaphore>) {
        let now = Utc::now();
        let ready = match self.queue.claim_ready(now).await {
            Ok(jobs) => jobs,
            Err(err) => {
                tracing::warn!(error = %err, "failed to claim ready jobs from queue");
                return;
            }
        };

        for (job_id, payload) in ready {
            let Ok(permit) = Arc::clone(semaphore).acquire_owned().await else {
                return;
            };
            let queue = Arc::clone(&self.queue);
            let executor = Arc::clone(&self.executor);
            let metrics = Arc::clone(&self.metrics);
            let job_timeout = self.job_timeout;

            tokio::spawn(async move {
                let _permit = permit;
                metrics.record_job_started();
                let started = std::time::Instant::now();

                let outcome = tokio::time::timeout(
                    job_timeout,
                    executor.run(payload.draft_id, payload.user_id),
                )
                .await;

                match outcome {
                    Ok(Ok(())) => {
                        metrics.record_success(started.elapsed().as_millis() as u64);
                        let _ = queue.complete(&job_id).await;
                    }
                    Ok(Err(err)) => {
                        record_error_metrics(&metrics, &err);
                        let now = Utc::now();
                        match queue.fail(&job_id, &err, now).await {
                            Ok(Some(_next_fire_at)) => metrics.record_retry(),
                            Ok(None) => {}
                            Err(queue_err) => {
                                tracing::warn!(error = %queue_err, "failed to record job failure in queue");
                            }
                        }
                    }
                    Err(_elapsed) => {
                        let timeout_err = publisher_contracts::PublisherError::transient_io(
                            "publish job exceeded its timeout",
                        );
                        record_error_metrics(&metrics, &timeout_err);
                        let now = Utc::now();
                        let _ = queue.fail(&job_id, &timeout_err, now).await;
                    }
                }
            });
        }
    }
}

fn record_error_metrics(metrics: &MetricsCollector, err: &publisher_contracts::PublisherError) {
    metrics.record_failure(err.kind(), 0);
    if matches!(err, publisher_contracts::PublisherError::RateLimited { .. }) {
        metrics.record_rate_limit_hit();
    }
    if matches!(err, publisher_contracts::PublisherError::CircuitOpen { .. }) {
        metrics.record_circuit_breaker_open();
    }
}
