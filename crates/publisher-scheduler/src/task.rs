//! Spawns the two periodic tasks: the scheduler tick (5 min, 30s after
//! startup) and stuck-job recovery, each cancelable via a shutdown signal
//! (spec.md §9 "periodic tasks").

use std::sync::Arc;
use std::time::Duration;

use publisher_contracts::model::PublishJobPayload;
use publisher_queue::JobQueue;
use tokio::sync::watch;

use crate::engine::SchedulingEngine;
use crate::recovery::StuckJobRecovery;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_RECOVERY_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Spawns the scheduler-tick task: waits `startup_delay`, then runs a tick
/// every `interval` until `shutdown` signals `true`.
pub fn spawn_scheduler_tick_task<Q: JobQueue<PublishJobPayload> + 'static>(
    engine: Arc<SchedulingEngine<Q>>,
    interval: Duration,
    startup_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(startup_delay) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // interval's first tick fires immediately
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    engine.run_tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

/// Spawns the stuck-job-recovery task: runs a pass every `interval` until
/// `shutdown` signals `true`.
pub fn spawn_stuck_job_recovery_task<Q: JobQueue<PublishJobPayload> + 'static>(
    recovery: Arc<StuckJobRecovery<Q>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    recovery.run_once().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use publisher_contracts::ports::{InMemoryPersistence, ManualClock, RecordingAlertSink};
    use publisher_queue::MemoryJobQueue;

    #[tokio::test(start_paused = true)]
    async fn scheduler_tick_task_stops_on_shutdown_signal() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let queue: Arc<MemoryJobQueue<PublishJobPayload>> = Arc::new(MemoryJobQueue::new());
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let engine = Arc::new(SchedulingEngine::new(persistence, queue, clock));
        let (tx, rx) = watch::channel(false);

        let handle = spawn_scheduler_tick_task(engine, Duration::from_millis(10), Duration::from_millis(5), rx);

        tokio::time::advance(Duration::from_millis(30)).await;
        tokio::task::yield_now().await;
        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_task_stops_on_shutdown_signal() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let queue: Arc<MemoryJobQueue<PublishJobPayload>> = Arc::new(MemoryJobQueue::new());
        let alerts = Arc::new(RecordingAlertSink::new());
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let recovery = Arc::new(StuckJobRecovery::new(persistence, queue, alerts, clock));
        let (tx, rx) = watch::channel(false);

        let handle = spawn_stuck_job_recovery_task(recovery, Duration::from_millis(10), rx);

        tokio::time::advance(Duration::from_millis(30)).await;
        tokio::task::yield_now().await;
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
