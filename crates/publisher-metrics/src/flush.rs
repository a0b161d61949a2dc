use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::collector::{MetricsCollector, MetricsSnapshot};

/// External key-value store the metrics flush task writes snapshots into.
/// Implementations own `metrics:publisher:1min:<epoch>` and the 24h-trimmed
/// `metrics:publisher:timeline` sorted set; write failures are logged and
/// never fatal.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn write_snapshot(&self, epoch_seconds: i64, snapshot: &MetricsSnapshot);
    async fn trim_timeline(&self, older_than_seconds: i64);
}

/// Spawns the periodic flush task: every `interval`, writes a snapshot to
/// `store` and trims entries older than 24h from the timeline. Exits
/// cleanly when `shutdown` is signalled.
pub fn spawn_flush_task(
    collector: Arc<MetricsCollector>,
    store: Arc<dyn MetricsStore>,
    interval: Duration,
    now_epoch_seconds: impl Fn() -> i64 + Send + 'static,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = now_epoch_seconds();
                    let snapshot = collector.snapshot();
                    store.write_snapshot(now, &snapshot).await;
                    store.trim_timeline(now - 24 * 3600).await;
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
