use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

const LATENCY_RING_CAP: usize = 1000;

/// Point-in-time view of [`MetricsCollector`], the shape returned by
/// `snapshot()` and rendered by the Prometheus exporter.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub total_jobs: u64,
    pub successful: u64,
    pub failed: u64,
    pub retried: u64,
    pub rate_limit_hits: u64,
    pub circuit_breaker_opens: u64,
    pub error_categories: HashMap<String, u64>,
    pub success_rate: f64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub max: u64,
    pub avg: f64,
}

/// In-process counters and a bounded latency ring (C4). Every field is
/// process-local; persistence, when enabled, is a best-effort periodic
/// flush handled by [`crate::flush::spawn_flush_task`].
#[derive(Default)]
pub struct MetricsCollector {
    total_jobs: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    rate_limit_hits: AtomicU64,
    circuit_breaker_opens: AtomicU64,
    error_categories: Mutex<HashMap<String, u64>>,
    latencies: Mutex<VecDeque<u64>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_job_started(&self) {
        self.total_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, latency_ms: u64) {
        self.successful.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency_ms);

        #[cfg(feature = "metrics")]
        {
            metrics::counter!("publisher_jobs_total", "outcome" => "success").increment(1);
            metrics::histogram!("publisher_job_duration_ms").record(latency_ms as f64);
        }
    }

    pub fn record_failure(&self, category: &str, latency_ms: u64) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency_ms);
        *self
            .error_categories
            .lock()
            .entry(category.to_string())
            .or_insert(0) += 1;

        #[cfg(feature = "metrics")]
        {
            metrics::counter!("publisher_jobs_total", "outcome" => "failure", "category" => category.to_string())
                .increment(1);
            metrics::histogram!("publisher_job_duration_ms").record(latency_ms as f64);
        }
    }

    pub fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::counter!("publisher_retries_total").increment(1);
    }

    pub fn record_rate_limit_hit(&self) {
        self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::counter!("publisher_rate_limit_hits_total").increment(1);
    }

    pub fn record_circuit_breaker_open(&self) {
        self.circuit_breaker_opens.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::counter!("publisher_circuit_breaker_opens_total").increment(1);
    }

    fn record_latency(&self, latency_ms: u64) {
        let mut latencies = self.latencies.lock();
        if latencies.len() >= LATENCY_RING_CAP {
            latencies.pop_front();
        }
        latencies.push_back(latency_ms);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_jobs = self.total_jobs.load(Ordering::Relaxed);
        let successful = self.successful.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let retried = self.retried.load(Ordering::Relaxed);
        let rate_limit_hits = self.rate_limit_hits.load(Ordering::Relaxed);
        let circuit_breaker_opens = self.circuit_breaker_opens.load(Ordering::Relaxed);
        let error_categories = self.error_categories.lock().clone();

        let success_rate = if total_jobs > 0 {
            let raw = successful as f64 / total_jobs as f64 * 100.0;
            (raw * 100.0).round() / 100.0
        } else {
            0.0
        };

        let mut sorted: Vec<u64> = self.latencies.lock().iter().copied().collect();
        sorted.sort_unstable();
        let p50 = percentile(&sorted, 50.0);
        let p95 = percentile(&sorted, 95.0);
        let p99 = percentile(&sorted, 99.0);
        let max = sorted.last().copied().unwrap_or(0);
        let avg = if sorted.is_empty() {
            0.0
        } else {
            sorted.iter().sum::<u64>() as f64 / sorted.len() as f64
        };

        MetricsSnapshot {
            total_jobs,
            successful,
            failed,
            retried,
            rate_limit_hits,
            circuit_breaker_opens,
            error_categories,
            success_rate,
            p50,
            p95,
            p99,
            max,
            avg,
        }
    }
}

/// `ceil(p/100 * n) - 1` indexing into a sorted sample. Returns 0 for an
/// empty sample.
pub fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let n = sorted.len() as f64;
    let index = ((p / 100.0 * n).ceil() as isize - 1).clamp(0, sorted.len() as isize - 1);
    sorted[index as usize]
}
