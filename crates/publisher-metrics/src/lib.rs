//! In-process metrics collector (C4): job counters, an error-category map,
//! a bounded latency ring for percentile computation, and both a `metrics`
//! crate facade and a hand-rolled Prometheus text exporter.

mod collector;
mod flush;
mod prometheus;

pub use collector::{percentile, MetricsCollector, MetricsSnapshot};
pub use flush::{spawn_flush_task, MetricsStore};
pub use prometheus::render as render_prometheus;
