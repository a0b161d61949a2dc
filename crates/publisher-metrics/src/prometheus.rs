use std::fmt::Write as _;

use crate::collector::MetricsSnapshot;

/// Renders a [`MetricsSnapshot`] as Prometheus text exposition format.
pub fn render(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();

    write_counter(&mut out, "publisher_jobs_total", snapshot.total_jobs);
    write_counter(&mut out, "publisher_jobs_successful_total", snapshot.successful);
    write_counter(&mut out, "publisher_jobs_failed_total", snapshot.failed);
    write_counter(&mut out, "publisher_jobs_retried_total", snapshot.retried);
    write_counter(
        &mut out,
        "publisher_rate_limit_hits_total",
        snapshot.rate_limit_hits,
    );
    write_counter(
        &mut out,
        "publisher_circuit_breaker_opens_total",
        snapshot.circuit_breaker_opens,
    );

    let _ = writeln!(out, "# TYPE publisher_success_rate gauge");
    let _ = writeln!(out, "publisher_success_rate {}", snapshot.success_rate);

    let _ = writeln!(out, "# TYPE publisher_job_latency_ms gauge");
    for (label, value) in [
        ("p50", snapshot.p50),
        ("p95", snapshot.p95),
        ("p99", snapshot.p99),
        ("max", snapshot.max),
    ] {
        let _ = writeln!(
            out,
            "publisher_job_latency_ms{{quantile=\"{label}\"}} {value}"
        );
    }
    let _ = writeln!(out, "publisher_job_latency_ms_avg {}", snapshot.avg);

    if !snapshot.error_categories.is_empty() {
        let _ = writeln!(out, "# TYPE publisher_errors_total counter");
        let mut categories: Vec<_> = snapshot.error_categories.iter().collect();
        categories.sort_by_key(|(name, _)| name.clone());
        for (category, count) in categories {
            let _ = writeln!(
                out,
                "publisher_errors_total{{category=\"{category}\"}} {count}"
            );
        }
    }

    out
}

fn write_counter(out: &mut String, name: &str, value: u64) {
    let _ = writeln!(out, "# TYPE {name} counter");
    let _ = writeln!(out, "{name} {value}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MetricsCollector;

    #[test]
    fn render_includes_every_counter_and_percentile() {
        let collector = MetricsCollector::new();
        collector.record_job_started();
        collector.record_success(42);
        collector.record_failure("SERVER_ERROR", 10);
        let text = render(&collector.snapshot());

        assert!(text.contains("publisher_jobs_total"));
        assert!(text.contains("publisher_job_latency_ms{quantile=\"p99\"}"));
        assert!(text.contains("publisher_errors_total{category=\"SERVER_ERROR\"} 1"));
    }
}
