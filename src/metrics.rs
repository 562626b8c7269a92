use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::LogLevel;

/// Install the Prometheus recorder and describe the hub's metrics.
///
/// Fails if a global recorder is already installed.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    init_metric_descriptions();

    Ok(handle)
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!("debug_hub_logs_total", "Log entries recorded, by level");
    describe_counter!(
        "debug_hub_sink_failures_total",
        "Log sink deliveries that failed or panicked"
    );
    describe_histogram!(
        "debug_hub_timer_duration_seconds",
        "Duration of completed performance timers"
    );
    describe_counter!("debug_hub_requests_total", "Completed tracked requests");
    describe_histogram!(
        "debug_hub_request_duration_seconds",
        "Duration of completed tracked requests"
    );
    describe_gauge!("debug_hub_active_requests", "Requests started but not completed");
    describe_gauge!("debug_hub_metric_value", "Latest health monitor sample value");
    describe_counter!("debug_hub_alerts_total", "Alerts raised by the health monitor");
    describe_gauge!("debug_hub_observers", "Connected dashboard observers");
    describe_gauge!("debug_hub_info", "Hub version information");

    gauge!("debug_hub_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Labelled by level only; components are free text chosen by the host.
pub fn record_log(level: LogLevel) {
    counter!("debug_hub_logs_total", "level" => level.as_str()).increment(1);
}

pub fn record_sink_failure(sink: &str) {
    counter!("debug_hub_sink_failures_total", "sink" => sink.to_string()).increment(1);
}

pub fn record_timer(name: &str, duration_ms: f64) {
    histogram!("debug_hub_timer_duration_seconds", "timer" => name.to_string())
        .record(duration_ms / 1000.0);
}

pub fn record_request_complete(status_code: u16, duration_ms: f64) {
    let status = status_class(status_code);
    counter!("debug_hub_requests_total", "status" => status).increment(1);
    histogram!("debug_hub_request_duration_seconds", "status" => status)
        .record(duration_ms / 1000.0);
}

pub fn set_active_requests(count: usize) {
    gauge!("debug_hub_active_requests").set(count as f64);
}

pub fn record_sample(category: &str, field: &'static str, value: f64) {
    gauge!(
        "debug_hub_metric_value",
        "category" => category.to_string(),
        "field" => field,
    )
    .set(value);
}

pub fn record_alert(category: &str, alert_type: &str, severity: &str) {
    counter!(
        "debug_hub_alerts_total",
        "category" => category.to_string(),
        "type" => alert_type.to_string(),
        "severity" => severity.to_string(),
    )
    .increment(1);
}

pub fn set_observers(count: usize) {
    gauge!("debug_hub_observers").set(count as f64);
}

fn status_class(status_code: u16) -> &'static str {
    match status_code {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_metrics() {
        init_metric_descriptions();

        // no recorder installed: calls must still be safe
        record_log(LogLevel::Warn);
        record_sink_failure("console");
        record_timer("db", 12.5);
        record_request_complete(404, 3.0);
        set_active_requests(2);
        record_sample("memory", "heap_used_mb", 42.0);
        record_alert("cpu", "high_cpu_usage", "warning");
        set_observers(1);
    }

    #[test]
    fn test_log_counter_has_level_label_only() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_log(LogLevel::Error);
            record_log(LogLevel::Error);
        });

        let rendered = handle.render();
        assert!(rendered.contains("debug_hub_logs_total{level=\"error\"} 2"));
        assert!(!rendered.contains("component="));
    }

    #[test]
    fn test_status_class() {
        assert_eq!(status_class(200), "2xx");
        assert_eq!(status_class(503), "5xx");
        assert_eq!(status_class(42), "other");
    }
}
