/// Integration tests for threshold evaluation and the alert lifecycle
use debug_hub::{
    bus::{EventBus, HubEvent},
    config::{CoreConfig, MonitorConfig},
    core::{DebugCore, LogLevel},
    monitor::{
        AlertSeverity, CpuSample, EventLoopSample, FixedProbe, HealthMonitor, MemorySample,
        MetricCategory, MetricSample, OverallStatus,
    },
};
use serde_json::json;
use std::sync::Arc;

fn monitor_with(config: MonitorConfig, probe: FixedProbe) -> (Arc<DebugCore>, HealthMonitor) {
    let bus = EventBus::new(256);
    let core = Arc::new(DebugCore::new(CoreConfig::default(), bus.clone()));
    let monitor = HealthMonitor::with_probe(config, core.clone(), bus, Box::new(probe));
    (core, monitor)
}

#[test]
fn test_memory_threshold_raises_then_resolves() {
    let config = MonitorConfig {
        memory_threshold_mb: 10.0,
        ..MonitorConfig::default()
    };
    let probe = FixedProbe {
        heap_used_mb: Some(15.0),
        cpu_percent: None,
    };
    let (core, monitor) = monitor_with(config, probe);

    monitor.sample_memory().unwrap();
    let active = monitor.get_active_alerts();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].category, "memory");
    assert_eq!(active[0].alert_type, "high_heap_usage");
    assert_eq!(active[0].severity, AlertSeverity::Warning);
    assert_eq!(monitor.calculate_overall_status(), OverallStatus::Warning);

    // still above: no duplicate while the first is unresolved
    monitor.sample_memory().unwrap();
    assert_eq!(monitor.get_alerts().len(), 1);

    monitor.ingest(MetricSample::Memory(MemorySample::with_heap_mb(5.0)));
    assert!(monitor.get_active_alerts().is_empty());
    assert_eq!(monitor.calculate_overall_status(), OverallStatus::Healthy);

    let messages: Vec<String> = core.logs().into_iter().map(|e| e.message).collect();
    assert!(messages.iter().any(|m| m == "Alert raised: memory/high_heap_usage"));
    assert!(messages.iter().any(|m| m == "Alert auto-resolved: memory/high_heap_usage"));
}

#[test]
fn test_below_threshold_never_alerts() {
    let (_, monitor) = monitor_with(
        MonitorConfig::default(),
        FixedProbe {
            heap_used_mb: Some(1.0),
            cpu_percent: Some(1.0),
        },
    );
    monitor.sample_memory();
    monitor.sample_cpu();
    assert!(monitor.get_alerts().is_empty());
    assert_eq!(monitor.get_metrics(Some(MetricCategory::Cpu), None)[&MetricCategory::Cpu].len(), 1);
}

#[test]
fn test_event_loop_lag_is_critical() {
    let (core, monitor) = monitor_with(MonitorConfig::default(), FixedProbe::default());
    monitor.ingest(MetricSample::EventLoop(EventLoopSample::with_lag(250.0)));

    assert_eq!(monitor.calculate_overall_status(), OverallStatus::Critical);
    let raised = core
        .logs()
        .into_iter()
        .find(|e| e.message.starts_with("Alert raised"))
        .unwrap();
    assert_eq!(raised.level, LogLevel::Error);
}

#[test]
fn test_status_is_worst_unresolved_severity() {
    let (_, monitor) = monitor_with(MonitorConfig::default(), FixedProbe::default());
    assert_eq!(monitor.calculate_overall_status(), OverallStatus::Healthy);

    monitor.create_alert("custom", "note", json!({}));
    assert_eq!(monitor.calculate_overall_status(), OverallStatus::Healthy);

    let warning = monitor.create_alert("cpu", "high_cpu_usage", json!({ "usage_percent": 95.0 }));
    assert_eq!(monitor.calculate_overall_status(), OverallStatus::Warning);

    let critical = monitor.create_alert("eventLoop", "high_event_loop_lag", json!({}));
    assert_eq!(monitor.calculate_overall_status(), OverallStatus::Critical);

    // acknowledging does not clear status, resolving does
    monitor.acknowledge_alert(&critical.id).unwrap();
    assert_eq!(monitor.calculate_overall_status(), OverallStatus::Critical);
    monitor.resolve_alert(&critical.id).unwrap();
    assert_eq!(monitor.calculate_overall_status(), OverallStatus::Warning);
    monitor.resolve_alert(&warning.id).unwrap();
    assert_eq!(monitor.calculate_overall_status(), OverallStatus::Healthy);
}

#[test]
fn test_alert_updates_are_idempotent_and_published() {
    let bus = EventBus::new(64);
    let core = Arc::new(DebugCore::new(CoreConfig::default(), bus.clone()));
    let monitor = HealthMonitor::with_probe(
        MonitorConfig::default(),
        core,
        bus.clone(),
        Box::new(FixedProbe::default()),
    );
    let mut updates = bus.subscribe_topic("alert:updated");

    let alert = monitor.create_alert("memory", "high_heap_usage", json!({}));
    let first = monitor.acknowledge_alert(&alert.id).unwrap();
    let second = monitor.acknowledge_alert(&alert.id).unwrap();
    assert!(second.acknowledged);
    assert_eq!(first.acknowledged_at, second.acknowledged_at);
    assert!(monitor.acknowledge_alert("missing").is_none());
    assert!(monitor.resolve_alert("missing").is_none());

    assert!(matches!(updates.try_recv(), Some(HubEvent::AlertUpdated(_))));
    assert!(matches!(updates.try_recv(), Some(HubEvent::AlertUpdated(_))));
}

#[test]
fn test_metric_timestamps_strictly_increase() {
    let (_, monitor) = monitor_with(MonitorConfig::default(), FixedProbe::default());
    let fixed = chrono::Utc::now();

    for _ in 0..3 {
        let mut sample = CpuSample::with_usage(10.0);
        sample.timestamp = fixed;
        monitor.ingest(MetricSample::Cpu(sample));
    }

    let history = monitor.get_metrics(Some(MetricCategory::Cpu), None);
    let stamps: Vec<_> = history[&MetricCategory::Cpu].iter().map(|s| s.timestamp()).collect();
    assert_eq!(stamps.len(), 3);
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_metric_history_is_bounded() {
    let (_, monitor) = monitor_with(
        MonitorConfig {
            max_metric_history: 5,
            ..MonitorConfig::default()
        },
        FixedProbe::default(),
    );
    for i in 0..12 {
        monitor.ingest(MetricSample::EventLoop(EventLoopSample::with_lag(i as f64)));
    }

    let history = monitor.get_metrics(Some(MetricCategory::EventLoop), Some(100));
    let lags: Vec<f64> = history[&MetricCategory::EventLoop]
        .iter()
        .map(|s| s.primary_value().1)
        .collect();
    assert_eq!(lags, vec![7.0, 8.0, 9.0, 10.0, 11.0]);
}

#[tokio::test]
async fn test_health_checks_count_and_publish() {
    let bus = EventBus::new(64);
    let core = Arc::new(DebugCore::new(CoreConfig::default(), bus.clone()));
    let monitor = HealthMonitor::with_probe(
        MonitorConfig::default(),
        core,
        bus.clone(),
        Box::new(FixedProbe::default()),
    );
    let mut checks = bus.subscribe_topic("health:check");

    let report = monitor.perform_health_check();
    assert_eq!(report.check_number, 1);
    assert_eq!(monitor.perform_health_check().check_number, 2);
    assert_eq!(monitor.get_system_summary().checks_performed, 2);
    assert!(matches!(checks.try_recv(), Some(HubEvent::HealthCheck(_))));
}
