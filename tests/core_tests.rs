/// Integration tests for the event & metrics bus
use debug_hub::{
    bus::{EventBus, HubEvent},
    config::CoreConfig,
    core::{ChannelSink, DebugCore, LogEntry, LogLevel, RequestDescriptor, RequestOutcome},
    error::SinkError,
};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn core_with(config: CoreConfig) -> Arc<DebugCore> {
    Arc::new(DebugCore::new(config, EventBus::new(256)))
}

fn request(url: &str) -> RequestDescriptor {
    RequestDescriptor {
        method: "GET".to_string(),
        url: url.to_string(),
        remote_addr: None,
    }
}

#[test]
fn test_history_keeps_newest_entries() {
    let core = core_with(CoreConfig {
        max_log_history: 100,
        ..CoreConfig::default()
    });

    for i in 0..150 {
        core.info("loader", format!("entry {}", i), None);
    }

    let logs = core.recent_logs(200);
    assert_eq!(logs.len(), 100);
    let expected: Vec<String> = (50..150).map(|i| format!("entry {}", i)).collect();
    let messages: Vec<String> = logs.into_iter().map(|e| e.message).collect();
    assert_eq!(messages, expected);
    assert_eq!(core.log_counts().total, 150);
}

#[test]
fn test_entry_ids_increase() {
    let core = core_with(CoreConfig::default());
    let ids: Vec<u64> = (0..10)
        .filter_map(|_| core.info("ids", "tick", None))
        .map(|e| e.id)
        .collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_threshold_filters_before_storing() {
    let core = core_with(CoreConfig {
        log_level: "warn".to_string(),
        ..CoreConfig::default()
    });

    assert!(core.debug("db", "noise", None).is_none());
    assert!(core.info("db", "noise", None).is_none());
    assert!(core.error("db", "boom", None).is_some());

    let counts = core.log_counts();
    assert_eq!(core.log_history_len(), 1);
    assert_eq!(counts.filtered, 2);
    assert_eq!(counts.error, 1);
}

#[test]
fn test_timer_ends_once() {
    let core = core_with(CoreConfig::default());
    let id = core.start_timer("db.query", Some(json!({ "table": "users" })));

    let result = core.end_timer(&id, Some(json!({ "rows": 3 }))).unwrap();
    assert_eq!(result.name, "db.query");
    assert!(result.duration_ms >= 0.0);
    assert_eq!(result.metadata, Some(json!({ "table": "users", "rows": 3 })));

    assert!(core.end_timer(&id, None).is_none());
    assert!(core.end_timer("never-started", None).is_none());
    assert_eq!(core.performance_counters().active_timers, 0);
}

#[test]
fn test_request_lifecycle_updates_average() {
    let core = core_with(CoreConfig::default());

    let first = core.track_request(request("/a")).unwrap();
    let second = core.track_request(request("/b")).unwrap();
    assert_ne!(first, second);
    assert_eq!(core.performance_counters().active_requests, 2);

    let done = core
        .complete_request(&first, RequestOutcome { status_code: 200, response_size: Some(12) })
        .unwrap();
    assert_eq!(done.url, "/a");
    assert!(core
        .complete_request(&first, RequestOutcome { status_code: 200, response_size: None })
        .is_none());

    let perf = core.performance_counters();
    assert_eq!(perf.active_requests, 1);
    assert_eq!(perf.completed_requests, 1);
    assert_eq!(perf.average_response_time_ms, done.duration_ms);
}

#[test]
fn test_average_response_time_is_mean_of_completions() {
    let core = core_with(CoreConfig::default());
    let outcome = RequestOutcome { status_code: 200, response_size: None };

    let mut durations = Vec::new();
    for pause in [0u64, 25, 50] {
        let id = core.track_request(request("/timed")).unwrap();
        std::thread::sleep(Duration::from_millis(pause));
        durations.push(core.complete_request(&id, outcome).unwrap().duration_ms);
    }

    let expected = durations.iter().sum::<f64>() / 3.0;
    let average = core.performance_counters().average_response_time_ms;
    assert!((average - expected).abs() < 1e-9);
    assert!(average >= 25.0);
}

#[test]
fn test_sweep_evicts_only_stale_entries() {
    let core = core_with(CoreConfig {
        timer_stale_after_secs: 60,
        request_stale_after_secs: 60,
        ..CoreConfig::default()
    });

    core.start_timer("forgotten", None);
    core.track_request(request("/hang")).unwrap();

    let report = core.sweep_orphans_at(Instant::now());
    assert_eq!(report.timers_evicted + report.requests_evicted, 0);

    let later = Instant::now() + Duration::from_secs(61);
    let report = core.sweep_orphans_at(later);
    assert_eq!(report.timers_evicted, 1);
    assert_eq!(report.requests_evicted, 1);

    // a second pass over the same instant finds nothing left
    let report = core.sweep_orphans_at(later);
    assert_eq!(report.timers_evicted + report.requests_evicted, 0);

    let perf = core.performance_counters();
    assert_eq!(perf.orphaned_timers, 1);
    assert_eq!(perf.orphaned_requests, 1);
    assert_eq!(perf.active_timers, 0);

    let warnings: Vec<LogEntry> = core
        .logs()
        .into_iter()
        .filter(|e| e.level == LogLevel::Warn)
        .collect();
    assert_eq!(warnings.len(), 2);
}

#[test]
fn test_failing_sinks_do_not_reach_the_caller() {
    let core = core_with(CoreConfig::default());
    core.register_sink(
        "panics",
        Arc::new(|_: &LogEntry| -> Result<(), SinkError> { panic!("sink exploded") }),
    );
    core.register_sink(
        "errors",
        Arc::new(|_: &LogEntry| -> Result<(), SinkError> {
            Err(SinkError::Rejected("disk full".to_string()))
        }),
    );
    let (channel, mut rx) = ChannelSink::new(8);
    core.register_sink("channel", Arc::new(channel));

    let entry = core.warn("payments", "retrying", None).unwrap();
    assert_eq!(core.log_history_len(), 1);
    assert_eq!(rx.try_recv().unwrap().id, entry.id);
}

#[test]
fn test_sink_registry_replaces_by_name() {
    let core = core_with(CoreConfig::default());
    let (first, mut first_rx) = ChannelSink::new(4);
    let (second, mut second_rx) = ChannelSink::new(4);

    core.register_sink("tap", Arc::new(first));
    core.register_sink("tap", Arc::new(second));
    assert_eq!(core.sink_names(), vec!["tap"]);

    core.info("x", "hello", None);
    assert!(first_rx.try_recv().is_err());
    assert!(second_rx.try_recv().is_ok());

    assert!(core.unregister_sink("tap"));
    assert!(!core.unregister_sink("tap"));
}

#[test]
fn test_clear_logs_publishes_count() {
    let core = core_with(CoreConfig::default());
    let mut events = core.bus().subscribe_topic("logs:cleared");

    core.info("x", "one", None);
    core.info("x", "two", None);
    assert_eq!(core.clear_logs(), 2);
    assert_eq!(core.log_history_len(), 0);

    match events.try_recv() {
        Some(HubEvent::LogsCleared { cleared }) => assert_eq!(cleared, 2),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    let core = core_with(CoreConfig::default());
    core.start();
    core.start();
    core.stop().await;
    core.stop().await;
    core.start();
    core.stop().await;
}
