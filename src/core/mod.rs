//! Event & metrics bus
//!
//! `DebugCore` is the structured-logging and instrumentation hub. It owns the
//! bounded log history, the level counters, open timers and in-flight request
//! traces. Every recorded entry is handed to the registered sinks and then
//! published on the [`EventBus`](crate::bus::EventBus).

pub mod entry;
pub mod sink;
pub mod tracker;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::bus::{EventBus, HubEvent};
use crate::config::CoreConfig;
use crate::history::BoundedHistory;
use crate::metrics;
use crate::process::{ProcessInfo, ProcessMemory, ProcessProbe};
use crate::scheduler::Scheduler;

pub use entry::{LogEntry, LogLevel, PerformanceSnapshot};
pub use sink::{ChannelSink, LogSink, TracingSink};
pub use tracker::{
    Orphan, RequestCompletion, RequestDescriptor, RequestOutcome, RequestTrace, Timer, TimerResult,
};

use sink::RegisteredSink;
use tracker::Tracker;

const MEMORY_SNAPSHOT_MAX_AGE: Duration = Duration::from_secs(1);

/// Logging port used by components that must not depend on the whole core
pub trait LogPort: Send + Sync {
    fn record(
        &self,
        level: LogLevel,
        component: &str,
        message: &str,
        data: Option<serde_json::Value>,
    ) -> Option<LogEntry>;
}

#[derive(Default)]
struct LogCounters {
    total: AtomicU64,
    by_level: [AtomicU64; 5],
    filtered: AtomicU64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LogCounts {
    pub total: u64,
    pub error: u64,
    pub warn: u64,
    pub info: u64,
    pub debug: u64,
    pub trace: u64,
    /// Entries dropped by the level threshold
    pub filtered: u64,
}

#[derive(Debug, Default)]
struct RequestStats {
    completed: u64,
    total_duration_ms: f64,
    orphaned_requests: u64,
    orphaned_timers: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceCounters {
    pub logs: LogCounts,
    pub log_history_len: usize,
    pub active_timers: usize,
    pub active_requests: usize,
    pub completed_requests: u64,
    pub average_response_time_ms: f64,
    pub orphaned_timers: u64,
    pub orphaned_requests: u64,
}

/// Read-only aggregate of the core's state
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub timestamp: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub process: ProcessInfo,
    pub memory: Option<ProcessMemory>,
    pub performance: PerformanceCounters,
    pub loggers: Vec<String>,
    pub monitors: Vec<String>,
    pub analyzers: Vec<String>,
}

/// Outcome of one orphan sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub timers_evicted: usize,
    pub requests_evicted: usize,
}

pub struct DebugCore {
    config: CoreConfig,
    threshold: LogLevel,
    bus: EventBus,
    process: ProcessInfo,
    started: Instant,
    started_at: DateTime<Utc>,
    next_id: AtomicU64,
    history: RwLock<BoundedHistory<LogEntry>>,
    counters: LogCounters,
    sinks: ArcSwap<Vec<RegisteredSink>>,
    tracker: Tracker,
    request_stats: Mutex<RequestStats>,
    monitors: RwLock<Vec<String>>,
    analyzers: RwLock<Vec<String>>,
    probe: Mutex<ProcessProbe>,
    sweeper: Scheduler,
    sweeping: AtomicBool,
}

impl DebugCore {
    pub fn new(config: CoreConfig, bus: EventBus) -> Self {
        let threshold = config.level_threshold();
        let history = BoundedHistory::new(config.max_log_history);

        Self {
            config,
            threshold,
            bus,
            process: ProcessInfo::current(),
            started: Instant::now(),
            started_at: Utc::now(),
            next_id: AtomicU64::new(1),
            history: RwLock::new(history),
            counters: LogCounters::default(),
            sinks: ArcSwap::from_pointee(Vec::new()),
            tracker: Tracker::default(),
            request_stats: Mutex::new(RequestStats::default()),
            monitors: RwLock::new(Vec::new()),
            analyzers: RwLock::new(Vec::new()),
            probe: Mutex::new(ProcessProbe::new()),
            sweeper: Scheduler::new(),
            sweeping: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    // ------------------------------------------------------------------
    // Sinks and registries
    // ------------------------------------------------------------------

    /// Attach a sink. Registering an existing name replaces that sink in place.
    pub fn register_sink(&self, name: impl Into<String>, sink: Arc<dyn LogSink>) {
        let name = name.into();
        self.sinks.rcu(|current| {
            let mut next: Vec<RegisteredSink> = current.as_ref().clone();
            match next.iter_mut().find(|s| s.name == name) {
                Some(existing) => existing.sink = sink.clone(),
                None => next.push(RegisteredSink {
                    name: name.clone(),
                    sink: sink.clone(),
                }),
            }
            next
        });
        tracing::debug!(sink = %name, "Log sink registered");
    }

    pub fn unregister_sink(&self, name: &str) -> bool {
        let before = self.sinks.load().len();
        self.sinks.rcu(|current| {
            current
                .iter()
                .filter(|s| s.name != name)
                .cloned()
                .collect::<Vec<_>>()
        });
        self.sinks.load().len() < before
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.sinks.load().iter().map(|s| s.name.clone()).collect()
    }

    pub fn register_monitor(&self, name: impl Into<String>) {
        push_unique(&self.monitors, name.into());
    }

    pub fn register_analyzer(&self, name: impl Into<String>) {
        push_unique(&self.analyzers, name.into());
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    /// Record a structured entry.
    ///
    /// Returns `None` when `level` is below the configured threshold. Sink
    /// failures are reported through `tracing` and never reach the caller.
    pub fn record(
        &self,
        level: LogLevel,
        component: &str,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Option<LogEntry> {
        if !level.passes(self.threshold) {
            self.counters.filtered.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let entry = LogEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            level,
            component: component.to_string(),
            message: message.into(),
            data,
            process: self.process.clone(),
            memory: self.memory_snapshot(),
            performance: self.performance_snapshot(),
        };

        self.history.write().push(entry.clone());
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        self.counters.by_level[level.index()].fetch_add(1, Ordering::Relaxed);
        metrics::record_log(level);

        self.dispatch(&entry);
        self.bus.publish(HubEvent::Log(entry.clone()));

        Some(entry)
    }

    pub fn error(&self, component: &str, message: impl Into<String>, data: Option<serde_json::Value>) -> Option<LogEntry> {
        self.record(LogLevel::Error, component, message, data)
    }

    pub fn warn(&self, component: &str, message: impl Into<String>, data: Option<serde_json::Value>) -> Option<LogEntry> {
        self.record(LogLevel::Warn, component, message, data)
    }

    pub fn info(&self, component: &str, message: impl Into<String>, data: Option<serde_json::Value>) -> Option<LogEntry> {
        self.record(LogLevel::Info, component, message, data)
    }

    pub fn debug(&self, component: &str, message: impl Into<String>, data: Option<serde_json::Value>) -> Option<LogEntry> {
        self.record(LogLevel::Debug, component, message, data)
    }

    fn dispatch(&self, entry: &LogEntry) {
        let sinks = self.sinks.load();
        for registered in sinks.iter() {
            if let Err(e) = registered.deliver(entry) {
                // fallback channel: process tracing output, never back into record()
                tracing::warn!(
                    sink = %registered.name,
                    entry_id = entry.id,
                    error = %e,
                    "Log sink failed"
                );
                metrics::record_sink_failure(&registered.name);
            }
        }
    }

    fn memory_snapshot(&self) -> Option<ProcessMemory> {
        if !self.config.enable_memory_tracking {
            return None;
        }
        self.probe.lock().memory_cached(MEMORY_SNAPSHOT_MAX_AGE)
    }

    fn performance_snapshot(&self) -> Option<PerformanceSnapshot> {
        if !self.config.enable_performance_tracking {
            return None;
        }
        Some(PerformanceSnapshot {
            uptime_ms: self.started.elapsed().as_millis() as u64,
            active_timers: self.tracker.active_timers(),
            active_requests: self.tracker.active_requests(),
        })
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// The newest `limit` entries, oldest first.
    pub fn recent_logs(&self, limit: usize) -> Vec<LogEntry> {
        self.history.read().tail(limit)
    }

    /// Copy of the whole retained history, oldest first.
    pub fn logs(&self) -> Vec<LogEntry> {
        self.history.read().snapshot()
    }

    pub fn log_history_len(&self) -> usize {
        self.history.read().len()
    }

    /// Drop the retained history. Counters keep their totals.
    pub fn clear_logs(&self) -> usize {
        let cleared = {
            let mut history = self.history.write();
            let len = history.len();
            history.clear();
            len
        };
        self.bus.publish(HubEvent::LogsCleared { cleared });
        tracing::info!(cleared, "Log history cleared");
        cleared
    }

    pub fn log_counts(&self) -> LogCounts {
        let level = |l: LogLevel| self.counters.by_level[l.index()].load(Ordering::Relaxed);
        LogCounts {
            total: self.counters.total.load(Ordering::Relaxed),
            error: level(LogLevel::Error),
            warn: level(LogLevel::Warn),
            info: level(LogLevel::Info),
            debug: level(LogLevel::Debug),
            trace: level(LogLevel::Trace),
            filtered: self.counters.filtered.load(Ordering::Relaxed),
        }
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    pub fn start_timer(&self, name: &str, metadata: Option<serde_json::Value>) -> String {
        if !self.config.enable_performance_tracking {
            return uuid::Uuid::new_v4().to_string();
        }
        self.tracker.start_timer(name, metadata)
    }

    /// Close a timer. Unknown, already-closed and swept ids all return `None`.
    pub fn end_timer(&self, id: &str, extra: Option<serde_json::Value>) -> Option<TimerResult> {
        let result = self.tracker.end_timer(id, extra)?;

        metrics::record_timer(&result.name, result.duration_ms);
        self.record(
            LogLevel::Debug,
            "performance",
            format!("Timer completed: {}", result.name),
            Some(json!({
                "timer_id": result.id,
                "duration_ms": result.duration_ms,
            })),
        );
        self.bus.publish(HubEvent::TimerEnd(result.clone()));

        Some(result)
    }

    pub fn open_timers(&self) -> Vec<Timer> {
        self.tracker.open_timers()
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    /// Start tracing a request. Returns `None` when request tracking is disabled.
    pub fn track_request(&self, descriptor: RequestDescriptor) -> Option<String> {
        if !self.config.enable_request_tracking {
            return None;
        }
        let trace = self.tracker.start_request(descriptor);
        let id = trace.id.clone();
        metrics::set_active_requests(self.tracker.active_requests());
        self.bus.publish(HubEvent::RequestStart(trace));
        Some(id)
    }

    /// Completion hook for the host's response path. Fires at most once per id.
    pub fn complete_request(&self, id: &str, outcome: RequestOutcome) -> Option<RequestCompletion> {
        let completion = self.tracker.complete_request(id, outcome)?;

        {
            let mut stats = self.request_stats.lock();
            stats.completed += 1;
            stats.total_duration_ms += completion.duration_ms;
        }
        metrics::record_request_complete(completion.status_code, completion.duration_ms);
        metrics::set_active_requests(self.tracker.active_requests());

        self.record(
            LogLevel::Info,
            "http",
            format!(
                "{} {} {} - {:.2}ms",
                completion.method, completion.url, completion.status_code, completion.duration_ms
            ),
            Some(json!({
                "request_id": completion.id,
                "status_code": completion.status_code,
                "response_size": completion.response_size,
                "duration_ms": completion.duration_ms,
            })),
        );
        self.bus.publish(HubEvent::RequestComplete(completion.clone()));

        Some(completion)
    }

    pub fn open_requests(&self) -> Vec<RequestTrace> {
        self.tracker.open_requests()
    }

    // ------------------------------------------------------------------
    // Orphan sweep
    // ------------------------------------------------------------------

    pub fn sweep_orphans(&self) -> SweepReport {
        self.sweep_orphans_at(Instant::now())
    }

    /// Evict timers and requests older than their staleness cutoff as of `now`,
    /// logging one warning per evicted entry.
    pub fn sweep_orphans_at(&self, now: Instant) -> SweepReport {
        let orphans = self.tracker.sweep(
            now,
            self.config.timer_stale_after(),
            self.config.request_stale_after(),
        );

        let mut report = SweepReport::default();
        for orphan in orphans {
            match orphan {
                Orphan::Timer { timer, age } => {
                    report.timers_evicted += 1;
                    self.record(
                        LogLevel::Warn,
                        "performance",
                        format!("Orphaned timer evicted: {}", timer.name),
                        Some(json!({
                            "timer_id": timer.id,
                            "age_ms": age.as_millis() as u64,
                            "metadata": timer.metadata,
                        })),
                    );
                }
                Orphan::Request { trace, age } => {
                    report.requests_evicted += 1;
                    self.record(
                        LogLevel::Warn,
                        "http",
                        format!("Request never completed: {} {}", trace.method, trace.url),
                        Some(json!({
                            "request_id": trace.id,
                            "age_ms": age.as_millis() as u64,
                            "remote_addr": trace.remote_addr,
                        })),
                    );
                }
            }
        }

        if report.timers_evicted + report.requests_evicted > 0 {
            let mut stats = self.request_stats.lock();
            stats.orphaned_timers += report.timers_evicted as u64;
            stats.orphaned_requests += report.requests_evicted as u64;
            metrics::set_active_requests(self.tracker.active_requests());
        }

        report
    }

    /// Start the periodic orphan sweep. Calling it while running is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.sweeping.swap(true, Ordering::SeqCst) {
            return;
        }
        let core = Arc::downgrade(self);
        self.sweeper.every("orphan-sweep", self.config.orphan_sweep_interval(), move || {
            let core = core.clone();
            async move {
                if let Some(core) = core.upgrade() {
                    let report = core.sweep_orphans();
                    if report != SweepReport::default() {
                        tracing::debug!(
                            timers = report.timers_evicted,
                            requests = report.requests_evicted,
                            "Orphan sweep evicted stale entries"
                        );
                    }
                }
            }
        });
        tracing::info!(
            interval_secs = self.config.orphan_sweep_interval_secs,
            "Orphan sweep started"
        );
    }

    pub async fn stop(&self) {
        if !self.sweeping.swap(false, Ordering::SeqCst) {
            return;
        }
        self.sweeper.shutdown().await;
    }

    // ------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------

    pub fn performance_counters(&self) -> PerformanceCounters {
        let stats = self.request_stats.lock();
        let average_response_time_ms = if stats.completed > 0 {
            stats.total_duration_ms / stats.completed as f64
        } else {
            0.0
        };

        PerformanceCounters {
            logs: self.log_counts(),
            log_history_len: self.log_history_len(),
            active_timers: self.tracker.active_timers(),
            active_requests: self.tracker.active_requests(),
            completed_requests: stats.completed,
            average_response_time_ms,
            orphaned_timers: stats.orphaned_timers,
            orphaned_requests: stats.orphaned_requests,
        }
    }

    pub fn system_health(&self) -> HealthSnapshot {
        HealthSnapshot {
            timestamp: Utc::now(),
            started_at: self.started_at,
            uptime_secs: self.started.elapsed().as_secs(),
            process: self.process.clone(),
            memory: self.probe.lock().memory_cached(MEMORY_SNAPSHOT_MAX_AGE),
            performance: self.performance_counters(),
            loggers: self.sink_names(),
            monitors: self.monitors.read().clone(),
            analyzers: self.analyzers.read().clone(),
        }
    }
}

impl LogPort for DebugCore {
    fn record(
        &self,
        level: LogLevel,
        component: &str,
        message: &str,
        data: Option<serde_json::Value>,
    ) -> Option<LogEntry> {
        DebugCore::record(self, level, component, message, data)
    }
}

fn push_unique(registry: &RwLock<Vec<String>>, name: String) {
    let mut names = registry.write();
    if !names.contains(&name) {
        names.push(name);
    }
}
