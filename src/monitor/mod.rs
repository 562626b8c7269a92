//! Health monitor
//!
//! Independent sampling loops feed one bounded history per metric category.
//! Memory, CPU and scheduler-lag samples are checked against thresholds;
//! a breach opens an alert and the next in-bounds sample resolves it.
//! Disk and network samples are descriptive only.

pub mod probe;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::bus::{EventBus, HubEvent};
use crate::config::MonitorConfig;
use crate::core::{LogLevel, LogPort};
use crate::history::BoundedHistory;
use crate::metrics;
use crate::process::bytes_to_mb;
use crate::scheduler::Scheduler;

pub use probe::{measure_scheduler_lag, FixedProbe, SysinfoProbe, SystemProbe};

/// Default number of samples returned per category by [`HealthMonitor::get_metrics`]
pub const DEFAULT_METRICS_LIMIT: usize = 50;

const COMPONENT: &str = "health-monitor";

// ============================================================================
// Metric samples
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricCategory {
    Memory,
    Cpu,
    EventLoop,
    Disk,
    Network,
}

impl MetricCategory {
    pub const ALL: [MetricCategory; 5] = [
        MetricCategory::Memory,
        MetricCategory::Cpu,
        MetricCategory::EventLoop,
        MetricCategory::Disk,
        MetricCategory::Network,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Cpu => "cpu",
            Self::EventLoop => "eventLoop",
            Self::Disk => "disk",
            Self::Network => "network",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "cpu" => Ok(Self::Cpu),
            "eventloop" | "event_loop" | "event-loop" => Ok(Self::EventLoop),
            "disk" => Ok(Self::Disk),
            "network" => Ok(Self::Network),
            other => Err(format!("unknown metric category: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySample {
    pub timestamp: DateTime<Utc>,
    /// Process resident set size in MB
    pub heap_used_mb: f64,
    pub rss_bytes: u64,
    pub virtual_bytes: u64,
    pub system_total_mb: f64,
    pub system_free_mb: f64,
    pub system_available_mb: f64,
}

impl MemorySample {
    pub fn with_heap_mb(heap_used_mb: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            heap_used_mb,
            rss_bytes: (heap_used_mb * 1024.0 * 1024.0) as u64,
            virtual_bytes: 0,
            system_total_mb: 0.0,
            system_free_mb: 0.0,
            system_available_mb: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuSample {
    pub timestamp: DateTime<Utc>,
    /// Share of one core used since the previous sample
    pub usage_percent: f64,
    pub interval_ms: Option<f64>,
    /// Host-wide usage across all cores
    #[serde(default)]
    pub system_usage_percent: f64,
    pub load_average: [f64; 3],
    pub cores: usize,
}

impl CpuSample {
    pub fn with_usage(usage_percent: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            usage_percent,
            interval_ms: None,
            system_usage_percent: 0.0,
            load_average: [0.0; 3],
            cores: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLoopSample {
    pub timestamp: DateTime<Utc>,
    pub lag_ms: f64,
}

impl EventLoopSample {
    pub fn with_lag(lag_ms: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            lag_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub name: String,
    pub mount_point: String,
    pub total_bytes: u64,
    pub available_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskSample {
    pub timestamp: DateTime<Utc>,
    pub working_dir: Option<String>,
    pub disks: Vec<DiskUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub name: String,
    pub received_bytes: u64,
    pub transmitted_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSample {
    pub timestamp: DateTime<Utc>,
    pub interfaces: Vec<NetworkInterface>,
}

/// A timestamped reading from one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum MetricSample {
    Memory(MemorySample),
    Cpu(CpuSample),
    EventLoop(EventLoopSample),
    Disk(DiskSample),
    Network(NetworkSample),
}

impl MetricSample {
    pub fn category(&self) -> MetricCategory {
        match self {
            Self::Memory(_) => MetricCategory::Memory,
            Self::Cpu(_) => MetricCategory::Cpu,
            Self::EventLoop(_) => MetricCategory::EventLoop,
            Self::Disk(_) => MetricCategory::Disk,
            Self::Network(_) => MetricCategory::Network,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Memory(s) => s.timestamp,
            Self::Cpu(s) => s.timestamp,
            Self::EventLoop(s) => s.timestamp,
            Self::Disk(s) => s.timestamp,
            Self::Network(s) => s.timestamp,
        }
    }

    fn set_timestamp(&mut self, timestamp: DateTime<Utc>) {
        match self {
            Self::Memory(s) => s.timestamp = timestamp,
            Self::Cpu(s) => s.timestamp = timestamp,
            Self::EventLoop(s) => s.timestamp = timestamp,
            Self::Disk(s) => s.timestamp = timestamp,
            Self::Network(s) => s.timestamp = timestamp,
        }
    }

    /// Headline figure of the sample, as `(field, value)`.
    pub fn primary_value(&self) -> (&'static str, f64) {
        match self {
            Self::Memory(s) => ("heap_used_mb", s.heap_used_mb),
            Self::Cpu(s) => ("usage_percent", s.usage_percent),
            Self::EventLoop(s) => ("lag_ms", s.lag_ms),
            Self::Disk(s) => ("disks", s.disks.len() as f64),
            Self::Network(s) => ("interfaces", s.interfaces.len() as f64),
        }
    }
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown alert severity: {}", other)),
        }
    }
}

/// Static severity table. Unmapped combinations are `Info`.
pub fn severity_for(category: &str, alert_type: &str) -> AlertSeverity {
    match (category, alert_type) {
        ("memory", "high_heap_usage") => AlertSeverity::Warning,
        ("cpu", "high_cpu_usage") => AlertSeverity::Warning,
        ("eventLoop", "high_event_loop_lag") => AlertSeverity::Critical,
        _ => AlertSeverity::Info,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub category: String,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub data: serde_json::Value,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        !self.resolved
    }

    fn same_rule(&self, category: &str, alert_type: &str) -> bool {
        self.category == category && self.alert_type == alert_type
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Warning,
    Critical,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
        })
    }
}

/// Worst severity among the alerts that are not resolved.
pub fn calculate_overall_status<'a>(alerts: impl IntoIterator<Item = &'a Alert>) -> OverallStatus {
    let worst = alerts
        .into_iter()
        .filter(|a| a.is_active())
        .map(|a| a.severity)
        .max();

    match worst {
        Some(AlertSeverity::Critical) => OverallStatus::Critical,
        Some(AlertSeverity::Warning) => OverallStatus::Warning,
        _ => OverallStatus::Healthy,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityBreakdown {
    pub info: usize,
    pub warning: usize,
    pub critical: usize,
}

impl SeverityBreakdown {
    pub fn from_alerts<'a>(alerts: impl IntoIterator<Item = &'a Alert>) -> Self {
        let mut breakdown = Self::default();
        for alert in alerts {
            match alert.severity {
                AlertSeverity::Info => breakdown.info += 1,
                AlertSeverity::Warning => breakdown.warning += 1,
                AlertSeverity::Critical => breakdown.critical += 1,
            }
        }
        breakdown
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlertCounts {
    pub total: usize,
    pub active: usize,
    pub acknowledged: usize,
    pub resolved: usize,
    /// Breakdown of active alerts only
    pub active_by_severity: SeverityBreakdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckReport {
    pub check_number: u64,
    pub timestamp: DateTime<Utc>,
    pub status: OverallStatus,
    pub active_alerts: usize,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemSummary {
    pub timestamp: DateTime<Utc>,
    pub status: OverallStatus,
    pub uptime_secs: u64,
    pub running: bool,
    pub checks_performed: u64,
    pub latest: BTreeMap<MetricCategory, MetricSample>,
    pub alerts: AlertCounts,
}

// ============================================================================
// Monitor
// ============================================================================

pub struct HealthMonitor {
    config: MonitorConfig,
    log: Arc<dyn LogPort>,
    bus: EventBus,
    probe: Mutex<Box<dyn SystemProbe>>,
    metrics: [RwLock<BoundedHistory<MetricSample>>; 5],
    alerts: RwLock<BoundedHistory<Alert>>,
    checks: AtomicU64,
    started: Instant,
    scheduler: Scheduler,
    running: AtomicBool,
}

impl HealthMonitor {
    pub fn new(config: MonitorConfig, log: Arc<dyn LogPort>, bus: EventBus) -> Self {
        Self::with_probe(config, log, bus, Box::new(SysinfoProbe::new()))
    }

    pub fn with_probe(
        config: MonitorConfig,
        log: Arc<dyn LogPort>,
        bus: EventBus,
        probe: Box<dyn SystemProbe>,
    ) -> Self {
        let capacity = config.max_metric_history;
        let alerts = BoundedHistory::new(config.max_alert_history);

        Self {
            config,
            log,
            bus,
            probe: Mutex::new(probe),
            metrics: std::array::from_fn(|_| RwLock::new(BoundedHistory::new(capacity))),
            alerts: RwLock::new(alerts),
            checks: AtomicU64::new(0),
            started: Instant::now(),
            scheduler: Scheduler::new(),
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start every sampling loop and the health check. No-op when running.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let secs = Duration::from_secs;
        self.every("memory-sampler", secs(self.config.memory_interval_secs), |m| async move {
            m.sample_memory();
        });
        self.every("cpu-sampler", secs(self.config.cpu_interval_secs), |m| async move {
            m.sample_cpu();
        });
        self.every("event-loop-sampler", secs(self.config.event_loop_interval_secs), |m| async move {
            m.sample_event_loop().await;
        });
        self.every("disk-sampler", secs(self.config.disk_interval_secs), |m| async move {
            m.sample_disk();
        });
        self.every("network-sampler", secs(self.config.network_interval_secs), |m| async move {
            m.sample_network();
        });
        self.every("health-check", secs(self.config.health_check_interval_secs), |m| async move {
            m.perform_health_check();
        });

        self.log.record(
            LogLevel::Info,
            COMPONENT,
            "Health monitoring started",
            Some(json!({
                "memory_threshold_mb": self.config.memory_threshold_mb,
                "cpu_threshold_percent": self.config.cpu_threshold_percent,
                "event_loop_lag_threshold_ms": self.config.event_loop_lag_threshold_ms,
            })),
        );
    }

    fn every<F, Fut>(self: &Arc<Self>, name: &str, period: Duration, task: F)
    where
        F: Fn(Arc<Self>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let monitor = Arc::downgrade(self);
        self.scheduler.every(name, period, move || {
            let monitor = monitor.upgrade();
            let run = monitor.map(&task);
            async move {
                if let Some(run) = run {
                    run.await;
                }
            }
        });
    }

    /// Cancel every loop and wait for them to exit. No-op when stopped.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.scheduler.shutdown().await;
        self.log.record(LogLevel::Info, COMPONENT, "Health monitoring stopped", None);
    }

    // ------------------------------------------------------------------
    // Sampling
    // ------------------------------------------------------------------

    pub fn sample_memory(&self) -> Option<MetricSample> {
        let sample = self.probe.lock().memory()?;
        Some(self.ingest(MetricSample::Memory(sample)))
    }

    pub fn sample_cpu(&self) -> Option<MetricSample> {
        let sample = self.probe.lock().cpu()?;
        Some(self.ingest(MetricSample::Cpu(sample)))
    }

    pub async fn sample_event_loop(&self) -> MetricSample {
        let sample = measure_scheduler_lag().await;
        self.ingest(MetricSample::EventLoop(sample))
    }

    pub fn sample_disk(&self) -> Option<MetricSample> {
        let sample = self.probe.lock().disk()?;
        Some(self.ingest(MetricSample::Disk(sample)))
    }

    pub fn sample_network(&self) -> Option<MetricSample> {
        let sample = self.probe.lock().network()?;
        Some(self.ingest(MetricSample::Network(sample)))
    }

    /// Store a sample, publish it and evaluate its threshold rule.
    ///
    /// The stored timestamp is nudged forward if needed so each category's
    /// history stays strictly increasing.
    pub fn ingest(&self, mut sample: MetricSample) -> MetricSample {
        let category = sample.category();
        {
            let mut history = self.metrics[category.index()].write();
            if let Some(last) = history.last() {
                let floor = last.timestamp();
                if sample.timestamp() <= floor {
                    sample.set_timestamp(floor + chrono::Duration::microseconds(1));
                }
            }
            history.push(sample.clone());
        }

        let (field, value) = sample.primary_value();
        metrics::record_sample(category.as_str(), field, value);
        self.bus.publish(HubEvent::Metric(sample.clone()));

        match &sample {
            MetricSample::Memory(s) => self.evaluate(
                MetricCategory::Memory,
                "high_heap_usage",
                s.heap_used_mb,
                self.config.memory_threshold_mb,
                json!({
                    "heap_used_mb": s.heap_used_mb,
                    "threshold_mb": self.config.memory_threshold_mb,
                    "rss_mb": bytes_to_mb(s.rss_bytes),
                }),
            ),
            MetricSample::Cpu(s) => self.evaluate(
                MetricCategory::Cpu,
                "high_cpu_usage",
                s.usage_percent,
                self.config.cpu_threshold_percent,
                json!({
                    "usage_percent": s.usage_percent,
                    "threshold_percent": self.config.cpu_threshold_percent,
                    "load_average": s.load_average,
                }),
            ),
            MetricSample::EventLoop(s) => self.evaluate(
                MetricCategory::EventLoop,
                "high_event_loop_lag",
                s.lag_ms,
                self.config.event_loop_lag_threshold_ms,
                json!({
                    "lag_ms": s.lag_ms,
                    "threshold_ms": self.config.event_loop_lag_threshold_ms,
                }),
            ),
            MetricSample::Disk(_) | MetricSample::Network(_) => {}
        }

        sample
    }

    fn evaluate(
        &self,
        category: MetricCategory,
        alert_type: &str,
        value: f64,
        threshold: f64,
        data: serde_json::Value,
    ) {
        let category = category.as_str();
        if value > threshold {
            let already_open = self
                .alerts
                .read()
                .iter()
                .any(|a| a.is_active() && a.same_rule(category, alert_type));
            if !already_open {
                self.create_alert(category, alert_type, data);
            }
            return;
        }

        let open: Vec<String> = self
            .alerts
            .read()
            .iter()
            .filter(|a| a.is_active() && a.same_rule(category, alert_type))
            .map(|a| a.id.clone())
            .collect();
        for id in open {
            if self.resolve_alert(&id).is_some() {
                self.log.record(
                    LogLevel::Info,
                    COMPONENT,
                    &format!("Alert auto-resolved: {}/{}", category, alert_type),
                    Some(json!({ "alert_id": id, "value": value, "threshold": threshold })),
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Alerts
    // ------------------------------------------------------------------

    pub fn create_alert(&self, category: &str, alert_type: &str, data: serde_json::Value) -> Alert {
        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            category: category.to_string(),
            alert_type: alert_type.to_string(),
            severity: severity_for(category, alert_type),
            data,
            acknowledged: false,
            acknowledged_at: None,
            resolved: false,
            resolved_at: None,
        };

        self.alerts.write().push(alert.clone());
        metrics::record_alert(category, alert_type, alert.severity.as_str());

        let level = match alert.severity {
            AlertSeverity::Critical => LogLevel::Error,
            _ => LogLevel::Warn,
        };
        self.log.record(
            level,
            COMPONENT,
            &format!("Alert raised: {}/{}", category, alert_type),
            Some(json!({
                "alert_id": alert.id,
                "severity": alert.severity,
                "data": alert.data,
            })),
        );
        self.bus.publish(HubEvent::AlertCreated(alert.clone()));

        alert
    }

    /// Mark an alert acknowledged. Returns `None` for unknown ids.
    pub fn acknowledge_alert(&self, id: &str) -> Option<Alert> {
        self.update_alert(id, |alert| {
            if !alert.acknowledged {
                alert.acknowledged = true;
                alert.acknowledged_at = Some(Utc::now());
            }
        })
    }

    /// Mark an alert resolved. Returns `None` for unknown ids.
    pub fn resolve_alert(&self, id: &str) -> Option<Alert> {
        self.update_alert(id, |alert| {
            if !alert.resolved {
                alert.resolved = true;
                alert.resolved_at = Some(Utc::now());
            }
        })
    }

    fn update_alert<F>(&self, id: &str, update: F) -> Option<Alert>
    where
        F: FnOnce(&mut Alert),
    {
        let updated = {
            let mut alerts = self.alerts.write();
            let alert = alerts.find_mut(|a| a.id == id)?;
            update(alert);
            alert.clone()
        };
        self.bus.publish(HubEvent::AlertUpdated(updated.clone()));
        Some(updated)
    }

    /// Alerts that are not resolved, oldest first.
    pub fn get_active_alerts(&self) -> Vec<Alert> {
        self.alerts
            .read()
            .iter()
            .filter(|a| a.is_active())
            .cloned()
            .collect()
    }

    /// Full retained alert history, oldest first.
    pub fn get_alerts(&self) -> Vec<Alert> {
        self.alerts.read().snapshot()
    }

    pub fn alert_counts(&self) -> AlertCounts {
        let alerts = self.alerts.read();
        let active: Vec<&Alert> = alerts.iter().filter(|a| a.is_active()).collect();
        AlertCounts {
            total: alerts.len(),
            active: active.len(),
            acknowledged: alerts.iter().filter(|a| a.acknowledged).count(),
            resolved: alerts.iter().filter(|a| a.resolved).count(),
            active_by_severity: SeverityBreakdown::from_alerts(active),
        }
    }

    pub fn calculate_overall_status(&self) -> OverallStatus {
        calculate_overall_status(self.alerts.read().iter())
    }

    // ------------------------------------------------------------------
    // Health check and queries
    // ------------------------------------------------------------------

    pub fn perform_health_check(&self) -> HealthCheckReport {
        let check_number = self.checks.fetch_add(1, Ordering::Relaxed) + 1;
        let report = HealthCheckReport {
            check_number,
            timestamp: Utc::now(),
            status: self.calculate_overall_status(),
            active_alerts: self.get_active_alerts().len(),
            uptime_secs: self.started.elapsed().as_secs(),
        };

        tracing::debug!(
            check = check_number,
            status = %report.status,
            active_alerts = report.active_alerts,
            "Health check completed"
        );
        self.bus.publish(HubEvent::HealthCheck(report.clone()));

        report
    }

    pub fn checks_performed(&self) -> u64 {
        self.checks.load(Ordering::Relaxed)
    }

    /// The newest `limit` samples for one category (or all of them), oldest first.
    pub fn get_metrics(
        &self,
        category: Option<MetricCategory>,
        limit: Option<usize>,
    ) -> BTreeMap<MetricCategory, Vec<MetricSample>> {
        let limit = limit.unwrap_or(DEFAULT_METRICS_LIMIT);
        let categories = match category {
            Some(c) => vec![c],
            None => MetricCategory::ALL.to_vec(),
        };

        categories
            .into_iter()
            .map(|c| (c, self.metrics[c.index()].read().tail(limit)))
            .collect()
    }

    pub fn latest(&self, category: MetricCategory) -> Option<MetricSample> {
        self.metrics[category.index()].read().last().cloned()
    }

    pub fn get_system_summary(&self) -> SystemSummary {
        let latest = MetricCategory::ALL
            .iter()
            .filter_map(|c| self.latest(*c).map(|s| (*c, s)))
            .collect();

        SystemSummary {
            timestamp: Utc::now(),
            status: self.calculate_overall_status(),
            uptime_secs: self.started.elapsed().as_secs(),
            running: self.is_running(),
            checks_performed: self.checks_performed(),
            latest,
            alerts: self.alert_counts(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::core::DebugCore;

    fn monitor(config: MonitorConfig) -> HealthMonitor {
        let bus = EventBus::new(64);
        let core = Arc::new(DebugCore::new(CoreConfig::default(), bus.clone()));
        HealthMonitor::with_probe(config, core, bus, Box::new(FixedProbe::default()))
    }

    fn alert(severity: AlertSeverity, resolved: bool) -> Alert {
        Alert {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            category: "test".to_string(),
            alert_type: "test".to_string(),
            severity,
            data: serde_json::Value::Null,
            acknowledged: false,
            acknowledged_at: None,
            resolved,
            resolved_at: None,
        }
    }

    #[test]
    fn test_severity_table() {
        assert_eq!(severity_for("memory", "high_heap_usage"), AlertSeverity::Warning);
        assert_eq!(severity_for("cpu", "high_cpu_usage"), AlertSeverity::Warning);
        assert_eq!(severity_for("eventLoop", "high_event_loop_lag"), AlertSeverity::Critical);
        assert_eq!(severity_for("disk", "low_space"), AlertSeverity::Info);
    }

    #[test]
    fn test_overall_status_ignores_resolved() {
        let alerts = vec![
            alert(AlertSeverity::Critical, true),
            alert(AlertSeverity::Warning, false),
        ];
        assert_eq!(calculate_overall_status(&alerts), OverallStatus::Warning);
        assert_eq!(calculate_overall_status(&alerts[..1]), OverallStatus::Healthy);
        assert_eq!(
            calculate_overall_status(&[alert(AlertSeverity::Info, false)]),
            OverallStatus::Healthy
        );
    }

    #[test]
    fn test_category_names() {
        assert_eq!("eventLoop".parse::<MetricCategory>().unwrap(), MetricCategory::EventLoop);
        assert_eq!("event_loop".parse::<MetricCategory>().unwrap(), MetricCategory::EventLoop);
        assert_eq!(
            serde_json::to_value(MetricCategory::EventLoop).unwrap(),
            serde_json::json!("eventLoop")
        );
        assert!("gpu".parse::<MetricCategory>().is_err());
    }

    #[test]
    fn test_sample_serializes_with_category_tag() {
        let value = serde_json::to_value(MetricSample::EventLoop(EventLoopSample::with_lag(3.0))).unwrap();
        assert_eq!(value["category"], "eventLoop");
        assert_eq!(value["lag_ms"], 3.0);
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let monitor = monitor(MonitorConfig::default());
        let fixed = Utc::now();
        for _ in 0..3 {
            let mut sample = MemorySample::with_heap_mb(1.0);
            sample.timestamp = fixed;
            monitor.ingest(MetricSample::Memory(sample));
        }

        let metrics = monitor.get_metrics(Some(MetricCategory::Memory), None);
        let samples = &metrics[&MetricCategory::Memory];
        assert_eq!(samples.len(), 3);
        assert!(samples.windows(2).all(|w| w[0].timestamp() < w[1].timestamp()));
    }

    #[test]
    fn test_breach_dedup_and_auto_resolve() {
        let monitor = monitor(MonitorConfig {
            cpu_threshold_percent: 50.0,
            ..MonitorConfig::default()
        });

        monitor.ingest(MetricSample::Cpu(CpuSample::with_usage(90.0)));
        monitor.ingest(MetricSample::Cpu(CpuSample::with_usage(95.0)));
        assert_eq!(monitor.get_active_alerts().len(), 1);

        monitor.ingest(MetricSample::Cpu(CpuSample::with_usage(10.0)));
        assert!(monitor.get_active_alerts().is_empty());
        assert_eq!(monitor.get_alerts().len(), 1);
        assert!(monitor.get_alerts()[0].resolved);

        monitor.ingest(MetricSample::Cpu(CpuSample::with_usage(99.0)));
        assert_eq!(monitor.get_alerts().len(), 2);
    }

    #[test]
    fn test_event_loop_breach_is_critical() {
        let monitor = monitor(MonitorConfig {
            event_loop_lag_threshold_ms: 5.0,
            ..MonitorConfig::default()
        });
        monitor.ingest(MetricSample::EventLoop(EventLoopSample::with_lag(50.0)));
        assert_eq!(monitor.calculate_overall_status(), OverallStatus::Critical);
    }

    #[test]
    fn test_disk_samples_never_alert() {
        let monitor = monitor(MonitorConfig::default());
        monitor.ingest(MetricSample::Disk(DiskSample {
            timestamp: Utc::now(),
            working_dir: None,
            disks: Vec::new(),
        }));
        assert!(monitor.get_alerts().is_empty());
        assert!(monitor.latest(MetricCategory::Disk).is_some());
    }

    #[test]
    fn test_alert_history_is_bounded() {
        let monitor = monitor(MonitorConfig {
            max_alert_history: 3,
            ..MonitorConfig::default()
        });
        let ids: Vec<String> = (0..5)
            .map(|i| monitor.create_alert("custom", &format!("t{}", i), serde_json::Value::Null).id)
            .collect();

        let retained: Vec<String> = monitor.get_alerts().into_iter().map(|a| a.id).collect();
        assert_eq!(retained, ids[2..].to_vec());
    }

    #[test]
    fn test_health_check_counts() {
        let monitor = monitor(MonitorConfig::default());
        let mut checks = monitor.bus.subscribe_topic("health:check");
        assert_eq!(monitor.perform_health_check().check_number, 1);
        assert_eq!(monitor.perform_health_check().check_number, 2);
        assert_eq!(monitor.checks_performed(), 2);
        assert!(matches!(checks.try_recv(), Some(HubEvent::HealthCheck(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_idempotent() {
        let monitor = Arc::new(monitor(MonitorConfig::default()));
        monitor.start();
        monitor.start();
        assert!(monitor.is_running());
        assert_eq!(monitor.scheduler.active_tasks().len(), 6);

        monitor.stop().await;
        monitor.stop().await;
        assert!(!monitor.is_running());
        assert!(monitor.scheduler.active_tasks().is_empty());
    }
}
