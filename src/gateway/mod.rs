//! Live dashboard gateway
//!
//! Read side: snapshot queries over the core and the monitor, plus exports.
//! Control side: forwards mutations to their owners. Push side: an observer
//! registry fed by the bus and by a periodic `system:update`.

pub mod export;
pub mod observers;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::bus::HubEvent;
use crate::config::DashboardConfig;
use crate::core::{DebugCore, HealthSnapshot, LogEntry, LogLevel};
use crate::error::AppError;
use crate::monitor::{
    Alert, AlertSeverity, HealthMonitor, MetricCategory, MetricSample, SeverityBreakdown,
    SystemSummary,
};
use crate::process::{ProcessInfo, ProcessMemory, ProcessProbe};
use crate::scheduler::Scheduler;

pub use export::{ExportBlob, ExportFormat};
pub use observers::{Delivery, ObserverRegistry};

pub const DEFAULT_LOG_LIMIT: usize = 100;
pub const MAX_LOG_LIMIT: usize = 1000;

/// Host-supplied garbage collection hint. Returns whether anything ran.
pub type GcHook = Arc<dyn Fn() -> bool + Send + Sync>;

// ============================================================================
// Wire types
// ============================================================================

/// Server-to-observer push message
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum PushMessage {
    #[serde(rename = "connected")]
    Connected(InitialSnapshot),
    #[serde(rename = "log:new")]
    LogNew(LogEntry),
    #[serde(rename = "alert:new")]
    AlertNew(Alert),
    #[serde(rename = "alert:updated")]
    AlertUpdated(Alert),
    #[serde(rename = "logs:cleared")]
    LogsCleared { cleared: usize },
    #[serde(rename = "system:update")]
    SystemUpdate(SystemUpdate),
    #[serde(rename = "logs:batch")]
    LogsBatch(Vec<LogEntry>),
    #[serde(rename = "metrics:batch")]
    MetricsBatch(BTreeMap<MetricCategory, Vec<MetricSample>>),
}

impl PushMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::LogNew(_) => "log:new",
            Self::AlertNew(_) => "alert:new",
            Self::AlertUpdated(_) => "alert:updated",
            Self::LogsCleared { .. } => "logs:cleared",
            Self::SystemUpdate(_) => "system:update",
            Self::LogsBatch(_) => "logs:batch",
            Self::MetricsBatch(_) => "metrics:batch",
        }
    }

    /// Bus events that observers see live. Everything else stays server-side.
    pub fn from_event(event: HubEvent) -> Option<Self> {
        match event {
            HubEvent::Log(entry) => Some(Self::LogNew(entry)),
            HubEvent::AlertCreated(alert) => Some(Self::AlertNew(alert)),
            HubEvent::AlertUpdated(alert) => Some(Self::AlertUpdated(alert)),
            HubEvent::LogsCleared { cleared } => Some(Self::LogsCleared { cleared }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InitialSnapshot {
    pub observer_id: String,
    pub system: ProcessInfo,
    pub health: HealthResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemUpdate {
    pub timestamp: DateTime<Utc>,
    pub health: HealthResponse,
    pub memory: Option<ProcessMemory>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: crate::monitor::OverallStatus,
    pub core: HealthSnapshot,
    pub monitor: SystemSummary,
    pub observers: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogQuery {
    pub level: Option<String>,
    pub component: Option<String>,
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AppliedLogFilters {
    pub level: Option<LogLevel>,
    pub component: Option<String>,
    pub search: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

/// One page of matching entries, newest first
#[derive(Debug, Clone, Serialize)]
pub struct LogPage {
    pub logs: Vec<LogEntry>,
    pub total: usize,
    pub has_more: bool,
    pub filters: AppliedLogFilters,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsQuery {
    pub category: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsResponse {
    pub metrics: BTreeMap<MetricCategory, Vec<MetricSample>>,
    pub summary: SystemSummary,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertQuery {
    pub severity: Option<String>,
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<Alert>,
    pub total: usize,
    pub active: usize,
    pub breakdown: SeverityBreakdown,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
    pub level: Option<String>,
    pub category: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub cleared: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GcHintResponse {
    pub triggered: bool,
    pub memory_before: Option<ProcessMemory>,
    pub memory_after: Option<ProcessMemory>,
}

/// Parameters an observer may pass when connecting
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscribeParams {
    pub logs_limit: Option<usize>,
    pub level: Option<String>,
    pub metrics_limit: Option<usize>,
}

fn parse_level(level: Option<&str>) -> Result<Option<LogLevel>, AppError> {
    level
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.parse::<LogLevel>().map_err(AppError::BadRequest))
        .transpose()
}

fn parse_category(category: Option<&str>) -> Result<Option<MetricCategory>, AppError> {
    category
        .filter(|c| !c.trim().is_empty() && !c.eq_ignore_ascii_case("all"))
        .map(|c| c.parse::<MetricCategory>().map_err(AppError::BadRequest))
        .transpose()
}

fn parse_format(format: Option<&str>) -> Result<ExportFormat, AppError> {
    format
        .map(|f| f.parse::<ExportFormat>().map_err(AppError::BadRequest))
        .unwrap_or(Ok(ExportFormat::Json))
}

// ============================================================================
// Gateway
// ============================================================================

pub struct Gateway {
    core: Arc<DebugCore>,
    monitor: Arc<HealthMonitor>,
    config: DashboardConfig,
    observers: ObserverRegistry,
    probe: Mutex<ProcessProbe>,
    gc_hook: Option<GcHook>,
    scheduler: Scheduler,
    running: AtomicBool,
}

impl Gateway {
    pub fn new(core: Arc<DebugCore>, monitor: Arc<HealthMonitor>, config: DashboardConfig) -> Self {
        let observers = ObserverRegistry::new(config.observer_buffer);
        Self {
            core,
            monitor,
            config,
            observers,
            probe: Mutex::new(ProcessProbe::new()),
            gc_hook: None,
            scheduler: Scheduler::new(),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_gc_hook(mut self, hook: GcHook) -> Self {
        self.gc_hook = Some(hook);
        self
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    // ------------------------------------------------------------------
    // Pull queries
    // ------------------------------------------------------------------

    pub fn health(&self) -> HealthResponse {
        let monitor = self.monitor.get_system_summary();
        HealthResponse {
            status: monitor.status,
            core: self.core.system_health(),
            monitor,
            observers: self.observers.len(),
        }
    }

    pub fn query_logs(&self, query: &LogQuery) -> Result<LogPage, AppError> {
        let level = parse_level(query.level.as_deref())?;
        let component = query.component.clone().filter(|c| !c.is_empty());
        let search = query.search.clone().filter(|s| !s.is_empty());
        let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).min(MAX_LOG_LIMIT);
        let offset = query.offset.unwrap_or(0);

        let matching: Vec<LogEntry> = self
            .core
            .logs()
            .into_iter()
            .rev()
            .filter(|e| level.map_or(true, |l| e.level == l))
            .filter(|e| component.as_deref().map_or(true, |c| e.component == c))
            .filter(|e| search.as_deref().map_or(true, |s| e.contains_text(s)))
            .collect();

        let total = matching.len();
        let logs: Vec<LogEntry> = matching.into_iter().skip(offset).take(limit).collect();
        let has_more = offset + logs.len() < total;

        Ok(LogPage {
            logs,
            total,
            has_more,
            filters: AppliedLogFilters {
                level,
                component,
                search,
                limit,
                offset,
            },
        })
    }

    pub fn query_metrics(&self, query: &MetricsQuery) -> Result<MetricsResponse, AppError> {
        let category = parse_category(query.category.as_deref())?;
        Ok(MetricsResponse {
            metrics: self.monitor.get_metrics(category, query.limit),
            summary: self.monitor.get_system_summary(),
        })
    }

    pub fn query_alerts(&self, query: &AlertQuery) -> Result<AlertsResponse, AppError> {
        let severity = query
            .severity
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<AlertSeverity>().map_err(AppError::BadRequest))
            .transpose()?;

        let alerts: Vec<Alert> = self
            .monitor
            .get_alerts()
            .into_iter()
            .rev()
            .filter(|a| !query.active_only || a.is_active())
            .filter(|a| severity.map_or(true, |s| a.severity == s))
            .collect();

        Ok(AlertsResponse {
            total: alerts.len(),
            active: alerts.iter().filter(|a| a.is_active()).count(),
            breakdown: SeverityBreakdown::from_alerts(&alerts),
            alerts,
        })
    }

    pub fn export_logs(&self, query: &ExportQuery) -> Result<ExportBlob, AppError> {
        let format = parse_format(query.format.as_deref())?;
        let level = parse_level(query.level.as_deref())?;

        let mut entries: Vec<LogEntry> = self
            .core
            .logs()
            .into_iter()
            .filter(|e| level.map_or(true, |l| e.level == l))
            .collect();
        if let Some(limit) = query.limit {
            let skip = entries.len().saturating_sub(limit);
            entries.drain(..skip);
        }

        Ok(export::export_logs(&entries, format)?)
    }

    pub fn export_metrics(&self, query: &ExportQuery) -> Result<ExportBlob, AppError> {
        let format = parse_format(query.format.as_deref())?;
        let category = parse_category(query.category.as_deref())?;
        let limit = query.limit.or(Some(self.monitor.config().max_metric_history));
        let metrics = self.monitor.get_metrics(category, limit);

        export::export_metrics(&metrics, format)?.ok_or_else(|| {
            AppError::BadRequest(format!("metrics cannot be exported as {}", format))
        })
    }

    // ------------------------------------------------------------------
    // Control
    // ------------------------------------------------------------------

    pub fn clear_logs(&self) -> ClearResponse {
        ClearResponse {
            cleared: self.core.clear_logs(),
        }
    }

    pub fn acknowledge_alert(&self, id: &str) -> Result<Alert, AppError> {
        self.monitor
            .acknowledge_alert(id)
            .ok_or_else(|| AppError::NotFound(format!("alert {}", id)))
    }

    pub fn resolve_alert(&self, id: &str) -> Result<Alert, AppError> {
        self.monitor
            .resolve_alert(id)
            .ok_or_else(|| AppError::NotFound(format!("alert {}", id)))
    }

    pub fn gc_hint(&self) -> GcHintResponse {
        let Some(hook) = &self.gc_hook else {
            return GcHintResponse {
                triggered: false,
                memory_before: None,
                memory_after: None,
            };
        };

        let memory_before = self.probe.lock().memory();
        let triggered = hook();
        let memory_after = self.probe.lock().memory();

        self.core.info(
            "dashboard",
            "Garbage collection hint requested",
            Some(serde_json::json!({ "triggered": triggered })),
        );

        GcHintResponse {
            triggered,
            memory_before,
            memory_after,
        }
    }

    // ------------------------------------------------------------------
    // Push channel
    // ------------------------------------------------------------------

    /// Register an observer and queue its initial snapshot plus any
    /// requested batches.
    pub fn connect(&self, params: &SubscribeParams) -> Result<(String, mpsc::Receiver<PushMessage>), AppError> {
        let level = parse_level(params.level.as_deref())?;
        let (id, rx) = self.observers.connect();

        self.observers.send_to(
            &id,
            PushMessage::Connected(InitialSnapshot {
                observer_id: id.clone(),
                system: ProcessInfo::current(),
                health: self.health(),
            }),
        );
        if let Some(limit) = params.logs_limit {
            self.observers.send_to(&id, PushMessage::LogsBatch(self.recent_logs(limit, level)));
        }
        if let Some(limit) = params.metrics_limit {
            self.observers.send_to(
                &id,
                PushMessage::MetricsBatch(self.monitor.get_metrics(None, Some(limit))),
            );
        }

        Ok((id, rx))
    }

    pub fn disconnect(&self, observer_id: &str) -> bool {
        self.observers.disconnect(observer_id)
    }

    /// Push a batch of recent logs to one observer. Returns the batch size.
    pub fn subscribe_logs(&self, observer_id: &str, limit: usize, level: Option<&str>) -> Result<usize, AppError> {
        let level = parse_level(level)?;
        let batch = self.recent_logs(limit, level);
        let count = batch.len();
        self.push_to(observer_id, PushMessage::LogsBatch(batch))?;
        Ok(count)
    }

    /// Push the newest `limit` samples of every category to one observer.
    pub fn subscribe_metrics(&self, observer_id: &str, limit: usize) -> Result<usize, AppError> {
        let batch = self.monitor.get_metrics(None, Some(limit));
        let count = batch.values().map(Vec::len).sum();
        self.push_to(observer_id, PushMessage::MetricsBatch(batch))?;
        Ok(count)
    }

    fn push_to(&self, observer_id: &str, message: PushMessage) -> Result<(), AppError> {
        match self.observers.send_to(observer_id, message) {
            Some(Delivery::Sent) => Ok(()),
            Some(Delivery::Dropped) => Err(AppError::Unavailable(format!(
                "observer {} queue is full",
                observer_id
            ))),
            Some(Delivery::Removed) | None => {
                Err(AppError::NotFound(format!("observer {}", observer_id)))
            }
        }
    }

    fn recent_logs(&self, limit: usize, level: Option<LogLevel>) -> Vec<LogEntry> {
        let mut logs: Vec<LogEntry> = self
            .core
            .logs()
            .into_iter()
            .rev()
            .filter(|e| level.map_or(true, |l| e.level == l))
            .take(limit.min(MAX_LOG_LIMIT))
            .collect();
        logs.reverse();
        logs
    }

    pub fn system_update(&self) -> PushMessage {
        PushMessage::SystemUpdate(SystemUpdate {
            timestamp: Utc::now(),
            health: self.health(),
            memory: self.probe.lock().memory(),
        })
    }

    /// Broadcast one `system:update`. Skipped when nobody is connected.
    pub fn broadcast_system_update(&self) -> usize {
        if self.observers.is_empty() {
            return 0;
        }
        self.observers.broadcast(&self.system_update())
    }

    /// Start forwarding bus events and the periodic update. No-op when running.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        // subscribe before returning so nothing published after start() is missed
        let mut events = self.core.bus().subscribe();
        let gateway = Arc::downgrade(self);
        self.scheduler.spawn("dashboard-forwarder", async move {
            while let Some(event) = events.recv().await {
                let Some(gateway) = gateway.upgrade() else {
                    break;
                };
                if let Some(message) = PushMessage::from_event(event) {
                    gateway.observers.broadcast(&message);
                }
            }
        });

        let gateway = Arc::downgrade(self);
        self.scheduler.every(
            "dashboard-update",
            self.config.update_interval(),
            move || {
                let gateway = gateway.clone();
                async move {
                    if let Some(gateway) = gateway.upgrade() {
                        gateway.broadcast_system_update();
                    }
                }
            },
        );

        tracing::info!(
            update_interval_secs = self.config.update_interval_secs,
            "Dashboard gateway started"
        );
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.scheduler.shutdown().await;
        tracing::info!("Dashboard gateway stopped");
    }
}
