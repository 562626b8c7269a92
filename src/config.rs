use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::core::LogLevel;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub core: CoreConfig,
    pub monitor: MonitorConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9600,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `pretty` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "pretty".to_string(),
        }
    }
}

/// Options for the event & metrics bus.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Entries less severe than this level are dropped by `record`
    pub log_level: String,
    pub enable_performance_tracking: bool,
    pub enable_memory_tracking: bool,
    pub enable_request_tracking: bool,
    pub max_log_history: usize,
    pub orphan_sweep_interval_secs: u64,
    pub timer_stale_after_secs: u64,
    pub request_stale_after_secs: u64,
    pub event_channel_capacity: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: "debug".to_string(),
            enable_performance_tracking: true,
            enable_memory_tracking: true,
            enable_request_tracking: true,
            max_log_history: 1000,
            orphan_sweep_interval_secs: 30,
            timer_stale_after_secs: 300,
            request_stale_after_secs: 300,
            event_channel_capacity: 1024,
        }
    }
}

impl CoreConfig {
    /// Parsed level threshold. Falls back to `debug` for values that
    /// would have been rejected by validation.
    pub fn level_threshold(&self) -> LogLevel {
        self.log_level.parse().unwrap_or(LogLevel::Debug)
    }

    pub fn orphan_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.orphan_sweep_interval_secs)
    }

    pub fn timer_stale_after(&self) -> Duration {
        Duration::from_secs(self.timer_stale_after_secs)
    }

    pub fn request_stale_after(&self) -> Duration {
        Duration::from_secs(self.request_stale_after_secs)
    }
}

/// Options for the health monitor sampling loops and alert thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub memory_interval_secs: u64,
    pub cpu_interval_secs: u64,
    pub event_loop_interval_secs: u64,
    pub disk_interval_secs: u64,
    pub network_interval_secs: u64,
    pub health_check_interval_secs: u64,
    pub memory_threshold_mb: f64,
    pub cpu_threshold_percent: f64,
    pub event_loop_lag_threshold_ms: f64,
    pub max_metric_history: usize,
    pub max_alert_history: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            memory_interval_secs: 10,
            cpu_interval_secs: 10,
            event_loop_interval_secs: 5,
            disk_interval_secs: 60,
            network_interval_secs: 60,
            health_check_interval_secs: 30,
            memory_threshold_mb: 512.0,
            cpu_threshold_percent: 80.0,
            event_loop_lag_threshold_ms: 100.0,
            max_metric_history: 100,
            max_alert_history: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub update_interval_secs: u64,
    pub observer_buffer: usize,
    /// When set, `/api/*` routes require `Authorization: Bearer <token>`
    pub auth_token: Option<String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: 5,
            observer_buffer: 256,
            auth_token: None,
        }
    }
}

impl DashboardConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }
}

/// Load configuration from an optional file plus `DEBUG_HUB__*` environment overrides.
pub fn load_config() -> anyhow::Result<Config> {
    load_config_from(Path::new("config"))
}

pub fn load_config_from(path: &Path) -> anyhow::Result<Config> {
    let path = path.to_string_lossy();
    let config = config::Config::builder()
        .add_source(config::File::with_name(&path).required(false))
        .add_source(config::Environment::with_prefix("DEBUG_HUB").separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.core.log_level.parse::<LogLevel>().is_err() {
        anyhow::bail!("Invalid core.log_level: {}", cfg.core.log_level);
    }

    match cfg.logging.format.as_str() {
        "pretty" | "json" => {}
        other => anyhow::bail!("Invalid logging.format: {} (expected pretty or json)", other),
    }

    let capacities = [
        ("core.max_log_history", cfg.core.max_log_history),
        ("core.event_channel_capacity", cfg.core.event_channel_capacity),
        ("monitor.max_metric_history", cfg.monitor.max_metric_history),
        ("monitor.max_alert_history", cfg.monitor.max_alert_history),
        ("dashboard.observer_buffer", cfg.dashboard.observer_buffer),
    ];
    for (name, value) in capacities {
        if value == 0 {
            anyhow::bail!("{} must be greater than zero", name);
        }
    }

    let intervals = [
        ("core.orphan_sweep_interval_secs", cfg.core.orphan_sweep_interval_secs),
        ("core.timer_stale_after_secs", cfg.core.timer_stale_after_secs),
        ("core.request_stale_after_secs", cfg.core.request_stale_after_secs),
        ("monitor.memory_interval_secs", cfg.monitor.memory_interval_secs),
        ("monitor.cpu_interval_secs", cfg.monitor.cpu_interval_secs),
        ("monitor.event_loop_interval_secs", cfg.monitor.event_loop_interval_secs),
        ("monitor.disk_interval_secs", cfg.monitor.disk_interval_secs),
        ("monitor.network_interval_secs", cfg.monitor.network_interval_secs),
        ("monitor.health_check_interval_secs", cfg.monitor.health_check_interval_secs),
        ("dashboard.update_interval_secs", cfg.dashboard.update_interval_secs),
    ];
    for (name, value) in intervals {
        if value == 0 {
            anyhow::bail!("{} must be greater than zero", name);
        }
    }

    if let Some(token) = &cfg.dashboard.auth_token {
        if token.is_empty() {
            anyhow::bail!("dashboard.auth_token cannot be empty when set");
        }
    }

    Ok(())
}
