//! Process-wide debug context
//!
//! Built once at startup and passed by reference to whatever needs it. Tests
//! build their own isolated instances.

use std::sync::Arc;

use crate::bus::EventBus;
use crate::config::Config;
use crate::core::{DebugCore, TracingSink};
use crate::gateway::{Gateway, GcHook};
use crate::monitor::{HealthMonitor, SystemProbe};

#[derive(Clone)]
pub struct DebugContext {
    pub config: Arc<Config>,
    pub bus: EventBus,
    pub core: Arc<DebugCore>,
    pub monitor: Arc<HealthMonitor>,
    pub gateway: Arc<Gateway>,
}

pub struct DebugContextBuilder {
    config: Config,
    probe: Option<Box<dyn SystemProbe>>,
    gc_hook: Option<GcHook>,
    console_sink: bool,
}

impl DebugContextBuilder {
    /// Replace the `sysinfo` probe, e.g. with scripted readings.
    pub fn probe(mut self, probe: Box<dyn SystemProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn gc_hook(mut self, hook: GcHook) -> Self {
        self.gc_hook = Some(hook);
        self
    }

    /// Mirror recorded entries into process tracing output (on by default).
    pub fn console_sink(mut self, enabled: bool) -> Self {
        self.console_sink = enabled;
        self
    }

    pub fn build(self) -> DebugContext {
        let bus = EventBus::new(self.config.core.event_channel_capacity);
        let core = Arc::new(DebugCore::new(self.config.core.clone(), bus.clone()));
        if self.console_sink {
            core.register_sink("console", Arc::new(TracingSink));
        }

        let monitor = match self.probe {
            Some(probe) => HealthMonitor::with_probe(self.config.monitor.clone(), core.clone(), bus.clone(), probe),
            None => HealthMonitor::new(self.config.monitor.clone(), core.clone(), bus.clone()),
        };
        let monitor = Arc::new(monitor);
        core.register_monitor("health");

        let mut gateway = Gateway::new(core.clone(), monitor.clone(), self.config.dashboard.clone());
        if let Some(hook) = self.gc_hook {
            gateway = gateway.with_gc_hook(hook);
        }

        DebugContext {
            config: Arc::new(self.config),
            bus,
            core,
            monitor,
            gateway: Arc::new(gateway),
        }
    }
}

impl DebugContext {
    pub fn builder(config: Config) -> DebugContextBuilder {
        DebugContextBuilder {
            config,
            probe: None,
            gc_hook: None,
            console_sink: true,
        }
    }

    pub fn new(config: Config) -> Self {
        Self::builder(config).build()
    }

    /// Start the orphan sweep, the sampling loops (if enabled) and the gateway.
    pub fn start(&self) {
        self.core.start();
        if self.config.monitor.enabled {
            self.monitor.start();
        }
        self.gateway.start();
    }

    /// Cancel every background loop, gateway first.
    pub async fn shutdown(&self) {
        self.gateway.stop().await;
        self.monitor.stop().await;
        self.core.stop().await;
    }
}
