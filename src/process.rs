//! Current-process resource readings backed by `sysinfo`

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessesToUpdate, System};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Identity of the process the hub is embedded in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub hostname: Option<String>,
    pub version: String,
}

impl ProcessInfo {
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            hostname: System::host_name(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessMemory {
    pub rss_bytes: u64,
    pub virtual_bytes: u64,
}

impl ProcessMemory {
    pub fn rss_mb(&self) -> f64 {
        bytes_to_mb(self.rss_bytes)
    }
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// Refreshes only the current process, keeping state between calls so CPU
/// usage is measured over the interval since the previous refresh.
pub struct ProcessProbe {
    system: System,
    pid: Option<Pid>,
    cached: Option<(Instant, ProcessMemory)>,
    last_refreshed: Option<Instant>,
}

impl Default for ProcessProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!("Failed to get current process ID for probing: {}", e);
                None
            }
        };

        Self {
            system: System::new(),
            pid,
            cached: None,
            last_refreshed: None,
        }
    }

    fn refresh(&mut self) -> Option<Pid> {
        let pid = self.pid?;
        self.system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.last_refreshed = Some(Instant::now());
        Some(pid)
    }

    /// When this probe last refreshed the process, i.e. the CPU baseline.
    pub fn last_refreshed(&self) -> Option<Instant> {
        self.last_refreshed
    }

    pub fn memory(&mut self) -> Option<ProcessMemory> {
        let pid = self.refresh()?;
        let process = self.system.process(pid)?;
        let memory = ProcessMemory {
            rss_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
        };
        self.cached = Some((Instant::now(), memory));
        Some(memory)
    }

    /// Memory reading no older than `max_age`.
    pub fn memory_cached(&mut self, max_age: Duration) -> Option<ProcessMemory> {
        match self.cached {
            Some((at, memory)) if at.elapsed() <= max_age => Some(memory),
            _ => self.memory(),
        }
    }

    /// CPU usage since the previous refresh, in percent of one core.
    pub fn cpu_usage(&mut self) -> Option<f32> {
        let pid = self.refresh()?;
        self.system.process(pid).map(|p| p.cpu_usage())
    }
}
