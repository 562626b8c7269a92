//! Metric sources for the health monitor
//!
//! [`SystemProbe`] is the seam between sampling loops and the host operating
//! system. The monitor only ever sees the sample structs, so tests can drive
//! threshold evaluation with scripted readings.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use sysinfo::{Disks, Networks, System};

use super::{CpuSample, DiskSample, DiskUsage, EventLoopSample, MemorySample, NetworkInterface, NetworkSample};
use crate::core::tracker::millis;
use crate::process::{bytes_to_mb, ProcessProbe};

pub trait SystemProbe: Send {
    fn memory(&mut self) -> Option<MemorySample>;
    fn cpu(&mut self) -> Option<CpuSample>;
    fn disk(&mut self) -> Option<DiskSample>;
    fn network(&mut self) -> Option<NetworkSample>;
}

/// `sysinfo`-backed probe for the current process and host
///
/// CPU usage is a delta since the previous refresh, so the CPU path owns its
/// own process handle and memory readings never move its baseline.
pub struct SysinfoProbe {
    memory: ProcessProbe,
    cpu: ProcessProbe,
    system: System,
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            memory: ProcessProbe::new(),
            cpu: ProcessProbe::new(),
            system: System::new(),
        }
    }

    /// Start of the window the next CPU sample will cover.
    pub fn cpu_baseline(&self) -> Option<Instant> {
        self.cpu.last_refreshed()
    }
}

impl SystemProbe for SysinfoProbe {
    fn memory(&mut self) -> Option<MemorySample> {
        let process = self.memory.memory()?;
        self.system.refresh_memory();

        Some(MemorySample {
            timestamp: Utc::now(),
            heap_used_mb: process.rss_mb(),
            rss_bytes: process.rss_bytes,
            virtual_bytes: process.virtual_bytes,
            system_total_mb: bytes_to_mb(self.system.total_memory()),
            system_free_mb: bytes_to_mb(self.system.free_memory()),
            system_available_mb: bytes_to_mb(self.system.available_memory()),
        })
    }

    fn cpu(&mut self) -> Option<CpuSample> {
        let previous = self.cpu.last_refreshed();
        let usage = self.cpu.cpu_usage()?;
        let interval_ms = previous
            .zip(self.cpu.last_refreshed())
            .map(|(from, to)| millis(to.duration_since(from)));
        self.system.refresh_cpu_usage();

        let load = System::load_average();
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Some(CpuSample {
            timestamp: Utc::now(),
            // the first refresh has no previous reading to diff against
            usage_percent: if interval_ms.is_some() { usage as f64 } else { 0.0 },
            interval_ms,
            system_usage_percent: if interval_ms.is_some() {
                self.system.global_cpu_usage() as f64
            } else {
                0.0
            },
            load_average: [load.one, load.five, load.fifteen],
            cores,
        })
    }

    fn disk(&mut self) -> Option<DiskSample> {
        let disks = Disks::new_with_refreshed_list();
        let working_dir = std::env::current_dir()
            .ok()
            .map(|p| p.display().to_string());

        Some(DiskSample {
            timestamp: Utc::now(),
            working_dir,
            disks: disks
                .list()
                .iter()
                .map(|d| DiskUsage {
                    name: d.name().to_string_lossy().into_owned(),
                    mount_point: d.mount_point().display().to_string(),
                    total_bytes: d.total_space(),
                    available_bytes: d.available_space(),
                })
                .collect(),
        })
    }

    fn network(&mut self) -> Option<NetworkSample> {
        let networks = Networks::new_with_refreshed_list();
        let mut interfaces: Vec<NetworkInterface> = networks
            .list()
            .iter()
            .map(|(name, data)| NetworkInterface {
                name: name.clone(),
                received_bytes: data.total_received(),
                transmitted_bytes: data.total_transmitted(),
            })
            .collect();
        interfaces.sort_by(|a, b| a.name.cmp(&b.name));

        Some(NetworkSample {
            timestamp: Utc::now(),
            interfaces,
        })
    }
}

/// How long a spawned no-op task waited before the runtime polled it.
pub async fn measure_scheduler_lag() -> EventLoopSample {
    let queued = Instant::now();
    let lag = tokio::spawn(async move { queued.elapsed() })
        .await
        .unwrap_or(Duration::ZERO);

    EventLoopSample {
        timestamp: Utc::now(),
        lag_ms: millis(lag),
    }
}

/// Scripted readings, handy for driving threshold evaluation without a host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixedProbe {
    pub heap_used_mb: Option<f64>,
    pub cpu_percent: Option<f64>,
}

impl SystemProbe for FixedProbe {
    fn memory(&mut self) -> Option<MemorySample> {
        self.heap_used_mb.map(MemorySample::with_heap_mb)
    }

    fn cpu(&mut self) -> Option<CpuSample> {
        self.cpu_percent.map(CpuSample::with_usage)
    }

    fn disk(&mut self) -> Option<DiskSample> {
        None
    }

    fn network(&mut self) -> Option<NetworkSample> {
        None
    }
}
