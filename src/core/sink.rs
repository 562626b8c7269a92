//! Log sinks
//!
//! A sink receives every recorded entry, in registration order. Sinks run on
//! the recording caller's thread, so anything slow belongs behind a
//! [`ChannelSink`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::entry::{LogEntry, LogLevel};
use crate::error::SinkError;

pub trait LogSink: Send + Sync {
    fn write(&self, entry: &LogEntry) -> Result<(), SinkError>;
}

impl<F> LogSink for F
where
    F: Fn(&LogEntry) -> Result<(), SinkError> + Send + Sync,
{
    fn write(&self, entry: &LogEntry) -> Result<(), SinkError> {
        self(entry)
    }
}

#[derive(Clone)]
pub(crate) struct RegisteredSink {
    pub name: String,
    pub sink: Arc<dyn LogSink>,
}

impl RegisteredSink {
    /// Deliver one entry, turning a panic into a `SinkError`.
    pub fn deliver(&self, entry: &LogEntry) -> Result<(), SinkError> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.sink.write(entry))) {
            Ok(result) => result,
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(SinkError::Panicked(reason))
            }
        }
    }
}

/// Mirrors entries into the process `tracing` output
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, entry: &LogEntry) -> Result<(), SinkError> {
        let data = entry
            .data
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_default();

        match entry.level {
            LogLevel::Error => tracing::error!(
                target: "debug_hub::sink",
                entry_id = entry.id,
                component = %entry.component,
                data = %data,
                "{}",
                entry.message
            ),
            LogLevel::Warn => tracing::warn!(
                target: "debug_hub::sink",
                entry_id = entry.id,
                component = %entry.component,
                data = %data,
                "{}",
                entry.message
            ),
            LogLevel::Info => tracing::info!(
                target: "debug_hub::sink",
                entry_id = entry.id,
                component = %entry.component,
                data = %data,
                "{}",
                entry.message
            ),
            LogLevel::Debug => tracing::debug!(
                target: "debug_hub::sink",
                entry_id = entry.id,
                component = %entry.component,
                data = %data,
                "{}",
                entry.message
            ),
            LogLevel::Trace => tracing::trace!(
                target: "debug_hub::sink",
                entry_id = entry.id,
                component = %entry.component,
                data = %data,
                "{}",
                entry.message
            ),
        }
        Ok(())
    }
}

/// Forwards entries to a bounded channel without blocking the recorder.
///
/// A full channel rejects the entry; a dropped receiver reports `Closed`.
pub struct ChannelSink {
    sender: mpsc::Sender<LogEntry>,
}

impl ChannelSink {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<LogEntry>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender }, receiver)
    }
}

impl LogSink for ChannelSink {
    fn write(&self, entry: &LogEntry) -> Result<(), SinkError> {
        self.sender.try_send(entry.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Rejected("channel full".to_string()),
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}
