//! Open timers and in-flight request traces
//!
//! Both maps close an entry by removing it, so a second close (or a close
//! after the orphan sweep) finds nothing and reports a miss.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Timer {
    pub id: String,
    pub name: String,
    #[serde(skip)]
    pub started: Instant,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerResult {
    pub id: String,
    pub name: String,
    pub duration_ms: f64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// What the host knows about a request when it starts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub remote_addr: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestTrace {
    pub id: String,
    pub method: String,
    pub url: String,
    pub remote_addr: Option<String>,
    #[serde(skip)]
    pub started: Instant,
    pub started_at: DateTime<Utc>,
}

/// What the host knows about a request when its response has been sent
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub status_code: u16,
    #[serde(default)]
    pub response_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestCompletion {
    pub id: String,
    pub method: String,
    pub url: String,
    pub status_code: u16,
    pub response_size: Option<u64>,
    pub duration_ms: f64,
    pub completed_at: DateTime<Utc>,
}

/// An entry evicted by the orphan sweep
#[derive(Debug, Clone)]
pub enum Orphan {
    Timer { timer: Timer, age: Duration },
    Request { trace: RequestTrace, age: Duration },
}

fn merge_metadata(
    base: Option<serde_json::Value>,
    extra: Option<serde_json::Value>,
) -> Option<serde_json::Value> {
    match (base, extra) {
        (Some(serde_json::Value::Object(mut base)), Some(serde_json::Value::Object(extra))) => {
            base.extend(extra);
            Some(serde_json::Value::Object(base))
        }
        (base, None) => base,
        (_, extra) => extra,
    }
}

pub(crate) fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[derive(Default)]
pub(crate) struct Tracker {
    timers: DashMap<String, Timer>,
    requests: DashMap<String, RequestTrace>,
}

impl Tracker {
    pub fn start_timer(&self, name: &str, metadata: Option<serde_json::Value>) -> String {
        let id = Uuid::new_v4().to_string();
        self.timers.insert(
            id.clone(),
            Timer {
                id: id.clone(),
                name: name.to_string(),
                started: Instant::now(),
                started_at: Utc::now(),
                metadata,
            },
        );
        id
    }

    pub fn end_timer(&self, id: &str, extra: Option<serde_json::Value>) -> Option<TimerResult> {
        let (_, timer) = self.timers.remove(id)?;
        Some(TimerResult {
            id: timer.id,
            name: timer.name,
            duration_ms: millis(timer.started.elapsed()),
            started_at: timer.started_at,
            ended_at: Utc::now(),
            metadata: merge_metadata(timer.metadata, extra),
        })
    }

    pub fn start_request(&self, descriptor: RequestDescriptor) -> RequestTrace {
        let trace = RequestTrace {
            id: Uuid::new_v4().to_string(),
            method: descriptor.method,
            url: descriptor.url,
            remote_addr: descriptor.remote_addr,
            started: Instant::now(),
            started_at: Utc::now(),
        };
        self.requests.insert(trace.id.clone(), trace.clone());
        trace
    }

    pub fn complete_request(&self, id: &str, outcome: RequestOutcome) -> Option<RequestCompletion> {
        let (_, trace) = self.requests.remove(id)?;
        Some(RequestCompletion {
            id: trace.id,
            method: trace.method,
            url: trace.url,
            status_code: outcome.status_code,
            response_size: outcome.response_size,
            duration_ms: millis(trace.started.elapsed()),
            completed_at: Utc::now(),
        })
    }

    pub fn active_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn active_requests(&self) -> usize {
        self.requests.len()
    }

    pub fn open_timers(&self) -> Vec<Timer> {
        self.timers.iter().map(|t| t.value().clone()).collect()
    }

    pub fn open_requests(&self) -> Vec<RequestTrace> {
        self.requests.iter().map(|r| r.value().clone()).collect()
    }

    /// Remove everything older than its cutoff as of `now`.
    ///
    /// An entry whose age equals the cutoff is kept until the next sweep.
    pub fn sweep(&self, now: Instant, timer_cutoff: Duration, request_cutoff: Duration) -> Vec<Orphan> {
        let stale_timers: Vec<String> = self
            .timers
            .iter()
            .filter(|t| now.saturating_duration_since(t.started) > timer_cutoff)
            .map(|t| t.key().clone())
            .collect();

        let stale_requests: Vec<String> = self
            .requests
            .iter()
            .filter(|r| now.saturating_duration_since(r.started) > request_cutoff)
            .map(|r| r.key().clone())
            .collect();

        let mut orphans = Vec::with_capacity(stale_timers.len() + stale_requests.len());

        for id in stale_timers {
            // a concurrent end_timer may have won the race
            if let Some((_, timer)) = self.timers.remove(&id) {
                let age = now.saturating_duration_since(timer.started);
                orphans.push(Orphan::Timer { timer, age });
            }
        }

        for id in stale_requests {
            if let Some((_, trace)) = self.requests.remove(&id) {
                let age = now.saturating_duration_since(trace.started);
                orphans.push(Orphan::Request { trace, age });
            }
        }

        orphans
    }
}
