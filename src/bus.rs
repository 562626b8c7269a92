//! Publish/subscribe port shared by the core, the health monitor and the gateway
//!
//! Publishing never blocks: events go onto a bounded broadcast channel and a
//! subscriber that falls behind skips ahead instead of slowing the publisher.

use tokio::sync::broadcast;

use crate::core::{LogEntry, RequestCompletion, RequestTrace, TimerResult};
use crate::monitor::{Alert, HealthCheckReport, MetricSample};

/// Everything that flows over the bus
#[derive(Debug, Clone)]
pub enum HubEvent {
    Log(LogEntry),
    LogsCleared { cleared: usize },
    TimerEnd(TimerResult),
    RequestStart(RequestTrace),
    RequestComplete(RequestCompletion),
    Metric(MetricSample),
    AlertCreated(Alert),
    AlertUpdated(Alert),
    HealthCheck(HealthCheckReport),
}

impl HubEvent {
    /// Topics this event is published under. The first entry is the primary topic.
    pub fn topics(&self) -> Vec<String> {
        match self {
            Self::Log(entry) => vec!["log".to_string(), format!("log:{}", entry.level)],
            Self::LogsCleared { .. } => vec!["logs:cleared".to_string()],
            Self::TimerEnd(_) => vec!["timer:end".to_string()],
            Self::RequestStart(_) => vec!["request:start".to_string()],
            Self::RequestComplete(_) => vec!["request:complete".to_string()],
            Self::Metric(sample) => vec!["metric".to_string(), format!("metric:{}", sample.category())],
            Self::AlertCreated(_) => vec!["alert:new".to_string()],
            Self::AlertUpdated(_) => vec!["alert:updated".to_string()],
            Self::HealthCheck(_) => vec!["health:check".to_string()],
        }
    }

    pub fn matches(&self, topic: &str) -> bool {
        self.topics().iter().any(|t| t == topic)
    }
}

/// Cloneable handle to the broadcast channel
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HubEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Returns how many subscribers will see it; zero is not an error.
    pub fn publish(&self, event: HubEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            topic: None,
        }
    }

    /// Subscribe to a single topic such as `log:error` or `alert:new`.
    pub fn subscribe_topic(&self, topic: impl Into<String>) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            topic: Some(topic.into()),
        }
    }
}

pub struct Subscription {
    rx: broadcast::Receiver<HubEvent>,
    topic: Option<String>,
}

impl Subscription {
    fn accepts(&self, event: &HubEvent) -> bool {
        match &self.topic {
            Some(topic) => event.matches(topic),
            None => true,
        }
    }

    /// Next matching event, or `None` once every publisher is gone.
    pub async fn recv(&mut self) -> Option<HubEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Bus subscriber lagged, skipping ahead");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event that is already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<HubEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
