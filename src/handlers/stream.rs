//! Server-sent events push channel
//!
//! `GET /api/stream` registers an observer and streams its queue. When the
//! client goes away the stream (and its receiver) is dropped, so the next
//! broadcast finds the queue closed and removes the observer.

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::context::DebugContext;
use crate::error::AppError;
use crate::gateway::{PushMessage, SubscribeParams};

/// GET /api/stream?logs_limit=&level=&metrics_limit=
pub async fn stream(
    State(ctx): State<DebugContext>,
    Query(params): Query<SubscribeParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let (observer_id, rx) = ctx.gateway.connect(&params)?;
    tracing::info!(observer = %observer_id, "Dashboard observer connected");

    let stream = ReceiverStream::new(rx).map(|message| Ok(to_event(&message)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_event(message: &PushMessage) -> Event {
    Event::default()
        .event(message.event_name())
        .json_data(message)
        .unwrap_or_else(|e| {
            tracing::warn!(event = message.event_name(), error = %e, "Failed to serialize push message");
            Event::default().event("error").data(e.to_string())
        })
}

#[derive(Debug, Default, Deserialize)]
pub struct LogSubscription {
    pub limit: Option<usize>,
    pub level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricSubscription {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    pub observer_id: String,
    pub sent: usize,
}

/// POST /api/stream/:observer/subscribe/logs - push a `logs:batch` to one observer
pub async fn subscribe_logs(
    State(ctx): State<DebugContext>,
    Path(observer_id): Path<String>,
    body: Option<Json<LogSubscription>>,
) -> Result<Json<SubscribeResponse>, AppError> {
    let sub = body.map(|Json(sub)| sub).unwrap_or_default();
    let sent = ctx.gateway.subscribe_logs(
        &observer_id,
        sub.limit.unwrap_or(crate::gateway::DEFAULT_LOG_LIMIT),
        sub.level.as_deref(),
    )?;
    Ok(Json(SubscribeResponse { observer_id, sent }))
}

/// POST /api/stream/:observer/subscribe/metrics - push a `metrics:batch` to one observer
pub async fn subscribe_metrics(
    State(ctx): State<DebugContext>,
    Path(observer_id): Path<String>,
    body: Option<Json<MetricSubscription>>,
) -> Result<Json<SubscribeResponse>, AppError> {
    let sub = body.map(|Json(sub)| sub).unwrap_or_default();
    let sent = ctx.gateway.subscribe_metrics(
        &observer_id,
        sub.limit.unwrap_or(crate::monitor::DEFAULT_METRICS_LIMIT),
    )?;
    Ok(Json(SubscribeResponse { observer_id, sent }))
}

