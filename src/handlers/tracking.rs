//! Request tracking middleware
//!
//! Opens a request trace before the inner service runs and fires the
//! completion hook once the response is produced. A request whose future is
//! dropped never completes and is left for the orphan sweep.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::core::{DebugCore, RequestDescriptor, RequestOutcome};

pub async fn track_requests(
    State(core): State<Arc<DebugCore>>,
    req: Request,
    next: Next,
) -> Response {
    let descriptor = RequestDescriptor {
        method: req.method().to_string(),
        url: req.uri().to_string(),
        remote_addr: req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string()),
    };

    let Some(request_id) = core.track_request(descriptor) else {
        return next.run(req).await;
    };

    let response = next.run(req).await;

    let response_size = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
    core.complete_request(
        &request_id,
        RequestOutcome {
            status_code: response.status().as_u16(),
            response_size,
        },
    );

    response
}
