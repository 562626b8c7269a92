use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

/// Liveness endpoint
/// Returns 200 OK while the process is serving requests
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({
        "status": "healthy",
        "service": "debug-hub",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}
