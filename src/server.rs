use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    auth,
    context::DebugContext,
    handlers::{dashboard_api, health, metrics_handler, stream},
    metrics,
    signals::setup_signal_handlers,
};

/// Start the dashboard server
///
/// This function:
/// 1. Initializes metrics
/// 2. Sets up signal handlers for graceful shutdown
/// 3. Starts the context's background loops
/// 4. Serves the dashboard API until a shutdown signal arrives
/// 5. Closes observer streams and cancels every loop
pub async fn start_server(ctx: DebugContext) -> Result<()> {
    info!("Initializing Prometheus metrics...");
    let metrics_handle = Arc::new(metrics::init_metrics()?);

    let (shutdown_tx, signal_handle) = setup_signal_handlers()?;
    let mut shutdown_rx = shutdown_tx.subscribe();

    ctx.start();

    let app = create_router(ctx.clone(), metrics_handle);

    let addr = SocketAddr::from((
        ctx.config.server.host.parse::<std::net::IpAddr>()?,
        ctx.config.server.port,
    ));

    info!("Starting debug hub on {}", addr);
    info!(
        "Configuration: log level {}, history {}, monitor {}, auth {}",
        ctx.config.core.log_level,
        ctx.config.core.max_log_history,
        if ctx.config.monitor.enabled { "enabled" } else { "disabled" },
        if ctx.config.dashboard.auth_token.is_some() { "token" } else { "open" },
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    ctx.core.info("server", format!("Dashboard listening on {}", addr), None);

    let gateway = ctx.gateway.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown_rx.recv().await;
        // open event streams would otherwise hold the drain forever
        let closed = gateway.observers().disconnect_all();
        info!(observers = closed, "Shutdown signal received, draining connections...");
    })
    .await?;

    ctx.shutdown().await;
    signal_handle.await?;
    info!("Server stopped gracefully");

    Ok(())
}

/// Create the Axum router with all routes and middleware
///
/// The hub's own routes are not request-tracked: reading the dashboard must
/// not write into the log history it serves. Host applications layer
/// [`track_requests`](crate::handlers::tracking::track_requests) onto their routes.
pub fn create_router(ctx: DebugContext, metrics_handle: Arc<PrometheusHandle>) -> Router {
    let api_routes = Router::new()
        .route("/api/health", get(dashboard_api::get_health))
        .route("/api/logs", get(dashboard_api::get_logs))
        .route("/api/logs/clear", post(dashboard_api::clear_logs))
        .route("/api/metrics", get(dashboard_api::get_metrics))
        .route("/api/alerts", get(dashboard_api::get_alerts))
        .route("/api/alerts/:id/acknowledge", post(dashboard_api::acknowledge_alert))
        .route("/api/alerts/:id/resolve", post(dashboard_api::resolve_alert))
        .route("/api/system/gc", post(dashboard_api::gc_hint))
        .route("/api/export/logs", get(dashboard_api::export_logs))
        .route("/api/export/metrics", get(dashboard_api::export_metrics))
        .route("/api/stream", get(stream::stream))
        .route("/api/stream/:observer/subscribe/logs", post(stream::subscribe_logs))
        .route("/api/stream/:observer/subscribe/metrics", post(stream::subscribe_metrics))
        .layer(middleware::from_fn_with_state(ctx.clone(), auth::auth_middleware))
        .with_state(ctx.clone());

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics_handler::metrics))
        .with_state(metrics_handle)
        .merge(api_routes)
        // Control endpoints take tiny bodies
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::monitor::FixedProbe;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    fn router(config: Config) -> Router {
        let ctx = DebugContext::builder(config)
            .probe(Box::new(FixedProbe::default()))
            .console_sink(false)
            .build();
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        create_router(ctx, Arc::new(recorder.handle()))
    }

    #[tokio::test]
    async fn test_public_routes_skip_auth() {
        let mut config = Config::default();
        config.dashboard.auth_token = Some("secret".to_string());
        let app = router(config);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let response = router(Config::default())
            .oneshot(Request::builder().uri("/api/nothing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
