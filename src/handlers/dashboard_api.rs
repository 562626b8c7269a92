//! Dashboard HTTP API handlers
//!
//! Thin axum wrappers over [`Gateway`](crate::gateway::Gateway). Every
//! handler reads snapshot copies or forwards a control call; none of them
//! touch the core or monitor stores directly.

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};

use crate::context::DebugContext;
use crate::error::AppError;
use crate::gateway::{
    AlertQuery, AlertsResponse, ClearResponse, ExportBlob, ExportQuery, GcHintResponse,
    HealthResponse, LogPage, LogQuery, MetricsQuery, MetricsResponse,
};
use crate::monitor::Alert;

/// GET /api/health - Core and monitor health snapshot
pub async fn get_health(State(ctx): State<DebugContext>) -> Json<HealthResponse> {
    Json(ctx.gateway.health())
}

/// GET /api/logs - Filtered, paginated log history (newest first)
///
/// Example: GET /api/logs?level=error&component=db&search=timeout&limit=20&offset=40
pub async fn get_logs(
    State(ctx): State<DebugContext>,
    Query(query): Query<LogQuery>,
) -> Result<Json<LogPage>, AppError> {
    Ok(Json(ctx.gateway.query_logs(&query)?))
}

/// GET /api/metrics - Metric samples per category
///
/// Example: GET /api/metrics?category=eventLoop&limit=10
pub async fn get_metrics(
    State(ctx): State<DebugContext>,
    Query(query): Query<MetricsQuery>,
) -> Result<Json<MetricsResponse>, AppError> {
    Ok(Json(ctx.gateway.query_metrics(&query)?))
}

/// GET /api/alerts - Alerts with a severity breakdown
pub async fn get_alerts(
    State(ctx): State<DebugContext>,
    Query(query): Query<AlertQuery>,
) -> Result<Json<AlertsResponse>, AppError> {
    Ok(Json(ctx.gateway.query_alerts(&query)?))
}

/// POST /api/logs/clear
pub async fn clear_logs(State(ctx): State<DebugContext>) -> Json<ClearResponse> {
    Json(ctx.gateway.clear_logs())
}

/// POST /api/alerts/:id/acknowledge
pub async fn acknowledge_alert(
    State(ctx): State<DebugContext>,
    Path(id): Path<String>,
) -> Result<Json<Alert>, AppError> {
    Ok(Json(ctx.gateway.acknowledge_alert(&id)?))
}

/// POST /api/alerts/:id/resolve
pub async fn resolve_alert(
    State(ctx): State<DebugContext>,
    Path(id): Path<String>,
) -> Result<Json<Alert>, AppError> {
    Ok(Json(ctx.gateway.resolve_alert(&id)?))
}

/// POST /api/system/gc
pub async fn gc_hint(State(ctx): State<DebugContext>) -> Json<GcHintResponse> {
    Json(ctx.gateway.gc_hint())
}

/// GET /api/export/logs?format=json|csv|text&level=&limit=
pub async fn export_logs(
    State(ctx): State<DebugContext>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    Ok(attachment(ctx.gateway.export_logs(&query)?))
}

/// GET /api/export/metrics?format=json|csv&category=&limit=
pub async fn export_metrics(
    State(ctx): State<DebugContext>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    Ok(attachment(ctx.gateway.export_metrics(&query)?))
}

fn attachment(blob: ExportBlob) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", blob.filename);
    (
        [
            (header::CONTENT_TYPE, blob.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        blob.body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::monitor::FixedProbe;
    use axum::http::StatusCode;

    fn ctx() -> DebugContext {
        DebugContext::builder(Config::default())
            .probe(Box::new(FixedProbe::default()))
            .console_sink(false)
            .build()
    }

    #[tokio::test]
    async fn test_get_logs_rejects_bad_level() {
        let result = get_logs(
            State(ctx()),
            Query(LogQuery {
                level: Some("chatty".to_string()),
                ..LogQuery::default()
            }),
        )
        .await;
        let response = result.unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_resolve_unknown_alert_is_404() {
        let response = resolve_alert(State(ctx()), Path("missing".to_string()))
            .await
            .unwrap_err()
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_export_sets_attachment_headers() {
        let ctx = ctx();
        ctx.core.info("test", "exported", None);

        let response = export_logs(
            State(ctx),
            Query(ExportQuery {
                format: Some("csv".to_string()),
                ..ExportQuery::default()
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.starts_with("attachment; filename=\"logs-"));
    }
}
