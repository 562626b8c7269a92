use crate::{context::DebugContext, error::AppError};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Bearer-token check for the dashboard API
///
/// Passes every request through when `dashboard.auth_token` is unset.
pub async fn auth_middleware(
    State(ctx): State<DebugContext>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = ctx.config.dashboard.auth_token.as_deref() else {
        return Ok(next.run(req).await);
    };

    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    let token = extract_bearer_token(auth_header)?;

    if !constant_time_eq(token.as_bytes(), expected.as_bytes()) {
        return Err(AppError::Unauthorized("Invalid dashboard token".to_string()));
    }

    Ok(next.run(req).await)
}

/// Extract Bearer token from Authorization header
fn extract_bearer_token(auth_header: &str) -> Result<&str, AppError> {
    const BEARER_PREFIX: &str = "Bearer ";

    let token = auth_header.strip_prefix(BEARER_PREFIX).ok_or_else(|| {
        AppError::Unauthorized("Authorization header must use Bearer scheme".to_string())
    })?;

    if token.is_empty() {
        return Err(AppError::Unauthorized("Bearer token is empty".to_string()));
    }

    Ok(token)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn app(token: Option<&str>) -> Router {
        let mut config = Config::default();
        config.dashboard.auth_token = token.map(str::to_string);
        let ctx = DebugContext::builder(config).console_sink(false).build();

        Router::new()
            .route("/test", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(ctx.clone(), auth_middleware))
            .with_state(ctx)
    }

    fn request(auth: Option<&str>) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::builder().uri("/test");
        if let Some(value) = auth {
            builder = builder.header("Authorization", value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc").unwrap(), "abc");
        assert!(extract_bearer_token("abc").is_err());
        assert!(extract_bearer_token("Bearer ").is_err());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secrets"));
    }

    #[tokio::test]
    async fn test_open_when_no_token_configured() {
        let response = app(None).oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_token_required_when_configured() {
        let response = app(Some("s3cret")).oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app(Some("s3cret"))
            .oneshot(request(Some("Bearer wrong")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app(Some("s3cret"))
            .oneshot(request(Some("Bearer s3cret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
