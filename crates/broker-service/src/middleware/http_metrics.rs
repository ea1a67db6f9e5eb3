//! HTTP metrics middleware.
//!
//! Runs outermost so responses produced before any handler are counted too:
//! - 404 Not Found
//! - 405 Method Not Allowed
//! - 408 Request Timeout from the timeout layer

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::observability::metrics::record_http_request;

/// Record method, normalized path, status and duration for every response.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed());

    response
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::{get, post},
        Router,
    };
    use tower::ServiceExt;

    async fn handler_200() -> &'static str {
        "OK"
    }

    async fn handler_409() -> (StatusCode, &'static str) {
        (StatusCode::CONFLICT, "full")
    }

    fn test_app() -> Router {
        Router::new()
            .route("/health", get(handler_200))
            .route("/api/meetings/auto", post(handler_409))
            .layer(middleware::from_fn(http_metrics_middleware))
    }

    async fn send(method: &str, uri: &str) -> StatusCode {
        let request = HttpRequest::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request builder should succeed");

        test_app()
            .oneshot(request)
            .await
            .expect("request should succeed")
            .status()
    }

    #[tokio::test]
    async fn test_middleware_passes_success_through() {
        assert_eq!(send("GET", "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_middleware_passes_conflict_through() {
        assert_eq!(send("POST", "/api/meetings/auto").await, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_middleware_sees_framework_rejections() {
        assert_eq!(send("GET", "/nonexistent").await, StatusCode::NOT_FOUND);
        assert_eq!(
            send("GET", "/api/meetings/auto").await,
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
