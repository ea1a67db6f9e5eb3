//! Broker service error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl.
//! Provider failures carry the provider's response body as `detail` so callers
//! can see why the upstream call failed.

use crate::time::TimeError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::token_cache::TokenError;
use serde::Serialize;
use thiserror::Error;

/// Broker service error type.
///
/// Maps to HTTP status codes:
/// - BadRequest: 400 Bad Request
/// - Configuration, Upstream, Internal: 500 Internal Server Error
///
/// Capacity exhaustion is not an error; see
/// [`AllocationOutcome`](crate::services::host_allocator::AllocationOutcome).
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Upstream error: {message}")]
    Upstream {
        /// Provider HTTP status, when a response was received.
        status: Option<u16>,
        message: String,
        /// Provider response body, JSON when it parsed as JSON.
        detail: Option<serde_json::Value>,
    },

    #[error("Internal server error")]
    Internal,
}

impl BrokerError {
    /// Shorthand for an upstream failure that never got a response.
    pub fn upstream(message: impl Into<String>) -> Self {
        BrokerError::Upstream {
            status: None,
            message: message.into(),
            detail: None,
        }
    }

    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            BrokerError::BadRequest(_) => 400,
            BrokerError::Configuration(_) | BrokerError::Upstream { .. } | BrokerError::Internal => {
                500
            }
        }
    }

    /// Bounded label for the error kind.
    pub fn error_type(&self) -> &'static str {
        match self {
            BrokerError::BadRequest(_) => "bad_request",
            BrokerError::Configuration(_) => "configuration",
            BrokerError::Upstream { .. } => "upstream",
            BrokerError::Internal => "internal",
        }
    }
}

impl From<TokenError> for BrokerError {
    fn from(err: TokenError) -> Self {
        BrokerError::Upstream {
            status: None,
            message: format!("Provider authentication failed: {err}"),
            detail: None,
        }
    }
}

impl From<TimeError> for BrokerError {
    fn from(err: TimeError) -> Self {
        BrokerError::BadRequest(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let (status, code, message, detail) = match self {
            BrokerError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason, None)
            }
            BrokerError::Configuration(reason) => {
                tracing::error!(target: "broker.config", reason = %reason, "Configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIGURATION_ERROR",
                    reason,
                    None,
                )
            }
            BrokerError::Upstream {
                status,
                message,
                detail,
            } => {
                tracing::error!(
                    target: "broker.provider",
                    upstream_status = ?status,
                    message = %message,
                    "Provider call failed"
                );
                let detail = detail.or_else(|| status.map(|s| serde_json::json!({ "status": s })));
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "UPSTREAM_ERROR",
                    message,
                    detail,
                )
            }
            BrokerError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                detail,
            },
        };

        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_display() {
        assert_eq!(
            BrokerError::BadRequest("topic is required".to_string()).to_string(),
            "Bad request: topic is required"
        );
        assert_eq!(
            BrokerError::Configuration("no hosts".to_string()).to_string(),
            "Configuration error: no hosts"
        );
        assert_eq!(
            BrokerError::upstream("timed out").to_string(),
            "Upstream error: timed out"
        );
        assert_eq!(BrokerError::Internal.to_string(), "Internal server error");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(BrokerError::BadRequest("x".to_string()).status_code(), 400);
        assert_eq!(BrokerError::Configuration("x".to_string()).status_code(), 500);
        assert_eq!(BrokerError::upstream("x").status_code(), 500);
        assert_eq!(BrokerError::Internal.status_code(), 500);
    }

    #[test]
    fn test_token_error_becomes_upstream() {
        let err: BrokerError = TokenError::AuthenticationRejected("Status 401".into()).into();
        assert!(matches!(err, BrokerError::Upstream { .. }));
        assert!(err.to_string().contains("authentication"));
    }

    #[test]
    fn test_time_error_becomes_bad_request() {
        let err: BrokerError = TimeError::EmptyWindow.into();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), "Bad request: end must be after start");
    }

    #[tokio::test]
    async fn test_into_response_bad_request() {
        let response = BrokerError::BadRequest("end_time must be after start_time".to_string())
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
        assert_eq!(body["error"]["message"], "end_time must be after start_time");
        assert!(body["error"].get("detail").is_none());
    }

    #[tokio::test]
    async fn test_into_response_configuration() {
        let response =
            BrokerError::Configuration("No hosts configured".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "CONFIGURATION_ERROR");
        assert_eq!(body["error"]["message"], "No hosts configured");
    }

    #[tokio::test]
    async fn test_into_response_upstream_carries_detail() {
        let response = BrokerError::Upstream {
            status: Some(429),
            message: "Provider returned 429 Too Many Requests".to_string(),
            detail: Some(serde_json::json!({ "code": 429, "message": "Too many requests" })),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "UPSTREAM_ERROR");
        assert_eq!(body["error"]["detail"]["message"], "Too many requests");
    }

    #[tokio::test]
    async fn test_into_response_upstream_status_only() {
        let response = BrokerError::Upstream {
            status: Some(502),
            message: "Provider returned 502".to_string(),
            detail: None,
        }
        .into_response();

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["detail"]["status"], 502);
    }

    #[tokio::test]
    async fn test_into_response_internal() {
        let response = BrokerError::Internal.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["message"], "An internal error occurred");
    }
}
