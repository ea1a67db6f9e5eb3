//! Metrics definitions for the meeting broker.
//!
//! All metrics follow Prometheus naming conventions:
//! - `broker_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP verbs
//! - `endpoint`: route templates, unknown paths collapse to `/other`
//! - `status`: success, error, timeout
//! - `operation`: provider calls named in code
//! - `outcome`: committed, exhausted, or an error kind
//! - `error_type`: bounded by error variants

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle served on `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("broker_http_request".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // An allocation is several provider round trips per host
        .set_buckets_for_metric(
            Matcher::Prefix("broker_allocation_duration".to_string()),
            &[0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000, 30.000],
        )
        .map_err(|e| format!("Failed to set allocation buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("broker_allocation_hosts_checked".to_string()),
            &[1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0],
        )
        .map_err(|e| format!("Failed to set hosts-checked buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("broker_provider_request".to_string()),
            &[0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set provider request buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `broker_http_requests_total`, `broker_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// Includes framework-level rejections (404, 405, 415) since the middleware
/// runs outermost.
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("broker_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("broker_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to a route template.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/" | "/health" | "/ready" | "/metrics" | "/api/meetings/auto"
        | "/api/meetings/users/licensed" | "/api/meetings/last-by-topic"
        | "/api/meetings/hosts" | "/api/recordings" | "/api/workspaces"
        | "/api/workspaces/locations" => path.to_string(),
        _ => normalize_dynamic_endpoint(path),
    }
}

/// Replace meeting, workspace and reservation ids with placeholders.
fn normalize_dynamic_endpoint(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();

    match parts.as_slice() {
        ["", "api", "meetings", id] if !id.is_empty() => "/api/meetings/{id}".to_string(),
        ["", "api", "workspaces", id, "reservations"] if !id.is_empty() => {
            "/api/workspaces/{id}/reservations".to_string()
        }
        ["", "api", "workspaces", id, "reservations", rid] if !id.is_empty() && !rid.is_empty() => {
            "/api/workspaces/{id}/reservations/{reservation_id}".to_string()
        }
        _ => "/other".to_string(),
    }
}

// ============================================================================
// Allocation Metrics
// ============================================================================

/// Record an allocation attempt.
///
/// Metric: `broker_allocations_total`, `broker_allocation_duration_seconds`,
/// `broker_allocation_hosts_checked`
/// Labels: `outcome`
///
/// `hosts_checked` is only known on exhaustion; a commit stops at the first
/// free host and is not recorded in the histogram.
pub fn record_allocation(outcome: &str, hosts_checked: Option<usize>, duration: Duration) {
    histogram!("broker_allocation_duration_seconds",
        "outcome" => outcome.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("broker_allocations_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);

    if let Some(count) = hosts_checked {
        #[allow(clippy::cast_precision_loss)]
        histogram!("broker_allocation_hosts_checked").record(count as f64);
    }
}

// ============================================================================
// Provider Metrics
// ============================================================================

/// Record a provider REST call.
///
/// Metric: `broker_provider_requests_total`,
/// `broker_provider_request_duration_seconds`
/// Labels: `operation`, `status`
pub fn record_provider_request(operation: &str, status: &str, duration: Duration) {
    histogram!("broker_provider_request_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("broker_provider_requests_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a failure to obtain a provider access token.
///
/// Metric: `broker_token_failures_total`
/// Labels: `error_type`
pub fn record_token_failure(error_type: &str) {
    counter!("broker_token_failures_total",
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_http_request() {
        // No recorder installed; recording must not panic
        record_http_request("GET", "/health", 200, Duration::from_millis(2));
        record_http_request("POST", "/api/meetings/auto", 409, Duration::from_millis(300));
        record_http_request("DELETE", "/api/meetings/123", 204, Duration::from_millis(40));
        record_http_request("GET", "/api/recordings", 504, Duration::from_secs(30));
    }

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(201), "success");
        assert_eq!(categorize_status_code(204), "success");

        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(504), "timeout");

        assert_eq!(categorize_status_code(400), "error");
        assert_eq!(categorize_status_code(409), "error");
        assert_eq!(categorize_status_code(500), "error");
        assert_eq!(categorize_status_code(503), "error");
    }

    #[test]
    fn test_normalize_endpoint_known_paths() {
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/ready"), "/ready");
        assert_eq!(normalize_endpoint("/api/meetings/auto"), "/api/meetings/auto");
        assert_eq!(
            normalize_endpoint("/api/meetings/last-by-topic"),
            "/api/meetings/last-by-topic"
        );
        assert_eq!(
            normalize_endpoint("/api/workspaces/locations"),
            "/api/workspaces/locations"
        );
    }

    #[test]
    fn test_normalize_endpoint_dynamic_paths() {
        assert_eq!(
            normalize_endpoint("/api/meetings/85746065432"),
            "/api/meetings/{id}"
        );
        assert_eq!(
            normalize_endpoint("/api/workspaces/ws-1/reservations"),
            "/api/workspaces/{id}/reservations"
        );
        assert_eq!(
            normalize_endpoint("/api/workspaces/ws-1/reservations/r-9"),
            "/api/workspaces/{id}/reservations/{reservation_id}"
        );
    }

    #[test]
    fn test_normalize_endpoint_unknown_paths() {
        assert_eq!(normalize_endpoint("/unknown"), "/other");
        assert_eq!(normalize_endpoint("/api/meetings/"), "/other");
        assert_eq!(normalize_endpoint("/api/workspaces/ws-1/other"), "/other");
        assert_eq!(normalize_endpoint("/api/v1/meetings/abc"), "/other");
    }

    #[test]
    fn test_record_allocation() {
        record_allocation("committed", None, Duration::from_millis(120));
        record_allocation("exhausted", Some(3), Duration::from_millis(900));
        record_allocation("upstream", None, Duration::from_millis(50));
    }

    #[test]
    fn test_record_provider_and_token_metrics() {
        record_provider_request("list_meetings", "success", Duration::from_millis(80));
        record_provider_request("create_meeting", "timeout", Duration::from_secs(10));
        record_token_failure("auth_rejected");
    }
}
