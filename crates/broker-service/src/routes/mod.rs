//! HTTP routes for the meeting broker.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::hosts::HostList;
use crate::middleware::http_metrics_middleware;
use crate::services::ProviderApi;
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Provider REST API.
    pub provider: Arc<dyn ProviderApi>,

    /// Priority ordered hosts, fixed for the process lifetime.
    pub hosts: HostList,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health`, `/ready` - probes
/// - `/metrics` - Prometheus scrape endpoint
/// - `/api/meetings/...` - allocation, deletion, licensed users, reports
/// - `/api/recordings` - recordings report
/// - `/api/workspaces/...` - workspaces, reservations, room locations
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        // Meetings
        .route("/api/meetings/auto", post(handlers::auto_create_meeting))
        .route(
            "/api/meetings/users/licensed",
            get(handlers::list_licensed_users),
        )
        .route(
            "/api/meetings/last-by-topic",
            get(handlers::last_meeting_by_topic),
        )
        .route("/api/meetings/hosts", get(handlers::meetings_for_hosts))
        .route("/api/meetings/:id", delete(handlers::delete_meeting))
        .route("/api/recordings", get(handlers::list_recordings))
        // Workspaces
        .route("/api/workspaces", get(handlers::list_workspaces))
        .route(
            "/api/workspaces/locations",
            get(handlers::list_room_locations),
        )
        .route(
            "/api/workspaces/:id/reservations",
            get(handlers::list_reservations).post(handlers::create_reservation),
        )
        .route(
            "/api/workspaces/:id/reservations/:reservation_id",
            delete(handlers::delete_reservation),
        )
        .with_state(state);

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Each layer wraps the ones above it:
    // 1. TraceLayer - log request details (innermost)
    // 2. TimeoutLayer - 408 after 30s
    // 3. http_metrics_middleware - sees every response, timeouts included (outermost)
    api_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
