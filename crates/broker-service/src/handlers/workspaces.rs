//! Workspace handlers.
//!
//! - `GET /api/workspaces` - Workspaces, optionally at one location
//! - `GET /api/workspaces/locations` - Room locations
//! - `GET /api/workspaces/{id}/reservations` - Reservations for a workspace
//! - `POST /api/workspaces/{id}/reservations` - Reserve a workspace
//! - `DELETE /api/workspaces/{id}/reservations/{reservation_id}` - Cancel one

use crate::errors::BrokerError;
use crate::handlers::{parse_body, query_params};
use crate::models::{
    CreateReservationRequest, JsonObject, LocationsQuery, LocationsResponse, ReservationsQuery,
    WorkspacesQuery, WorkspacesResponse,
};
use crate::routes::AppState;
use crate::services::WorkspaceService;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /api/workspaces
#[instrument(skip_all, name = "broker.workspace.list")]
pub async fn list_workspaces(
    State(state): State<Arc<AppState>>,
    query: Result<Query<WorkspacesQuery>, QueryRejection>,
) -> Result<Json<WorkspacesResponse>, BrokerError> {
    let query = query_params(query)?;

    let response = WorkspaceService::list_workspaces(
        state.provider.as_ref(),
        query.location_id.as_deref(),
        state.config.page_size,
    )
    .await?;

    Ok(Json(response))
}

/// Handler for GET /api/workspaces/locations
#[instrument(skip_all, name = "broker.workspace.locations")]
pub async fn list_room_locations(
    State(state): State<Arc<AppState>>,
    query: Result<Query<LocationsQuery>, QueryRejection>,
) -> Result<Json<LocationsResponse>, BrokerError> {
    let query = query_params(query)?;

    let response = WorkspaceService::list_room_locations(
        state.provider.as_ref(),
        &query,
        state.config.page_size,
    )
    .await?;

    Ok(Json(response))
}

/// Handler for GET /api/workspaces/{id}/reservations
#[instrument(skip_all, name = "broker.workspace.reservations", fields(workspace_id = %workspace_id))]
pub async fn list_reservations(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
    query: Result<Query<ReservationsQuery>, QueryRejection>,
) -> Result<Json<JsonObject>, BrokerError> {
    let query = query_params(query)?;

    let body = WorkspaceService::list_reservations(
        state.provider.as_ref(),
        &workspace_id,
        &query,
        state.config.default_timezone,
    )
    .await?;

    Ok(Json(body))
}

/// Handler for POST /api/workspaces/{id}/reservations
///
/// # Response
///
/// - 201 Created: provider's reservation record
/// - 400 Bad Request: missing, invalid or inverted times; unknown timezone
/// - 500 Internal Server Error: provider call failed
#[instrument(skip_all, name = "broker.workspace.reserve", fields(workspace_id = %workspace_id))]
pub async fn create_reservation(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<JsonObject>), BrokerError> {
    let request: CreateReservationRequest = parse_body(&body)?;

    let created = WorkspaceService::create_reservation(
        state.provider.as_ref(),
        &workspace_id,
        &request,
        state.config.default_timezone,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// Handler for DELETE /api/workspaces/{id}/reservations/{reservation_id}
#[instrument(
    skip_all,
    name = "broker.workspace.cancel",
    fields(workspace_id = %workspace_id, reservation_id = %reservation_id)
)]
pub async fn delete_reservation(
    State(state): State<Arc<AppState>>,
    Path((workspace_id, reservation_id)): Path<(String, String)>,
) -> Result<StatusCode, BrokerError> {
    WorkspaceService::delete_reservation(state.provider.as_ref(), &workspace_id, &reservation_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
