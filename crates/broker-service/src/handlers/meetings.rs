//! Meeting handlers.
//!
//! - `POST /api/meetings/auto` - Create a meeting on the first host with capacity
//! - `DELETE /api/meetings/{id}` - Delete a meeting
//! - `GET /api/meetings/users/licensed` - Licensed users on the account

use crate::errors::BrokerError;
use crate::handlers::parse_body;
use crate::models::{
    AutoMeetingRequest, CapacityExhaustedResponse, CreatedMeetingResponse, ErrorBody,
    HostCheckResponse, LicensedUsersResponse, OverlapSummary, ProviderMeeting,
};
use crate::routes::AppState;
use crate::services::{AllocationLimits, AllocationOutcome, AllocationRequest, HostAllocator};
use crate::time::{format_utc, parse_timezone, TimeError, TimeWindow};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;

/// Error code in the 409 body.
pub const CAPACITY_EXHAUSTED: &str = "CAPACITY_EXHAUSTED";

fn required(value: Option<String>, field: &str) -> Result<String, BrokerError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BrokerError::BadRequest(format!("{field} is required")))
}

/// Validate the body into an allocation request. No provider calls.
fn to_allocation_request(
    request: AutoMeetingRequest,
    state: &AppState,
) -> Result<AllocationRequest, BrokerError> {
    let topic = required(request.topic, "topic")?;
    let start = required(request.start_time, "start_time")?;
    let end = required(request.end_time, "end_time")?;

    let timezone = match request.timezone.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => parse_timezone(name)?,
        _ => state.config.default_timezone,
    };

    let window = TimeWindow::from_local(&start, &end, timezone).map_err(|e| match e {
        TimeError::EmptyWindow => {
            BrokerError::BadRequest("end_time must be after start_time".to_string())
        }
        other => BrokerError::from(other),
    })?;

    Ok(AllocationRequest {
        topic,
        agenda: request.agenda.filter(|a| !a.trim().is_empty()),
        window,
        timezone,
    })
}

fn overlap_summary(meeting: &ProviderMeeting) -> OverlapSummary {
    OverlapSummary {
        id: meeting.id,
        topic: meeting.topic.clone(),
        start_time: meeting.start_time.map(format_utc),
        duration: meeting.duration,
    }
}

/// Handler for POST /api/meetings/auto
///
/// # Response
///
/// - 201 Created: meeting created, body names the host
/// - 400 Bad Request: missing fields, unknown timezone, bad or inverted times
/// - 409 Conflict: every host is at the concurrency limit
/// - 500 Internal Server Error: no hosts configured, or a provider call failed
#[instrument(
    skip_all,
    name = "broker.meeting.auto",
    fields(method = "POST", endpoint = "/api/meetings/auto")
)]
pub async fn auto_create_meeting(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, BrokerError> {
    let request: AutoMeetingRequest = parse_body(&body)?;
    let allocation = to_allocation_request(request, &state)?;

    let limits = AllocationLimits {
        max_concurrent: state.config.max_concurrent,
        page_size: state.config.overlap_page_size,
    };

    let outcome = HostAllocator::allocate(
        state.provider.as_ref(),
        &state.hosts,
        &allocation,
        limits,
        Utc::now(),
    )
    .await?;

    match outcome {
        AllocationOutcome::Committed { host, meeting } => {
            let response = CreatedMeetingResponse {
                host,
                id: meeting.id,
                topic: meeting.topic,
                start_time: meeting.start_time.map(format_utc),
                duration: meeting.duration,
                join_url: meeting.join_url,
                start_url: meeting.start_url,
            };
            Ok((StatusCode::CREATED, Json(response)).into_response())
        }
        AllocationOutcome::Exhausted { checked } => {
            let response = CapacityExhaustedResponse {
                error: ErrorBody {
                    code: CAPACITY_EXHAUSTED.to_string(),
                    message: format!(
                        "All {} hosts are at the concurrency limit of {} for the requested window",
                        checked.len(),
                        limits.max_concurrent
                    ),
                },
                hosts_checked: checked
                    .iter()
                    .map(|check| HostCheckResponse {
                        user: check.host.clone(),
                        overlaps: check.overlaps.iter().map(overlap_summary).collect(),
                    })
                    .collect(),
            };
            Ok((StatusCode::CONFLICT, Json(response)).into_response())
        }
    }
}

/// Handler for DELETE /api/meetings/{id}
#[instrument(skip_all, name = "broker.meeting.delete", fields(meeting_id = %id))]
pub async fn delete_meeting(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, BrokerError> {
    state.provider.delete_meeting(&id).await?;

    tracing::info!(target: "broker.handlers.meetings", meeting_id = %id, "Meeting deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/meetings/users/licensed
#[instrument(skip_all, name = "broker.meeting.licensed_users")]
pub async fn list_licensed_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LicensedUsersResponse>, BrokerError> {
    let users = state
        .provider
        .list_licensed_users(state.config.page_size)
        .await?;

    Ok(Json(LicensedUsersResponse {
        total: users.len(),
        users,
    }))
}
