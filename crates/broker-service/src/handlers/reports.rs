//! Cross-host report handlers.
//!
//! - `GET /api/meetings/last-by-topic` - Latest meeting per topic
//! - `GET /api/meetings/hosts` - Meetings for all hosts in a local time range
//! - `GET /api/recordings` - Cloud recordings in a date range
//!
//! Every report accepts `hosts=a,b` to replace the configured host list for
//! that request.

use crate::errors::BrokerError;
use crate::handlers::{effective_hosts, query_params};
use crate::models::{
    HostMeeting, HostMeetingsQuery, HostsQuery, MeetingListKind, MeetingsResponse,
    RecordingsQuery, RecordingsResponse, TopicLatestMeeting,
};
use crate::routes::AppState;
use crate::services::reports::{DateRange, RangeFilter};
use crate::services::ReportService;
use crate::time::parse_timezone;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /api/meetings/last-by-topic
#[instrument(skip_all, name = "broker.report.last_by_topic")]
pub async fn last_meeting_by_topic(
    State(state): State<Arc<AppState>>,
    query: Result<Query<HostsQuery>, QueryRejection>,
) -> Result<Json<MeetingsResponse<TopicLatestMeeting>>, BrokerError> {
    let query = query_params(query)?;
    let hosts = effective_hosts(&state.hosts, query.hosts.as_deref());

    let meetings =
        ReportService::last_by_topic(state.provider.as_ref(), &hosts, state.config.page_size)
            .await?;

    Ok(Json(meetings.into()))
}

/// Handler for GET /api/meetings/hosts
///
/// `type` defaults to `upcoming` and `timezone` to the configured default.
#[instrument(skip_all, name = "broker.report.meetings_for_hosts")]
pub async fn meetings_for_hosts(
    State(state): State<Arc<AppState>>,
    query: Result<Query<HostMeetingsQuery>, QueryRejection>,
) -> Result<Json<MeetingsResponse<HostMeeting>>, BrokerError> {
    let query = query_params(query)?;

    let kind = match query.kind.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => raw
            .parse::<MeetingListKind>()
            .map_err(BrokerError::BadRequest)?,
        _ => MeetingListKind::Upcoming,
    };

    let timezone = match query.timezone.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => parse_timezone(name)?,
        _ => state.config.default_timezone,
    };

    let filter = RangeFilter::parse(
        kind,
        timezone,
        query.from.as_deref(),
        query.to.as_deref(),
        query.q.as_deref(),
    )?;
    let hosts = effective_hosts(&state.hosts, query.hosts.as_deref());

    let meetings = ReportService::meetings_in_range(
        state.provider.as_ref(),
        &hosts,
        &filter,
        state.config.page_size,
    )
    .await?;

    Ok(Json(meetings.into()))
}

/// Handler for GET /api/recordings
///
/// `from` and `to` are required `YYYY-MM-DD` dates.
#[instrument(skip_all, name = "broker.report.recordings")]
pub async fn list_recordings(
    State(state): State<Arc<AppState>>,
    query: Result<Query<RecordingsQuery>, QueryRejection>,
) -> Result<Json<RecordingsResponse>, BrokerError> {
    let query = query_params(query)?;
    let range = DateRange::parse(query.from.as_deref(), query.to.as_deref())?;
    let hosts = effective_hosts(&state.hosts, query.hosts.as_deref());

    let response =
        ReportService::recordings(state.provider.as_ref(), &hosts, range, state.config.page_size)
            .await?;

    Ok(Json(response))
}
