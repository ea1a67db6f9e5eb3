//! Broker service models.
//!
//! Inbound request bodies, query strings and response shapes. Provider-side
//! records live in [`provider`].

pub mod provider;

use serde::{Deserialize, Serialize};

pub use provider::{
    CreateMeetingRequest, JsonObject, LocationQuery, MeetingListKind, ProviderMeeting,
    ProviderUser, ReservationPayload, ReservationQuery,
};

/// Liveness/readiness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// "ready" or "not_ready".
    pub status: String,

    /// Number of configured hosts.
    pub hosts: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Meeting API Models
// ============================================================================

/// Body of `POST /api/meetings/auto`.
///
/// Fields are optional at the serde level so that a missing field produces a
/// 400 with a specific message rather than a generic rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AutoMeetingRequest {
    pub topic: Option<String>,
    pub agenda: Option<String>,
    /// Local wall-clock start in `timezone`.
    pub start_time: Option<String>,
    /// Local wall-clock end in `timezone`.
    pub end_time: Option<String>,
    /// IANA name; the configured default when absent.
    pub timezone: Option<String>,
}

/// 201 body for a committed allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedMeetingResponse {
    pub host: String,
    pub id: u64,
    pub topic: String,
    /// Absolute UTC start as returned by the provider.
    pub start_time: Option<String>,
    pub duration: Option<u32>,
    pub join_url: Option<String>,
    /// Host-only link.
    pub start_url: Option<String>,
}

/// One conflicting meeting in a 409 body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlapSummary {
    pub id: u64,
    pub topic: String,
    pub start_time: Option<String>,
    pub duration: Option<u32>,
}

/// Per-host detail in a 409 body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostCheckResponse {
    pub user: String,
    pub overlaps: Vec<OverlapSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// 409 body when every host is at its concurrency limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityExhaustedResponse {
    pub error: ErrorBody,
    pub hosts_checked: Vec<HostCheckResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicensedUsersResponse {
    pub total: usize,
    pub users: Vec<ProviderUser>,
}

/// Optional per-request override of the configured host list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostsQuery {
    /// Comma separated.
    pub hosts: Option<String>,
}

// ============================================================================
// Report Models
// ============================================================================

/// Latest meeting for one topic across all hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicLatestMeeting {
    pub topic: String,
    pub user_id: String,
    pub meeting_id: u64,
    /// UTC.
    pub start_time: String,
    /// UTC.
    pub end_time: String,
    pub duration: Option<u32>,
    pub join_url: Option<String>,
}

/// Query for `GET /api/meetings/hosts`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostMeetingsQuery {
    /// Provider listing kind; `upcoming` when absent.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Inclusive lower bound, local time in `timezone`.
    pub from: Option<String>,
    /// Inclusive upper bound; a bare date covers the whole day.
    pub to: Option<String>,
    pub timezone: Option<String>,
    /// Case-insensitive topic substring.
    pub q: Option<String>,
    pub hosts: Option<String>,
}

/// One meeting in the cross-host range report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMeeting {
    pub host: String,
    pub id: u64,
    pub topic: String,
    /// UTC.
    pub start_time: String,
    /// `YYYY-MM-DD HH:MM` in the requested timezone.
    pub start_local: String,
    /// `YYYY-MM-DD HH:MM` in the requested timezone.
    pub end_local: String,
    pub duration: Option<u32>,
    pub timezone: String,
    pub join_url: Option<String>,
}

/// `{total, meetings}` listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingsResponse<T> {
    pub total: usize,
    pub meetings: Vec<T>,
}

impl<T> From<Vec<T>> for MeetingsResponse<T> {
    fn from(meetings: Vec<T>) -> Self {
        Self {
            total: meetings.len(),
            meetings,
        }
    }
}

/// Query for `GET /api/recordings`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordingsQuery {
    /// `YYYY-MM-DD`, required.
    pub from: Option<String>,
    /// `YYYY-MM-DD`, required.
    pub to: Option<String>,
    pub hosts: Option<String>,
}

/// A provider cloud recording tagged with the host it was listed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingItem {
    pub host: String,
    #[serde(flatten)]
    pub recording: JsonObject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecordingCount {
    pub host: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingsResponse {
    pub total: usize,
    pub items: Vec<RecordingItem>,
    /// One entry per host, in host order.
    pub summary: Vec<HostRecordingCount>,
}

// ============================================================================
// Workspace Models
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkspacesQuery {
    pub location_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspacesResponse {
    pub total: usize,
    pub workspaces: Vec<JsonObject>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationsQuery {
    pub parent_location_id: Option<String>,
    #[serde(rename = "type")]
    pub location_type: Option<String>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationsResponse {
    pub total: usize,
    pub locations: Vec<JsonObject>,
}

/// Query for `GET /api/workspaces/:id/reservations`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReservationsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub timezone: Option<String>,
    pub user_id: Option<String>,
}

/// Body of `POST /api/workspaces/:id/reservations`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateReservationRequest {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub timezone: Option<String>,
    pub topic: Option<String>,
    pub reserve_for: Option<String>,
    pub meeting: Option<serde_json::Value>,
}
