//! Provider-side records and payloads.
//!
//! Only the fields the broker reads are typed. Everything else the provider
//! returns for workspaces, locations and recordings is passed through as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Untyped provider object, passed through unchanged.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Occurrence key used for meetings that are not part of a series.
pub const SINGLE_OCCURRENCE: &str = "single";

/// Provider meeting type for a scheduled, non-recurring meeting.
pub const SCHEDULED_MEETING_TYPE: u8 = 2;

/// Provider user type for licensed users.
pub const LICENSED_USER_TYPE: u8 = 2;

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

/// A meeting as listed or returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMeeting {
    pub id: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrence_id: Option<String>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub topic: String,

    /// Absent for recurring meetings with no fixed time.
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,

    /// Minutes.
    #[serde(default)]
    pub duration: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agenda: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
}

impl ProviderMeeting {
    /// `(id, occurrence)` identity shared by every listing of this meeting.
    pub fn dedup_key(&self) -> (u64, &str) {
        (
            self.id,
            self.occurrence_id.as_deref().unwrap_or(SINGLE_OCCURRENCE),
        )
    }

    /// Start and end instants, when the meeting has a fixed start.
    pub fn span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.start_time?;
        Some((start, crate::time::meeting_end(start, self.duration)))
    }
}

/// Listing selector for `GET /users/{host}/meetings?type=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeetingListKind {
    /// In progress right now.
    Live,
    Upcoming,
    Scheduled,
    UpcomingMeetings,
    PreviousMeetings,
}

impl MeetingListKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingListKind::Live => "live",
            MeetingListKind::Upcoming => "upcoming",
            MeetingListKind::Scheduled => "scheduled",
            MeetingListKind::UpcomingMeetings => "upcoming_meetings",
            MeetingListKind::PreviousMeetings => "previous_meetings",
        }
    }
}

impl fmt::Display for MeetingListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeetingListKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "live" => Ok(MeetingListKind::Live),
            "upcoming" => Ok(MeetingListKind::Upcoming),
            "scheduled" => Ok(MeetingListKind::Scheduled),
            "upcoming_meetings" => Ok(MeetingListKind::UpcomingMeetings),
            "previous_meetings" => Ok(MeetingListKind::PreviousMeetings),
            other => Err(format!(
                "unknown meeting type '{other}', expected one of live, upcoming, scheduled, upcoming_meetings, previous_meetings"
            )),
        }
    }
}

/// Settings sent with every meeting the broker creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeetingSettings {
    pub join_before_host: bool,
    pub waiting_room: bool,
}

impl Default for MeetingSettings {
    fn default() -> Self {
        Self {
            join_before_host: false,
            waiting_room: true,
        }
    }
}

/// Body of `POST /users/{host}/meetings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateMeetingRequest {
    pub topic: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agenda: Option<String>,

    #[serde(rename = "type")]
    pub meeting_type: u8,

    /// Local wall-clock time, `YYYY-MM-DDTHH:MM:SS`, read in `timezone`.
    pub start_time: String,

    /// Minutes.
    pub duration: i64,

    pub timezone: String,

    pub settings: MeetingSettings,
}

impl CreateMeetingRequest {
    /// A scheduled meeting with host-join-required and waiting room enabled.
    pub fn scheduled(
        topic: String,
        agenda: Option<String>,
        start_local: String,
        duration_minutes: i64,
        timezone: String,
    ) -> Self {
        Self {
            topic,
            agenda,
            meeting_type: SCHEDULED_MEETING_TYPE,
            start_time: start_local,
            duration: duration_minutes,
            timezone,
            settings: MeetingSettings::default(),
        }
    }
}

/// A provider user, reduced to what the licensed-user listing exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUser {
    pub id: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub email: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub first_name: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub last_name: String,

    /// 1 = basic, 2 = licensed.
    #[serde(rename = "type", default)]
    pub user_type: u8,
}

/// Query for `GET /workspaces/{id}/reservations`, times already in UTC.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub user_id: Option<String>,
}

/// Body of `POST /workspaces/{id}/reservations`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReservationPayload {
    /// UTC, `…Z`.
    pub start_time: String,
    /// UTC, `…Z`.
    pub end_time: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    /// Provider user the reservation is made for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserve_for: Option<String>,

    /// Meeting object for room reservations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting: Option<serde_json::Value>,
}

/// Query for `GET /rooms/locations`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationQuery {
    pub parent_location_id: Option<String>,
    pub location_type: Option<String>,
    pub page_size: Option<u32>,
}
