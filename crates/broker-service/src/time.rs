//! Wall-clock and window arithmetic.
//!
//! Callers speak local time plus an IANA zone; the provider reports absolute
//! UTC instants. Everything that crosses that boundary goes through here.

use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc,
};
use chrono_tz::Tz;
use std::str::FromStr;
use thiserror::Error;

/// Meeting length assumed when the provider omits `duration`.
pub const DEFAULT_MEETING_MINUTES: i64 = 60;

/// Wall-clock formats accepted for local times, most specific first.
const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Errors produced while interpreting caller supplied times.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("invalid time '{0}'")]
    InvalidTime(String),

    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("local time '{input}' does not exist in {tz}")]
    NonexistentLocalTime { input: String, tz: String },

    #[error("end must be after start")]
    EmptyWindow,
}

/// Resolve an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz, TimeError> {
    Tz::from_str(name.trim()).map_err(|_| TimeError::UnknownTimezone(name.to_string()))
}

/// Interpret `input` as a wall-clock time in `tz`.
///
/// Strings carrying an offset or `Z` are absolute and only converted into
/// `tz`. A bare date means local midnight. Ambiguous wall times resolve to the
/// earlier instant; wall times skipped by a DST jump are rejected.
pub fn parse_local(input: &str, tz: Tz) -> Result<DateTime<Tz>, TimeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TimeError::InvalidTime(input.to_string()));
    }

    if let Ok(absolute) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(absolute.with_timezone(&tz));
    }

    let naive = LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| TimeError::InvalidTime(input.to_string()))?;

    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => Err(TimeError::NonexistentLocalTime {
            input: input.to_string(),
            tz: tz.name().to_string(),
        }),
    }
}

/// True when `input` is a bare `YYYY-MM-DD` date.
pub fn is_date_only(input: &str) -> bool {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT).is_ok()
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(input: &str) -> Result<NaiveDate, TimeError> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT)
        .map_err(|_| TimeError::InvalidDate(input.to_string()))
}

/// `YYYY-MM-DDTHH:MM:SS` in `tz`, the form the provider expects for a
/// meeting start together with a `timezone` field.
pub fn format_local(instant: DateTime<Utc>, tz: Tz) -> String {
    instant
        .with_timezone(&tz)
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string()
}

/// `YYYY-MM-DD HH:MM` in `tz`, for reports.
pub fn format_display(instant: DateTime<Utc>, tz: Tz) -> String {
    instant.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string()
}

/// RFC 3339 UTC with a `Z` suffix.
pub fn format_utc(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// End instant of a meeting. A missing or zero duration counts as an hour.
pub fn meeting_end(start: DateTime<Utc>, duration_minutes: Option<u32>) -> DateTime<Utc> {
    let minutes = match duration_minutes {
        Some(d) if d > 0 => i64::from(d),
        _ => DEFAULT_MEETING_MINUTES,
    };
    start + Duration::minutes(minutes)
}

/// Half-open `[start, end)` interval in UTC with `end > start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    /// Build a window, rejecting empty or inverted ranges.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TimeError> {
        if end <= start {
            return Err(TimeError::EmptyWindow);
        }
        Ok(Self { start, end })
    }

    /// Parse both ends as wall-clock times in `tz`.
    pub fn from_local(start: &str, end: &str, tz: Tz) -> Result<Self, TimeError> {
        let start = parse_local(start, tz)?.with_timezone(&Utc);
        let end = parse_local(end, tz)?.with_timezone(&Utc);
        Self::new(start, end)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Whole minutes between start and end, rounded down.
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// `self.start < other_end && other_start < self.end`.
    ///
    /// Touching intervals do not overlap.
    pub fn overlaps(&self, other_start: DateTime<Utc>, other_end: DateTime<Utc>) -> bool {
        self.start < other_end && other_start < self.end
    }
}
