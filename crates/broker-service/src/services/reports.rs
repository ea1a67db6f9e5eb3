//! Read-only reports across hosts.
//!
//! Each report fans out one listing per host concurrently and merges results
//! in host order, so output is stable for a fixed host list. An empty host
//! list is a configuration error.

use crate::errors::BrokerError;
use crate::hosts::HostList;
use crate::models::{
    HostMeeting, HostRecordingCount, MeetingListKind, ProviderMeeting, RecordingItem,
    RecordingsResponse, TopicLatestMeeting,
};
use crate::services::provider_client::ProviderApi;
use crate::time::{
    format_display, format_utc, is_date_only, meeting_end, parse_date, parse_local,
};
use chrono::{DateTime, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use futures::future::try_join_all;
use std::collections::HashMap;
use tracing::instrument;

/// Filters for [`ReportService::meetings_in_range`].
#[derive(Debug, Clone)]
pub struct RangeFilter {
    pub kind: MeetingListKind,
    pub timezone: Tz,
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub until: Option<DateTime<Utc>>,
    /// Lowercased topic substring.
    pub topic_contains: Option<String>,
}

impl RangeFilter {
    /// Build from caller strings.
    ///
    /// `from` and `to` are local times in `timezone`. A bare date for `to`
    /// covers that whole day; otherwise `to` is inclusive.
    pub fn parse(
        kind: MeetingListKind,
        timezone: Tz,
        from: Option<&str>,
        to: Option<&str>,
        q: Option<&str>,
    ) -> Result<Self, BrokerError> {
        let from = from
            .filter(|s| !s.trim().is_empty())
            .map(|s| parse_local(s, timezone).map(|t| t.with_timezone(&Utc)))
            .transpose()?;

        let until = match to.filter(|s| !s.trim().is_empty()) {
            None => None,
            Some(raw) if is_date_only(raw) => {
                let day = parse_date(raw)?;
                let next = day.checked_add_days(Days::new(1)).ok_or_else(|| {
                    BrokerError::BadRequest(format!("date '{raw}' is out of range"))
                })?;
                let midnight = parse_local(&next.format("%Y-%m-%d").to_string(), timezone)?;
                Some(midnight.with_timezone(&Utc))
            }
            Some(raw) => {
                let end = parse_local(raw, timezone)?.with_timezone(&Utc);
                // Inclusive bound expressed as exclusive.
                Some(end + chrono::Duration::nanoseconds(1))
            }
        };

        if let (Some(f), Some(u)) = (from, until) {
            if u <= f {
                return Err(BrokerError::BadRequest(
                    "'to' must not be before 'from'".to_string(),
                ));
            }
        }

        let topic_contains = q
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        Ok(Self {
            kind,
            timezone,
            from,
            until,
            topic_contains,
        })
    }

    fn keeps(&self, meeting: &ProviderMeeting, start: DateTime<Utc>) -> bool {
        if self.from.is_some_and(|f| start < f) {
            return false;
        }
        if self.until.is_some_and(|u| start >= u) {
            return false;
        }
        match &self.topic_contains {
            Some(needle) => meeting.topic.to_lowercase().contains(needle.as_str()),
            None => true,
        }
    }
}

/// Inclusive date range for recordings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    /// Both dates required, `YYYY-MM-DD`, `from <= to`.
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<Self, BrokerError> {
        let (Some(from), Some(to)) = (
            from.filter(|s| !s.trim().is_empty()),
            to.filter(|s| !s.trim().is_empty()),
        ) else {
            return Err(BrokerError::BadRequest(
                "'from' and 'to' are required (YYYY-MM-DD)".to_string(),
            ));
        };

        let from = parse_date(from)?;
        let to = parse_date(to)?;
        if to < from {
            return Err(BrokerError::BadRequest(
                "'to' must not be before 'from'".to_string(),
            ));
        }
        Ok(Self { from, to })
    }
}

fn require_hosts(hosts: &HostList) -> Result<(), BrokerError> {
    if hosts.is_empty() {
        return Err(BrokerError::Configuration(
            "No hosts configured for reports".to_string(),
        ));
    }
    Ok(())
}

/// Stateless report service.
pub struct ReportService;

impl ReportService {
    /// Latest-ending scheduled meeting per topic across all hosts.
    ///
    /// Empty topics are skipped. Ties keep the first meeting seen in host
    /// then listing order. Output follows first-seen topic order.
    #[instrument(skip_all, fields(hosts = hosts.len()))]
    pub async fn last_by_topic(
        provider: &dyn ProviderApi,
        hosts: &HostList,
        page_size: u32,
    ) -> Result<Vec<TopicLatestMeeting>, BrokerError> {
        require_hosts(hosts)?;

        let listings = try_join_all(hosts.iter().map(|host| async move {
            provider
                .list_meetings(host, MeetingListKind::Scheduled, page_size, None)
                .await
                .map(|meetings| (host, meetings))
        }))
        .await?;

        let mut order: Vec<String> = Vec::new();
        let mut latest: HashMap<String, (DateTime<Utc>, TopicLatestMeeting)> = HashMap::new();

        for (host, meetings) in listings {
            for meeting in meetings {
                if meeting.topic.trim().is_empty() {
                    continue;
                }
                let Some(start) = meeting.start_time else {
                    continue;
                };
                let end = meeting_end(start, meeting.duration);

                let replace = match latest.get(&meeting.topic) {
                    None => {
                        order.push(meeting.topic.clone());
                        true
                    }
                    Some((current_end, _)) => end > *current_end,
                };
                if !replace {
                    continue;
                }

                let entry = TopicLatestMeeting {
                    topic: meeting.topic.clone(),
                    user_id: host.to_string(),
                    meeting_id: meeting.id,
                    start_time: format_utc(start),
                    end_time: format_utc(end),
                    duration: meeting.duration,
                    join_url: meeting.join_url,
                };
                latest.insert(meeting.topic, (end, entry));
            }
        }

        let result: Vec<TopicLatestMeeting> = order
            .into_iter()
            .filter_map(|topic| latest.remove(&topic).map(|(_, entry)| entry))
            .collect();

        tracing::debug!(
            target: "broker.service.reports",
            topics = result.len(),
            "Built last-by-topic report"
        );

        Ok(result)
    }

    /// Meetings of `filter.kind` for every host, filtered and sorted by start.
    #[instrument(skip_all, fields(hosts = hosts.len(), kind = %filter.kind))]
    pub async fn meetings_in_range(
        provider: &dyn ProviderApi,
        hosts: &HostList,
        filter: &RangeFilter,
        page_size: u32,
    ) -> Result<Vec<HostMeeting>, BrokerError> {
        require_hosts(hosts)?;

        let listings = try_join_all(hosts.iter().map(|host| async move {
            provider
                .list_meetings(host, filter.kind, page_size, None)
                .await
                .map(|meetings| (host, meetings))
        }))
        .await?;

        let mut rows: Vec<(DateTime<Utc>, HostMeeting)> = Vec::new();
        for (host, meetings) in listings {
            for meeting in meetings {
                let Some(start) = meeting.start_time else {
                    continue;
                };
                if !filter.keeps(&meeting, start) {
                    continue;
                }
                let end = meeting_end(start, meeting.duration);
                rows.push((
                    start,
                    HostMeeting {
                        host: host.to_string(),
                        id: meeting.id,
                        topic: meeting.topic,
                        start_time: format_utc(start),
                        start_local: format_display(start, filter.timezone),
                        end_local: format_display(end, filter.timezone),
                        duration: meeting.duration,
                        timezone: filter.timezone.name().to_string(),
                        join_url: meeting.join_url,
                    },
                ));
            }
        }

        // Stable, so equal starts keep host order.
        rows.sort_by_key(|(start, _)| *start);

        Ok(rows.into_iter().map(|(_, row)| row).collect())
    }

    /// Cloud recordings per host with a per-host count.
    #[instrument(skip_all, fields(hosts = hosts.len(), from = %range.from, to = %range.to))]
    pub async fn recordings(
        provider: &dyn ProviderApi,
        hosts: &HostList,
        range: DateRange,
        page_size: u32,
    ) -> Result<RecordingsResponse, BrokerError> {
        require_hosts(hosts)?;

        let listings = try_join_all(hosts.iter().map(|host| async move {
            provider
                .list_recordings(host, range.from, range.to, page_size)
                .await
                .map(|recordings| (host, recordings))
        }))
        .await?;

        let mut items = Vec::new();
        let mut summary = Vec::with_capacity(listings.len());
        for (host, recordings) in listings {
            summary.push(HostRecordingCount {
                host: host.to_string(),
                count: recordings.len(),
            });
            items.extend(recordings.into_iter().map(|recording| RecordingItem {
                host: host.to_string(),
                recording,
            }));
        }

        Ok(RecordingsResponse {
            total: items.len(),
            items,
            summary,
        })
    }
}
