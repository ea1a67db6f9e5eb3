//! Overlap detection for a single host.
//!
//! A host is busy during a window when some meeting it owns is in progress or
//! upcoming, has not yet ended, and intersects the window. Only the first
//! `limit` overlaps matter to the allocator, so listings stop paging once
//! that many meetings have been seen.

use crate::errors::BrokerError;
use crate::models::{MeetingListKind, ProviderMeeting};
use crate::services::provider_client::ProviderApi;
use crate::time::TimeWindow;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::instrument;

/// Which listing a meeting was read from.
///
/// Declaration order is merge precedence: an in-progress copy wins a
/// duplicate key over an upcoming one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MeetingSource {
    InProgress,
    Upcoming,
}

impl MeetingSource {
    pub fn list_kind(self) -> MeetingListKind {
        match self {
            MeetingSource::InProgress => MeetingListKind::Live,
            MeetingSource::Upcoming => MeetingListKind::Upcoming,
        }
    }
}

/// Stateless overlap detector.
pub struct OverlapDetector;

impl OverlapDetector {
    /// Meetings owned by `host` that intersect `window`, at most `limit`.
    ///
    /// The live and upcoming listings are fetched concurrently. Any provider
    /// failure aborts the detection.
    #[instrument(skip_all, fields(host = %host, limit = limit))]
    pub async fn find_overlaps(
        provider: &dyn ProviderApi,
        host: &str,
        window: &TimeWindow,
        now: DateTime<Utc>,
        limit: usize,
        page_size: u32,
    ) -> Result<Vec<ProviderMeeting>, BrokerError> {
        let (live, upcoming) = tokio::try_join!(
            provider.list_meetings(
                host,
                MeetingSource::InProgress.list_kind(),
                page_size,
                Some(limit)
            ),
            provider.list_meetings(
                host,
                MeetingSource::Upcoming.list_kind(),
                page_size,
                Some(limit)
            ),
        )?;

        tracing::debug!(
            target: "broker.service.overlap",
            host = %host,
            live = live.len(),
            upcoming = upcoming.len(),
            "Fetched host listings"
        );

        let overlaps = collect_overlaps(
            [
                (MeetingSource::InProgress, live),
                (MeetingSource::Upcoming, upcoming),
            ],
            window,
            now,
            limit,
        );

        tracing::debug!(
            target: "broker.service.overlap",
            host = %host,
            overlaps = overlaps.len(),
            "Overlap check complete"
        );

        Ok(overlaps)
    }
}

/// Merge listings and keep the meetings that intersect `window`.
///
/// Sources are merged by [`MeetingSource`] precedence whatever order they
/// are passed in, keeping listing order within a source. A meeting already
/// seen under the same `(id, occurrence)` key is dropped. Meetings without a
/// fixed start, or that ended at or before `now`, never overlap.
pub fn collect_overlaps<I>(
    sources: I,
    window: &TimeWindow,
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<ProviderMeeting>
where
    I: IntoIterator<Item = (MeetingSource, Vec<ProviderMeeting>)>,
{
    let mut sources: Vec<_> = sources.into_iter().collect();
    sources.sort_by_key(|(source, _)| *source);

    let mut seen: HashSet<(u64, String)> = HashSet::new();
    let mut overlaps = Vec::new();

    'sources: for (_source, meetings) in sources {
        for meeting in meetings {
            if overlaps.len() >= limit {
                break 'sources;
            }

            let (id, occurrence) = meeting.dedup_key();
            if !seen.insert((id, occurrence.to_string())) {
                continue;
            }

            let Some((start, end)) = meeting.span() else {
                continue;
            };
            if end <= now {
                continue;
            }

            if window.overlaps(start, end) {
                overlaps.push(meeting);
            }
        }
    }

    overlaps
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::services::provider_client::mock::{meeting, MockProvider};
    use chrono::Duration;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn window(start: &str, end: &str) -> TimeWindow {
        TimeWindow::new(at(start), at(end)).unwrap()
    }

    const NOW: &str = "2030-03-01T08:00:00Z";

    #[test]
    fn test_touching_meeting_does_not_overlap() {
        let w = window("2030-03-01T10:00:00Z", "2030-03-01T11:00:00Z");
        let ends_at_start = meeting(1, "before", at("2030-03-01T09:00:00Z"), Some(60));
        let starts_at_end = meeting(2, "after", at("2030-03-01T11:00:00Z"), Some(30));

        let got = collect_overlaps(
            [(MeetingSource::Upcoming, vec![ends_at_start, starts_at_end])],
            &w,
            at(NOW),
            2,
        );

        assert!(got.is_empty());
    }

    #[test]
    fn test_missing_duration_counts_as_an_hour() {
        let w = window("2030-03-01T10:59:00Z", "2030-03-01T11:30:00Z");
        let m = meeting(1, "no duration", at("2030-03-01T10:00:00Z"), None);

        let got = collect_overlaps([(MeetingSource::Upcoming, vec![m])], &w, at(NOW), 2);

        assert_eq!(got.len(), 1);
    }

    #[test]
    fn test_in_progress_copy_wins_duplicate() {
        let w = window("2030-03-01T10:00:00Z", "2030-03-01T11:00:00Z");
        let mut live = meeting(7, "live copy", at("2030-03-01T10:15:00Z"), Some(30));
        live.occurrence_id = Some("occ-1".to_string());
        let mut upcoming = meeting(7, "upcoming copy", at("2030-03-01T10:15:00Z"), Some(30));
        upcoming.occurrence_id = Some("occ-1".to_string());

        let got = collect_overlaps(
            [
                (MeetingSource::InProgress, vec![live.clone()]),
                (MeetingSource::Upcoming, vec![upcoming]),
            ],
            &w,
            at(NOW),
            5,
        );

        assert_eq!(got, vec![live]);
    }

    #[test]
    fn test_in_progress_copy_wins_when_passed_last() {
        let w = window("2030-03-01T10:00:00Z", "2030-03-01T11:00:00Z");
        let live = meeting(7, "live copy", at("2030-03-01T10:15:00Z"), Some(30));
        let upcoming = meeting(7, "upcoming copy", at("2030-03-01T10:15:00Z"), Some(30));

        let got = collect_overlaps(
            [
                (MeetingSource::Upcoming, vec![upcoming]),
                (MeetingSource::InProgress, vec![live.clone()]),
            ],
            &w,
            at(NOW),
            5,
        );

        assert_eq!(got, vec![live]);
    }

    #[test]
    fn test_limit_prefers_in_progress_meetings() {
        let w = window("2030-03-01T10:00:00Z", "2030-03-01T11:00:00Z");
        let upcoming = meeting(1, "upcoming", at("2030-03-01T10:30:00Z"), Some(30));
        let live = meeting(2, "live", at("2030-03-01T07:45:00Z"), Some(180));

        let got = collect_overlaps(
            [
                (MeetingSource::Upcoming, vec![upcoming]),
                (MeetingSource::InProgress, vec![live]),
            ],
            &w,
            at(NOW),
            1,
        );

        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, 2);
    }

    #[test]
    fn test_distinct_occurrences_are_not_merged() {
        let w = window("2030-03-01T10:00:00Z", "2030-03-01T12:00:00Z");
        let mut first = meeting(7, "series", at("2030-03-01T10:00:00Z"), Some(30));
        first.occurrence_id = Some("a".to_string());
        let mut second = meeting(7, "series", at("2030-03-01T11:00:00Z"), Some(30));
        second.occurrence_id = Some("b".to_string());

        let got = collect_overlaps(
            [(MeetingSource::Upcoming, vec![first, second])],
            &w,
            at(NOW),
            5,
        );

        assert_eq!(got.len(), 2);
    }

    #[test]
    fn test_finished_meetings_are_dropped() {
        let w = window("2030-03-01T07:00:00Z", "2030-03-01T09:00:00Z");
        let finished = meeting(1, "done", at("2030-03-01T07:00:00Z"), Some(60));
        let running = meeting(2, "running", at("2030-03-01T07:30:00Z"), Some(60));

        let got = collect_overlaps(
            [(MeetingSource::InProgress, vec![finished, running])],
            &w,
            at(NOW),
            5,
        );

        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, 2);
    }

    #[test]
    fn test_meetings_without_start_are_ignored() {
        let w = window("2030-03-01T10:00:00Z", "2030-03-01T11:00:00Z");
        let mut floating = meeting(3, "no fixed time", at("2030-03-01T10:00:00Z"), Some(30));
        floating.start_time = None;

        let got = collect_overlaps([(MeetingSource::Upcoming, vec![floating])], &w, at(NOW), 2);

        assert!(got.is_empty());
    }

    #[test]
    fn test_result_is_capped_at_limit() {
        let w = window("2030-03-01T10:00:00Z", "2030-03-01T11:00:00Z");
        let all: Vec<_> = (1..=6)
            .map(|i| meeting(i, "busy", at("2030-03-01T10:00:00Z"), Some(60)))
            .collect();

        for limit in 1..=4 {
            let got = collect_overlaps(
                [(MeetingSource::Upcoming, all.clone())],
                &w,
                at(NOW),
                limit,
            );
            assert_eq!(got.len(), limit);
        }
    }

    #[tokio::test]
    async fn test_find_overlaps_reads_both_listings() {
        let start = Utc::now() + Duration::hours(2);
        let provider = MockProvider::new()
            .with_meetings(
                "host-a",
                MeetingListKind::Live,
                vec![meeting(1, "running", Utc::now() - Duration::minutes(10), Some(240))],
            )
            .with_meetings(
                "host-a",
                MeetingListKind::Upcoming,
                vec![
                    meeting(2, "later", start, Some(30)),
                    meeting(3, "much later", start + Duration::hours(5), Some(30)),
                ],
            );

        let w = TimeWindow::new(start, start + Duration::hours(1)).unwrap();
        let got = OverlapDetector::find_overlaps(&provider, "host-a", &w, Utc::now(), 2, 30)
            .await
            .unwrap();

        let ids: Vec<u64> = got.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2]);

        let mut kinds: Vec<MeetingListKind> =
            provider.list_calls().into_iter().map(|(_, k)| k).collect();
        kinds.sort_by_key(|k| k.as_str());
        assert_eq!(kinds, vec![MeetingListKind::Live, MeetingListKind::Upcoming]);
    }

    #[tokio::test]
    async fn test_find_overlaps_stops_paging_at_limit() {
        let start = Utc::now() + Duration::hours(1);
        let many: Vec<_> = (1..=10)
            .map(|i| meeting(i, "busy", start, Some(30)))
            .collect();
        let provider = MockProvider::new().with_meetings("h", MeetingListKind::Upcoming, many);

        let w = TimeWindow::new(start, start + Duration::minutes(30)).unwrap();
        let got = OverlapDetector::find_overlaps(&provider, "h", &w, Utc::now(), 2, 2)
            .await
            .unwrap();

        assert_eq!(got.len(), 2);
        assert_eq!(provider.pages_served("h", MeetingListKind::Upcoming), 1);
    }

    #[tokio::test]
    async fn test_find_overlaps_propagates_provider_failure() {
        let provider = MockProvider::new().with_failing_host("down");
        let start = Utc::now() + Duration::hours(1);
        let w = TimeWindow::new(start, start + Duration::minutes(30)).unwrap();

        let err = OverlapDetector::find_overlaps(&provider, "down", &w, Utc::now(), 2, 30)
            .await
            .unwrap_err();

        assert!(matches!(err, BrokerError::Upstream { status: Some(500), .. }));
    }
}
