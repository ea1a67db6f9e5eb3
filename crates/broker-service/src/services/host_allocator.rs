//! Host allocation.
//!
//! Walks the host list in priority order and creates the meeting on the first
//! host whose overlap count is below the concurrency limit. This is first-fit:
//! a later host with more spare capacity never wins over an earlier host that
//! has any.
//!
//! The capacity check is client side. Two allocations racing against the same
//! host can both observe spare capacity and both commit; the provider offers
//! no conditional create to close that gap.

use crate::errors::BrokerError;
use crate::hosts::HostList;
use crate::models::{CreateMeetingRequest, ProviderMeeting};
use crate::observability::metrics;
use crate::services::overlap::OverlapDetector;
use crate::services::provider_client::ProviderApi;
use crate::time::{format_local, TimeWindow};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::time::Instant;
use tracing::instrument;

/// A validated request to place one meeting.
#[derive(Debug, Clone)]
pub struct AllocationRequest {
    pub topic: String,
    pub agenda: Option<String>,
    pub window: TimeWindow,
    /// Zone the caller spoke in; the meeting is created in it.
    pub timezone: Tz,
}

/// Overlaps observed on one host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostCheck {
    pub host: String,
    pub overlaps: Vec<ProviderMeeting>,
}

/// Result of an allocation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AllocationOutcome {
    /// The meeting was created on `host`.
    Committed {
        host: String,
        meeting: ProviderMeeting,
    },
    /// Every host was at its limit. Checks are in host order.
    Exhausted { checked: Vec<HostCheck> },
}

/// Tuning for one allocation.
#[derive(Debug, Clone, Copy)]
pub struct AllocationLimits {
    /// Per-host concurrency limit.
    pub max_concurrent: usize,
    /// Page size for the overlap listings.
    pub page_size: u32,
}

/// Stateless host allocator.
pub struct HostAllocator;

impl HostAllocator {
    /// Allocate `request` to the first host with spare capacity.
    ///
    /// Hosts are checked one at a time. At most one creation call is made,
    /// and none when every host is full.
    ///
    /// # Errors
    ///
    /// - `BrokerError::Configuration` - host list is empty
    /// - `BrokerError::BadRequest` - window is shorter than one minute
    /// - `BrokerError::Upstream` - any provider call failed; the scan stops
    #[instrument(skip_all, fields(hosts = hosts.len(), limit = limits.max_concurrent))]
    pub async fn allocate(
        provider: &dyn ProviderApi,
        hosts: &HostList,
        request: &AllocationRequest,
        limits: AllocationLimits,
        now: DateTime<Utc>,
    ) -> Result<AllocationOutcome, BrokerError> {
        let started = Instant::now();
        let result = Self::scan(provider, hosts, request, limits, now).await;

        let (outcome_label, hosts_checked) = match &result {
            Ok(AllocationOutcome::Committed { .. }) => ("committed", None),
            Ok(AllocationOutcome::Exhausted { checked }) => ("exhausted", Some(checked.len())),
            Err(e) => (e.error_type(), None),
        };
        metrics::record_allocation(outcome_label, hosts_checked, started.elapsed());

        result
    }

    async fn scan(
        provider: &dyn ProviderApi,
        hosts: &HostList,
        request: &AllocationRequest,
        limits: AllocationLimits,
        now: DateTime<Utc>,
    ) -> Result<AllocationOutcome, BrokerError> {
        if hosts.is_empty() {
            return Err(BrokerError::Configuration(
                "No hosts configured for meeting allocation".to_string(),
            ));
        }

        let duration = request.window.duration_minutes();
        if duration < 1 {
            return Err(BrokerError::BadRequest(
                "meeting must last at least one minute".to_string(),
            ));
        }

        let mut checked = Vec::with_capacity(hosts.len());

        for (position, host) in hosts.iter().enumerate() {
            let overlaps = OverlapDetector::find_overlaps(
                provider,
                host,
                &request.window,
                now,
                limits.max_concurrent,
                limits.page_size,
            )
            .await?;

            let busy = overlaps.len();
            checked.push(HostCheck {
                host: host.to_string(),
                overlaps,
            });

            if busy >= limits.max_concurrent {
                tracing::debug!(
                    target: "broker.service.allocator",
                    host = %host,
                    position,
                    overlaps = busy,
                    "Host at capacity, trying next"
                );
                continue;
            }

            let create = CreateMeetingRequest::scheduled(
                request.topic.clone(),
                request.agenda.clone(),
                format_local(request.window.start(), request.timezone),
                duration,
                request.timezone.name().to_string(),
            );
            let meeting = provider.create_meeting(host, &create).await?;

            tracing::info!(
                target: "broker.service.allocator",
                host = %host,
                position,
                overlaps = busy,
                meeting_id = meeting.id,
                "Meeting allocated"
            );

            return Ok(AllocationOutcome::Committed {
                host: host.to_string(),
                meeting,
            });
        }

        tracing::warn!(
            target: "broker.service.allocator",
            hosts = checked.len(),
            "All hosts at capacity"
        );

        Ok(AllocationOutcome::Exhausted { checked })
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::models::MeetingListKind;
    use crate::services::provider_client::mock::{meeting, MockProvider};
    use crate::time::parse_local;
    use chrono::{Duration, DurationRound};
    use chrono_tz::America::Lima;

    const LIMITS: AllocationLimits = AllocationLimits {
        max_concurrent: 2,
        page_size: 30,
    };

    /// A window starting `hours_from_now` hours out, on a whole minute.
    fn window(hours_from_now: i64, minutes: i64) -> TimeWindow {
        let start = (Utc::now() + Duration::hours(hours_from_now))
            .duration_trunc(Duration::minutes(1))
            .unwrap();
        TimeWindow::new(start, start + Duration::minutes(minutes)).unwrap()
    }

    fn request(window: TimeWindow) -> AllocationRequest {
        AllocationRequest {
            topic: "Design review".to_string(),
            agenda: Some("Agenda".to_string()),
            window,
            timezone: Lima,
        }
    }

    fn busy(ids: &[u64], w: &TimeWindow) -> Vec<ProviderMeeting> {
        ids.iter()
            .map(|id| meeting(*id, "busy", w.start(), Some(60)))
            .collect()
    }

    #[tokio::test]
    async fn test_full_first_host_commits_to_second() {
        let w = window(3, 60);
        let provider = MockProvider::new().with_meetings(
            "A",
            MeetingListKind::Upcoming,
            busy(&[1, 2], &w),
        );
        let hosts = HostList::new(["A", "B"]);

        let outcome = HostAllocator::allocate(&provider, &hosts, &request(w), LIMITS, Utc::now())
            .await
            .unwrap();

        match outcome {
            AllocationOutcome::Committed { host, .. } => assert_eq!(host, "B"),
            other => panic!("expected commit, got {other:?}"),
        }
        let creates = provider.create_calls();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].0, "B");
    }

    #[tokio::test]
    async fn test_single_full_host_is_exhausted_without_create() {
        let w = window(3, 60);
        let provider = MockProvider::new().with_meetings(
            "A",
            MeetingListKind::Upcoming,
            busy(&[1, 2], &w),
        );
        let hosts = HostList::new(["A"]);

        let outcome = HostAllocator::allocate(&provider, &hosts, &request(w), LIMITS, Utc::now())
            .await
            .unwrap();

        match outcome {
            AllocationOutcome::Exhausted { checked } => {
                assert_eq!(checked.len(), 1);
                assert_eq!(checked[0].host, "A");
                let ids: Vec<u64> = checked[0].overlaps.iter().map(|m| m.id).collect();
                assert_eq!(ids, vec![1, 2]);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(provider.create_count(), 0);
    }

    #[tokio::test]
    async fn test_first_fit_prefers_earlier_host_with_one_slot() {
        let w = window(3, 60);
        let provider =
            MockProvider::new().with_meetings("A", MeetingListKind::Upcoming, busy(&[1], &w));
        let hosts = HostList::new(["A", "B"]);

        let outcome = HostAllocator::allocate(&provider, &hosts, &request(w), LIMITS, Utc::now())
            .await
            .unwrap();

        assert!(matches!(outcome, AllocationOutcome::Committed { ref host, .. } if host == "A"));
        assert!(provider.list_calls().iter().all(|(h, _)| h == "A"));
    }

    #[tokio::test]
    async fn test_exhausted_reports_every_host_in_order() {
        let w = window(3, 60);
        let provider = MockProvider::new()
            .with_meetings("A", MeetingListKind::Upcoming, busy(&[1, 2], &w))
            .with_meetings("B", MeetingListKind::Live, busy(&[3, 4, 5], &w))
            .with_meetings("C", MeetingListKind::Upcoming, busy(&[6, 7], &w));
        let hosts = HostList::new(["A", "B", "C"]);

        let outcome = HostAllocator::allocate(&provider, &hosts, &request(w), LIMITS, Utc::now())
            .await
            .unwrap();

        let AllocationOutcome::Exhausted { checked } = outcome else {
            panic!("expected exhaustion");
        };
        let order: Vec<&str> = checked.iter().map(|c| c.host.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
        assert!(checked.iter().all(|c| c.overlaps.len() == 2));
        assert_eq!(provider.create_count(), 0);
    }

    #[tokio::test]
    async fn test_meeting_ending_at_start_leaves_host_free() {
        let w = window(3, 60);
        let before = w.start() - Duration::minutes(60);
        let provider = MockProvider::new().with_meetings(
            "A",
            MeetingListKind::Upcoming,
            vec![
                meeting(1, "ends at start", before, Some(60)),
                meeting(2, "also ends at start", before, Some(60)),
            ],
        );
        let hosts = HostList::new(["A"]);

        let outcome = HostAllocator::allocate(&provider, &hosts, &request(w), LIMITS, Utc::now())
            .await
            .unwrap();

        assert!(matches!(outcome, AllocationOutcome::Committed { ref host, .. } if host == "A"));
    }

    #[tokio::test]
    async fn test_committed_start_round_trips_to_local_time() {
        let local_start = "2031-07-15T09:30:00";
        let start = parse_local(local_start, Lima).unwrap().with_timezone(&Utc);
        let w = TimeWindow::new(start, start + Duration::minutes(45)).unwrap();
        let provider = MockProvider::new();
        let hosts = HostList::new(["A"]);

        let outcome = HostAllocator::allocate(&provider, &hosts, &request(w), LIMITS, Utc::now())
            .await
            .unwrap();

        let AllocationOutcome::Committed { meeting, .. } = outcome else {
            panic!("expected commit");
        };
        let returned = meeting.start_time.unwrap();
        assert_eq!(format_local(returned, Lima), local_start);

        let (_, sent) = &provider.create_calls()[0];
        assert_eq!(sent.start_time, local_start);
        assert_eq!(sent.duration, 45);
        assert_eq!(sent.timezone, "America/Lima");
        assert!(!sent.settings.join_before_host);
        assert!(sent.settings.waiting_room);
    }

    #[tokio::test]
    async fn test_empty_host_list_is_configuration_error() {
        let provider = MockProvider::new();

        let err = HostAllocator::allocate(
            &provider,
            &HostList::default(),
            &request(window(1, 30)),
            LIMITS,
            Utc::now(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BrokerError::Configuration(_)));
        assert!(provider.list_calls().is_empty());
    }

    #[tokio::test]
    async fn test_sub_minute_window_is_rejected_before_provider_calls() {
        let start = Utc::now() + Duration::hours(1);
        let w = TimeWindow::new(start, start + Duration::seconds(30)).unwrap();
        let provider = MockProvider::new();

        let err = HostAllocator::allocate(
            &provider,
            &HostList::new(["A"]),
            &request(w),
            LIMITS,
            Utc::now(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BrokerError::BadRequest(_)));
        assert!(provider.list_calls().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_stops_the_scan() {
        let provider = MockProvider::new().with_failing_host("A");
        let hosts = HostList::new(["A", "B"]);

        let err = HostAllocator::allocate(
            &provider,
            &hosts,
            &request(window(2, 30)),
            LIMITS,
            Utc::now(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BrokerError::Upstream { .. }));
        assert!(provider.list_calls().iter().all(|(h, _)| h == "A"));
        assert_eq!(provider.create_count(), 0);
    }

    #[tokio::test]
    async fn test_create_failure_is_not_masked_as_exhaustion() {
        let provider = MockProvider::new().failing_creates();
        let hosts = HostList::new(["A", "B"]);

        let err = HostAllocator::allocate(
            &provider,
            &hosts,
            &request(window(2, 30)),
            LIMITS,
            Utc::now(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BrokerError::Upstream { .. }));
        assert_eq!(provider.create_count(), 1);
    }
}
