//! Report integration tests.
//!
//! - `GET /api/meetings/last-by-topic`
//! - `GET /api/meetings/hosts`
//! - `GET /api/recordings`
//!
//! Backed by the in-process `MockProvider` so fan-out order and host
//! overrides can be checked without a network provider.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

use broker_service::models::{JsonObject, MeetingListKind};
use broker_service::services::provider_client::mock::meeting;
use broker_service::services::MockProvider;
use broker_test_utils::TestBrokerServer;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn object(value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

async fn get_json(server: &TestBrokerServer, path_and_query: &str) -> (u16, Value) {
    let response = reqwest::get(format!("{}{}", server.url(), path_and_query))
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_last_by_topic_picks_latest_end_across_hosts() -> Result<(), anyhow::Error> {
    let provider = MockProvider::new()
        .with_meetings(
            "host-a",
            MeetingListKind::Scheduled,
            vec![
                meeting(1, "Retro", at("2031-03-01T15:00:00Z"), Some(60)),
                meeting(2, "Design review", at("2031-03-02T15:00:00Z"), Some(30)),
            ],
        )
        .with_meetings(
            "host-b",
            MeetingListKind::Scheduled,
            vec![
                meeting(3, "Retro", at("2031-03-08T15:00:00Z"), Some(60)),
                meeting(4, "", at("2031-03-09T15:00:00Z"), Some(60)),
            ],
        );

    let server =
        TestBrokerServer::spawn_with_provider(Arc::new(provider), &["host-a", "host-b"]).await?;
    let (status, body) = get_json(&server, "/api/meetings/last-by-topic").await;

    assert_eq!(status, 200);
    assert_eq!(body["total"], 2);
    assert_eq!(body["meetings"][0]["topic"], "Retro");
    assert_eq!(body["meetings"][0]["meeting_id"], 3);
    assert_eq!(body["meetings"][0]["user_id"], "host-b");
    assert_eq!(body["meetings"][0]["end_time"], "2031-03-08T16:00:00Z");
    assert_eq!(body["meetings"][1]["topic"], "Design review");

    Ok(())
}

#[tokio::test]
async fn test_hosts_override_replaces_configured_list() -> Result<(), anyhow::Error> {
    let provider = Arc::new(
        MockProvider::new()
            .with_meetings(
                "configured",
                MeetingListKind::Scheduled,
                vec![meeting(1, "Configured", at("2031-03-01T15:00:00Z"), Some(60))],
            )
            .with_meetings(
                "other",
                MeetingListKind::Scheduled,
                vec![meeting(2, "Other", at("2031-03-01T15:00:00Z"), Some(60))],
            ),
    );

    let server = TestBrokerServer::spawn_with_provider(provider.clone(), &["configured"]).await?;
    let (status, body) = get_json(&server, "/api/meetings/last-by-topic?hosts=other").await;

    assert_eq!(status, 200);
    assert_eq!(body["total"], 1);
    assert_eq!(body["meetings"][0]["user_id"], "other");

    let hosts: Vec<String> = provider.list_calls().into_iter().map(|(h, _)| h).collect();
    assert_eq!(hosts, vec!["other".to_string()]);

    Ok(())
}

#[tokio::test]
async fn test_meetings_in_range_filters_and_sorts() -> Result<(), anyhow::Error> {
    // Lima is UTC-5: local 2031-03-01 covers 05:00Z to 05:00Z the next day.
    let provider = MockProvider::new()
        .with_meetings(
            "host-a",
            MeetingListKind::Upcoming,
            vec![
                meeting(1, "Budget review", at("2031-03-01T20:00:00Z"), Some(30)),
                meeting(2, "Budget prep", at("2031-03-02T04:30:00Z"), Some(30)),
                meeting(3, "Budget late", at("2031-03-02T05:00:00Z"), Some(30)),
            ],
        )
        .with_meetings(
            "host-b",
            MeetingListKind::Upcoming,
            vec![
                meeting(4, "budget kickoff", at("2031-03-01T13:00:00Z"), Some(45)),
                meeting(5, "Lunch", at("2031-03-01T17:00:00Z"), Some(60)),
            ],
        );

    let server =
        TestBrokerServer::spawn_with_provider(Arc::new(provider), &["host-a", "host-b"]).await?;
    let (status, body) = get_json(
        &server,
        "/api/meetings/hosts?from=2031-03-01&to=2031-03-01&q=BUDGET",
    )
    .await;

    assert_eq!(status, 200);
    let ids: Vec<u64> = body["meetings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![4, 1, 2]);
    assert_eq!(body["total"], 3);

    let first = &body["meetings"][0];
    assert_eq!(first["host"], "host-b");
    assert_eq!(first["start_time"], "2031-03-01T13:00:00Z");
    assert_eq!(first["start_local"], "2031-03-01 08:00");
    assert_eq!(first["end_local"], "2031-03-01 08:45");
    assert_eq!(first["timezone"], "America/Lima");

    Ok(())
}

#[tokio::test]
async fn test_meetings_in_range_uses_requested_type() -> Result<(), anyhow::Error> {
    let provider = Arc::new(MockProvider::new().with_meetings(
        "host-a",
        MeetingListKind::PreviousMeetings,
        vec![meeting(9, "Old", at("2031-01-01T15:00:00Z"), Some(30))],
    ));

    let server = TestBrokerServer::spawn_with_provider(provider.clone(), &["host-a"]).await?;
    let (status, body) = get_json(&server, "/api/meetings/hosts?type=previous_meetings").await;

    assert_eq!(status, 200);
    assert_eq!(body["meetings"][0]["id"], 9);
    assert_eq!(
        provider.list_calls(),
        vec![("host-a".to_string(), MeetingListKind::PreviousMeetings)]
    );

    Ok(())
}

#[tokio::test]
async fn test_meetings_in_range_rejects_bad_input() -> Result<(), anyhow::Error> {
    let server =
        TestBrokerServer::spawn_with_provider(Arc::new(MockProvider::new()), &["host-a"]).await?;

    for query in [
        "type=weekly",
        "from=yesterday",
        "from=2031-03-02&to=2031-03-01",
        "timezone=Nowhere/City",
    ] {
        let (status, body) = get_json(&server, &format!("/api/meetings/hosts?{query}")).await;
        assert_eq!(status, 400, "query {query} should be rejected");
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }

    Ok(())
}

#[tokio::test]
async fn test_report_provider_failure_fails_whole_report() -> Result<(), anyhow::Error> {
    let provider = MockProvider::new()
        .with_meetings(
            "host-a",
            MeetingListKind::Scheduled,
            vec![meeting(1, "Fine", at("2031-03-01T15:00:00Z"), Some(60))],
        )
        .with_failing_host("host-b");

    let server =
        TestBrokerServer::spawn_with_provider(Arc::new(provider), &["host-a", "host-b"]).await?;
    let (status, body) = get_json(&server, "/api/meetings/last-by-topic").await;

    assert_eq!(status, 500);
    assert_eq!(body["error"]["code"], "UPSTREAM_ERROR");

    Ok(())
}

#[tokio::test]
async fn test_recordings_tagged_with_host_and_summarized() -> Result<(), anyhow::Error> {
    let provider = MockProvider::new()
        .with_recordings(
            "host-a",
            vec![
                object(json!({"uuid": "r1", "topic": "Retro", "recording_count": 2})),
                object(json!({"uuid": "r2", "topic": "Demo", "recording_count": 1})),
            ],
        )
        .with_recordings(
            "host-b",
            vec![object(json!({"uuid": "r3", "topic": "Sync"}))],
        );

    let server = TestBrokerServer::spawn_with_provider(
        Arc::new(provider),
        &["host-a", "host-b", "host-c"],
    )
    .await?;
    let (status, body) = get_json(&server, "/api/recordings?from=2031-03-01&to=2031-03-31").await;

    assert_eq!(status, 200);
    assert_eq!(body["total"], 3);
    assert_eq!(body["items"][0]["host"], "host-a");
    assert_eq!(body["items"][0]["uuid"], "r1");
    assert_eq!(body["items"][0]["recording_count"], 2);
    assert_eq!(body["items"][2]["host"], "host-b");
    assert_eq!(
        body["summary"],
        json!([
            {"host": "host-a", "count": 2},
            {"host": "host-b", "count": 1},
            {"host": "host-c", "count": 0},
        ])
    );

    Ok(())
}

#[tokio::test]
async fn test_recordings_require_valid_dates() -> Result<(), anyhow::Error> {
    let provider = Arc::new(MockProvider::new());
    let server = TestBrokerServer::spawn_with_provider(provider.clone(), &["host-a"]).await?;

    for query in [
        "",
        "?from=2031-03-01",
        "?from=03/01/2031&to=2031-03-02",
        "?from=2031-03-05&to=2031-03-01",
    ] {
        let (status, _) = get_json(&server, &format!("/api/recordings{query}")).await;
        assert_eq!(status, 400, "query '{query}' should be rejected");
    }

    assert_eq!(provider.recording_calls(), 0);

    Ok(())
}
