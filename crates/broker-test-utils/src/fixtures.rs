//! Provider fixtures for wiremock-backed tests.
//!
//! Paths match what [`TestBrokerServer::spawn`](crate::TestBrokerServer::spawn)
//! configures: API calls under `/v2`, tokens from `/oauth/token`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path prefix of the provider REST API.
pub const API_PREFIX: &str = "/v2";

/// Access token handed out by [`mount_token`].
pub const TEST_TOKEN: &str = "test-access-token";

/// Provider API path for `segments`, e.g. `api_path("users/host-a/meetings")`.
pub fn api_path(segments: &str) -> String {
    format!("{API_PREFIX}/{}", segments.trim_start_matches('/'))
}

/// Serve a long-lived access token.
pub async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": TEST_TOKEN,
            "token_type": "bearer",
            "expires_in": 3600,
        })))
        .mount(server)
        .await;
}

/// Listing entry as the provider returns it.
pub fn meeting_json(id: u64, topic: &str, start: DateTime<Utc>, duration: u32) -> Value {
    json!({
        "id": id,
        "uuid": format!("uuid-{id}"),
        "topic": topic,
        "type": 2,
        "start_time": start.to_rfc3339_opts(SecondsFormat::Secs, true),
        "duration": duration,
        "timezone": "UTC",
        "join_url": format!("https://provider.test/j/{id}"),
    })
}

/// Serve one page of `meetings` for `host`'s `kind` listing.
pub async fn mount_meetings(server: &MockServer, host: &str, kind: &str, meetings: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path(api_path(&format!("users/{host}/meetings"))))
        .and(query_param("type", kind))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "page_size": meetings.len(),
            "total_records": meetings.len(),
            "next_page_token": "",
            "meetings": meetings,
        })))
        .mount(server)
        .await;
}

/// Serve empty live and upcoming listings for `host`.
pub async fn mount_idle_host(server: &MockServer, host: &str) {
    mount_meetings(server, host, "live", Vec::new()).await;
    mount_meetings(server, host, "upcoming", Vec::new()).await;
}

/// Accept meeting creation for `host`, answering with `id`.
///
/// The response echoes nothing from the request; tests that care about the
/// payload read it back from [`MockServer::received_requests`].
pub async fn mount_create_meeting(server: &MockServer, host: &str, id: u64, start: DateTime<Utc>) {
    Mock::given(method("POST"))
        .and(path(api_path(&format!("users/{host}/meetings"))))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": id,
            "topic": "created",
            "type": 2,
            "start_time": start.to_rfc3339_opts(SecondsFormat::Secs, true),
            "duration": 60,
            "join_url": format!("https://provider.test/j/{id}"),
            "start_url": format!("https://provider.test/s/{id}"),
        })))
        .mount(server)
        .await;
}

/// Bodies of every request the server received for `method_name` at `api`.
pub async fn received_json(server: &MockServer, method_name: &str, api: &str) -> Vec<Value> {
    let wanted = api_path(api);
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == method_name && r.url.path() == wanted)
        .filter_map(|r| serde_json::from_slice(&r.body).ok())
        .collect()
}
