//! Health endpoint integration tests.
//!
//! Tests the `/health` (liveness), `/ready` (readiness) and `/metrics`
//! endpoints using the `TestBrokerServer` harness.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use broker_service::services::MockProvider;
use broker_test_utils::TestBrokerServer;
use std::sync::Arc;

async fn spawn(hosts: &[&str]) -> Result<TestBrokerServer, anyhow::Error> {
    TestBrokerServer::spawn_with_provider(Arc::new(MockProvider::new()), hosts).await
}

/// `/health` returns plain text "OK" for liveness probes.
#[tokio::test]
async fn test_health_endpoint_returns_200() -> Result<(), anyhow::Error> {
    let server = spawn(&["host-a"]).await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await?, "OK");

    Ok(())
}

#[tokio::test]
async fn test_ready_reports_host_count() -> Result<(), anyhow::Error> {
    let server = spawn(&["host-a", "host-b"]).await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(response.status(), 200);

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    assert!(
        content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("application/json")),
        "Expected application/json content type, got {:?}",
        content_type
    );

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["hosts"], 2);
    assert!(body.get("error").is_none());

    Ok(())
}

#[tokio::test]
async fn test_ready_without_hosts_is_unavailable() -> Result<(), anyhow::Error> {
    let server = spawn(&[]).await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(response.status(), 503);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "not_ready");
    assert_eq!(body["error"], "No hosts configured");

    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_serves_text() -> Result<(), anyhow::Error> {
    let server = spawn(&["host-a"]).await?;

    let response = reqwest::get(format!("{}/metrics", server.url())).await?;

    assert_eq!(response.status(), 200);
    // Content may be empty: the per-server recorder is not the global one.
    let _ = response.text().await?;

    Ok(())
}

#[tokio::test]
async fn test_unknown_route_is_404() -> Result<(), anyhow::Error> {
    let server = spawn(&["host-a"]).await?;

    let response = reqwest::get(format!("{}/api/nope", server.url())).await?;

    assert_eq!(response.status(), 404);

    Ok(())
}
