//! Test server harness for E2E testing
//!
//! Provides `TestBrokerServer` for spawning real broker instances in tests.

use broker_service::config::Config;
use broker_service::hosts::HostList;
use broker_service::routes::{self, AppState};
use broker_service::services::{ProviderApi, ProviderClient};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Host file path that never exists, so tests only see the hosts they pass.
const MISSING_HOSTS_FILE: &str = "/nonexistent/broker-test-hosts.json";

/// Test harness for spawning the broker in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_allocation_e2e() -> Result<(), anyhow::Error> {
///     let provider = wiremock::MockServer::start().await;
///     let server = TestBrokerServer::spawn(&provider.uri(), &["host-a"]).await?;
///
///     let response = reqwest::Client::new()
///         .post(format!("{}/api/meetings/auto", server.url()))
///         .json(&serde_json::json!({ "topic": "standup" }))
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 400);
///     Ok(())
/// }
/// ```
pub struct TestBrokerServer {
    addr: SocketAddr,
    config: Config,
    _handle: JoinHandle<()>,
}

impl TestBrokerServer {
    /// Spawn a broker that talks to a provider at `provider_base_url`.
    ///
    /// The provider API is expected under `/v2` and the token endpoint at
    /// `/oauth/token`, which is how [`crate::fixtures`] mounts them.
    pub async fn spawn(provider_base_url: &str, hosts: &[&str]) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(provider_base_url, hosts, &[]).await
    }

    /// Like [`spawn`](Self::spawn) with extra environment variables, e.g.
    /// `MAX_CONCURRENT`.
    pub async fn spawn_with_vars(
        provider_base_url: &str,
        hosts: &[&str],
        extra: &[(&str, &str)],
    ) -> Result<Self, anyhow::Error> {
        let config = test_config(provider_base_url, extra)?;
        let provider = ProviderClient::from_config(&config)
            .map_err(|e| anyhow::anyhow!("Failed to create provider client: {}", e))?;

        Self::start(config, Arc::new(provider), hosts).await
    }

    /// Spawn a broker backed by an in-process provider, e.g.
    /// [`MockProvider`](broker_service::services::MockProvider).
    pub async fn spawn_with_provider(
        provider: Arc<dyn ProviderApi>,
        hosts: &[&str],
    ) -> Result<Self, anyhow::Error> {
        let config = test_config("http://127.0.0.1:9", &[])?;
        Self::start(config, provider, hosts).await
    }

    async fn start(
        config: Config,
        provider: Arc<dyn ProviderApi>,
        hosts: &[&str],
    ) -> Result<Self, anyhow::Error> {
        let state = Arc::new(AppState {
            config: config.clone(),
            provider,
            hosts: HostList::new(hosts),
        });

        // Per-server recorder; the global one can only be installed once.
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for TestBrokerServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

fn test_config(provider_base_url: &str, extra: &[(&str, &str)]) -> Result<Config, anyhow::Error> {
    let base = provider_base_url.trim_end_matches('/');
    let mut vars = HashMap::from([
        ("ZOOM_ACCOUNT_ID".to_string(), "test-account".to_string()),
        ("ZOOM_CLIENT_ID".to_string(), "test-client".to_string()),
        ("ZOOM_CLIENT_SECRET".to_string(), "test-secret".to_string()),
        ("ZOOM_API_BASE_URL".to_string(), format!("{base}/v2")),
        ("ZOOM_OAUTH_URL".to_string(), format!("{base}/oauth/token")),
        ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ("TZ_DEFAULT".to_string(), "America/Lima".to_string()),
        ("HOSTS_FILE".to_string(), MISSING_HOSTS_FILE.to_string()),
        ("PROVIDER_HTTP_TIMEOUT_SECONDS".to_string(), "2".to_string()),
    ]);
    for (key, value) in extra {
        vars.insert((*key).to_string(), (*value).to_string());
    }

    Config::from_vars(&vars).map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))
}
