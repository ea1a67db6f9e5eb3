//! OAuth 2.0 account-credentials token cache.
//!
//! Acquires bearer tokens from the provider's token endpoint and reuses them
//! until they are about to expire.
//!
//! # Behavior
//!
//! - Tokens are fetched lazily on the first [`TokenCache::token`] call and
//!   again on the first call after `expires_in - refresh_margin` has elapsed.
//! - Refresh is single-flight: the cache holds an async mutex across the
//!   token request, so concurrent callers that observe an expired token wait
//!   for one refresh instead of issuing their own.
//! - There is no background renewal and no retry. A failed acquisition is
//!   returned to the caller and the next call tries again.
//!
//! # Example
//!
//! ```rust,ignore
//! use common::secret::SecretString;
//! use common::token_cache::{TokenCache, TokenCacheConfig};
//!
//! let config = TokenCacheConfig::new(
//!     "https://zoom.us/oauth/token".to_string(),
//!     "account-id".to_string(),
//!     "client-id".to_string(),
//!     SecretString::from("client-secret"),
//! );
//! let cache = TokenCache::new(config)?;
//!
//! let token = cache.token().await?;
//! let header = format!("Bearer {}", token.expose_secret());
//! ```

use crate::secret::{ExposeSecret, SecretString};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, trace, warn};

/// Default safety margin subtracted from the provider-reported lifetime.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout for HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifetime assumed when the token response omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Errors that can occur while acquiring a token.
#[derive(Error, Debug, Clone)]
pub enum TokenError {
    /// HTTP transport failure (connect, timeout, TLS).
    #[error("HTTP client error: {0}")]
    HttpError(String),

    /// Credentials rejected by the token endpoint (400, 401, 403).
    #[error("Authentication rejected: {0}")]
    AuthenticationRejected(String),

    /// Token response could not be parsed.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Configuration for the token cache.
#[derive(Clone)]
pub struct TokenCacheConfig {
    /// Token endpoint URL (e.g., `https://zoom.us/oauth/token`).
    pub token_url: String,

    /// Provider account the credentials belong to.
    pub account_id: String,

    /// OAuth client ID.
    pub client_id: String,

    /// OAuth client secret.
    pub client_secret: SecretString,

    /// Treat tokens as expired this long before the provider says they are.
    pub refresh_margin: Duration,

    /// HTTP request timeout.
    pub http_timeout: Duration,
}

impl std::fmt::Debug for TokenCacheConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCacheConfig")
            .field("token_url", &self.token_url)
            .field("account_id", &self.account_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("refresh_margin", &self.refresh_margin)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl TokenCacheConfig {
    /// Create a configuration with the default margin and timeout.
    #[must_use]
    pub fn new(
        token_url: String,
        account_id: String,
        client_id: String,
        client_secret: SecretString,
    ) -> Self {
        Self {
            token_url,
            account_id,
            client_id,
            client_secret,
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Set the refresh margin.
    #[must_use]
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

/// Token response from the provider's OAuth endpoint.
#[derive(Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl std::fmt::Debug for OAuthTokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

struct CachedToken {
    token: SecretString,
    valid_until: DateTime<Utc>,
}

/// Process-wide bearer token cache for the provider API.
pub struct TokenCache {
    config: TokenCacheConfig,
    http_client: reqwest::Client,
    current: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("config", &self.config)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl TokenCache {
    /// Build a cache with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Configuration` if credentials are blank or the
    /// HTTP client cannot be built.
    pub fn new(config: TokenCacheConfig) -> Result<Self, TokenError> {
        if config.account_id.trim().is_empty()
            || config.client_id.trim().is_empty()
            || config.client_secret.expose_secret().trim().is_empty()
        {
            return Err(TokenError::Configuration(
                "account_id, client_id and client_secret are required".into(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TokenError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http_client,
            current: Mutex::new(None),
        })
    }

    /// Return a valid bearer token, fetching a new one if the cached token
    /// is missing or past its refresh point.
    ///
    /// # Errors
    ///
    /// Propagates any acquisition failure; nothing is cached in that case.
    #[instrument(skip_all)]
    pub async fn token(&self) -> Result<SecretString, TokenError> {
        let mut current = self.current.lock().await;

        if let Some(cached) = current.as_ref() {
            if Utc::now() < cached.valid_until {
                trace!(target: "common.token_cache", "Reusing cached token");
                return Ok(cached.token.clone());
            }
        }

        let refreshed = acquire_token(&self.config, &self.http_client).await?;
        let token = refreshed.token.clone();

        if current.is_none() {
            info!(
                target: "common.token_cache",
                client_id = %self.config.client_id,
                valid_until = %refreshed.valid_until,
                "Initial token acquired"
            );
        } else {
            debug!(
                target: "common.token_cache",
                client_id = %self.config.client_id,
                valid_until = %refreshed.valid_until,
                "Token refreshed"
            );
        }

        *current = Some(refreshed);
        Ok(token)
    }

    /// Drop the cached token if it is still `rejected`, so the next call
    /// fetches a fresh one. A token refreshed by another caller is kept.
    ///
    /// Returns `true` when the cached token was dropped.
    pub async fn invalidate(&self, rejected: &SecretString) -> bool {
        let mut current = self.current.lock().await;
        let is_rejected = current
            .as_ref()
            .is_some_and(|cached| cached.token.expose_secret() == rejected.expose_secret());

        if is_rejected {
            debug!(target: "common.token_cache", "Dropping rejected token");
            *current = None;
        }
        is_rejected
    }
}

/// Request a new token using the account-credentials grant.
#[instrument(skip_all)]
async fn acquire_token(
    config: &TokenCacheConfig,
    http_client: &reqwest::Client,
) -> Result<CachedToken, TokenError> {
    debug!(
        target: "common.token_cache",
        client_id = %config.client_id,
        url = %config.token_url,
        "Requesting provider token"
    );

    let response = http_client
        .post(&config.token_url)
        .query(&[
            ("grant_type", "account_credentials"),
            ("account_id", config.account_id.as_str()),
        ])
        .basic_auth(
            &config.client_id,
            Some(config.client_secret.expose_secret()),
        )
        .send()
        .await
        .map_err(|e| {
            debug!(target: "common.token_cache", error = %e, "HTTP request failed");
            TokenError::HttpError(e.to_string())
        })?;

    let status = response.status();

    if status.is_success() {
        let token_response: OAuthTokenResponse = response.json().await.map_err(|e| {
            warn!(target: "common.token_cache", error = %e, "Failed to parse token response");
            TokenError::InvalidResponse(e.to_string())
        })?;

        if token_response.access_token.is_empty() {
            return Err(TokenError::InvalidResponse("empty access_token".into()));
        }

        let expires_in = token_response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let lifetime = expires_in.saturating_sub(config.refresh_margin.as_secs());
        #[allow(clippy::cast_possible_wrap)]
        let valid_until = Utc::now() + chrono::Duration::seconds(lifetime as i64);

        Ok(CachedToken {
            token: SecretString::from(token_response.access_token),
            valid_until,
        })
    } else if matches!(status.as_u16(), 400 | 401 | 403) {
        let body = response.text().await.unwrap_or_else(|e| {
            trace!(target: "common.token_cache", error = %e, "Failed to read error response body");
            "<failed to read body>".to_string()
        });
        warn!(
            target: "common.token_cache",
            status = %status,
            "Credentials rejected by token endpoint"
        );
        trace!(
            target: "common.token_cache",
            body = %body,
            "Token rejection response body"
        );
        Err(TokenError::AuthenticationRejected(format!("Status {status}")))
    } else {
        warn!(
            target: "common.token_cache",
            status = %status,
            "Unexpected response from token endpoint"
        );
        Err(TokenError::HttpError(format!("Unexpected status: {status}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> TokenCacheConfig {
        TokenCacheConfig::new(
            format!("{base_url}/oauth/token"),
            "acct-1".to_string(),
            "client-1".to_string(),
            SecretString::from("secret-1"),
        )
    }

    fn token_body(token: &str, expires_in: u64) -> serde_json::Value {
        serde_json::json!({
            "access_token": token,
            "token_type": "bearer",
            "expires_in": expires_in,
            "scope": "meeting:read meeting:write"
        })
    }

    #[test]
    fn test_config_defaults() {
        let config = test_config("http://localhost");
        assert_eq!(config.refresh_margin, DEFAULT_REFRESH_MARGIN);
        assert_eq!(config.http_timeout, DEFAULT_HTTP_TIMEOUT);
    }

    #[test]
    fn test_config_debug_redacts_secret() {
        let debug_str = format!("{:?}", test_config("http://localhost"));
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("secret-1"));
    }

    #[test]
    fn test_blank_credentials_rejected() {
        let mut config = test_config("http://localhost");
        config.account_id = "  ".to_string();

        let result = TokenCache::new(config);
        assert!(matches!(result, Err(TokenError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_token_is_fetched_with_account_credentials_grant() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(query_param("grant_type", "account_credentials"))
            .and(query_param("account_id", "acct-1"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-a", 3600)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let cache = TokenCache::new(test_config(&mock_server.uri())).unwrap();
        let token = cache.token().await.unwrap();

        assert_eq!(token.expose_secret(), "tok-a");
    }

    #[tokio::test]
    async fn test_token_is_reused_until_expiry() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-a", 3600)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let cache = TokenCache::new(test_config(&mock_server.uri())).unwrap();

        for _ in 0..5 {
            assert_eq!(cache.token().await.unwrap().expose_secret(), "tok-a");
        }
    }

    #[tokio::test]
    async fn test_token_within_margin_is_refreshed() {
        let mock_server = MockServer::start().await;
        let call_count = Arc::new(AtomicU32::new(0));
        let counter = call_count.clone();

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(move |_: &wiremock::Request| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                // Lifetime shorter than the 60s margin: always stale.
                ResponseTemplate::new(200).set_body_json(token_body(&format!("tok-{n}"), 30))
            })
            .mount(&mock_server)
            .await;

        let cache = TokenCache::new(test_config(&mock_server.uri())).unwrap();

        assert_eq!(cache.token().await.unwrap().expose_secret(), "tok-0");
        assert_eq!(cache.token().await.unwrap().expose_secret(), "tok-1");
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("shared", 3600))
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let cache = Arc::new(TokenCache::new(test_config(&mock_server.uri())).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.token().await })
            })
            .collect();

        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token.expose_secret(), "shared");
        }
    }

    #[tokio::test]
    async fn test_missing_expires_in_uses_default_lifetime() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "access_token": "no-expiry" })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let cache = TokenCache::new(test_config(&mock_server.uri())).unwrap();
        cache.token().await.unwrap();
        assert_eq!(cache.token().await.unwrap().expose_secret(), "no-expiry");
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok", 3600)))
            .expect(2)
            .mount(&mock_server)
            .await;

        let cache = TokenCache::new(test_config(&mock_server.uri())).unwrap();
        let rejected = cache.token().await.unwrap();
        assert!(cache.invalidate(&rejected).await);
        cache.token().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalidate_keeps_newer_token() {
        let mock_server = MockServer::start().await;
        let call_count = Arc::new(AtomicU32::new(0));
        let counter = call_count.clone();

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(move |_: &wiremock::Request| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                ResponseTemplate::new(200).set_body_json(token_body(&format!("tok-{n}"), 3600))
            })
            .mount(&mock_server)
            .await;

        let cache = TokenCache::new(test_config(&mock_server.uri())).unwrap();
        let stale = cache.token().await.unwrap();

        // Another caller already replaced the rejected token.
        assert!(cache.invalidate(&stale).await);
        let fresh = cache.token().await.unwrap();
        assert_eq!(fresh.expose_secret(), "tok-1");

        // A late rejection of the old token leaves the fresh one cached.
        assert!(!cache.invalidate(&stale).await);
        assert_eq!(cache.token().await.unwrap().expose_secret(), "tok-1");
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_401_is_authentication_rejected() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(401).set_body_string(r#"{"reason":"Invalid client_id or client_secret"}"#),
            )
            .mount(&mock_server)
            .await;

        let cache = TokenCache::new(test_config(&mock_server.uri())).unwrap();
        let result = cache.token().await;

        assert!(matches!(result, Err(TokenError::AuthenticationRejected(_))));
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("recovered", 3600)))
            .mount(&mock_server)
            .await;

        let cache = TokenCache::new(test_config(&mock_server.uri())).unwrap();

        assert!(matches!(cache.token().await, Err(TokenError::HttpError(_))));
        assert_eq!(cache.token().await.unwrap().expose_secret(), "recovered");
    }

    #[tokio::test]
    async fn test_invalid_json_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let cache = TokenCache::new(test_config(&mock_server.uri())).unwrap();
        assert!(matches!(
            cache.token().await,
            Err(TokenError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_http_timeout_is_http_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("slow", 3600))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let config =
            test_config(&mock_server.uri()).with_http_timeout(Duration::from_millis(100));
        let cache = TokenCache::new(config).unwrap();

        assert!(matches!(cache.token().await, Err(TokenError::HttpError(_))));
    }

    #[test]
    fn test_oauth_response_debug_redacts_token() {
        let response = OAuthTokenResponse {
            access_token: "super-secret-access-token".to_string(),
            expires_in: Some(3600),
        };

        let debug_str = format!("{response:?}");
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("super-secret-access-token"));
        assert!(debug_str.contains("3600"));
    }
}
