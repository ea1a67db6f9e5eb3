//! Broker service configuration.
//!
//! Configuration is loaded from environment variables. The provider client
//! secret is redacted in Debug output.

use chrono_tz::Tz;
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

/// Default IANA timezone for requests that do not name one.
pub const DEFAULT_TIMEZONE: &str = "America/Lima";

/// Default provider REST base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.zoom.us/v2";

/// Default provider OAuth token endpoint.
pub const DEFAULT_OAUTH_URL: &str = "https://zoom.us/oauth/token";

/// Default location of the priority ordered host list.
pub const DEFAULT_HOSTS_FILE: &str = "config/hosts.json";

/// Default per-host concurrency limit.
pub const DEFAULT_MAX_CONCURRENT: usize = 2;

/// Default page size for report listings.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Default page size for overlap detection listings.
pub const DEFAULT_OVERLAP_PAGE_SIZE: u32 = 30;

/// Largest page size the provider accepts.
pub const MAX_PAGE_SIZE: u32 = 300;

/// Default outbound request timeout in seconds.
pub const DEFAULT_PROVIDER_HTTP_TIMEOUT_SECONDS: u64 = 10;

/// Default token refresh margin in seconds.
pub const DEFAULT_TOKEN_REFRESH_MARGIN_SECONDS: u64 = 60;

/// Broker service configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:3000").
    pub bind_address: String,

    /// Timezone applied when a request omits one.
    pub default_timezone: Tz,

    /// Provider account for the account-credentials grant.
    pub account_id: String,

    /// OAuth client ID.
    pub client_id: String,

    /// OAuth client secret.
    pub client_secret: SecretString,

    /// Provider REST base URL, without trailing slash.
    pub api_base_url: String,

    /// Provider OAuth token endpoint.
    pub oauth_url: String,

    /// Single-host fallback (`ZOOM_USER_ID`).
    pub single_user_id: Option<String>,

    /// Comma separated host fallback (`ZOOM_HOSTS`).
    pub env_hosts: Vec<String>,

    /// Path of the JSON host list.
    pub hosts_file: PathBuf,

    /// Maximum simultaneous meetings per host.
    pub max_concurrent: usize,

    /// Page size for report listings.
    pub page_size: u32,

    /// Page size for overlap detection listings.
    pub overlap_page_size: u32,

    /// Timeout applied to every provider call.
    pub provider_http_timeout: Duration,

    /// Tokens are refreshed this long before the provider expiry.
    pub token_refresh_margin: Duration,

    /// Seconds to wait after a shutdown signal before stopping.
    pub drain_seconds: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("default_timezone", &self.default_timezone)
            .field("account_id", &self.account_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("oauth_url", &self.oauth_url)
            .field("single_user_id", &self.single_user_id)
            .field("env_hosts", &self.env_hosts)
            .field("hosts_file", &self.hosts_file)
            .field("max_concurrent", &self.max_concurrent)
            .field("page_size", &self.page_size)
            .field("overlap_page_size", &self.overlap_page_size)
            .field("provider_http_timeout", &self.provider_http_timeout)
            .field("token_refresh_margin", &self.token_refresh_margin)
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid concurrency limit: {0}")]
    InvalidMaxConcurrent(String),

    #[error("Invalid page size: {0}")]
    InvalidPageSize(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let account_id = required(vars, "ZOOM_ACCOUNT_ID")?;
        let client_id = required(vars, "ZOOM_CLIENT_ID")?;
        let client_secret = SecretString::from(required(vars, "ZOOM_CLIENT_SECRET")?);

        let bind_address = optional(vars, "BIND_ADDRESS")
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let tz_name =
            optional(vars, "TZ_DEFAULT").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let default_timezone = Tz::from_str(&tz_name).map_err(|_| {
            ConfigError::InvalidTimezone(format!(
                "TZ_DEFAULT must be an IANA timezone name, got '{tz_name}'"
            ))
        })?;

        let api_base_url = optional(vars, "ZOOM_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let oauth_url =
            optional(vars, "ZOOM_OAUTH_URL").unwrap_or_else(|| DEFAULT_OAUTH_URL.to_string());

        let single_user_id = optional(vars, "ZOOM_USER_ID");

        let env_hosts = vars
            .get("ZOOM_HOSTS")
            .map(|raw| split_hosts(raw))
            .unwrap_or_default();

        let hosts_file = PathBuf::from(
            optional(vars, "HOSTS_FILE").unwrap_or_else(|| DEFAULT_HOSTS_FILE.to_string()),
        );

        let max_concurrent = if let Some(value_str) = optional(vars, "MAX_CONCURRENT") {
            let value: usize = value_str.parse().map_err(|e| {
                ConfigError::InvalidMaxConcurrent(format!(
                    "MAX_CONCURRENT must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidMaxConcurrent(
                    "MAX_CONCURRENT must be greater than 0".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_MAX_CONCURRENT
        };

        let page_size = parse_page_size(vars, "ZOOM_PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        let overlap_page_size =
            parse_page_size(vars, "OVERLAP_PAGE_SIZE", DEFAULT_OVERLAP_PAGE_SIZE)?;

        let timeout_secs = parse_seconds(
            vars,
            "PROVIDER_HTTP_TIMEOUT_SECONDS",
            DEFAULT_PROVIDER_HTTP_TIMEOUT_SECONDS,
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidDuration(
                "PROVIDER_HTTP_TIMEOUT_SECONDS must be greater than 0".to_string(),
            ));
        }

        let margin_secs = parse_seconds(
            vars,
            "TOKEN_REFRESH_MARGIN_SECONDS",
            DEFAULT_TOKEN_REFRESH_MARGIN_SECONDS,
        )?;

        let drain_seconds = parse_seconds(vars, "BROKER_DRAIN_SECONDS", 0)?;

        Ok(Config {
            bind_address,
            default_timezone,
            account_id,
            client_id,
            client_secret,
            api_base_url,
            oauth_url,
            single_user_id,
            env_hosts,
            hosts_file,
            max_concurrent,
            page_size,
            overlap_page_size,
            provider_http_timeout: Duration::from_secs(timeout_secs),
            token_refresh_margin: Duration::from_secs(margin_secs),
            drain_seconds,
        })
    }
}

/// Split a comma separated host list, trimming entries and dropping empties.
pub fn split_hosts(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn optional(vars: &HashMap<String, String>, key: &str) -> Option<String> {
    vars.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required(vars: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    optional(vars, key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_page_size(
    vars: &HashMap<String, String>,
    key: &str,
    default: u32,
) -> Result<u32, ConfigError> {
    let Some(value_str) = optional(vars, key) else {
        return Ok(default);
    };

    let value: u32 = value_str.parse().map_err(|e| {
        ConfigError::InvalidPageSize(format!(
            "{key} must be a valid positive integer, got '{value_str}': {e}"
        ))
    })?;

    if value == 0 || value > MAX_PAGE_SIZE {
        return Err(ConfigError::InvalidPageSize(format!(
            "{key} must be between 1 and {MAX_PAGE_SIZE}, got {value}"
        )));
    }

    Ok(value)
}

fn parse_seconds(
    vars: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match optional(vars, key) {
        Some(value_str) => value_str.parse().map_err(|e| {
            ConfigError::InvalidDuration(format!(
                "{key} must be a whole number of seconds, got '{value_str}': {e}"
            ))
        }),
        None => Ok(default),
    }
}
