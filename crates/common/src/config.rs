//! Shared configuration types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default log filter when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "broker_service=debug,tower_http=debug";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human readable, one line per event.
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log filter directive (`RUST_LOG` syntax)
    pub log_filter: String,
    /// Log line format
    pub log_format: LogFormat,
}

impl ObservabilityConfig {
    /// Read `RUST_LOG` and `LOG_FORMAT` from a variable map.
    ///
    /// Unknown `LOG_FORMAT` values fall back to [`LogFormat::Pretty`].
    #[must_use]
    pub fn from_vars(vars: &HashMap<String, String>) -> Self {
        let log_filter = vars
            .get("RUST_LOG")
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let log_format = match vars.get("LOG_FORMAT").map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self {
            log_filter,
            log_format,
        }
    }

    /// Read from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(&std::env::vars().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_unset() {
        let config = ObservabilityConfig::from_vars(&HashMap::new());
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_json_format_is_case_insensitive() {
        let vars = HashMap::from([("LOG_FORMAT".to_string(), "JSON".to_string())]);
        let config = ObservabilityConfig::from_vars(&vars);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_blank_filter_uses_default() {
        let vars = HashMap::from([("RUST_LOG".to_string(), "  ".to_string())]);
        let config = ObservabilityConfig::from_vars(&vars);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_custom_filter() {
        let vars = HashMap::from([("RUST_LOG".to_string(), "info".to_string())]);
        let config = ObservabilityConfig::from_vars(&vars);
        assert_eq!(config.log_filter, "info");
    }
}
