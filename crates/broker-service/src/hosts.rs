//! Priority ordered host list.
//!
//! Read once at startup. The first source that yields at least one host wins:
//! the JSON file, then `ZOOM_HOSTS`, then `ZOOM_USER_ID`.

use crate::config::Config;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum HostListError {
    #[error("Failed to read host file {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Malformed host file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// Where the active host list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSource {
    File,
    EnvList,
    SingleUser,
    None,
}

/// Accepts both `["a","b"]` and `{"hosts":["a","b"]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum HostFile {
    Bare(Vec<String>),
    Wrapped { hosts: Vec<String> },
}

/// Immutable, priority ordered list of provider users that may host meetings.
#[derive(Debug, Clone, Default)]
pub struct HostList {
    hosts: Arc<[String]>,
}

impl HostList {
    /// Build from raw entries, trimming and dropping blanks. Order is kept.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts: Vec<String> = entries
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            hosts: hosts.into(),
        }
    }

    /// Resolve the host list for this process from `config`.
    ///
    /// A missing file falls through to the environment sources. A file that
    /// exists but cannot be read or parsed is fatal.
    pub fn load(config: &Config) -> Result<(Self, HostSource), HostListError> {
        let from_file = read_host_file(&config.hosts_file)?;
        if let Some(list) = from_file.filter(|l| !l.is_empty()) {
            info!(
                target: "broker.hosts",
                path = %config.hosts_file.display(),
                count = list.len(),
                "Host list loaded from file"
            );
            return Ok((list, HostSource::File));
        }

        let from_env = HostList::new(&config.env_hosts);
        if !from_env.is_empty() {
            info!(target: "broker.hosts", count = from_env.len(), "Host list loaded from ZOOM_HOSTS");
            return Ok((from_env, HostSource::EnvList));
        }

        if let Some(single) = config.single_user_id.as_deref() {
            let list = HostList::new([single]);
            if !list.is_empty() {
                info!(target: "broker.hosts", "Host list loaded from ZOOM_USER_ID");
                return Ok((list, HostSource::SingleUser));
            }
        }

        warn!(target: "broker.hosts", "No hosts configured; allocation and reports will fail");
        Ok((HostList::default(), HostSource::None))
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.hosts
    }
}

fn read_host_file(path: &Path) -> Result<Option<HostList>, HostListError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(target: "broker.hosts", path = %path.display(), "Host file not found");
            return Ok(None);
        }
        Err(e) => {
            return Err(HostListError::Read {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };

    let parsed: HostFile = serde_json::from_str(&raw).map_err(|e| HostListError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let entries = match parsed {
        HostFile::Bare(hosts) | HostFile::Wrapped { hosts } => hosts,
    };

    Ok(Some(HostList::new(entries)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn config_with(hosts_file: &Path, extra: &[(&str, &str)]) -> Config {
        let mut vars = HashMap::from([
            ("ZOOM_ACCOUNT_ID".to_string(), "acct".to_string()),
            ("ZOOM_CLIENT_ID".to_string(), "client".to_string()),
            ("ZOOM_CLIENT_SECRET".to_string(), "secret".to_string()),
            (
                "HOSTS_FILE".to_string(),
                hosts_file.to_string_lossy().to_string(),
            ),
        ]);
        for (k, v) in extra {
            vars.insert((*k).to_string(), (*v).to_string());
        }
        Config::from_vars(&vars).unwrap()
    }

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_new_trims_and_keeps_order() {
        let list = HostList::new([" b@x.com ", "", "a@x.com", "   "]);
        assert_eq!(list.as_slice(), ["b@x.com", "a@x.com"]);
    }

    #[test]
    fn test_load_bare_array_file() {
        let file = write_file(r#"["first@x.com", "second@x.com"]"#);
        let (list, source) = HostList::load(&config_with(file.path(), &[])).unwrap();

        assert_eq!(source, HostSource::File);
        assert_eq!(list.as_slice(), ["first@x.com", "second@x.com"]);
    }

    #[test]
    fn test_load_wrapped_file() {
        let file = write_file(r#"{"hosts": ["only@x.com"]}"#);
        let (list, source) = HostList::load(&config_with(file.path(), &[])).unwrap();

        assert_eq!(source, HostSource::File);
        assert_eq!(list.as_slice(), ["only@x.com"]);
    }

    #[test]
    fn test_file_wins_over_env() {
        let file = write_file(r#"["file@x.com"]"#);
        let config = config_with(
            file.path(),
            &[("ZOOM_HOSTS", "env@x.com"), ("ZOOM_USER_ID", "single@x.com")],
        );
        let (list, _) = HostList::load(&config).unwrap();

        assert_eq!(list.as_slice(), ["file@x.com"]);
    }

    #[test]
    fn test_missing_file_falls_back_to_env_list() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("hosts.json");
        let config = config_with(
            &missing,
            &[("ZOOM_HOSTS", "a@x.com,b@x.com"), ("ZOOM_USER_ID", "single@x.com")],
        );
        let (list, source) = HostList::load(&config).unwrap();

        assert_eq!(source, HostSource::EnvList);
        assert_eq!(list.as_slice(), ["a@x.com", "b@x.com"]);
    }

    #[test]
    fn test_empty_file_falls_back_to_single_user() {
        let file = write_file("[]");
        let config = config_with(file.path(), &[("ZOOM_USER_ID", "single@x.com")]);
        let (list, source) = HostList::load(&config).unwrap();

        assert_eq!(source, HostSource::SingleUser);
        assert_eq!(list.as_slice(), ["single@x.com"]);
    }

    #[test]
    fn test_nothing_configured_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let (list, source) = HostList::load(&config_with(&dir.path().join("none.json"), &[]))
            .unwrap();

        assert!(list.is_empty());
        assert_eq!(source, HostSource::None);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let file = write_file(r#"{"hosts": "not-a-list"}"#);
        let result = HostList::load(&config_with(file.path(), &[]));

        assert!(matches!(result, Err(HostListError::Malformed { .. })));
    }
}
