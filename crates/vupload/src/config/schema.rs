use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default = "default_progress_capacity")]
    pub progress_capacity: usize,
    /// How often upload progress is sampled while a transfer runs.
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

fn default_progress_capacity() -> usize {
    256
}

fn default_progress_interval_ms() -> u64 {
    500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            api: ApiConfig::default(),
            storage: StorageConfig::default(),
            progress_capacity: default_progress_capacity(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Sent with every request, e.g. `Authorization` or `Accept`.
    #[serde(default = "default_headers")]
    pub default_headers: HashMap<String, String>,
}

fn default_base_url() -> String {
    "https://api.vimeo.com".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    300
}

fn default_user_agent() -> String {
    format!("vupload/{}", env!("CARGO_PKG_VERSION"))
}

fn default_headers() -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert(
        "Accept".to_string(),
        "application/vnd.vimeo.*+json;version=3.4".to_string(),
    );
    headers
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
            default_headers: default_headers(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Falls back to `~/.vupload/data/vupload.db` when unset.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        self.database_path
            .clone()
            .or_else(crate::db::default_database_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"version": "1.0"}"#).unwrap();
        assert_eq!(config.api.base_url, "https://api.vimeo.com");
        assert_eq!(config.api.connect_timeout_secs, 10);
        assert_eq!(config.api.request_timeout_secs, 300);
        assert_eq!(config.progress_capacity, 256);
        assert!(config.api.default_headers.contains_key("Accept"));
        assert!(config.storage.database_path.is_none());
    }

    #[test]
    fn test_explicit_database_path_wins() {
        let storage = StorageConfig {
            database_path: Some(PathBuf::from("/tmp/jobs.db")),
        };
        assert_eq!(
            storage.resolved_database_path(),
            Some(PathBuf::from("/tmp/jobs.db"))
        );
    }

    #[test]
    fn test_user_agent_has_version() {
        assert!(ApiConfig::default().user_agent.starts_with("vupload/"));
    }
}
