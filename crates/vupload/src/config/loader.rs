use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let base_url = config.api.base_url.as_str();
    if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
        return Err(ConfigError::Validation {
            message: format!("api.base_url must be an http(s) URL, got '{}'", base_url),
        });
    }
    reqwest::Url::parse(base_url).map_err(|e| ConfigError::Validation {
        message: format!("api.base_url is invalid: {}", e),
    })?;

    if config.api.connect_timeout_secs == 0 || config.api.request_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "API timeouts must be greater than zero".to_string(),
        });
    }

    if config.progress_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "progress_capacity must be greater than zero".to_string(),
        });
    }

    if config.progress_interval_ms == 0 {
        return Err(ConfigError::Validation {
            message: "progress_interval_ms must be greater than zero".to_string(),
        });
    }

    Ok(())
}
