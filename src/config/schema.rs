//! Configuration schema for copycache
//!
//! Configuration is stored at `~/.config/copycache/config.toml`

use crate::cache::DEFAULT_CAPACITY;
use crate::cache::fetch::DEFAULT_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// File cache settings
    pub cache: CacheConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// General application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: LogFormat,
}

/// File cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Use the file cache when resolving sources (default: true)
    pub enabled: bool,

    /// In-memory entries kept per map before least recently used ones are evicted
    pub capacity: usize,

    /// Override for the cache directory (default: `<state dir>/filecache`)
    pub state_dir: Option<PathBuf>,

    /// Timeout for remote source downloads
    pub request_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_CAPACITY,
            state_dir: None,
            request_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[cache]"));
        assert!(toml.contains(r#"log_format = "text""#));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.cache.capacity, 1024);
        assert!(config.cache.enabled);
        assert_eq!(config.general.log_format, LogFormat::Text);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [cache]
            capacity = 64
            state_dir = "/var/cache/copycache"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.capacity, 64);
        assert_eq!(
            config.cache.state_dir,
            Some(PathBuf::from("/var/cache/copycache"))
        );
        assert_eq!(config.cache.request_timeout_secs, 300); // default preserved
    }

    #[test]
    fn unknown_log_format_rejected() {
        let result: Result<Config, _> = toml::from_str("[general]\nlog_format = \"xml\"");
        assert!(result.is_err());
    }
}
