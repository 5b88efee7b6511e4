use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::paths::Paths;

/// Fetch engine settings: retry policy, timeouts, and the TLS stance.
///
/// `verify_tls` defaults to `false` on purpose: this tool exists to reach
/// hosts with broken or self-signed certificates. Flip it per deployment
/// when that is not what you want.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetcherConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub verify_tls: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36".to_string()
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_secs: default_timeout_secs(),
            proxy: None,
            verify_tls: false,
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Explicit browser binary; when unset, common Chrome/Chromium
    /// locations are probed.
    #[serde(default)]
    pub binary: Option<String>,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
}

fn default_headless() -> bool {
    true
}

fn default_viewport_width() -> u32 {
    1920
}

fn default_viewport_height() -> u32 {
    1080
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            binary: None,
            proxy: None,
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// How many recent events each summary includes per sequence.
    #[serde(default = "default_recent")]
    pub recent: usize,
    /// Ring-buffer cap per sequence; oldest events are evicted past it.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_recent() -> usize {
    10
}

fn default_capacity() -> usize {
    10_000
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            recent: default_recent(),
            capacity: default_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.fetcher.max_retries, 3);
        assert_eq!(config.fetcher.retry_delay_ms, 1000);
        assert!(!config.fetcher.verify_tls);
        assert!(config.browser.headless);
        assert_eq!(config.recorder.recent, 10);
        assert_eq!(config.recorder.capacity, 10_000);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"fetcher": {"maxRetries": 5}}"#).unwrap();
        assert_eq!(config.fetcher.max_retries, 5);
        assert_eq!(config.fetcher.timeout_secs, 30);
        assert!(config.recorder.enabled);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.fetcher.proxy = Some("http://127.0.0.1:8080".to_string());
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.fetcher.proxy.as_deref(), Some("http://127.0.0.1:8080"));
    }
}
