//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the backend URL, the user's Telegram id, and session cache settings.
//!
//! Configuration is stored at `~/.config/rollcall/config.json`; environment
//! variables (`ROLLCALL_API_URL`, `ROLLCALL_TELEGRAM_ID`) override it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::{DEFAULT_CACHE_PREFIX, DEFAULT_QUOTA_BYTES};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "rollcall";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Session store file name in the cache directory
const SESSION_FILE: &str = "session.json";

const DEFAULT_API_URL: &str = "http://localhost:8080";

pub const ENV_API_URL: &str = "ROLLCALL_API_URL";
pub const ENV_TELEGRAM_ID: &str = "ROLLCALL_TELEGRAM_ID";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub telegram_id: Option<i64>,
    pub cache_prefix: String,
    pub session_quota_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            telegram_id: None,
            cache_prefix: DEFAULT_CACHE_PREFIX.to_string(),
            session_quota_bytes: DEFAULT_QUOTA_BYTES,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };
        Ok(config.with_overrides(|name| std::env::var(name).ok()))
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides from `lookup` (the process environment in `load`).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.api_url = url;
        }
        if let Some(raw) = lookup(ENV_TELEGRAM_ID) {
            match raw.trim().parse() {
                Ok(id) => self.telegram_id = Some(id),
                Err(_) => warn!(value = %raw, "Ignoring invalid {}", ENV_TELEGRAM_ID),
            }
        }
        self
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn session_path(&self) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join(SESSION_FILE))
    }

    pub fn log_dir(&self) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join("logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache_prefix, DEFAULT_CACHE_PREFIX);
        assert_eq!(config.session_quota_bytes, DEFAULT_QUOTA_BYTES);
        assert_eq!(config.telegram_id, None);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"api_url": "https://att.example.com"}"#).unwrap();
        assert_eq!(config.api_url, "https://att.example.com");
        assert_eq!(config.cache_prefix, DEFAULT_CACHE_PREFIX);
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default().with_overrides(env(&[
            (ENV_API_URL, "https://att.example.com"),
            (ENV_TELEGRAM_ID, "123456"),
        ]));
        assert_eq!(config.api_url, "https://att.example.com");
        assert_eq!(config.telegram_id, Some(123456));
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let base = Config {
            telegram_id: Some(1),
            ..Config::default()
        };
        let config = base.clone().with_overrides(env(&[(ENV_API_URL, "  "), (ENV_TELEGRAM_ID, "abc")]));
        assert_eq!(config, base);
    }
}
