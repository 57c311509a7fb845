//! Configuration management

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000/api";
pub const API_BASE_ENV: &str = "STREAMFLIX_API_BASE_URL";

/// Accepted range for the embed load timeout, in seconds.
const LOAD_TIMEOUT_RANGE: (u64, u64) = (15, 20);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    // Backend
    #[serde(default = "default_api_base")]
    pub api_base_url: String,
    #[serde(default)]
    pub auth_token: String,
    // Player settings
    #[serde(default)]
    pub external_player: String,
    #[serde(default)]
    pub use_internal_player: bool,
    #[serde(default = "default_true")]
    pub hw_accel: bool,
    #[serde(default = "default_buffer")]
    pub buffer_seconds: u32,
    #[serde(default = "default_true")]
    pub pass_user_agent_to_player: bool,
    #[serde(default = "default_true")]
    pub single_window_mode: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    // Link resolution
    #[serde(default = "default_load_timeout")]
    pub load_timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    #[serde(default = "default_blocked_hosts")]
    pub blocked_embed_hosts: Vec<String>,
    // Preferences
    #[serde(default = "default_true")]
    pub dark_mode: bool,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_subtitles")]
    pub subtitles: String,
}

fn default_api_base() -> String { DEFAULT_API_BASE.to_string() }
fn default_buffer() -> u32 { 5 }
fn default_true() -> bool { true }
fn default_user_agent() -> String { format!("Streamflix/{}", env!("CARGO_PKG_VERSION")) }
fn default_load_timeout() -> u64 { 20 }
fn default_poll_interval() -> u64 { 3 }
fn default_max_poll_attempts() -> u32 { 20 }
fn default_blocked_hosts() -> Vec<String> { vec!["1flix.to".to_string()] }
fn default_language() -> String { "en".to_string() }
fn default_subtitles() -> String { "off".to_string() }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base(),
            auth_token: String::new(),
            external_player: String::new(),
            use_internal_player: false,
            hw_accel: true,
            buffer_seconds: 5,
            pass_user_agent_to_player: true,
            single_window_mode: true,
            user_agent: default_user_agent(),
            load_timeout_secs: 20,
            poll_interval_secs: 3,
            max_poll_attempts: 20,
            blocked_embed_hosts: default_blocked_hosts(),
            dark_mode: true,
            language: default_language(),
            subtitles: default_subtitles(),
        }
    }
}

impl AppConfig {
    pub fn config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("streamflix");
        path.push("config.json");
        path
    }

    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Self {
        let mut config = Self::load_from(&Self::config_path());
        if let Ok(base) = std::env::var(API_BASE_ENV) {
            if !base.trim().is_empty() {
                config.api_base_url = base.trim().to_string();
            }
        }
        config
    }

    /// Missing or malformed files yield defaults.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(
            self.load_timeout_secs
                .clamp(LOAD_TIMEOUT_RANGE.0, LOAD_TIMEOUT_RANGE.1),
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn player_command(&self) -> String {
        if self.external_player.trim().is_empty() {
            "ffplay".to_string()
        } else {
            self.external_player.trim().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("nope.json"));
        assert_eq!(config.api_base_url, DEFAULT_API_BASE);
        assert_eq!(config.max_poll_attempts, 20);
        assert_eq!(config.blocked_embed_hosts, vec!["1flix.to".to_string()]);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = AppConfig::default();
        config.external_player = "mpv".to_string();
        config.dark_mode = false;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.external_player, "mpv");
        assert!(!loaded.dark_mode);
        assert_eq!(loaded.player_command(), "mpv");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"auth_token": "abc", "load_timeout_secs": 60}"#).unwrap();
        let config = AppConfig::load_from(&path);
        assert_eq!(config.auth_token, "abc");
        assert_eq!(config.poll_interval_secs, 3);
        assert!(config.hw_accel);
        // Clamped into the accepted window
        assert_eq!(config.load_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        let config = AppConfig::load_from(&path);
        assert_eq!(config.language, "en");
        assert_eq!(config.player_command(), "ffplay");
    }
}
