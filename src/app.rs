use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ApiError, ApiResult};
use crate::utils;

const DEFAULT_API_BASE: &str = "http://localhost:5000/api/v1";

/// Backoff used by the socket between reconnection attempts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: u32,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            factor: 2,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ms = self
            .initial_delay_ms
            .saturating_mul((self.factor.max(1) as u64).saturating_pow(exp));
        Duration::from_millis(ms.min(self.max_delay_ms))
    }

    pub fn allows(&self, attempt: u32) -> bool {
        self.enabled && self.max_attempts.is_none_or(|max| attempt <= max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub api_base_url: String,
    /// Socket server root; derived from `api_base_url` when unset.
    pub backend_url: Option<String>,
    pub token: Option<String>,
    pub google_places_api_key: Option<String>,
    /// Public origin serving the embeddable widget.
    pub app_url: Option<String>,
    pub show_toasts: bool,
    pub coming_soon: bool,
    pub request_timeout_secs: u64,
    pub reconnect: ReconnectPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE.to_string(),
            backend_url: None,
            token: None,
            google_places_api_key: None,
            app_url: None,
            show_toasts: true,
            coming_soon: false,
            request_timeout_secs: 30,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("hichat.toml"))
    }

    /// Reads the config file (if any) and applies `HICHAT_*` overrides.
    pub fn load() -> Self {
        let mut settings = Self::default_path()
            .map(|p| Self::load_or_default(&p))
            .unwrap_or_default();
        settings.apply_env(|key| std::env::var(key).ok());
        settings
    }

    /// A missing file gives the defaults; an unreadable one is reported
    /// and then gives the defaults too.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            log::debug!("no settings file at {}", path.display());
            return Self::default();
        }
        Self::load_from(path).unwrap_or_else(|e| {
            log::warn!("{}; using defaults", e);
            Self::default()
        })
    }

    pub fn load_from(path: &Path) -> ApiResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| ApiError::Config(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&text).map_err(|e| ApiError::Config(e.to_string()))
    }

    pub fn save(&self) -> ApiResult<()> {
        let path = Self::default_path().ok_or_else(|| ApiError::Config("no config dir".into()))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> ApiResult<()> {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let text = toml::to_string_pretty(self).map_err(|e| ApiError::Config(e.to_string()))?;
        fs::write(path, text).map_err(|e| ApiError::Config(e.to_string()))
    }

    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var("HICHAT_API_BASE_URL") {
            self.api_base_url = v;
        }
        if let Some(v) = var("HICHAT_BACKEND_URL") {
            self.backend_url = Some(v);
        }
        if let Some(v) = var("HICHAT_TOKEN") {
            self.token = Some(v);
        }
        if let Some(v) = var("HICHAT_GOOGLE_PLACES_API_KEY") {
            self.google_places_api_key = Some(v);
        }
        if let Some(v) = var("HICHAT_APP_URL") {
            self.app_url = Some(v);
        }
        if let Some(v) = var("HICHAT_SHOW_TOASTS").and_then(|v| parse_flag(&v)) {
            self.show_toasts = v;
        }
        if let Some(v) = var("HICHAT_COMING_SOON").and_then(|v| parse_flag(&v)) {
            self.coming_soon = v;
        }
    }

    pub fn api_base(&self) -> String {
        utils::api_base(&self.api_base_url)
    }

    pub fn socket_base(&self) -> String {
        match self.backend_url.as_deref() {
            Some(url) if !url.trim().is_empty() => utils::normalize_url(url),
            _ => utils::socket_base_url(&self.api_base_url),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn roundtrips_through_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("hichat.toml");
        let settings = Settings {
            token: Some("tok".into()),
            coming_soon: true,
            ..Settings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hichat.toml");
        fs::write(&path, "api_base_url = \"https://api.hichat.io/api/v1\"\n").unwrap();
        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.request_timeout_secs, 30);
        assert!(settings.show_toasts);
        assert_eq!(settings.socket_base(), "https://api.hichat.io");
    }

    #[test]
    fn broken_or_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert_eq!(Settings::load_or_default(&missing), Settings::default());

        let broken = dir.path().join("hichat.toml");
        fs::write(&broken, "api_base_url = [not toml").unwrap();
        assert_eq!(Settings::load_or_default(&broken), Settings::default());

        fs::write(&broken, "coming_soon = true\n").unwrap();
        assert!(Settings::load_or_default(&broken).coming_soon);
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("HICHAT_TOKEN", "from-env"),
            ("HICHAT_SHOW_TOASTS", "off"),
            ("HICHAT_COMING_SOON", "maybe"),
        ]);
        let mut settings = Settings::default();
        settings.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(settings.token.as_deref(), Some("from-env"));
        assert!(!settings.show_toasts);
        assert!(!settings.coming_soon);
    }

    #[test]
    fn backend_url_wins_over_derived_socket_base() {
        let settings = Settings {
            backend_url: Some("https://ws.hichat.io/".into()),
            ..Settings::default()
        };
        assert_eq!(settings.socket_base(), "https://ws.hichat.io");
    }

    #[test]
    fn reconnect_delay_is_capped() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_millis(1000));
        assert_eq!(policy.delay(2), Duration::from_millis(2000));
        assert_eq!(policy.delay(3), Duration::from_millis(4000));
        assert_eq!(policy.delay(10), Duration::from_millis(5000));
        assert!(policy.allows(1_000));
    }
}
