//! Bridge configuration
//!
//! Every section and field has a default, so running without a config file
//! is valid. Values are resolved in order: defaults, TOML file, environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Main bridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub hub: HubSection,
    pub store: StoreSection,
    pub telegram: TelegramSection,
}

/// Hub connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HubSection {
    /// Websocket endpoint (ws:// or wss://)
    pub url: String,
    /// One-shot HTTP publish endpoint
    pub http_url: String,
    pub connect_timeout_secs: u64,
    /// Ping interval; two silent intervals fail the link
    pub heartbeat_secs: u64,
    /// Delay before reconnecting after a failure
    pub backoff_secs: u64,
    /// Stale topics tolerated before forcing a resync
    pub drift_threshold: usize,
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            url: "wss://hub.drink.cafe/ws".to_string(),
            http_url: "https://hub.drink.cafe/http".to_string(),
            connect_timeout_secs: 60,
            heartbeat_secs: 20,
            backoff_secs: 10,
            drift_threshold: crate::reconcile::DEFAULT_DRIFT_THRESHOLD,
        }
    }
}

impl HubSection {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

/// Subscription store settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreSection {
    pub path: PathBuf,
    pub lock_timeout_secs: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/tmp/db.hub2.json"),
            lock_timeout_secs: 10,
        }
    }
}

impl StoreSection {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

/// Telegram Bot API settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelegramSection {
    /// Environment variable holding the bot token
    pub api_token_env: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for TelegramSection {
    fn default() -> Self {
        Self {
            api_token_env: "API_TOKEN".to_string(),
            base_url: "https://api.telegram.org".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeConfig {
    /// Load configuration, optionally from a TOML file, then apply the
    /// process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env_overrides_from(|name| std::env::var(name).ok())
    }

    /// Parse TOML content without touching the environment
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply `DB_PATH`, `HUB_URL` and `HUB_HTTP_URL` overrides, then validate
    pub fn apply_env_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("DB_PATH").filter(|v| !v.is_empty()) {
            self.store.path = PathBuf::from(path);
        }
        if let Some(url) = lookup("HUB_URL").filter(|v| !v.is_empty()) {
            self.hub.url = url;
        }
        if let Some(url) = lookup("HUB_HTTP_URL").filter(|v| !v.is_empty()) {
            self.hub.http_url = url;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check URLs and timeouts
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ws = parse_url("hub.url", &self.hub.url)?;
        if !matches!(ws.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidConfig(format!(
                "hub.url must use ws:// or wss://, got '{}'",
                self.hub.url
            )));
        }
        let http = parse_url("hub.http_url", &self.hub.http_url)?;
        if !matches!(http.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidConfig(format!(
                "hub.http_url must use http:// or https://, got '{}'",
                self.hub.http_url
            )));
        }
        parse_url("telegram.base_url", &self.telegram.base_url)?;

        for (name, value) in [
            ("hub.connect_timeout_secs", self.hub.connect_timeout_secs),
            ("hub.heartbeat_secs", self.hub.heartbeat_secs),
            ("store.lock_timeout_secs", self.store.lock_timeout_secs),
            ("telegram.timeout_secs", self.telegram.timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        if self.store.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "store.path must not be empty".to_string(),
            ));
        }
        if self.telegram.api_token_env.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "telegram.api_token_env must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Bot token from the configured environment variable
    pub fn telegram_token(&self) -> Result<String, ConfigError> {
        std::env::var(&self.telegram.api_token_env)
            .ok()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ConfigError::EnvVarNotFound(self.telegram.api_token_env.clone()))
    }
}

fn parse_url(field: &str, value: &str) -> Result<Url, ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::InvalidConfig(format!("{field} must not be empty")));
    }
    Url::parse(value)
        .map_err(|e| ConfigError::InvalidConfig(format!("{field} '{value}' is not a URL: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.hub.url, "wss://hub.drink.cafe/ws");
        assert_eq!(config.hub.http_url, "https://hub.drink.cafe/http");
        assert_eq!(config.hub.heartbeat(), Duration::from_secs(20));
        assert_eq!(config.hub.connect_timeout(), Duration::from_secs(60));
        assert_eq!(config.hub.backoff(), Duration::from_secs(10));
        assert_eq!(config.hub.drift_threshold, 10);
        assert_eq!(config.store.path, PathBuf::from("/tmp/db.hub2.json"));
        assert_eq!(config.store.lock_timeout(), Duration::from_secs(10));
        assert_eq!(config.telegram.api_token_env, "API_TOKEN");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = BridgeConfig::from_toml(
            r#"
[hub]
url = "ws://localhost:8080/ws"
drift_threshold = 3

[store]
path = "/var/lib/hub2/db.json"
"#,
        )
        .unwrap();

        assert_eq!(config.hub.url, "ws://localhost:8080/ws");
        assert_eq!(config.hub.drift_threshold, 3);
        assert_eq!(config.hub.heartbeat_secs, 20);
        assert_eq!(config.store.path, PathBuf::from("/var/lib/hub2/db.json"));
        assert_eq!(config.telegram, TelegramSection::default());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DB_PATH", "/data/subs.json"),
            ("HUB_URL", "ws://127.0.0.1:9000/ws"),
            ("HUB_HTTP_URL", "http://127.0.0.1:9000/http"),
        ]
        .into_iter()
        .collect();

        let config = BridgeConfig::default()
            .apply_env_overrides_from(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.store.path, PathBuf::from("/data/subs.json"));
        assert_eq!(config.hub.url, "ws://127.0.0.1:9000/ws");
        assert_eq!(config.hub.http_url, "http://127.0.0.1:9000/http");
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let config = BridgeConfig::default()
            .apply_env_overrides_from(|_| Some(String::new()))
            .unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_rejects_non_websocket_hub_url() {
        let mut config = BridgeConfig::default();
        config.hub.url = "https://hub.drink.cafe/ws".to_string();
        assert!(matches!(
            config.apply_env_overrides_from(no_env),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        let mut config = BridgeConfig::default();
        config.hub.heartbeat_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("hub.heartbeat_secs"));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(matches!(
            BridgeConfig::from_toml("[hub\nurl = "),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn test_missing_token_env() {
        let mut config = BridgeConfig::default();
        config.telegram.api_token_env = "HUB2_TEST_TOKEN_THAT_IS_NEVER_SET".to_string();
        assert!(matches!(
            config.telegram_token(),
            Err(ConfigError::EnvVarNotFound(name)) if name == "HUB2_TEST_TOKEN_THAT_IS_NEVER_SET"
        ));
    }
}
