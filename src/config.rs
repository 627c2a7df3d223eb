// src/config.rs

use crate::projector::{CheckpointTable, ProgressProjector};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub const ENV_API_URL: &str = "AUDIOBOOK_API_URL";
pub const ENV_TICK_MS: &str = "AUDIOBOOK_TICK_MS";
pub const ENV_TIMEOUT_MS: &str = "AUDIOBOOK_TIMEOUT_MS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid base url {url:?}: {reason}")]
    BaseUrl { url: String, reason: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("invalid value {value:?} for {key}")]
    Env { key: &'static str, value: String },
}

/// Progress projection tuning. The right cadence is a UX decision and has
/// moved between 500ms and 20s, so it lives here rather than in code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectorConfig {
    pub tick_interval_ms: u64,
    pub checkpoints: CheckpointTable,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 3_000,
            checkpoints: CheckpointTable::default(),
        }
    }
}

impl ProjectorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn build(&self) -> ProgressProjector {
        ProgressProjector::new(self.checkpoints.clone(), self.tick_interval())
    }
}

/// What the backend accepts; checked before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadLimits {
    pub allowed_extensions: Vec<String>,
    pub max_upload_bytes: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            allowed_extensions: ["pdf", "txt", "epub", "mobi"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Session-scoped client configuration, built once and passed to the
/// transport and orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// Whole-request timeout. Analysis runs for minutes, so keep this generous.
    pub request_timeout_ms: u64,
    pub projector: ProjectorConfig,
    pub limits: UploadLimits,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5001".to_string(),
            request_timeout_ms: 10 * 60 * 1000,
            projector: ProjectorConfig::default(),
            limits: UploadLimits::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "loaded client config");
        Ok(config)
    }

    /// Overrides fields from `AUDIOBOOK_*` environment variables.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            self.base_url = url;
        }
        if let Ok(value) = std::env::var(ENV_TICK_MS) {
            self.projector.tick_interval_ms = parse_env(ENV_TICK_MS, value)?;
        }
        if let Ok(value) = std::env::var(ENV_TIMEOUT_MS) {
            self.request_timeout_ms = parse_env(ENV_TIMEOUT_MS, value)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.base_url).map_err(|e| ConfigError::BaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::BaseUrl {
                url: self.base_url.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Zero("request_timeout_ms"));
        }
        if self.projector.tick_interval_ms == 0 {
            return Err(ConfigError::Zero("tick_interval_ms"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Origin without a trailing slash, ready for path joins.
    pub fn origin(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

fn parse_env(key: &'static str, value: String) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env { key, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.projector.checkpoints.cap().percent, 95);
    }

    #[test]
    fn toml_overrides_projector_table() {
        let config = ClientConfig::from_toml_str(
            r#"
            base_url = "https://books.example.com/"
            request_timeout_ms = 30000

            [projector]
            tick_interval_ms = 500
            checkpoints = [
                { percent = 10, label = "Uploading" },
                { percent = 90, label = "Analyzing" },
                { percent = 100, label = "Done" },
            ]

            [limits]
            allowed_extensions = ["txt"]
            "#,
        )
        .unwrap();

        assert_eq!(config.origin(), "https://books.example.com");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.projector.tick_interval(), Duration::from_millis(500));
        assert_eq!(config.projector.checkpoints.cap().label, "Analyzing");
        assert_eq!(config.limits.allowed_extensions, vec!["txt".to_string()]);
        assert_eq!(config.limits.max_upload_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn rejects_table_without_completion() {
        let err = ClientConfig::from_toml_str(
            r#"
            [projector]
            checkpoints = [{ percent = 10, label = "a" }, { percent = 50, label = "b" }]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_bad_base_url_and_zero_interval() {
        let bad_url = ClientConfig::default().with_base_url("localhost:5001");
        assert!(matches!(bad_url.validate(), Err(ConfigError::BaseUrl { .. })));

        let mut zero = ClientConfig::default();
        zero.projector.tick_interval_ms = 0;
        assert!(matches!(zero.validate(), Err(ConfigError::Zero("tick_interval_ms"))));
    }
}
