//! Configuration Management
//!
//! An explicit [`ClientConfig`] is handed to [`Client`](crate::Client) at
//! construction. There are no process-wide defaults to mutate, so clients
//! with different settings can live side by side.

use crate::api::error::ApiError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

/// Default API endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.katapult.io";

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "KATAPULT_API_KEY";

/// Environment variable overriding the base URL
pub const BASE_URL_ENV: &str = "KATAPULT_BASE_URL";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Root of the API; operation paths are appended to it
    pub base_url: Url,
    /// Bearer token sent on authenticated requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub user_agent: String,
    /// Overall timeout in seconds applied by the stock transport
    #[serde(with = "optional_secs")]
    pub timeout: Option<Duration>,
}

static DEFAULT_URL: LazyLock<Url> =
    LazyLock::new(|| Url::parse(DEFAULT_BASE_URL).expect("DEFAULT_BASE_URL is a valid URL"));

fn default_base_url() -> Url {
    DEFAULT_URL.clone()
}

fn default_user_agent() -> String {
    format!("katapult-rs/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            user_agent: default_user_agent(),
            timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl ClientConfig {
    /// Default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("katapult").join("config.json"))
    }

    /// Load configuration from the default location, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("Ignoring unreadable config {}: {:#}", path.display(), err);
                Self::default()
            }
        }
    }

    /// Load configuration from a JSON or YAML file, picked by extension
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config {}", path.display()))?,
            _ => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config {}", path.display()))?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration as JSON
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Overlay `KATAPULT_API_KEY` and `KATAPULT_BASE_URL` when set
    pub fn with_env(mut self) -> Result<Self> {
        if let Some(key) = std::env::var(API_KEY_ENV).ok().filter(|v| !v.is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(raw) = std::env::var(BASE_URL_ENV).ok().filter(|v| !v.is_empty()) {
            self.base_url = Url::parse(&raw)
                .with_context(|| format!("{} is not a valid URL", BASE_URL_ENV))?;
        }
        Ok(self)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL, rejecting URLs without a scheme or host
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ApiError> {
        self.base_url = Url::parse(base_url)
            .map_err(|e| ApiError::invalid_argument(format!("invalid base URL: {}", e)))?;
        self.validate()?;
        Ok(self)
    }

    /// Check the base URL has an http(s) scheme and a host
    pub fn validate(&self) -> Result<(), ApiError> {
        match self.base_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ApiError::invalid_argument(format!(
                    "base URL scheme must be http or https, got {}",
                    other
                )))
            }
        }
        if self.base_url.host_str().map_or(true, str::is_empty) {
            return Err(ApiError::invalid_argument("base URL host is empty"));
        }
        Ok(())
    }
}

mod optional_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}
