use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default API base URL, matching the development backend
pub const DEFAULT_BASE_URL: &str = "http://localhost:9000/api";
/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for the authorization layer and its HTTP transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL every request path is joined onto
    pub base_url: String,
    /// Path of the dedicated credential renewal endpoint
    pub renewal_path: String,
    /// Path of the sign-in endpoint
    pub signin_path: String,
    /// Path of the account registration endpoint
    pub register_path: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Directory for the remembered-session file; `None` disables persistence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            renewal_path: "/auth/refresh".to_string(),
            signin_path: "/auth/signin".to_string(),
            register_path: "/auth/register".to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            data_dir: None,
        }
    }
}

impl ApiConfig {
    /// Build a config from defaults plus environment overrides.
    ///
    /// Reads `.env` if present, then honors `AUTHRELAY_API_URL`,
    /// `AUTHRELAY_TIMEOUT_SECS` and `AUTHRELAY_DATA_DIR`.
    pub fn from_env() -> Result<Self> {
        // Load .env if present; a missing file is not an error
        let _ = dotenvy::dotenv();

        let mut config = Self::default();

        if let Ok(url) = env::var("AUTHRELAY_API_URL") {
            if !url.is_empty() {
                config.base_url = url;
            }
        }

        if let Ok(timeout) = env::var("AUTHRELAY_TIMEOUT_SECS") {
            config.request_timeout_secs = timeout
                .parse()
                .context("AUTHRELAY_TIMEOUT_SECS is not a valid number of seconds")?;
        }

        if let Ok(dir) = env::var("AUTHRELAY_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = Some(PathBuf::from(dir));
            }
        }

        Ok(config)
    }

    /// Configure a base URL, trimming any trailing slash
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let url = base_url.into();
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Configure the data directory for remembered-session persistence
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Request timeout as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Join a request path onto the base URL
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_join_handles_slashes() {
        let config = ApiConfig::default().with_base_url("http://api.example.com/");
        assert_eq!(
            config.url_for("/auth/refresh"),
            "http://api.example.com/auth/refresh"
        );
        assert_eq!(
            config.url_for("chats/42/messages"),
            "http://api.example.com/chats/42/messages"
        );
    }

    #[test]
    fn defaults_are_sane() {
        let config = ApiConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.renewal_path, "/auth/refresh");
        assert_eq!(config.register_path, "/auth/register");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.data_dir.is_none());
    }
}
