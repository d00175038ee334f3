// src/config.rs

use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;
use validator::Validate;

use crate::error::SyncError;

#[derive(Debug, Clone, Validate)]
pub struct Config {
    /// Base URL of the REST API, e.g. `https://examline.example/api`.
    #[validate(url)]
    pub api_base_url: String,
    /// Push channel endpoint (`ws://` or `wss://`).
    #[validate(url)]
    pub ws_url: String,
    /// Bearer token of the current professor session.
    #[validate(length(min = 1))]
    pub session_token: String,
    /// Explicit professor id for the broadcast room; falls back to the token's `sub` claim.
    pub professor_id: Option<String>,
    #[validate(length(min = 1))]
    pub login_path: String,
    #[validate(range(min = 1))]
    pub safety_refresh_secs: u64,
    #[validate(range(min = 1))]
    pub fallback_refresh_secs: u64,
    pub refresh_debounce_ms: u64,
    #[validate(range(min = 1))]
    pub reconnect_delay_secs: u64,
    #[validate(range(min = 1))]
    pub http_timeout_secs: u64,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self, SyncError> {
        dotenv().ok();

        let config = Self {
            api_base_url: required("EXAMLINE_API_URL")?,
            ws_url: required("EXAMLINE_WS_URL")?,
            session_token: required("EXAMLINE_TOKEN")?,
            professor_id: env::var("EXAMLINE_PROFESSOR_ID").ok().filter(|v| !v.is_empty()),
            login_path: env::var("LOGIN_PATH").unwrap_or_else(|_| "/login".to_string()),
            safety_refresh_secs: parsed("SAFETY_REFRESH_SECS", 30)?,
            fallback_refresh_secs: parsed("FALLBACK_REFRESH_SECS", 120)?,
            refresh_debounce_ms: parsed("REFRESH_DEBOUNCE_MS", 1000)?,
            reconnect_delay_secs: parsed("RECONNECT_DELAY_SECS", 10)?,
            http_timeout_secs: parsed("HTTP_TIMEOUT_SECS", 30)?,
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Configuration with the default intervals, for embedding and tests.
    pub fn new(api_base_url: &str, ws_url: &str, session_token: &str) -> Self {
        Self {
            api_base_url: api_base_url.to_string(),
            ws_url: ws_url.to_string(),
            session_token: session_token.to_string(),
            professor_id: None,
            login_path: "/login".to_string(),
            safety_refresh_secs: 30,
            fallback_refresh_secs: 120,
            refresh_debounce_ms: 1000,
            reconnect_delay_secs: 10,
            http_timeout_secs: 30,
            rust_log: "info".to_string(),
        }
    }

    pub fn safety_interval(&self) -> Duration {
        Duration::from_secs(self.safety_refresh_secs)
    }

    pub fn fallback_interval(&self) -> Duration {
        Duration::from_secs(self.fallback_refresh_secs)
    }

    pub fn refresh_debounce(&self) -> Duration {
        Duration::from_millis(self.refresh_debounce_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn required(key: &str) -> Result<String, SyncError> {
    env::var(key).map_err(|_| SyncError::Config(format!("{} must be set", key)))
}

fn parsed<T: FromStr>(key: &str, default: T) -> Result<T, SyncError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| SyncError::Config(format!("{} is not a valid number: {}", key, raw))),
        Err(_) => Ok(default),
    }
}
