// src/error.rs

use std::fmt;

/// Global Sync Error Enum.
/// Centralizes the failure taxonomy of the exam-window sync client.
#[derive(Debug)]
pub enum SyncError {
    // 401 from the REST API. Fatal to the session, never retried.
    Unauthorized,

    // Request could not be sent or the connection dropped mid-flight.
    Network(String),

    // Non-success HTTP status other than 401.
    Http(u16),

    // Response or event body could not be decoded.
    Decode(String),

    // Push channel could not be opened or was lost.
    Channel(String),

    // Missing or invalid configuration value.
    Config(String),
}

impl SyncError {
    /// Whether the next scheduled refresh can be expected to recover from this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_)
                | SyncError::Http(_)
                | SyncError::Decode(_)
                | SyncError::Channel(_)
        )
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Unauthorized => write!(f, "session is no longer authorized"),
            SyncError::Network(msg) => write!(f, "network error: {}", msg),
            SyncError::Http(status) => write!(f, "unexpected HTTP status {}", status),
            SyncError::Decode(msg) => write!(f, "could not decode payload: {}", msg),
            SyncError::Channel(msg) => write!(f, "push channel error: {}", msg),
            SyncError::Config(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl std::error::Error for SyncError {}

/// Converts `reqwest::Error` into the matching `SyncError` variant.
/// Allows using `?` operator on REST calls.
impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.status() == Some(reqwest::StatusCode::UNAUTHORIZED) {
            SyncError::Unauthorized
        } else if err.is_decode() {
            SyncError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            SyncError::Http(status.as_u16())
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::Channel(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::Config(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for SyncError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        SyncError::Config(format!("session token: {}", err))
    }
}

impl From<validator::ValidationErrors> for SyncError {
    fn from(err: validator::ValidationErrors) -> Self {
        SyncError::Config(err.to_string())
    }
}
