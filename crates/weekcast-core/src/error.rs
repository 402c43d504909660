//! Unified error types for Weekcast.

use thiserror::Error;

/// Result type alias using WeekcastError.
pub type Result<T> = std::result::Result<T, WeekcastError>;

#[derive(Error, Debug)]
pub enum WeekcastError {
    // Content store errors
    #[error("Duplicate content: {0}")]
    DuplicateContent(String),

    #[error("Store error: {0}")]
    Store(String),

    // Settings errors
    #[error("Invalid setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },

    // Channel errors
    #[error("Channel error: {0}")]
    Channel(String),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl WeekcastError {
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_setting(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSetting { key: key.into(), reason: reason.into() }
    }

    /// True when an insert hit an existing `(tenant, url)` or `url` key.
    /// Callers treat this as "already known", not a crash.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateContent(_))
    }
}
