use thiserror::Error;

use crate::domain::{StatFamily, StatRole};

/// Main error type for the stat bot
#[derive(Error, Debug)]
pub enum StatBotError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    Validation(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Data source errors
    #[error("Fetch failed for {family}: {reason}")]
    FetchFailed { family: StatFamily, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid number in field {field}: {value}")]
    InvalidNumber { field: String, value: String },

    // Channel platform errors
    #[error("Channel creation failed for {role}: {reason}")]
    ChannelCreateFailed { role: StatRole, reason: String },

    #[error("Rename failed for {role}: {reason}")]
    RenameFailed { role: StatRole, reason: String },

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Label too long for {role}: {len} > {max} characters")]
    LabelTooLong { role: StatRole, len: usize, max: usize },

    // Registry errors
    #[error("Corrupt channel registry: {0}")]
    CorruptRegistry(String),

    #[error("Unknown role: {0} has no channel binding")]
    UnknownRole(StatRole),

    #[error("Channel {channel_id} is already bound to {bound_to}")]
    DuplicateChannel { channel_id: String, bound_to: StatRole },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl StatBotError {
    pub fn fetch_failed(family: StatFamily, reason: impl Into<String>) -> Self {
        StatBotError::FetchFailed {
            family,
            reason: reason.into(),
        }
    }

    /// Errors that must stop the process instead of being logged and skipped
    pub fn is_fatal(&self) -> bool {
        matches!(self, StatBotError::UnknownRole(_))
    }
}

/// Result type alias for StatBotError
pub type Result<T> = std::result::Result<T, StatBotError>;
