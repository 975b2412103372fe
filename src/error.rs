// src/error.rs

//! Unified error handling for the synchronization engine.

use std::fmt;

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Source answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Database operation failed
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Expected markup was missing
    #[error("Parse error for {context}: {message}")]
    Parse { context: String, message: String },

    /// Another writer holds the index lock
    #[error("Index busy: lock at {path} not acquired within {waited_ms}ms")]
    IndexBusy { path: String, waited_ms: u64 },

    /// Index file unreadable or from another format version
    #[error("Index corrupt: {0}")]
    IndexCorrupt(String),

    /// Lexical network missing or unreadable
    #[error("Lexical resource error: {0}")]
    Lexical(String),

    /// A sync is already running in this process
    #[error("A synchronization run is already in progress")]
    SyncInProgress,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a parse error with context.
    pub fn parse(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Parse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a lexical resource error.
    pub fn lexical(message: impl fmt::Display) -> Self {
        Self::Lexical(message.to_string())
    }

    /// Whether the failure is worth retrying at the fetch boundary.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether the failure means the store as a whole is unreachable.
    ///
    /// Such errors abort a sync; everything else is scoped to one record.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Store(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Io(_)
                    | sqlx::Error::Configuration(_)
                    | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}
