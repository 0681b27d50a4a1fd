// src/error.rs

//! Unified error handling for the update service.

use std::fmt;

use thiserror::Error;

/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Source fetch failed or timed out
    #[error("Source {source_id} unavailable for manga {manga_id}: {reason}")]
    SourceUnavailable {
        source_id: String,
        manga_id: String,
        reason: String,
    },

    /// Persisting a manga's chapter set failed
    #[error("State write failed for manga {manga_id}: {reason}")]
    StateWriteFailed { manga_id: String, reason: String },

    /// Download failed in a way worth retrying
    #[error("Transient download error: {0}")]
    DownloadTransient(String),

    /// Download failed for good
    #[error("Download failed: {0}")]
    DownloadFatal(String),

    /// A notification channel rejected or dropped a message
    #[error("Notification via {channel} failed: {reason}")]
    NotifyFailed { channel: String, reason: String },

    /// Configuration error
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// No source registered under the given id
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization failed
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl AppError {
    /// Create a source-unavailable error.
    pub fn source_unavailable(
        source_id: impl Into<String>,
        manga_id: impl Into<String>,
        reason: impl fmt::Display,
    ) -> Self {
        Self::SourceUnavailable {
            source_id: source_id.into(),
            manga_id: manga_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a state-write error.
    pub fn state_write(manga_id: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::StateWriteFailed {
            manga_id: manga_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a notification error for a channel.
    pub fn notify(channel: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::NotifyFailed {
            channel: channel.into(),
            reason: reason.to_string(),
        }
    }

    /// Wrap a reqwest error without the request URL, which may carry
    /// credentials.
    pub fn http(error: reqwest::Error) -> Self {
        Self::Http(error.without_url())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigInvalid(message.into())
    }

    /// Whether retrying the failed operation may succeed.
    ///
    /// Timeouts, connection failures, 5xx and 429 responses count as
    /// transient. Everything else, including 4xx responses and local I/O
    /// errors, is final.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::DownloadTransient(_) | Self::SourceUnavailable { .. } => true,
            Self::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    return true;
                }
                e.status()
                    .map(|s| s.is_server_error() || s.as_u16() == 429)
                    .unwrap_or(false)
            }
            _ => false,
        }
    }
}
