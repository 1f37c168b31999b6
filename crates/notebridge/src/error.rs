//! Error types for notebridge.
//!
//! `Error` covers infrastructure failures (configuration, persistence,
//! platform start-up). `SyncError` is the outcome taxonomy of the sync
//! operations themselves and is what the presentation layer sees.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// The main error type for notebridge infrastructure.
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// Failed to persist settings.
    #[error("failed to save settings to {path}: {source}")]
    SettingsSave {
        /// Path of the settings file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Platform Errors ===
    /// Platform-specific operation failed.
    #[error("platform error: {0}")]
    Platform(String),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for notebridge operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new platform error.
    #[must_use]
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a configuration validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }
}

/// Outcome errors of send, receive and cleanup operations.
///
/// None of these are retried automatically. `Duplicate` is a deliberate
/// no-op rather than a failure and is never shown to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "error", content = "detail", rename_all = "snake_case")]
pub enum SyncError {
    /// A URL or credential is missing or invalid.
    #[error("misconfigured: {0}")]
    Misconfigured(String),

    /// The text to send was empty or whitespace only.
    #[error("empty text")]
    EmptyPayload,

    /// The same text was sent moments ago.
    #[error("duplicate")]
    Duplicate,

    /// Another operation of the same kind is still in flight.
    #[error("busy")]
    Busy,

    /// The remote call failed; carries the raw message or response body.
    #[error("{0}")]
    TransportFailure(String),

    /// The clipboard could not be written after bounded retries.
    #[error("clipboard unavailable: {0}")]
    ClipboardUnavailable(String),

    /// The paste keystroke could not be injected.
    #[error("auto paste failed: {0}")]
    PasteInjectionFailed(String),
}

impl SyncError {
    /// Create a misconfiguration error.
    #[must_use]
    pub fn misconfigured(message: impl Into<String>) -> Self {
        Self::Misconfigured(message.into())
    }

    /// Whether the user should be told about this outcome.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Duplicate)
    }
}
