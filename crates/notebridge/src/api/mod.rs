//! Remote note endpoint collaborator.
//!
//! The engine talks to the remote service through [`NoteApi`] only. Each call
//! takes an [`Endpoint`] resolved from the current configuration snapshot and
//! the [`CredentialSource`], so a settings change takes effect on the next
//! call without rebuilding the client.

mod http;
#[cfg(test)]
pub(crate) mod mock;

pub use http::{parse_backup_count, read_api_url, HttpNoteApi};

use async_trait::async_trait;
use reqwest::Url;
use thiserror::Error;

use crate::config::Config;
use crate::error::SyncError;

/// Transport-level failure of a remote call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The server answered with a non-success status.
    #[error("HTTP {status}\n\n{body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The request never got an answer (DNS, connect, timeout, TLS).
    #[error("{0}")]
    Network(String),

    /// The server answered but the body was not what was expected.
    #[error("{0}")]
    UnexpectedResponse(String),
}

impl ApiError {
    /// Whether the remote endpoint produced an answer at all.
    #[must_use]
    pub fn remote_answered(&self) -> bool {
        !matches!(self, Self::Network(_))
    }
}

impl From<ApiError> for SyncError {
    fn from(err: ApiError) -> Self {
        Self::TransportFailure(err.to_string())
    }
}

/// HTTP basic-auth pair.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    /// User name.
    pub user: String,
    /// Password, possibly empty.
    pub password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Credentials attached to one remote call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Token sent as the `token` form field or query parameter.
    pub token: String,
    /// Optional basic auth.
    pub basic: Option<BasicAuth>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("basic_user", &self.basic.as_ref().map(|b| b.user.as_str()))
            .finish()
    }
}

/// Which token a call needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Send, receive and connection test.
    Note,
    /// Cleanup operations.
    Cleanup,
}

/// Supplies decrypted credentials.
///
/// Implementations return `None` for anything that is not configured.
pub trait CredentialSource: Send + Sync + std::fmt::Debug {
    /// Token for `kind`.
    fn token(&self, config: &Config, kind: TokenKind) -> Option<String>;

    /// Basic-auth pair, when a user is configured.
    fn basic_auth(&self, config: &Config) -> Option<BasicAuth>;
}

/// Reads credentials straight from the configuration snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigCredentials;

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl CredentialSource for ConfigCredentials {
    fn token(&self, config: &Config, kind: TokenKind) -> Option<String> {
        match kind {
            TokenKind::Note => non_empty(&config.server.token),
            TokenKind::Cleanup => non_empty(&config.server.cleanup_token),
        }
    }

    fn basic_auth(&self, config: &Config) -> Option<BasicAuth> {
        non_empty(&config.server.basic_user).map(|user| BasicAuth {
            user,
            password: config.server.basic_password.clone(),
        })
    }
}

/// A resolved remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Absolute URL.
    pub url: Url,
    /// Credentials for the call.
    pub credentials: Credentials,
    /// Request pretty-printed responses.
    pub pretty: bool,
}

impl Endpoint {
    /// Resolve an endpoint from a configured URL and token.
    ///
    /// # Errors
    ///
    /// Returns `Misconfigured` when the URL is empty or invalid, or the
    /// token is missing.
    pub fn resolve(
        label: &str,
        url: &str,
        token: Option<String>,
        basic: Option<BasicAuth>,
    ) -> Result<Self, SyncError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(SyncError::misconfigured(format!("{label} URL is not set")));
        }
        let url = Url::parse(url)
            .map_err(|e| SyncError::misconfigured(format!("{label} URL is invalid: {e}")))?;
        let token =
            token.ok_or_else(|| SyncError::misconfigured(format!("{label} token is not set")))?;

        Ok(Self {
            url,
            credentials: Credentials { token, basic },
            pretty: false,
        })
    }

    /// Endpoint that accepts new notes.
    ///
    /// # Errors
    ///
    /// Returns `Misconfigured` when the send URL or token is missing.
    pub fn for_send(config: &Config, creds: &dyn CredentialSource) -> Result<Self, SyncError> {
        Self::resolve(
            "send",
            &config.server.send_url,
            creds.token(config, TokenKind::Note),
            creds.basic_auth(config),
        )
    }

    /// Endpoint that returns the latest note.
    ///
    /// # Errors
    ///
    /// Returns `Misconfigured` when the receive URL or token is missing.
    pub fn for_receive(config: &Config, creds: &dyn CredentialSource) -> Result<Self, SyncError> {
        Self::resolve(
            "receive",
            &config.server.receive_url,
            creds.token(config, TokenKind::Note),
            creds.basic_auth(config),
        )
    }

    /// Endpoint of the cleanup API.
    ///
    /// # Errors
    ///
    /// Returns `Misconfigured` when the cleanup URL or token is missing.
    pub fn for_cleanup(config: &Config, creds: &dyn CredentialSource) -> Result<Self, SyncError> {
        let mut endpoint = Self::resolve(
            "cleanup",
            &config.server.cleanup_url,
            creds.token(config, TokenKind::Cleanup),
            creds.basic_auth(config),
        )?;
        endpoint.pretty = config.server.cleanup_pretty;
        Ok(endpoint)
    }
}

/// Answer of a backup-count call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupCount {
    /// Number of backup copies on the server.
    pub count: u64,
    /// Raw response body.
    pub message: String,
}

/// The remote note service.
///
/// Successful calls return the server's human-readable message.
#[async_trait]
pub trait NoteApi: Send + Sync + std::fmt::Debug {
    /// Post a new note.
    async fn send_text(&self, endpoint: &Endpoint, text: &str) -> Result<String, ApiError>;

    /// Post a probe note with a short timeout.
    async fn test_connection(&self, endpoint: &Endpoint, text: &str) -> Result<String, ApiError>;

    /// Fetch the text of the most recent note; may be empty.
    async fn fetch_latest_note(&self, endpoint: &Endpoint) -> Result<String, ApiError>;

    /// Delete every note in the inbox.
    async fn delete_all_inbox(&self, endpoint: &Endpoint) -> Result<String, ApiError>;

    /// Delete all backup copies.
    async fn purge_backups(&self, endpoint: &Endpoint) -> Result<String, ApiError>;

    /// Count backup copies without deleting them.
    async fn backup_count(&self, endpoint: &Endpoint) -> Result<BackupCount, ApiError>;
}
