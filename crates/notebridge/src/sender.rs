//! Single-flight dispatcher for outbound notes.
//!
//! At most one send is in flight process-wide. A concurrent call is rejected
//! with [`SyncError::Busy`], never queued. Repeats of the text that was just
//! dispatched are dropped as [`SyncError::Duplicate`] for a short window.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::api::{CredentialSource, Endpoint, NoteApi};
use crate::config::Config;
use crate::error::SyncError;
use crate::filter::{normalize_line_endings, text_hash};
use crate::flight::FlightGuard;

/// Repeats of the last dispatched text inside this window are dropped.
pub const DUPLICATE_WINDOW: Duration = Duration::from_secs(2);

/// Acknowledgement of a dispatched note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendAck {
    /// Remote response message.
    pub message: String,
}

#[derive(Debug, Clone, Copy)]
struct LastSent {
    hash: blake3::Hash,
    at: Instant,
}

/// Sends notes to the remote endpoint, one at a time.
#[derive(Debug)]
pub struct Dispatcher {
    api: Arc<dyn NoteApi>,
    credentials: Arc<dyn CredentialSource>,
    sending: AtomicBool,
    last_sent: Mutex<Option<LastSent>>,
}

impl Dispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(api: Arc<dyn NoteApi>, credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            api,
            credentials,
            sending: AtomicBool::new(false),
            last_sent: Mutex::new(None),
        }
    }

    /// Send `text` using the endpoint from `config`.
    ///
    /// # Errors
    ///
    /// Checked in this order: `Busy`, `Misconfigured`, `EmptyPayload`,
    /// `Duplicate`, then `TransportFailure` from the remote call.
    #[instrument(skip_all, fields(chars = text.chars().count()))]
    pub async fn send(&self, config: &Config, text: &str) -> Result<SendAck, SyncError> {
        let Some(_guard) = FlightGuard::acquire(&self.sending) else {
            debug!("Send already in flight");
            return Err(SyncError::Busy);
        };

        let endpoint = Endpoint::for_send(config, self.credentials.as_ref())?;

        let text = normalize_line_endings(text);
        if text.trim().is_empty() {
            return Err(SyncError::EmptyPayload);
        }

        let hash = text_hash(&text);
        if self.is_recent_duplicate(hash, Instant::now()) {
            debug!("Dropping duplicate send");
            return Err(SyncError::Duplicate);
        }

        let result = self.api.send_text(&endpoint, &text).await;

        // The window is about repeats the user sees, so any remote answer
        // counts, whatever its status.
        let answered = match &result {
            Ok(_) => true,
            Err(e) => e.remote_answered(),
        };
        if answered {
            self.record_sent(hash, Instant::now());
        }

        match result {
            Ok(message) => {
                info!("Note sent");
                Ok(SendAck { message })
            }
            Err(e) => {
                warn!(error = %e, "Send failed");
                Err(e.into())
            }
        }
    }

    /// Post a `TEST` note to check URL and credentials.
    ///
    /// Bypasses the single-flight flag and leaves the duplicate window alone.
    ///
    /// # Errors
    ///
    /// Returns `Misconfigured` or `TransportFailure`.
    pub async fn test_connection(&self, config: &Config) -> Result<SendAck, SyncError> {
        let endpoint = Endpoint::for_send(config, self.credentials.as_ref())?;
        let text = format!(
            "TEST\n{}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );

        let message = self.api.test_connection(&endpoint, &text).await?;
        info!("Connection test succeeded");
        Ok(SendAck { message })
    }

    /// Whether a send is in flight right now.
    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.sending.load(std::sync::atomic::Ordering::Acquire)
    }

    fn is_recent_duplicate(&self, hash: blake3::Hash, now: Instant) -> bool {
        let last = *self.last_sent.lock().unwrap_or_else(PoisonError::into_inner);
        last.is_some_and(|last| {
            last.hash == hash && now.saturating_duration_since(last.at) < DUPLICATE_WINDOW
        })
    }

    fn record_sent(&self, hash: blake3::Hash, at: Instant) {
        *self.last_sent.lock().unwrap_or_else(PoisonError::into_inner) = Some(LastSent { hash, at });
    }
}
