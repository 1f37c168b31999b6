//! Receive, write to the clipboard, then paste.
//!
//! Each step short-circuits with its own outcome: a fetch failure never
//! touches the clipboard, an empty note is reported as [`ReceiveOutcome::Empty`],
//! and a failed paste still leaves the text on the clipboard.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::api::{CredentialSource, Endpoint, NoteApi};
use crate::config::Config;
use crate::error::{Error, SyncError};
use crate::event::PasteStatus;
use crate::filter::normalize_line_endings;
use crate::flight::FlightGuard;

/// Clipboard write attempts before giving up.
pub const CLIPBOARD_WRITE_ATTEMPTS: u32 = 5;

/// Pause between clipboard write attempts.
pub const CLIPBOARD_RETRY_DELAY: Duration = Duration::from_millis(40);

/// Writes text to the system clipboard, one attempt per call.
pub trait ClipboardWriter: Send + Sync + std::fmt::Debug {
    /// Replace the clipboard contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the clipboard is held by another process.
    fn set_text(&self, text: &str) -> Result<(), Error>;
}

/// Injects the paste chord into the focused window.
pub trait PasteInjector: Send + Sync + std::fmt::Debug {
    /// Paste, returning a label for the method that worked.
    ///
    /// # Errors
    ///
    /// Returns an error if every injection path failed.
    fn paste(&self) -> Result<String, Error>;
}

/// Result of a receive that reached the remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// The endpoint had no note; the clipboard was left alone.
    Empty,
    /// The note is on the clipboard.
    Received {
        /// Number of characters written.
        chars: usize,
        /// Outcome of the paste step.
        paste: PasteStatus,
    },
}

/// Runs the receive sequence, one at a time.
#[derive(Debug)]
pub struct ReceiveSequencer {
    api: Arc<dyn NoteApi>,
    credentials: Arc<dyn CredentialSource>,
    clipboard: Arc<dyn ClipboardWriter>,
    paste: Arc<dyn PasteInjector>,
    receiving: AtomicBool,
}

impl ReceiveSequencer {
    /// Create a sequencer.
    #[must_use]
    pub fn new(
        api: Arc<dyn NoteApi>,
        credentials: Arc<dyn CredentialSource>,
        clipboard: Arc<dyn ClipboardWriter>,
        paste: Arc<dyn PasteInjector>,
    ) -> Self {
        Self {
            api,
            credentials,
            clipboard,
            paste,
            receiving: AtomicBool::new(false),
        }
    }

    /// Fetch the latest note, put it on the clipboard and paste it.
    ///
    /// # Errors
    ///
    /// `Busy`, `Misconfigured`, `TransportFailure` or `ClipboardUnavailable`.
    /// A failed paste is not an error; see [`PasteStatus::Failed`].
    #[instrument(skip_all)]
    pub async fn receive(&self, config: &Config) -> Result<ReceiveOutcome, SyncError> {
        let Some(_guard) = FlightGuard::acquire(&self.receiving) else {
            debug!("Receive already in flight");
            return Err(SyncError::Busy);
        };

        let endpoint = Endpoint::for_receive(config, self.credentials.as_ref())?;
        let text = self.api.fetch_latest_note(&endpoint).await.map_err(|e| {
            warn!(error = %e, "Fetch failed");
            SyncError::from(e)
        })?;

        if text.trim().is_empty() {
            info!("Remote has no note");
            return Ok(ReceiveOutcome::Empty);
        }

        let text = normalize_line_endings(&text);
        self.write_clipboard(&text).await?;

        tokio::time::sleep(config.stabilize_wait()).await;

        let paste = if config.receive.auto_paste {
            self.inject_paste().await
        } else {
            PasteStatus::Skipped
        };

        let chars = text.chars().count();
        info!(chars, ?paste, "Note received");
        Ok(ReceiveOutcome::Received { chars, paste })
    }

    async fn write_clipboard(&self, text: &str) -> Result<(), SyncError> {
        let mut last_error = String::new();

        for attempt in 1..=CLIPBOARD_WRITE_ATTEMPTS {
            let clipboard = self.clipboard.clone();
            let owned = text.to_string();
            let result = tokio::task::spawn_blocking(move || clipboard.set_text(&owned))
                .await
                .map_err(|e| Error::internal(e.to_string()))
                .and_then(|r| r);

            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!(attempt, error = %e, "Clipboard write failed");
                    last_error = e.to_string();
                }
            }
            if attempt < CLIPBOARD_WRITE_ATTEMPTS {
                tokio::time::sleep(CLIPBOARD_RETRY_DELAY).await;
            }
        }

        warn!(error = %last_error, "Clipboard unavailable");
        Err(SyncError::ClipboardUnavailable(last_error))
    }

    async fn inject_paste(&self) -> PasteStatus {
        let paste = self.paste.clone();
        let result = tokio::task::spawn_blocking(move || paste.paste())
            .await
            .map_err(|e| Error::internal(e.to_string()))
            .and_then(|r| r);

        match result {
            Ok(method) => PasteStatus::Injected(method),
            Err(e) => {
                warn!(error = %e, "Auto paste failed");
                PasteStatus::Failed(SyncError::PasteInjectionFailed(e.to_string()).to_string())
            }
        }
    }
}
