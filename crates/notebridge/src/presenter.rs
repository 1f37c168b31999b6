//! Log-based presentation of notifications.
//!
//! Stands in for a tray icon: every notification becomes one log line with
//! human-readable text. The latest cleanup result is kept for status output.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::event::{CleanupTrigger, Notification, PasteStatus};

/// Last cleanup outcome seen by the presenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupSummary {
    /// Whether the call succeeded.
    pub ok: bool,
    /// Rendered summary line.
    pub text: String,
}

/// Renders notifications through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct LogPresenter {
    last_cleanup: Arc<Mutex<Option<CleanupSummary>>>,
}

impl LogPresenter {
    /// Create a presenter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent cleanup result, if any.
    #[must_use]
    pub fn last_cleanup(&self) -> Option<CleanupSummary> {
        self.last_cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Consume notifications until the channel closes.
    pub fn spawn(self, mut notifications: broadcast::Receiver<Notification>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match notifications.recv().await {
                    Ok(notification) => self.present(&notification),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Presenter fell behind, notifications skipped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Render one notification.
    pub fn present(&self, notification: &Notification) {
        let line = render(notification);
        match notification {
            Notification::SendFailed { .. }
            | Notification::ReceiveFailed { .. }
            | Notification::CleanupFinished { ok: false, .. } => error!("{line}"),
            Notification::HotkeyUnavailable { .. }
            | Notification::Received {
                paste: PasteStatus::Failed(_),
                ..
            } => warn!("{line}"),
            _ => info!("{line}"),
        }

        if let Notification::CleanupFinished { ok, .. } = notification {
            *self
                .last_cleanup
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(CleanupSummary {
                ok: *ok,
                text: line,
            });
        }
    }
}

/// Human-readable text for a notification.
#[must_use]
pub fn render(notification: &Notification) -> String {
    match notification {
        Notification::StateChanged {
            enabled,
            cleanup_mode,
        } => format!(
            "Sync {}, scheduled cleanup {cleanup_mode}",
            if *enabled { "enabled" } else { "disabled" }
        ),
        Notification::SendSucceeded { message } => format!("Sent: {}", first_line(message)),
        Notification::SendFailed { error } => format!("Send failed: {error}"),
        Notification::Received { chars, paste } => match paste {
            PasteStatus::Skipped => format!("Received {chars} characters to the clipboard"),
            PasteStatus::Injected(method) => {
                format!("Received {chars} characters and pasted ({method})")
            }
            PasteStatus::Failed(reason) => format!(
                "Received {chars} characters to the clipboard; {reason}. \
                 Elevated target windows reject synthetic input"
            ),
        },
        Notification::ReceiveEmpty => "Nothing to receive".to_string(),
        Notification::ReceiveFailed { error } => format!("Receive failed: {error}"),
        Notification::CleanupFinished {
            kind,
            trigger,
            ok,
            message,
        } => {
            let origin = match trigger {
                CleanupTrigger::Scheduled => "Scheduled",
                CleanupTrigger::Manual => "Manual",
            };
            let status = if *ok { "done" } else { "failed" };
            format!("{origin} {kind} {status}: {}", first_line(message))
        }
        Notification::HotkeyUnavailable {
            slot,
            binding,
            reason,
        } => format!("Hotkey {binding} for {slot} is unavailable: {reason}"),
    }
}

fn first_line(message: &str) -> &str {
    message.lines().find(|l| !l.trim().is_empty()).unwrap_or("")
}
