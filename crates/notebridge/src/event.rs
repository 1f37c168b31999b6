//! Events flowing into the engine and notifications flowing out of it.
//!
//! [`SourceEvent`]s come from the native event source and are handled in
//! arrival order by the daemon. [`Notification`]s are typed outcomes that
//! presentation layers subscribe to; they carry data, never formatted text.

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::trace;

use crate::config::CleanupMode;
use crate::error::SyncError;

/// Capacity of the notification broadcast channel.
const NOTIFICATION_CAPACITY: usize = 64;

/// A clipboard text change.
///
/// Events from the source carry the raw text; events forwarded by the
/// debounce filter carry normalized text with `\n` line endings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardEvent {
    /// Clipboard text.
    pub text: String,
    /// When the change was observed.
    pub observed_at: Instant,
}

/// Logical hotkey slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HotkeySlot {
    /// Flips the master switch.
    Toggle,
    /// Fetches the latest note and pastes it.
    Receive,
}

impl HotkeySlot {
    /// Both slots, in registration order.
    pub const ALL: [Self; 2] = [Self::Toggle, Self::Receive];

    /// Stable numeric id used by the native registry.
    #[must_use]
    pub const fn index(self) -> u32 {
        match self {
            Self::Toggle => 0,
            Self::Receive => 1,
        }
    }
}

impl ClipboardEvent {
    /// An event observed now.
    #[must_use]
    pub fn now(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            observed_at: Instant::now(),
        }
    }
}

impl std::fmt::Display for HotkeySlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Toggle => write!(f, "toggle"),
            Self::Receive => write!(f, "receive"),
        }
    }
}

/// Raw events delivered by the native event source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// The clipboard text changed (not yet debounced).
    ClipboardText(ClipboardEvent),
    /// A hotkey slot fired.
    Hotkey(HotkeySlot),
}

/// What started a cleanup operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTrigger {
    /// Fired by the scheduler.
    Scheduled,
    /// Requested by the user.
    Manual,
}

/// Remote cleanup operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupKind {
    /// Delete every note in the inbox.
    DeleteInbox,
    /// Purge backup copies.
    PurgeBackups,
    /// Count backup copies without deleting them.
    BackupCount,
}

impl std::fmt::Display for CleanupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeleteInbox => write!(f, "delete inbox"),
            Self::PurgeBackups => write!(f, "purge backups"),
            Self::BackupCount => write!(f, "backup count"),
        }
    }
}

/// How the paste step of a receive ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum PasteStatus {
    /// Auto-paste is off.
    Skipped,
    /// The chord was injected by the named method.
    Injected(String),
    /// Both injection paths failed; the clipboard still holds the text.
    Failed(String),
}

/// Typed notifications for presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    /// The master switch or cleanup mode changed.
    StateChanged {
        /// Master switch.
        enabled: bool,
        /// Cleanup schedule now in effect.
        cleanup_mode: CleanupMode,
    },
    /// A send reached the remote endpoint.
    SendSucceeded {
        /// Remote response message.
        message: String,
    },
    /// A send failed.
    SendFailed {
        /// Why it failed.
        error: SyncError,
    },
    /// A note was received and written to the clipboard.
    Received {
        /// Number of characters received.
        chars: usize,
        /// Outcome of the paste step.
        paste: PasteStatus,
    },
    /// The remote endpoint had no note.
    ReceiveEmpty,
    /// A receive failed before the clipboard was written.
    ReceiveFailed {
        /// Why it failed.
        error: SyncError,
    },
    /// A cleanup call finished. Scheduled fires skipped because cleanup was
    /// turned off in the meantime publish nothing.
    CleanupFinished {
        /// Which operation ran.
        kind: CleanupKind,
        /// What started it.
        trigger: CleanupTrigger,
        /// Whether the remote call succeeded.
        ok: bool,
        /// Remote response or error message.
        message: String,
    },
    /// A hotkey slot could not be bound.
    HotkeyUnavailable {
        /// The slot left unbound.
        slot: HotkeySlot,
        /// Binding label.
        binding: String,
        /// Why registration failed.
        reason: String,
    },
}

/// Fan-out of [`Notification`]s to any number of subscribers.
///
/// Publishing never blocks and never fails; with no subscribers the
/// notification is dropped.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    /// Create a notifier with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self { tx }
    }

    /// Publish a notification.
    pub fn publish(&self, notification: Notification) {
        trace!(?notification, "Publishing notification");
        let _ = self.tx.send(notification);
    }

    /// Subscribe to notifications published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}
