//! Debounce and dedupe for clipboard change notifications.
//!
//! Clipboard APIs report several notifications per logical copy, one per
//! format variant. The filter forwards a change only when enough time has
//! passed since the previous forward and the text actually differs.

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::event::ClipboardEvent;

/// Minimum time between two forwarded events.
pub const DEBOUNCE_INTERVAL: Duration = Duration::from_millis(350);

/// Normalize `\r\n` and stray `\r` line endings to `\n`.
#[must_use]
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Content hash of already-normalized text.
#[must_use]
pub fn text_hash(text: &str) -> blake3::Hash {
    blake3::hash(text.as_bytes())
}

/// Suppresses notification bursts and exact repeats.
///
/// State only changes when an event is forwarded, so a burst of raw
/// notifications cannot keep pushing the window forward.
#[derive(Debug)]
pub struct DebounceFilter {
    interval: Duration,
    last_forwarded: Option<(blake3::Hash, Instant)>,
}

impl Default for DebounceFilter {
    fn default() -> Self {
        Self::new(DEBOUNCE_INTERVAL)
    }
}

impl DebounceFilter {
    /// Create a filter with a custom debounce interval.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_forwarded: None,
        }
    }

    /// Decide whether a raw clipboard change is forwarded.
    ///
    /// Returns the event with normalized text when it passes, `None` when it
    /// is blank, too soon after the last forward, or identical to it.
    pub fn accept(&mut self, text: &str, now: Instant) -> Option<ClipboardEvent> {
        let text = normalize_line_endings(text);
        if text.trim().is_empty() {
            trace!("Ignoring blank clipboard text");
            return None;
        }

        let hash = text_hash(&text);
        if let Some((last_hash, last_at)) = self.last_forwarded {
            if now.saturating_duration_since(last_at) < self.interval {
                trace!("Clipboard change inside debounce window");
                return None;
            }
            if last_hash == hash {
                trace!("Clipboard text unchanged");
                return None;
            }
        }

        self.last_forwarded = Some((hash, now));
        Some(ClipboardEvent {
            text,
            observed_at: now,
        })
    }

    /// Filter a raw event from the source.
    pub fn accept_event(&mut self, event: &ClipboardEvent) -> Option<ClipboardEvent> {
        self.accept(&event.text, event.observed_at)
    }
}
