//! Clipboard access and change watching.
//!
//! Reads and writes are single attempts; callers decide how often to retry,
//! because ownership of the clipboard can be held briefly by whichever
//! process wrote it last. Change notifications come from a dedicated watcher
//! thread and are forwarded through a callback without touching the clipboard.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use clipboard_rs::{
    Clipboard, ClipboardContext, ClipboardHandler, ClipboardWatcher, ClipboardWatcherContext,
    ContentFormat, WatcherShutdown,
};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Errors that can occur while talking to the system clipboard.
#[derive(Debug, Error)]
pub enum ClipboardError {
    /// Failed to access the clipboard.
    #[error("clipboard access failed: {0}")]
    AccessFailed(String),

    /// Failed to start or run the change watcher.
    #[error("clipboard watcher failed: {0}")]
    WatcherFailed(String),
}

/// Result type for clipboard operations.
pub type Result<T> = std::result::Result<T, ClipboardError>;

/// Handle to the system clipboard.
///
/// A fresh platform context is opened for every operation, so the handle is
/// cheap and can be shared between threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClipboard;

impl SystemClipboard {
    /// Create a new clipboard handle.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Read the current clipboard text.
    ///
    /// Returns `Ok(None)` when the clipboard holds no text at all.
    ///
    /// # Errors
    ///
    /// Returns an error if the clipboard holds text but it could not be read,
    /// typically because another process still owns it.
    pub fn read_text(&self) -> Result<Option<String>> {
        let ctx =
            ClipboardContext::new().map_err(|e| ClipboardError::AccessFailed(e.to_string()))?;

        if !ctx.has(ContentFormat::Text) {
            trace!("Clipboard holds no text");
            return Ok(None);
        }

        match ctx.get_text() {
            Ok(text) if text.is_empty() => Ok(None),
            Ok(text) => Ok(Some(text)),
            Err(e) => Err(ClipboardError::AccessFailed(e.to_string())),
        }
    }

    /// Replace the clipboard contents with `text`.
    ///
    /// # Errors
    ///
    /// Returns an error if the clipboard could not be opened or written.
    pub fn write_text(&self, text: &str) -> Result<()> {
        let ctx =
            ClipboardContext::new().map_err(|e| ClipboardError::AccessFailed(e.to_string()))?;
        ctx.set_text(text.to_string())
            .map_err(|e| ClipboardError::AccessFailed(e.to_string()))
    }
}

struct ChangeForwarder<F> {
    on_change: F,
}

impl<F: FnMut() + Send> ClipboardHandler for ChangeForwarder<F> {
    fn on_clipboard_change(&mut self) {
        (self.on_change)();
    }
}

/// Watches the clipboard for changes on a dedicated thread.
///
/// The callback runs on the watcher thread. It should only post a message to
/// whoever owns the interesting state, never do the work itself.
pub struct ClipboardChangeWatcher {
    shutdown: Option<WatcherShutdown>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ClipboardChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipboardChangeWatcher")
            .field("running", &self.is_running())
            .finish()
    }
}

impl ClipboardChangeWatcher {
    /// Start watching and invoke `on_change` for every clipboard notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform watcher could not be created.
    pub fn spawn<F>(on_change: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread = thread::Builder::new()
            .name("clipboard-watcher".to_string())
            .spawn(move || {
                let mut ctx = match ClipboardWatcherContext::<ChangeForwarder<F>>::new() {
                    Ok(ctx) => ctx,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let shutdown = ctx
                    .add_handler(ChangeForwarder { on_change })
                    .get_shutdown_channel();
                if ready_tx.send(Ok(shutdown)).is_err() {
                    return;
                }

                debug!("Clipboard watcher started");
                ctx.start_watch();
                debug!("Clipboard watcher stopped");
            })
            .map_err(|e| ClipboardError::WatcherFailed(e.to_string()))?;

        let shutdown = ready_rx
            .recv()
            .map_err(|_| ClipboardError::WatcherFailed("watcher thread exited".to_string()))?
            .map_err(ClipboardError::WatcherFailed)?;

        Ok(Self {
            shutdown: Some(shutdown),
            thread: Some(thread),
        })
    }

    /// Check if the watcher thread is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the watcher and wait for its thread to exit.
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.stop();
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Clipboard watcher thread panicked");
            }
        }
    }
}

impl Drop for ClipboardChangeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
