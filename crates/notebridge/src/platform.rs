//! Adapters from the core traits to `notebridge-native`.

use std::sync::Arc;

use notebridge_native::{
    spawn_event_forwarder, ClipboardChangeWatcher, HotkeyRegistry, MainLoop,
    PasteInjector as NativePaste, SystemClipboard,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{Binding, HotkeyConfig};
use crate::error::{Error, Result};
use crate::event::{HotkeySlot, Notifier, SourceEvent};
use crate::receiver::{ClipboardWriter, PasteInjector};
use crate::source::{
    BindingSink, ClipboardReader, EventSource, HotkeyRegistrar, LoopMessage, LoopPoster, LoopState,
};

/// OS clipboard for the core traits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeClipboard(SystemClipboard);

impl ClipboardReader for NativeClipboard {
    fn read_text(&self) -> Result<Option<String>> {
        self.0.read_text().map_err(|e| Error::platform(e.to_string()))
    }
}

impl ClipboardWriter for NativeClipboard {
    fn set_text(&self, text: &str) -> Result<()> {
        self.0
            .write_text(text)
            .map_err(|e| Error::platform(e.to_string()))
    }
}

/// OS paste injection for the core traits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativePasteInjector(NativePaste);

impl PasteInjector for NativePasteInjector {
    fn paste(&self) -> Result<String> {
        self.0
            .paste()
            .map(|method| method.to_string())
            .map_err(|e| Error::platform(e.to_string()))
    }
}

/// OS hotkey registry for the event source loop.
#[derive(Debug)]
pub struct NativeHotkeys(HotkeyRegistry);

impl NativeHotkeys {
    /// Create the platform hotkey manager on the calling thread, which must
    /// be the thread that runs the [`HotkeyLoop`].
    ///
    /// # Errors
    ///
    /// Returns an error if the platform has no usable hotkey manager.
    pub fn new() -> Result<Self> {
        HotkeyRegistry::new()
            .map(Self)
            .map_err(|e| Error::platform(e.to_string()))
    }
}

impl HotkeyRegistrar for NativeHotkeys {
    fn register(&mut self, slot: HotkeySlot, binding: &Binding) -> Result<u32> {
        self.0
            .register(slot.index(), binding.modifiers.bits(), binding.virtual_key)
            .map_err(|e| Error::platform(e.to_string()))
    }

    fn unregister(&mut self, slot: HotkeySlot) {
        self.0.unregister(slot.index());
    }
}

/// The main-thread loop that owns the OS hotkey manager.
///
/// Hotkeys registered here are delivered because this loop keeps
/// dispatching OS messages while it waits for the next [`LoopMessage`].
#[derive(Debug)]
pub struct HotkeyLoop {
    main_loop: MainLoop<LoopMessage>,
}

impl HotkeyLoop {
    /// Build the loop. Must be called on the main thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform event loop could not be created.
    pub fn new() -> Result<Self> {
        MainLoop::new()
            .map(|main_loop| Self { main_loop })
            .map_err(|e| Error::platform(e.to_string()))
    }

    /// Handle for posting into the loop from any thread.
    #[must_use]
    pub fn poster(&self) -> LoopPoster {
        let proxy = self.main_loop.proxy();
        LoopPoster::new(move |message| proxy.send(message))
    }

    /// Create the hotkey manager on this thread and run until a
    /// [`LoopMessage::Shutdown`] arrives or the engine goes away.
    ///
    /// Must not be called from inside the tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform event loop fails.
    pub fn run(self, events: mpsc::Sender<SourceEvent>, notifier: Notifier) -> Result<()> {
        let mut state = LoopState::new(
            NativeHotkeys::new(),
            NativeClipboard::default(),
            events,
            notifier,
        );
        self.main_loop
            .run(move |message| state.handle(message))
            .map_err(|e| Error::platform(e.to_string()))
    }
}

/// The event source wired to the real clipboard watcher and hotkey events.
#[derive(Debug)]
pub struct NativeSource {
    source: Arc<EventSource>,
    watcher: Option<ClipboardChangeWatcher>,
}

impl NativeSource {
    /// Attach to the hotkey loop behind `poster`, then start the clipboard
    /// watcher and the hotkey forwarder.
    ///
    /// A clipboard watcher that cannot start is logged and skipped; hotkeys
    /// keep working without it.
    ///
    /// # Errors
    ///
    /// Returns an error if the forwarder thread could not be spawned.
    pub fn start(poster: LoopPoster, hotkeys: &HotkeyConfig) -> Result<Self> {
        let source = Arc::new(EventSource::attach(poster, hotkeys));

        let poster = source.poster();
        let watcher = match ClipboardChangeWatcher::spawn(move || {
            poster.post(LoopMessage::ClipboardChanged);
        }) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!(error = %e, "Clipboard watcher unavailable, sending is disabled");
                None
            }
        };

        let poster = source.poster();
        // The forwarder blocks on the global hotkey channel for the life of
        // the process, so its handle is not kept.
        spawn_event_forwarder(move |id| poster.post(LoopMessage::HotkeyFired(id)))?;

        info!(platform = notebridge_native::platform_name(), "Native event source started");
        Ok(Self { source, watcher })
    }

    /// Binding target for the coordinator.
    #[must_use]
    pub fn bindings(&self) -> Arc<dyn BindingSink> {
        self.source.clone()
    }

    /// Stop the clipboard watcher and ask the hotkey loop to exit.
    pub fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        self.source.shutdown();
    }
}

impl Drop for NativeSource {
    fn drop(&mut self) {
        self.stop();
    }
}
