//! Native event source loop.
//!
//! One loop owns the hotkey registrar. In the daemon that is the main-thread
//! event loop, which also dispatches the OS messages hotkeys arrive through.
//! Platform callbacks (the clipboard watcher thread, the hotkey event thread)
//! never touch the registrar; they post a [`LoopMessage`] and return. The
//! loop turns those messages into [`SourceEvent`]s on a bounded tokio channel
//! for the async engine.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, trace, warn};

use crate::config::{Binding, HotkeyConfig};
use crate::error::Result;
use crate::event::{ClipboardEvent, HotkeySlot, Notification, Notifier, SourceEvent};

/// Clipboard read attempts per change notification.
pub const CLIPBOARD_READ_ATTEMPTS: u32 = 3;

/// Pause between clipboard read attempts.
pub const CLIPBOARD_READ_BACKOFF: Duration = Duration::from_millis(40);

/// Registers global hotkeys for logical slots.
///
/// Lives on the loop thread only, so implementations need not be `Send`.
pub trait HotkeyRegistrar {
    /// Bind `slot` to `binding`, returning the id carried by fired events.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses the binding.
    fn register(&mut self, slot: HotkeySlot, binding: &Binding) -> Result<u32>;

    /// Release whatever `slot` holds.
    fn unregister(&mut self, slot: HotkeySlot);
}

/// Reads the clipboard text, one attempt per call.
pub trait ClipboardReader {
    /// Current clipboard text, `None` when it holds no text.
    ///
    /// # Errors
    ///
    /// Returns an error if the clipboard is held by another process.
    fn read_text(&self) -> Result<Option<String>>;
}

/// Receives new hotkey bindings.
pub trait BindingSink: Send + Sync + std::fmt::Debug {
    /// Rebind both hotkey slots. Must not block.
    fn apply_bindings(&self, hotkeys: &HotkeyConfig);
}

/// Bindings target for processes that register no hotkeys.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedBindings;

impl BindingSink for DetachedBindings {
    fn apply_bindings(&self, _hotkeys: &HotkeyConfig) {
        trace!("No event source attached, bindings not applied");
    }
}

/// Messages handled by the loop.
#[derive(Debug, Clone)]
pub enum LoopMessage {
    /// The clipboard changed; read it.
    ClipboardChanged,
    /// A native hotkey with this id was pressed.
    HotkeyFired(u32),
    /// Replace the hotkey bindings.
    ApplyBindings(HotkeyConfig),
    /// Stop the loop.
    Shutdown,
}

type PostFn = dyn Fn(LoopMessage) -> bool + Send + Sync;

/// Cloneable handle for posting into the loop from any thread.
#[derive(Clone)]
pub struct LoopPoster {
    post: Arc<PostFn>,
}

impl LoopPoster {
    /// Wrap whatever delivers messages to the loop. `post` returns `false`
    /// once the loop has exited.
    #[must_use]
    pub fn new<F>(post: F) -> Self
    where
        F: Fn(LoopMessage) -> bool + Send + Sync + 'static,
    {
        Self {
            post: Arc::new(post),
        }
    }

    /// Post a message; `false` once the loop has exited.
    pub fn post(&self, message: LoopMessage) -> bool {
        (self.post)(message)
    }
}

impl std::fmt::Debug for LoopPoster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopPoster").finish_non_exhaustive()
    }
}

/// The engine-side handle of a running loop.
#[derive(Debug)]
pub struct EventSource {
    poster: LoopPoster,
}

impl EventSource {
    /// Attach to a loop and ask it to bind the initial hotkeys.
    #[must_use]
    pub fn attach(poster: LoopPoster, initial: &HotkeyConfig) -> Self {
        if !poster.post(LoopMessage::ApplyBindings(initial.clone())) {
            warn!("Event source stopped before the first bindings");
        }
        Self { poster }
    }

    /// Handle for platform callbacks.
    #[must_use]
    pub fn poster(&self) -> LoopPoster {
        self.poster.clone()
    }

    /// Ask the loop to release its hotkeys and exit.
    pub fn shutdown(&self) {
        self.poster.post(LoopMessage::Shutdown);
    }
}

impl BindingSink for EventSource {
    fn apply_bindings(&self, hotkeys: &HotkeyConfig) {
        if !self.poster.post(LoopMessage::ApplyBindings(hotkeys.clone())) {
            warn!("Event source stopped, bindings not applied");
        }
    }
}

/// State owned by the loop: the registrar, the id map and the outgoing
/// channel.
///
/// The loop itself is whatever calls [`LoopState::handle`] for every posted
/// message. It must not run inside the tokio runtime, because hotkey events
/// wait for room on the channel rather than being dropped.
pub struct LoopState<R, C> {
    registrar: Option<R>,
    reader: C,
    ids: HashMap<u32, HotkeySlot>,
    events: tokio::sync::mpsc::Sender<SourceEvent>,
    notifier: Notifier,
}

impl<R, C> std::fmt::Debug for LoopState<R, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopState")
            .field("hotkeys_available", &self.registrar.is_some())
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}

impl<R: HotkeyRegistrar, C: ClipboardReader> LoopState<R, C> {
    /// Build the loop state on the loop thread.
    ///
    /// When `registrar` failed the loop still forwards clipboard changes and
    /// every slot is reported unbound.
    #[must_use]
    pub fn new(
        registrar: Result<R>,
        reader: C,
        events: tokio::sync::mpsc::Sender<SourceEvent>,
        notifier: Notifier,
    ) -> Self {
        let registrar = match registrar {
            Ok(registrar) => Some(registrar),
            Err(e) => {
                warn!(error = %e, "Hotkeys unavailable");
                None
            }
        };
        Self {
            registrar,
            reader,
            ids: HashMap::new(),
            events,
            notifier,
        }
    }

    /// Handle one message. Returns `false` once the loop should stop, after
    /// every hotkey has been released.
    pub fn handle(&mut self, message: LoopMessage) -> bool {
        let keep_running = match message {
            LoopMessage::ClipboardChanged => self.on_clipboard_changed(),
            LoopMessage::HotkeyFired(id) => self.on_hotkey(id),
            LoopMessage::ApplyBindings(hotkeys) => {
                self.apply_bindings(&hotkeys);
                true
            }
            LoopMessage::Shutdown => false,
        };
        if !keep_running {
            self.release_all();
            debug!("Event source loop stopped");
        }
        keep_running
    }

    fn release_all(&mut self) {
        self.ids.clear();
        if let Some(registrar) = self.registrar.as_mut() {
            for slot in HotkeySlot::ALL {
                registrar.unregister(slot);
            }
        }
    }

    /// Clipboard changes are dropped when the engine is behind; the debounce
    /// would collapse them anyway.
    fn forward_clipboard(&self, event: SourceEvent) -> bool {
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(?event, "Engine is behind, dropping clipboard change");
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Engine gone, stopping event source");
                false
            }
        }
    }

    /// Hotkey presses are never dropped; the loop waits for room.
    fn forward_hotkey(&self, slot: HotkeySlot) -> bool {
        if self.events.blocking_send(SourceEvent::Hotkey(slot)).is_ok() {
            true
        } else {
            debug!("Engine gone, stopping event source");
            false
        }
    }

    fn on_clipboard_changed(&self) -> bool {
        match read_with_retry(&self.reader) {
            Some(text) => {
                self.forward_clipboard(SourceEvent::ClipboardText(ClipboardEvent::now(text)))
            }
            None => true,
        }
    }

    fn on_hotkey(&self, id: u32) -> bool {
        match self.ids.get(&id) {
            Some(&slot) => {
                debug!(%slot, "Hotkey fired");
                self.forward_hotkey(slot)
            }
            None => {
                trace!(id, "Ignoring unknown hotkey id");
                true
            }
        }
    }

    fn apply_bindings(&mut self, hotkeys: &HotkeyConfig) {
        for slot in HotkeySlot::ALL {
            let binding = match slot {
                HotkeySlot::Toggle => &hotkeys.toggle,
                HotkeySlot::Receive => &hotkeys.receive,
            };
            self.ids.retain(|_, bound| *bound != slot);

            let Some(registrar) = self.registrar.as_mut() else {
                self.report_unavailable(slot, binding, "hotkeys are not available");
                continue;
            };
            registrar.unregister(slot);

            if binding.modifiers.is_empty() {
                self.report_unavailable(slot, binding, "binding has no modifier keys");
                continue;
            }

            match registrar.register(slot, binding) {
                Ok(id) => {
                    info!(%slot, binding = %binding.display, "Hotkey bound");
                    self.ids.insert(id, slot);
                }
                Err(e) => self.report_unavailable(slot, binding, &e.to_string()),
            }
        }
    }

    fn report_unavailable(&self, slot: HotkeySlot, binding: &Binding, reason: &str) {
        warn!(%slot, binding = %binding.display, reason, "Hotkey left unbound");
        self.notifier.publish(Notification::HotkeyUnavailable {
            slot,
            binding: binding.display.clone(),
            reason: reason.to_string(),
        });
    }
}

/// Read the clipboard with a few short retries.
///
/// Another process may still own the clipboard right after it announced a
/// change, so a couple of failed reads are expected.
fn read_with_retry<C: ClipboardReader + ?Sized>(reader: &C) -> Option<String> {
    for attempt in 1..=CLIPBOARD_READ_ATTEMPTS {
        match reader.read_text() {
            Ok(text) => return text,
            Err(e) => {
                trace!(attempt, error = %e, "Clipboard read failed");
                if attempt < CLIPBOARD_READ_ATTEMPTS {
                    thread::sleep(CLIPBOARD_READ_BACKOFF);
                }
            }
        }
    }
    warn!("Clipboard still busy, change dropped");
    None
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread::JoinHandle;

    use tokio::sync::mpsc::Receiver;
    use tokio::time::timeout;

    use super::*;
    use crate::config::Modifiers;
    use crate::error::Error;

    const WAIT: Duration = Duration::from_secs(2);

    #[derive(Debug, Default)]
    struct Registry {
        log: Mutex<Vec<String>>,
        reject: Mutex<Option<HotkeySlot>>,
    }

    impl Registry {
        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    struct MockRegistrar(Arc<Registry>);

    impl HotkeyRegistrar for MockRegistrar {
        fn register(&mut self, slot: HotkeySlot, binding: &Binding) -> Result<u32> {
            if *self.0.reject.lock().unwrap() == Some(slot) {
                return Err(Error::platform("already taken"));
            }
            self.0
                .log
                .lock()
                .unwrap()
                .push(format!("register {slot} {}", binding.virtual_key));
            Ok(100 + binding.virtual_key)
        }

        fn unregister(&mut self, slot: HotkeySlot) {
            self.0.log.lock().unwrap().push(format!("unregister {slot}"));
        }
    }

    struct MockReader {
        failures: AtomicUsize,
        text: Option<String>,
    }

    impl ClipboardReader for MockReader {
        fn read_text(&self) -> Result<Option<String>> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::platform("busy"));
            }
            Ok(self.text.clone())
        }
    }

    fn reader(text: &str, failures: usize) -> MockReader {
        MockReader {
            failures: AtomicUsize::new(failures),
            text: Some(text.to_string()),
        }
    }

    /// Drive a loop on a plain thread, the way the main loop drives it.
    fn spawn_loop<R, C>(mut state: LoopState<R, C>) -> (LoopPoster, JoinHandle<()>)
    where
        R: HotkeyRegistrar + Send + 'static,
        C: ClipboardReader + Send + 'static,
    {
        let (tx, rx) = std::sync::mpsc::channel();
        let thread = thread::spawn(move || {
            while let Ok(message) = rx.recv() {
                if !state.handle(message) {
                    break;
                }
            }
        });
        (LoopPoster::new(move |message| tx.send(message).is_ok()), thread)
    }

    struct Running {
        source: EventSource,
        events: Receiver<SourceEvent>,
        thread: JoinHandle<()>,
    }

    impl Running {
        fn post(&self, message: LoopMessage) {
            assert!(self.source.poster().post(message));
        }

        fn stop(self) {
            self.source.shutdown();
            self.thread.join().unwrap();
        }
    }

    fn start_with_capacity(
        registry: &Arc<Registry>,
        reader: MockReader,
        hotkeys: &HotkeyConfig,
        notifier: Notifier,
        capacity: usize,
    ) -> Running {
        let (tx, events) = tokio::sync::mpsc::channel(capacity);
        let state = LoopState::new(Ok(MockRegistrar(registry.clone())), reader, tx, notifier);
        let (poster, thread) = spawn_loop(state);
        Running {
            source: EventSource::attach(poster, hotkeys),
            events,
            thread,
        }
    }

    fn start(
        registry: &Arc<Registry>,
        reader: MockReader,
        hotkeys: &HotkeyConfig,
        notifier: Notifier,
    ) -> Running {
        start_with_capacity(registry, reader, hotkeys, notifier, 8)
    }

    #[tokio::test]
    async fn test_clipboard_change_is_forwarded() {
        let registry = Arc::new(Registry::default());
        let mut running = start(
            &registry,
            reader("copied", 0),
            &HotkeyConfig::default(),
            Notifier::new(),
        );

        running.post(LoopMessage::ClipboardChanged);

        let event = timeout(WAIT, running.events.recv()).await.unwrap().unwrap();
        match event {
            SourceEvent::ClipboardText(event) => assert_eq!(event.text, "copied"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_clipboard_read_retries_then_succeeds() {
        let registry = Arc::new(Registry::default());
        let mut running = start(
            &registry,
            reader("late", 2),
            &HotkeyConfig::default(),
            Notifier::new(),
        );

        running.post(LoopMessage::ClipboardChanged);

        let event = timeout(WAIT, running.events.recv()).await.unwrap().unwrap();
        assert!(matches!(event, SourceEvent::ClipboardText(e) if e.text == "late"));
    }

    #[tokio::test]
    async fn test_clipboard_read_gives_up_after_three_attempts() {
        let registry = Arc::new(Registry::default());
        let mut running = start(
            &registry,
            reader("never", 3),
            &HotkeyConfig::default(),
            Notifier::new(),
        );

        running.post(LoopMessage::ClipboardChanged);
        assert!(timeout(Duration::from_millis(300), running.events.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_hotkey_ids_map_to_slots() {
        let registry = Arc::new(Registry::default());
        let mut running = start(
            &registry,
            reader("", 0),
            &HotkeyConfig::default(),
            Notifier::new(),
        );

        running.post(LoopMessage::HotkeyFired(100 + 0x52));
        running.post(LoopMessage::HotkeyFired(7));
        running.post(LoopMessage::HotkeyFired(100 + 0x4E));

        let first = timeout(WAIT, running.events.recv()).await.unwrap().unwrap();
        let second = timeout(WAIT, running.events.recv()).await.unwrap().unwrap();
        assert_eq!(first, SourceEvent::Hotkey(HotkeySlot::Receive));
        assert_eq!(second, SourceEvent::Hotkey(HotkeySlot::Toggle));
    }

    #[tokio::test]
    async fn test_hotkey_waits_for_room_while_clipboard_is_dropped() {
        let registry = Arc::new(Registry::default());
        let mut running = start_with_capacity(
            &registry,
            reader("burst", 0),
            &HotkeyConfig::default(),
            Notifier::new(),
            1,
        );

        // The first change fills the channel, the second is dropped, and the
        // hotkey waits until the engine catches up.
        running.post(LoopMessage::ClipboardChanged);
        running.post(LoopMessage::ClipboardChanged);
        running.post(LoopMessage::HotkeyFired(100 + 0x52));
        tokio::time::sleep(Duration::from_millis(200)).await;

        let first = timeout(WAIT, running.events.recv()).await.unwrap().unwrap();
        assert!(matches!(first, SourceEvent::ClipboardText(_)));
        let second = timeout(WAIT, running.events.recv()).await.unwrap().unwrap();
        assert_eq!(second, SourceEvent::Hotkey(HotkeySlot::Receive));
        assert!(timeout(Duration::from_millis(100), running.events.recv())
            .await
            .is_err());

        running.stop();
    }

    #[tokio::test]
    async fn test_rebinding_unregisters_first() {
        let registry = Arc::new(Registry::default());
        let mut running = start(
            &registry,
            reader("", 0),
            &HotkeyConfig::default(),
            Notifier::new(),
        );

        let mut hotkeys = HotkeyConfig::default();
        hotkeys.receive = Binding::new(Modifiers::CTRL | Modifiers::SHIFT, 0x56, "Ctrl + Shift + V");
        running.source.apply_bindings(&hotkeys);

        // The old receive id no longer maps to anything.
        running.post(LoopMessage::HotkeyFired(100 + 0x52));
        running.post(LoopMessage::HotkeyFired(100 + 0x56));
        let event = timeout(WAIT, running.events.recv()).await.unwrap().unwrap();
        assert_eq!(event, SourceEvent::Hotkey(HotkeySlot::Receive));

        running.stop();
        let log = registry.log();
        assert_eq!(
            &log[4..8],
            [
                "unregister toggle".to_string(),
                format!("register toggle {}", 0x4E),
                "unregister receive".to_string(),
                format!("register receive {}", 0x56),
            ]
        );
    }

    #[test]
    fn test_apply_bindings_drives_registrar_and_reports_failures() {
        let registry = Arc::new(Registry::default());
        *registry.reject.lock().unwrap() = Some(HotkeySlot::Receive);
        let notifier = Notifier::new();
        let mut notifications = notifier.subscribe();
        let (tx, mut events) = tokio::sync::mpsc::channel(8);
        let mut state = LoopState::new(Ok(MockRegistrar(registry.clone())), reader("", 0), tx, notifier);

        assert!(state.handle(LoopMessage::ApplyBindings(HotkeyConfig::default())));
        assert_eq!(
            registry.log(),
            [
                "unregister toggle".to_string(),
                format!("register toggle {}", 0x4E),
                "unregister receive".to_string(),
            ]
        );
        assert_eq!(
            notifications.try_recv().unwrap(),
            Notification::HotkeyUnavailable {
                slot: HotkeySlot::Receive,
                binding: "Ctrl + Alt + R".to_string(),
                reason: "platform error: already taken".to_string(),
            }
        );
        assert!(notifications.try_recv().is_err());

        // A zero-modifier toggle is released and never registered.
        let mut hotkeys = HotkeyConfig::default();
        hotkeys.toggle.modifiers = Modifiers::NONE;
        *registry.reject.lock().unwrap() = None;
        assert!(state.handle(LoopMessage::ApplyBindings(hotkeys)));
        assert_eq!(
            &registry.log()[3..],
            [
                "unregister toggle".to_string(),
                "unregister receive".to_string(),
                format!("register receive {}", 0x52),
            ]
        );
        assert!(matches!(
            notifications.try_recv().unwrap(),
            Notification::HotkeyUnavailable { slot: HotkeySlot::Toggle, ref reason, .. }
                if reason == "binding has no modifier keys"
        ));

        // The stale toggle id is gone, the new receive id works.
        assert!(state.handle(LoopMessage::HotkeyFired(100 + 0x4E)));
        assert!(state.handle(LoopMessage::HotkeyFired(100 + 0x52)));
        assert_eq!(events.try_recv().unwrap(), SourceEvent::Hotkey(HotkeySlot::Receive));
        assert!(events.try_recv().is_err());

        // Shutdown releases both slots and stops the loop.
        assert!(!state.handle(LoopMessage::Shutdown));
        assert_eq!(
            &registry.log()[6..],
            ["unregister toggle".to_string(), "unregister receive".to_string()]
        );
    }

    #[test]
    fn test_closed_engine_stops_the_loop() {
        let registry = Arc::new(Registry::default());
        let (tx, events) = tokio::sync::mpsc::channel(8);
        let mut state = LoopState::new(
            Ok(MockRegistrar(registry.clone())),
            reader("orphan", 0),
            tx,
            Notifier::new(),
        );
        assert!(state.handle(LoopMessage::ApplyBindings(HotkeyConfig::default())));
        drop(events);

        assert!(!state.handle(LoopMessage::HotkeyFired(100 + 0x4E)));
        assert!(registry.log().ends_with(&[
            "unregister toggle".to_string(),
            "unregister receive".to_string()
        ]));
    }

    #[tokio::test]
    async fn test_registration_failure_leaves_slot_unbound() {
        let registry = Arc::new(Registry::default());
        *registry.reject.lock().unwrap() = Some(HotkeySlot::Receive);
        let notifier = Notifier::new();
        let mut notifications = notifier.subscribe();

        let mut running = start(
            &registry,
            reader("", 0),
            &HotkeyConfig::default(),
            notifier,
        );

        let notification = timeout(WAIT, notifications.recv()).await.unwrap().unwrap();
        assert!(matches!(
            notification,
            Notification::HotkeyUnavailable { slot: HotkeySlot::Receive, ref reason, .. }
                if reason.contains("already taken")
        ));

        running.post(LoopMessage::HotkeyFired(100 + 0x52));
        running.post(LoopMessage::HotkeyFired(100 + 0x4E));
        let event = timeout(WAIT, running.events.recv()).await.unwrap().unwrap();
        assert_eq!(event, SourceEvent::Hotkey(HotkeySlot::Toggle));
    }

    #[tokio::test]
    async fn test_registrar_failure_keeps_clipboard_working() {
        let notifier = Notifier::new();
        let mut notifications = notifier.subscribe();
        let (tx, mut events) = tokio::sync::mpsc::channel(8);
        let state = LoopState::new(
            Err::<MockRegistrar, _>(Error::platform("no display")),
            reader("still works", 0),
            tx,
            notifier,
        );
        let (poster, _thread) = spawn_loop(state);
        let source = EventSource::attach(poster, &HotkeyConfig::default());

        for _ in HotkeySlot::ALL {
            let notification = timeout(WAIT, notifications.recv()).await.unwrap().unwrap();
            assert!(matches!(notification, Notification::HotkeyUnavailable { .. }));
        }

        source.poster().post(LoopMessage::ClipboardChanged);
        let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        assert!(matches!(event, SourceEvent::ClipboardText(_)));
    }

    #[test]
    fn test_poster_reports_stopped_loop() {
        let (tx, rx) = std::sync::mpsc::channel();
        let poster = LoopPoster::new(move |message| tx.send(message).is_ok());
        assert!(poster.post(LoopMessage::ClipboardChanged));

        drop(rx);
        assert!(!poster.post(LoopMessage::ClipboardChanged));
    }
}
