//! Foreground daemon: wires the event source to the sync engine.
//!
//! [`Engine`] consumes source events on one task in arrival order and turns
//! operation results into notifications. [`Daemon`] builds the real
//! collaborators around it and runs until Ctrl-C, with the hotkey loop on
//! the calling thread and everything else on the tokio runtime.

use std::path::Path;
use std::sync::Arc;

use tokio::runtime::{Handle, Runtime};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ConfigCredentials, CredentialSource, HttpNoteApi, NoteApi};
use crate::config::{Config, JsonSettingsStore};
use crate::coordinator::Coordinator;
use crate::error::{Error, Result, SyncError};
use crate::event::{ClipboardEvent, HotkeySlot, Notification, Notifier, SourceEvent};
use crate::filter::DebounceFilter;
use crate::platform::{HotkeyLoop, NativeClipboard, NativePasteInjector, NativeSource};
use crate::presenter::LogPresenter;
use crate::receiver::{ReceiveOutcome, ReceiveSequencer};
use crate::scheduler::{CleanupScheduler, LocalClock};
use crate::sender::{Dispatcher, SendAck};
use crate::source::{LoopMessage, LoopPoster};

/// Capacity of the source event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Routes source events to send, receive and the master switch.
#[derive(Debug)]
pub struct Engine {
    coordinator: Arc<Coordinator>,
    dispatcher: Arc<Dispatcher>,
    sequencer: Arc<ReceiveSequencer>,
    notifier: Notifier,
}

impl Engine {
    /// Create an engine.
    #[must_use]
    pub fn new(
        coordinator: Arc<Coordinator>,
        dispatcher: Arc<Dispatcher>,
        sequencer: Arc<ReceiveSequencer>,
        notifier: Notifier,
    ) -> Arc<Self> {
        Arc::new(Self {
            coordinator,
            dispatcher,
            sequencer,
            notifier,
        })
    }

    /// Consume events until the channel closes.
    pub fn spawn(self: Arc<Self>, mut events: mpsc::Receiver<SourceEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut filter = DebounceFilter::default();
            while let Some(event) = events.recv().await {
                self.handle(&mut filter, event);
            }
            debug!("Source event channel closed");
        })
    }

    /// Handle one event. Network work is spawned so the next event is not
    /// held up.
    pub fn handle(self: &Arc<Self>, filter: &mut DebounceFilter, event: SourceEvent) {
        match event {
            SourceEvent::ClipboardText(event) => self.on_clipboard(filter, &event),
            SourceEvent::Hotkey(HotkeySlot::Toggle) => {
                // Persisting the switch writes the settings file.
                let coordinator = Arc::clone(&self.coordinator);
                tokio::task::spawn_blocking(move || {
                    if let Err(e) = coordinator.toggle_enabled() {
                        warn!(error = %e, "Could not flip the master switch");
                    }
                });
            }
            SourceEvent::Hotkey(HotkeySlot::Receive) => {
                let engine = Arc::clone(self);
                tokio::spawn(async move {
                    let config = engine.coordinator.snapshot();
                    let result = engine.sequencer.receive(&config).await;
                    engine.publish_receive(result);
                });
            }
        }
    }

    fn on_clipboard(self: &Arc<Self>, filter: &mut DebounceFilter, event: &ClipboardEvent) {
        let Some(event) = filter.accept_event(event) else {
            return;
        };
        let config = self.coordinator.snapshot();
        if !config.enabled {
            debug!("Sync disabled, clipboard change ignored");
            return;
        }

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let result = engine.dispatcher.send(&config, &event.text).await;
            engine.publish_send(&config, result);
        });
    }

    /// Publish the outcome of a send.
    pub fn publish_send(&self, config: &Config, result: std::result::Result<SendAck, SyncError>) {
        match result {
            Ok(ack) if config.show_message_on_success => {
                self.notifier
                    .publish(Notification::SendSucceeded { message: ack.message });
            }
            Ok(_) => {}
            Err(error) if error.is_user_facing() => {
                self.notifier.publish(Notification::SendFailed { error });
            }
            Err(error) => debug!(%error, "Send skipped"),
        }
    }

    /// Publish the outcome of a receive.
    pub fn publish_receive(&self, result: std::result::Result<ReceiveOutcome, SyncError>) {
        let notification = match result {
            Ok(ReceiveOutcome::Received { chars, paste }) => Notification::Received { chars, paste },
            Ok(ReceiveOutcome::Empty) => Notification::ReceiveEmpty,
            Err(error) => Notification::ReceiveFailed { error },
        };
        self.notifier.publish(notification);
    }
}

/// The running foreground daemon.
#[derive(Debug)]
pub struct Daemon {
    coordinator: Arc<Coordinator>,
    scheduler: Arc<CleanupScheduler>,
    source: NativeSource,
    engine: JoinHandle<()>,
    presenter: LogPresenter,
    presenter_task: JoinHandle<()>,
}

impl Daemon {
    /// Run the daemon in the foreground until Ctrl-C.
    ///
    /// The calling thread becomes the hotkey loop, so on macOS this must be
    /// the main thread. Everything else runs on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the event loop
    /// could not be created or the daemon failed to start.
    pub fn run_foreground(runtime: &Runtime, config: Config, config_path: &Path) -> Result<()> {
        config.validate()?;
        let hotkey_loop = HotkeyLoop::new()?;
        let poster = hotkey_loop.poster();
        let notifier = Notifier::new();
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let config_path = config_path.to_path_buf();
        let daemon_notifier = notifier.clone();
        let daemon = runtime.spawn(async move {
            let result = match Daemon::start(
                config,
                &config_path,
                poster.clone(),
                events_rx,
                daemon_notifier,
            ) {
                Ok(daemon) => daemon.run_until_interrupted().await,
                Err(e) => Err(e),
            };
            // Hand the main thread back however the daemon ended.
            poster.post(LoopMessage::Shutdown);
            result
        });

        if let Err(e) = hotkey_loop.run(events_tx, notifier) {
            daemon.abort();
            return Err(e);
        }
        runtime
            .block_on(daemon)
            .map_err(|e| Error::internal(e.to_string()))?
    }

    /// Build every collaborator and start watching the desktop.
    ///
    /// `poster` reaches the running hotkey loop, which forwards source
    /// events into `events` and reports unbound hotkeys on `notifier`.
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or the event source could not be
    /// created.
    pub fn start(
        config: Config,
        config_path: &Path,
        poster: LoopPoster,
        events: mpsc::Receiver<SourceEvent>,
        notifier: Notifier,
    ) -> Result<Self> {
        config.validate()?;
        let presenter = LogPresenter::new();
        let presenter_task = presenter.clone().spawn(notifier.subscribe());

        let api: Arc<dyn NoteApi> =
            Arc::new(HttpNoteApi::new().map_err(|e| Error::internal(e.to_string()))?);
        let credentials: Arc<dyn CredentialSource> = Arc::new(ConfigCredentials);

        let hotkeys = config.hotkeys.clone();
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(config));
        let scheduler = CleanupScheduler::new(
            Arc::clone(&api),
            Arc::clone(&credentials),
            snapshot_rx,
            notifier.clone(),
            Arc::new(LocalClock),
            Handle::current(),
        );

        let source = NativeSource::start(poster, &hotkeys)?;

        let coordinator = Arc::new(Coordinator::new(
            snapshot_tx,
            Arc::new(JsonSettingsStore::beside(config_path)),
            source.bindings(),
            Arc::clone(&scheduler),
            notifier.clone(),
        ));

        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&api), Arc::clone(&credentials)));
        let sequencer = Arc::new(ReceiveSequencer::new(
            api,
            credentials,
            Arc::new(NativeClipboard::default()),
            Arc::new(NativePasteInjector::default()),
        ));

        let engine = Engine::new(Arc::clone(&coordinator), dispatcher, sequencer, notifier)
            .spawn(events);
        coordinator.activate();

        info!("Daemon started");
        Ok(Self {
            coordinator,
            scheduler,
            source,
            engine,
            presenter,
            presenter_task,
        })
    }

    /// The reconfiguration entry point of the running daemon.
    #[must_use]
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Run until Ctrl-C, then shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal handler could not be installed.
    pub async fn run_until_interrupted(self) -> Result<()> {
        tokio::signal::ctrl_c().await?;
        info!("Interrupt received, shutting down");
        self.shutdown();
        Ok(())
    }

    /// Stop timers, watchers and the engine task.
    pub fn shutdown(mut self) {
        self.scheduler.shutdown();
        self.source.stop();
        self.engine.abort();
        self.presenter_task.abort();
        if let Some(summary) = self.presenter.last_cleanup() {
            debug!(ok = summary.ok, last = %summary.text, "Last cleanup");
        }
    }
}
