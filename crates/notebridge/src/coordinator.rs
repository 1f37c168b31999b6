//! Reconfiguration coordinator.
//!
//! Owns the configuration snapshot. Every save or master-switch flip runs
//! the same sequence: validate, persist and publish the new snapshot, rebind
//! hotkeys, reapply the scheduler, and only then tell observers, so nobody
//! sees a notification before the scheduler matches the new settings.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::{info, instrument};

use crate::config::{Config, SettingsStore};
use crate::error::Result;
use crate::event::{Notification, Notifier};
use crate::scheduler::CleanupScheduler;
use crate::source::BindingSink;

/// Applies configuration changes in a fixed order.
#[derive(Debug)]
pub struct Coordinator {
    snapshot: watch::Sender<Arc<Config>>,
    store: Arc<dyn SettingsStore>,
    bindings: Arc<dyn BindingSink>,
    scheduler: Arc<CleanupScheduler>,
    notifier: Notifier,
    reconfigure: Mutex<()>,
}

impl Coordinator {
    /// Create a coordinator around an existing snapshot channel.
    #[must_use]
    pub fn new(
        snapshot: watch::Sender<Arc<Config>>,
        store: Arc<dyn SettingsStore>,
        bindings: Arc<dyn BindingSink>,
        scheduler: Arc<CleanupScheduler>,
        notifier: Notifier,
    ) -> Self {
        Self {
            snapshot,
            store,
            bindings,
            scheduler,
            notifier,
            reconfigure: Mutex::new(()),
        }
    }

    /// The current configuration snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Config> {
        self.snapshot.borrow().clone()
    }

    /// Receiver that always sees the latest snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<Config>> {
        self.snapshot.subscribe()
    }

    /// Replace the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or could not be persisted; the
    /// current snapshot stays in effect in that case.
    #[instrument(skip_all)]
    pub fn save(&self, config: Config) -> Result<Arc<Config>> {
        let _serial = self.reconfigure.lock().unwrap_or_else(PoisonError::into_inner);
        self.apply(config)
    }

    /// Set the master switch.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings could not be persisted.
    pub fn set_enabled(&self, enabled: bool) -> Result<Arc<Config>> {
        let _serial = self.reconfigure.lock().unwrap_or_else(PoisonError::into_inner);
        let next = self.snapshot().with_enabled(enabled);
        self.apply(next)
    }

    /// Flip the master switch.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings could not be persisted.
    pub fn toggle_enabled(&self) -> Result<Arc<Config>> {
        let _serial = self.reconfigure.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot();
        self.apply(current.with_enabled(!current.enabled))
    }

    /// Arm the scheduler for the current snapshot and announce it.
    ///
    /// Used once at startup, without persisting anything. The event source
    /// binds the initial hotkeys itself when it starts.
    pub fn activate(&self) {
        let _serial = self.reconfigure.lock().unwrap_or_else(PoisonError::into_inner);
        let config = self.snapshot();
        self.scheduler.apply_from_configuration();
        self.notify(&config);
    }

    fn apply(&self, config: Config) -> Result<Arc<Config>> {
        config.validate()?;
        self.store.persist(&config)?;

        let config = Arc::new(config);
        self.snapshot.send_replace(config.clone());

        self.bindings.apply_bindings(&config.hotkeys);
        self.scheduler.apply_from_configuration();
        self.notify(&config);

        info!(
            enabled = config.enabled,
            cleanup = %config.cleanup_mode(),
            "Configuration applied"
        );
        Ok(config)
    }

    fn notify(&self, config: &Config) {
        self.notifier.publish(Notification::StateChanged {
            enabled: config.enabled,
            cleanup_mode: config.cleanup_mode(),
        });
    }
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDate;
    use tokio::runtime::Handle;

    use super::testing::RecordingBindings;
    use super::*;
    use crate::api::mock::{configured, MockApi};
    use crate::api::ConfigCredentials;
    use crate::config::{CleanupMode, MemorySettingsStore, Modifiers};
    use crate::scheduler::testing::PausedClock;
    use crate::scheduler::SchedulerState;

    struct Fixture {
        api: Arc<MockApi>,
        store: Arc<MemorySettingsStore>,
        bindings: Arc<RecordingBindings>,
        scheduler: Arc<CleanupScheduler>,
        notifier: Notifier,
        coordinator: Coordinator,
    }

    fn fixture(initial: Config) -> Fixture {
        let api = Arc::new(MockApi::new());
        let store = Arc::new(MemorySettingsStore::new());
        let bindings = Arc::new(RecordingBindings::default());
        let notifier = Notifier::new();
        let (tx, rx) = watch::channel(Arc::new(initial));
        let start = NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let scheduler = CleanupScheduler::new(
            api.clone(),
            Arc::new(ConfigCredentials),
            rx,
            notifier.clone(),
            Arc::new(PausedClock::starting_at(start)),
            Handle::current(),
        );
        let coordinator = Coordinator::new(
            tx,
            store.clone(),
            bindings.clone(),
            scheduler.clone(),
            notifier.clone(),
        );
        Fixture {
            api,
            store,
            bindings,
            scheduler,
            notifier,
            coordinator,
        }
    }

    fn every(minutes: u32) -> Config {
        let mut config = configured();
        config.cleanup.every_enabled = true;
        config.cleanup.every_minutes = minutes;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_persists_rebinds_and_arms() {
        let fx = fixture(configured());
        let mut notifications = fx.notifier.subscribe();

        fx.coordinator.save(every(5)).unwrap();

        assert_eq!(fx.store.saved().len(), 1);
        assert_eq!(fx.bindings.applied.lock().unwrap().len(), 1);
        assert_eq!(
            fx.scheduler.state(),
            SchedulerState::ArmedEvery(Duration::from_secs(300))
        );
        assert_eq!(
            notifications.recv().await.unwrap(),
            Notification::StateChanged {
                enabled: true,
                cleanup_mode: CleanupMode::Every { minutes: 5 },
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_sees_consistent_scheduler() {
        let fx = fixture(every(5));
        fx.coordinator.activate();
        let mut notifications = fx.notifier.subscribe();

        fx.coordinator.set_enabled(false).unwrap();

        // By the time observers hear about it, the timer is gone.
        let notification = notifications.recv().await.unwrap();
        assert_eq!(
            notification,
            Notification::StateChanged {
                enabled: false,
                cleanup_mode: CleanupMode::Off,
            }
        );
        assert_eq!(fx.scheduler.state(), SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_config_changes_nothing() {
        let fx = fixture(configured());
        let mut bad = configured();
        bad.hotkeys.toggle.modifiers = Modifiers::NONE;

        assert!(fx.coordinator.save(bad).is_err());

        assert!(fx.store.saved().is_empty());
        assert!(fx.bindings.applied.lock().unwrap().is_empty());
        assert_eq!(
            fx.coordinator.snapshot().hotkeys.toggle.modifiers,
            Modifiers::CTRL | Modifiers::ALT
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_flips_and_persists() {
        let fx = fixture(every(1));
        fx.coordinator.activate();

        let config = fx.coordinator.toggle_enabled().unwrap();
        assert!(!config.enabled);
        assert!(!fx.coordinator.snapshot().enabled);

        tokio::time::sleep(Duration::from_secs(180)).await;
        assert_eq!(fx.api.deletes(), 0);

        let config = fx.coordinator.toggle_enabled().unwrap();
        assert!(config.enabled);
        assert_eq!(fx.store.saved().len(), 2);
        assert_eq!(
            fx.scheduler.state(),
            SchedulerState::ArmedEvery(Duration::from_secs(60))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_new_snapshot() {
        let fx = fixture(configured());
        let mut rx = fx.coordinator.subscribe();

        fx.coordinator.set_enabled(false).unwrap();

        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().enabled);
    }
}
