//! Recurring remote cleanup.
//!
//! The scheduler holds at most one armed timer. Timer tasks only wait and
//! then spawn the cleanup run as a separate task, so disarming a timer never
//! aborts a call that is already on the wire. A single reentrancy flag keeps
//! at most one cleanup call in flight, scheduled or manual.
//!
//! Every arm bumps a generation counter. A daily run that finishes while
//! the generation is unchanged decides on its own whether to rearm; if a
//! reconfiguration happened during the run, the reconfiguration wins.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::api::{CredentialSource, Endpoint, NoteApi};
use crate::config::{CleanupMode, Config};
use crate::error::SyncError;
use crate::event::{CleanupKind, CleanupTrigger, Notification, Notifier};
use crate::flight::FlightGuard;

/// Source of local wall-clock time for daily runs.
pub trait WallClock: Send + Sync + std::fmt::Debug {
    /// Current local date and time.
    fn now(&self) -> NaiveDateTime;
}

/// The system's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl WallClock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Next daily fire at `hour:minute` after `now`.
///
/// Today if that instant is strictly in the future, otherwise tomorrow.
/// Out-of-range values are clamped.
#[must_use]
pub fn next_daily_fire(now: NaiveDateTime, hour: u32, minute: u32) -> NaiveDateTime {
    let time = NaiveTime::from_hms_opt(hour.min(23), minute.min(59), 0).unwrap_or(NaiveTime::MIN);
    let today = now.date().and_time(time);
    if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "at", rename_all = "snake_case")]
pub enum SchedulerState {
    /// No timer armed and nothing running.
    Stopped,
    /// A one-shot timer fires at this local time.
    ArmedDaily(NaiveDateTime),
    /// A repeating timer fires with this period.
    ArmedEvery(#[serde(with = "duration_secs")] Duration),
    /// A cleanup call is in flight.
    Running,
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }
}

/// Result of a manual cleanup operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Operation that ran.
    pub kind: CleanupKind,
    /// Remote response message.
    pub message: String,
    /// Backup count, for [`CleanupKind::BackupCount`].
    pub count: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Daily(NaiveDateTime),
    Every(Duration),
}

#[derive(Debug)]
struct ArmedTimer {
    kind: TimerKind,
    generation: u64,
    task: JoinHandle<()>,
}

/// Arms and runs the scheduled inbox cleanup.
#[derive(Debug)]
pub struct CleanupScheduler {
    api: Arc<dyn NoteApi>,
    credentials: Arc<dyn CredentialSource>,
    config: watch::Receiver<Arc<Config>>,
    notifier: Notifier,
    clock: Arc<dyn WallClock>,
    runtime: Handle,
    timer: Mutex<Option<ArmedTimer>>,
    generation: AtomicU64,
    running: AtomicBool,
}

impl CleanupScheduler {
    /// Create a stopped scheduler.
    ///
    /// Timers and runs are spawned on `runtime`, so the scheduler can be
    /// reconfigured from any thread.
    #[must_use]
    pub fn new(
        api: Arc<dyn NoteApi>,
        credentials: Arc<dyn CredentialSource>,
        config: watch::Receiver<Arc<Config>>,
        notifier: Notifier,
        clock: Arc<dyn WallClock>,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new(Self {
            api,
            credentials,
            config,
            notifier,
            clock,
            runtime,
            timer: Mutex::new(None),
            generation: AtomicU64::new(0),
            running: AtomicBool::new(false),
        })
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            return SchedulerState::Running;
        }
        match self.lock_timer().as_ref().map(|t| t.kind) {
            Some(TimerKind::Daily(next)) => SchedulerState::ArmedDaily(next),
            Some(TimerKind::Every(period)) => SchedulerState::ArmedEvery(period),
            None => SchedulerState::Stopped,
        }
    }

    /// Cancel any armed timer and arm according to the current snapshot.
    ///
    /// Calling it again with an unchanged configuration leaves exactly one
    /// equivalent timer armed. In-flight runs are not affected.
    pub fn apply_from_configuration(self: &Arc<Self>) {
        let mode = self.config.borrow().cleanup_mode();
        let mut slot = self.lock_timer();
        self.disarm_locked(&mut slot);
        self.arm_locked(&mut slot, mode);
    }

    /// Cancel any armed timer.
    pub fn shutdown(&self) {
        let mut slot = self.lock_timer();
        self.disarm_locked(&mut slot);
        debug!("Cleanup scheduler stopped");
    }

    /// Run a cleanup operation now, outside the schedule.
    ///
    /// # Errors
    ///
    /// `Busy` when another cleanup call is in flight, `Misconfigured`, or
    /// `TransportFailure`.
    #[instrument(skip(self))]
    pub async fn run_now(&self, kind: CleanupKind) -> Result<CleanupReport, SyncError> {
        let Some(_guard) = FlightGuard::acquire(&self.running) else {
            return Err(SyncError::Busy);
        };

        let config = self.config.borrow().clone();
        let result = self.call(kind, &config).await;
        self.publish(kind, CleanupTrigger::Manual, &result);
        result
    }

    fn lock_timer(&self) -> MutexGuard<'_, Option<ArmedTimer>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn disarm_locked(&self, slot: &mut Option<ArmedTimer>) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(timer) = slot.take() {
            timer.task.abort();
            debug!(kind = ?timer.kind, generation = timer.generation, "Timer disarmed");
        }
    }

    fn arm_locked(self: &Arc<Self>, slot: &mut Option<ArmedTimer>, mode: CleanupMode) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let weak = Arc::downgrade(self);

        let (kind, task) = match mode {
            CleanupMode::Off => {
                debug!("Cleanup schedule off");
                return;
            }
            CleanupMode::Daily { hour, minute } => {
                let now = self.clock.now();
                let next = next_daily_fire(now, hour, minute);
                let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
                let task = self.runtime.spawn(daily_timer(weak, delay, generation));
                info!(next = %next, "Daily cleanup armed");
                (TimerKind::Daily(next), task)
            }
            CleanupMode::Every { minutes } => {
                let period = Duration::from_secs(u64::from(minutes.max(1)) * 60);
                let task = self.runtime.spawn(every_timer(weak, period));
                info!(minutes, "Repeating cleanup armed");
                (TimerKind::Every(period), task)
            }
        };

        *slot = Some(ArmedTimer {
            kind,
            generation,
            task,
        });
    }

    fn fire(self: &Arc<Self>, daily_generation: Option<u64>) {
        let this = Arc::clone(self);
        self.runtime.spawn(async move {
            this.run_scheduled().await;
            if let Some(generation) = daily_generation {
                this.after_daily_run(generation);
            }
        });
    }

    async fn run_scheduled(&self) {
        let Some(_guard) = FlightGuard::acquire(&self.running) else {
            warn!("Cleanup still running, dropping this fire");
            return;
        };

        // The configuration may have changed since the timer was armed.
        let config = self.config.borrow().clone();
        if config.cleanup_mode() == CleanupMode::Off {
            info!("Cleanup disabled at fire time, skipping");
            return;
        }

        let kind = CleanupKind::DeleteInbox;
        let result = self.call(kind, &config).await;
        self.publish(kind, CleanupTrigger::Scheduled, &result);
    }

    fn after_daily_run(self: &Arc<Self>, generation: u64) {
        let mut slot = self.lock_timer();
        if self.generation.load(Ordering::Acquire) != generation {
            debug!("Reconfigured during daily run, leaving the new timer in place");
            return;
        }

        let mode = self.config.borrow().cleanup_mode();
        if let CleanupMode::Daily { .. } = mode {
            self.disarm_locked(&mut slot);
            self.arm_locked(&mut slot, mode);
        } else {
            info!(%mode, "Daily cleanup no longer configured, stopping");
            self.disarm_locked(&mut slot);
        }
    }

    async fn call(&self, kind: CleanupKind, config: &Config) -> Result<CleanupReport, SyncError> {
        let endpoint = Endpoint::for_cleanup(config, self.credentials.as_ref())?;
        let report = match kind {
            CleanupKind::DeleteInbox => CleanupReport {
                kind,
                message: self.api.delete_all_inbox(&endpoint).await?,
                count: None,
            },
            CleanupKind::PurgeBackups => CleanupReport {
                kind,
                message: self.api.purge_backups(&endpoint).await?,
                count: None,
            },
            CleanupKind::BackupCount => {
                let answer = self.api.backup_count(&endpoint).await?;
                CleanupReport {
                    kind,
                    message: answer.message,
                    count: Some(answer.count),
                }
            }
        };
        Ok(report)
    }

    fn publish(
        &self,
        kind: CleanupKind,
        trigger: CleanupTrigger,
        result: &Result<CleanupReport, SyncError>,
    ) {
        let (ok, message) = match result {
            Ok(report) => (true, report.message.clone()),
            Err(e) => (false, e.to_string()),
        };
        if ok {
            info!(%kind, ?trigger, "Cleanup finished");
        } else {
            warn!(%kind, ?trigger, error = %message, "Cleanup failed");
        }
        self.notifier.publish(Notification::CleanupFinished {
            kind,
            trigger,
            ok,
            message,
        });
    }
}

async fn daily_timer(scheduler: Weak<CleanupScheduler>, delay: Duration, generation: u64) {
    tokio::time::sleep(delay).await;
    if let Some(scheduler) = scheduler.upgrade() {
        debug!(generation, "Daily cleanup timer fired");
        scheduler.fire(Some(generation));
    }
}

async fn every_timer(scheduler: Weak<CleanupScheduler>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let Some(scheduler) = scheduler.upgrade() else {
            return;
        };
        debug!("Repeating cleanup timer fired");
        scheduler.fire(None);
    }
}
