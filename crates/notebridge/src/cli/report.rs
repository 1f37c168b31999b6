//! Status report for `notebridge status`.

use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::config::{CleanupMode, Config};
use crate::scheduler::next_daily_fire;

/// Snapshot of what the daemon would do with the current configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Master switch.
    pub enabled: bool,
    /// Effective cleanup schedule.
    pub cleanup_mode: CleanupMode,
    /// Next scheduled daily cleanup, when the schedule is daily.
    pub next_daily_fire: Option<NaiveDateTime>,
    /// Whether a send URL is configured.
    pub send_url_set: bool,
    /// Whether a receive URL is configured.
    pub receive_url_set: bool,
    /// Whether a cleanup URL is configured.
    pub cleanup_url_set: bool,
    /// Whether the note token is configured.
    pub token_set: bool,
    /// Whether the cleanup token is configured.
    pub cleanup_token_set: bool,
    /// Toggle hotkey label.
    pub toggle_hotkey: String,
    /// Receive hotkey label.
    pub receive_hotkey: String,
}

impl StatusReport {
    /// Build the report for `config` as of `now`.
    #[must_use]
    pub fn build(config: &Config, now: NaiveDateTime) -> Self {
        let cleanup_mode = config.cleanup_mode();
        let next_daily_fire = match cleanup_mode {
            CleanupMode::Daily { hour, minute } => Some(next_daily_fire(now, hour, minute)),
            _ => None,
        };
        let set = |value: &str| !value.trim().is_empty();
        let server = &config.server;

        Self {
            enabled: config.enabled,
            cleanup_mode,
            next_daily_fire,
            send_url_set: set(&server.send_url),
            receive_url_set: set(&server.receive_url),
            cleanup_url_set: set(&server.cleanup_url),
            token_set: set(&server.token),
            cleanup_token_set: set(&server.cleanup_token),
            toggle_hotkey: config.hotkeys.toggle.display.clone(),
            receive_hotkey: config.hotkeys.receive.display.clone(),
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let yes_no = |b: bool| if b { "yes" } else { "no" };
        writeln!(f, "Sync:            {}", if self.enabled { "enabled" } else { "disabled" })?;
        writeln!(f, "Cleanup:         {}", self.cleanup_mode)?;
        if let Some(next) = self.next_daily_fire {
            writeln!(f, "Next cleanup:    {}", next.format("%Y-%m-%d %H:%M"))?;
        }
        writeln!(f, "Send URL:        {}", yes_no(self.send_url_set))?;
        writeln!(f, "Receive URL:     {}", yes_no(self.receive_url_set))?;
        writeln!(f, "Cleanup URL:     {}", yes_no(self.cleanup_url_set))?;
        writeln!(f, "Token:           {}", yes_no(self.token_set))?;
        writeln!(f, "Cleanup token:   {}", yes_no(self.cleanup_token_set))?;
        writeln!(f, "Toggle hotkey:   {}", self.toggle_hotkey)?;
        write!(f, "Receive hotkey:  {}", self.receive_hotkey)
    }
}
