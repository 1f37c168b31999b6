//! Command-line interface for notebridge.
//!
//! This module provides the CLI structure and the status report for the
//! `notebridge` binary.

mod commands;
mod report;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    CleanupCommand, ConfigCommand, ReceiveCommand, SendCommand, StatusCommand,
};
pub use report::StatusReport;

/// notebridge - Bridge your clipboard to a remote note endpoint
///
/// Sends copied text to a note service, pulls the latest note back into the
/// clipboard on a hotkey, and cleans the remote inbox on a schedule.
#[derive(Debug, Parser)]
#[command(name = "notebridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Watch the clipboard and hotkeys in the foreground until Ctrl-C
    Run,

    /// Send text once (reads stdin when no text is given)
    Send(SendCommand),

    /// Fetch the latest note into the clipboard and paste it
    Receive(ReceiveCommand),

    /// Clean up the remote inbox or backups
    #[command(subcommand)]
    Cleanup(CleanupCommand),

    /// Post a test note to the send endpoint
    TestConnection,

    /// Show sync and schedule status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Turn sync on and persist the setting
    Enable,

    /// Turn sync off and persist the setting
    Disable,
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        crate::logging::Verbosity::from_flags(self.verbose, self.quiet)
    }

    /// The configuration file in use.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::Config::default_config_path)
    }
}
