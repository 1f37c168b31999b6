//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::event::CleanupKind;

/// Send command arguments.
#[derive(Debug, Args)]
pub struct SendCommand {
    /// Text to send; standard input is read when omitted
    pub text: Option<String>,
}

/// Receive command arguments.
#[derive(Debug, Args)]
pub struct ReceiveCommand {
    /// Only write the clipboard, do not inject a paste
    #[arg(long)]
    pub no_paste: bool,
}

/// Manual cleanup operations.
#[derive(Debug, Subcommand)]
pub enum CleanupCommand {
    /// Delete every note in the remote inbox
    Inbox,

    /// Purge remote backups
    Backups {
        /// Only report how many backups would be purged
        #[arg(long)]
        count_only: bool,
    },
}

impl CleanupCommand {
    /// The cleanup operation this command runs.
    #[must_use]
    pub fn kind(&self) -> CleanupKind {
        match self {
            Self::Inbox => CleanupKind::DeleteInbox,
            Self::Backups { count_only: false } => CleanupKind::PurgeBackups,
            Self::Backups { count_only: true } => CleanupKind::BackupCount,
        }
    }
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration (secrets are omitted)
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration and settings file paths
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
