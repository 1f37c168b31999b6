//! `notebridge` - Bridge the clipboard to a remote note endpoint
//!
//! This library provides the sync engine behind the `notebridge` binary:
//! clipboard changes are debounced and sent to a note service, a hotkey
//! pulls the latest note back into the clipboard and pastes it, and a
//! scheduler cleans the remote inbox daily or on a fixed period.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod api;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod daemon;
pub mod error;
pub mod event;
pub mod filter;
mod flight;
pub mod logging;
pub mod platform;
pub mod presenter;
pub mod receiver;
pub mod scheduler;
pub mod sender;
pub mod source;

pub use config::Config;
pub use coordinator::Coordinator;
pub use error::{Error, Result, SyncError};
pub use event::{Notification, Notifier};
pub use logging::init_logging;
