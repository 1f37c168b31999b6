//! Native OS integration for notebridge.
//!
//! This crate wraps the platform pieces notebridge needs: reading, writing
//! and watching the clipboard, registering global hotkeys, running the
//! main-thread event loop that delivers them, and injecting the paste chord
//! into the focused window.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod clipboard;
pub mod event_loop;
pub mod hotkey;
pub mod paste;

pub use clipboard::{ClipboardChangeWatcher, ClipboardError, SystemClipboard};
pub use event_loop::{LoopError, LoopProxy, MainLoop};
pub use hotkey::{
    build_hotkey, code_from_virtual_key, spawn_event_forwarder, HotkeyError, HotkeyRegistry,
    MOD_ALT, MOD_CONTROL, MOD_SHIFT,
};
pub use paste::{PasteError, PasteInjector, PasteMethod};

/// Get the platform name.
#[must_use]
pub fn platform_name() -> &'static str {
    if cfg!(target_os = "macos") {
        "macOS"
    } else if cfg!(target_os = "windows") {
        "Windows"
    } else if cfg!(target_os = "linux") {
        "Linux"
    } else {
        "unknown"
    }
}
