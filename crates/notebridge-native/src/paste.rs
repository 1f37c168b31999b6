//! Paste keystroke injection.
//!
//! The primary path synthesizes the paste chord through `enigo`. When fewer
//! key events are delivered than requested (elevated target windows, missing
//! input permissions) the chord is sent again through the platform's
//! scripted key-send tool.

use std::process::Command;

use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use thiserror::Error;
use tracing::{debug, warn};

/// Number of key events in one paste chord: modifier down, V down, V up,
/// modifier up.
const PASTE_EVENT_COUNT: usize = 4;

/// Errors that can occur while injecting a paste.
#[derive(Debug, Error)]
pub enum PasteError {
    /// The synthetic input backend could not be initialized.
    #[error("input backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Fewer key events were delivered than requested.
    #[error("synthetic input delivered {delivered} of {requested} key events")]
    Incomplete {
        /// Events that were accepted by the OS.
        delivered: usize,
        /// Events that were requested.
        requested: usize,
    },

    /// The scripted key-send fallback failed too.
    #[error("paste injection failed: {0}")]
    Failed(String),
}

/// How the paste chord was finally delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasteMethod {
    /// Low-level synthetic key events.
    SyntheticInput,
    /// The platform's scripted key-send tool.
    ScriptedKeys,
}

impl std::fmt::Display for PasteMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SyntheticInput => write!(f, "synthetic input"),
            Self::ScriptedKeys => write!(f, "scripted keys"),
        }
    }
}

/// Injects the platform paste chord into the focused window.
#[derive(Debug, Clone, Copy, Default)]
pub struct PasteInjector;

impl PasteInjector {
    /// Create a new injector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Inject a paste, falling back to scripted keys if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if both the synthetic and scripted paths fail.
    pub fn paste(&self) -> Result<PasteMethod, PasteError> {
        match inject_synthetic() {
            Ok(()) => return Ok(PasteMethod::SyntheticInput),
            Err(e) => debug!(error = %e, "Synthetic paste incomplete, using scripted keys"),
        }

        send_scripted().map(|()| PasteMethod::ScriptedKeys)
    }
}

#[cfg(target_os = "macos")]
const PASTE_MODIFIER: Key = Key::Meta;

#[cfg(not(target_os = "macos"))]
const PASTE_MODIFIER: Key = Key::Control;

fn inject_synthetic() -> Result<(), PasteError> {
    let mut enigo = Enigo::new(&Settings::default())
        .map_err(|e| PasteError::BackendUnavailable(e.to_string()))?;

    let chord = [
        (PASTE_MODIFIER, Direction::Press),
        (Key::Unicode('v'), Direction::Press),
        (Key::Unicode('v'), Direction::Release),
        (PASTE_MODIFIER, Direction::Release),
    ];

    let mut delivered = 0;
    for (key, direction) in chord {
        if let Err(e) = enigo.key(key, direction) {
            warn!(error = %e, ?key, ?direction, "Key event rejected");
            break;
        }
        delivered += 1;
    }

    if delivered < PASTE_EVENT_COUNT {
        // Never leave the modifier stuck down.
        let _ = enigo.key(PASTE_MODIFIER, Direction::Release);
        return Err(PasteError::Incomplete {
            delivered,
            requested: PASTE_EVENT_COUNT,
        });
    }
    Ok(())
}

#[cfg(target_os = "windows")]
fn scripted_commands() -> Vec<Command> {
    let mut cmd = Command::new("powershell");
    cmd.args([
        "-NoProfile",
        "-NonInteractive",
        "-Command",
        "Add-Type -AssemblyName System.Windows.Forms; [System.Windows.Forms.SendKeys]::SendWait('^v')",
    ]);
    vec![cmd]
}

#[cfg(target_os = "macos")]
fn scripted_commands() -> Vec<Command> {
    let mut cmd = Command::new("osascript");
    cmd.args([
        "-e",
        r#"tell application "System Events" to keystroke "v" using command down"#,
    ]);
    vec![cmd]
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn scripted_commands() -> Vec<Command> {
    let mut xdotool = Command::new("xdotool");
    xdotool.args(["key", "--clearmodifiers", "ctrl+v"]);
    let mut wtype = Command::new("wtype");
    wtype.args(["-M", "ctrl", "v", "-m", "ctrl"]);
    vec![xdotool, wtype]
}

fn send_scripted() -> Result<(), PasteError> {
    let mut last_error = String::from("no scripted key-send tool available");

    for mut cmd in scripted_commands() {
        let program = cmd.get_program().to_string_lossy().to_string();
        match cmd.output() {
            Ok(output) if output.status.success() => {
                debug!(program = %program, "Scripted paste sent");
                return Ok(());
            }
            Ok(output) => {
                last_error = format!(
                    "{program} exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => last_error = format!("{program}: {e}"),
        }
        debug!(error = %last_error, "Scripted paste attempt failed");
    }

    Err(PasteError::Failed(last_error))
}
