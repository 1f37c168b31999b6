//! Global hotkey registration.
//!
//! Bindings are described the way they are stored in settings: a modifier
//! bitset and a Windows-style virtual-key code. This module maps them onto
//! `global-hotkey` types and keeps track of which hotkey occupies which slot.

use std::collections::HashMap;
use std::thread::{self, JoinHandle};

use global_hotkey::hotkey::{Code, HotKey, Modifiers};
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use thiserror::Error;
use tracing::{debug, trace};

/// Alt modifier bit.
pub const MOD_ALT: u8 = 0x01;
/// Control modifier bit.
pub const MOD_CONTROL: u8 = 0x02;
/// Shift modifier bit.
pub const MOD_SHIFT: u8 = 0x04;

/// Errors that can occur while registering hotkeys.
#[derive(Debug, Error)]
pub enum HotkeyError {
    /// The platform hotkey manager could not be created.
    #[error("hotkey manager unavailable: {0}")]
    ManagerUnavailable(String),

    /// The binding has no modifier keys.
    #[error("hotkey has no modifier keys")]
    NoModifiers,

    /// The virtual-key code has no mapping on this platform.
    #[error("unsupported virtual key 0x{0:02X}")]
    UnsupportedKey(u32),

    /// The OS refused the registration (usually owned by another process).
    #[error("hotkey registration failed: {0}")]
    RegistrationFailed(String),
}

/// Result type for hotkey operations.
pub type Result<T> = std::result::Result<T, HotkeyError>;

/// Registers global hotkeys per logical slot.
///
/// Must be created and used on one thread; on some platforms the underlying
/// manager is bound to the thread that created it.
pub struct HotkeyRegistry {
    manager: GlobalHotKeyManager,
    registered: HashMap<u32, HotKey>,
}

impl std::fmt::Debug for HotkeyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotkeyRegistry")
            .field("registered", &self.registered.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl HotkeyRegistry {
    /// Create a registry backed by the platform hotkey manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform manager cannot be created.
    pub fn new() -> Result<Self> {
        let manager = GlobalHotKeyManager::new()
            .map_err(|e| HotkeyError::ManagerUnavailable(e.to_string()))?;
        Ok(Self {
            manager,
            registered: HashMap::new(),
        })
    }

    /// Register a hotkey for `slot`, returning the id that fired events carry.
    ///
    /// Any hotkey previously held by the slot is released first.
    ///
    /// # Errors
    ///
    /// Returns an error if the binding is invalid or the OS rejects it. The
    /// slot is left unbound in that case.
    pub fn register(&mut self, slot: u32, modifiers: u8, virtual_key: u32) -> Result<u32> {
        self.unregister(slot);

        let hotkey = build_hotkey(modifiers, virtual_key)?;
        self.manager
            .register(hotkey)
            .map_err(|e| HotkeyError::RegistrationFailed(e.to_string()))?;

        debug!(slot, id = hotkey.id(), "Hotkey registered");
        self.registered.insert(slot, hotkey);
        Ok(hotkey.id())
    }

    /// Release the hotkey held by `slot`, if any.
    pub fn unregister(&mut self, slot: u32) {
        if let Some(hotkey) = self.registered.remove(&slot) {
            if let Err(e) = self.manager.unregister(hotkey) {
                debug!(slot, error = %e, "Hotkey unregister failed");
            }
        }
    }

    /// Check whether `slot` currently holds a hotkey.
    #[must_use]
    pub fn is_registered(&self, slot: u32) -> bool {
        self.registered.contains_key(&slot)
    }
}

impl Drop for HotkeyRegistry {
    fn drop(&mut self) {
        let slots: Vec<u32> = self.registered.keys().copied().collect();
        for slot in slots {
            self.unregister(slot);
        }
    }
}

/// Forward pressed-hotkey ids to `on_fire` from a background thread.
///
/// The thread exits once `on_fire` returns `false`.
///
/// # Errors
///
/// Returns an error if the thread could not be spawned.
pub fn spawn_event_forwarder<F>(mut on_fire: F) -> std::io::Result<JoinHandle<()>>
where
    F: FnMut(u32) -> bool + Send + 'static,
{
    thread::Builder::new()
        .name("hotkey-events".to_string())
        .spawn(move || {
            let receiver = GlobalHotKeyEvent::receiver();
            while let Ok(event) = receiver.recv() {
                if event.state != HotKeyState::Pressed {
                    continue;
                }
                trace!(id = event.id, "Hotkey pressed");
                if !on_fire(event.id) {
                    break;
                }
            }
        })
}

/// Build a `global-hotkey` binding from a modifier bitset and virtual key.
///
/// # Errors
///
/// Returns an error if no modifier is set or the key has no mapping.
pub fn build_hotkey(modifiers: u8, virtual_key: u32) -> Result<HotKey> {
    let mods = modifiers_from_bits(modifiers);
    if mods.is_empty() {
        return Err(HotkeyError::NoModifiers);
    }
    let code = code_from_virtual_key(virtual_key).ok_or(HotkeyError::UnsupportedKey(virtual_key))?;
    Ok(HotKey::new(Some(mods), code))
}

/// Convert the stored modifier bitset into `global-hotkey` modifiers.
#[must_use]
pub fn modifiers_from_bits(bits: u8) -> Modifiers {
    let mut mods = Modifiers::empty();
    if bits & MOD_ALT != 0 {
        mods |= Modifiers::ALT;
    }
    if bits & MOD_CONTROL != 0 {
        mods |= Modifiers::CONTROL;
    }
    if bits & MOD_SHIFT != 0 {
        mods |= Modifiers::SHIFT;
    }
    mods
}

const LETTERS: [Code; 26] = [
    Code::KeyA,
    Code::KeyB,
    Code::KeyC,
    Code::KeyD,
    Code::KeyE,
    Code::KeyF,
    Code::KeyG,
    Code::KeyH,
    Code::KeyI,
    Code::KeyJ,
    Code::KeyK,
    Code::KeyL,
    Code::KeyM,
    Code::KeyN,
    Code::KeyO,
    Code::KeyP,
    Code::KeyQ,
    Code::KeyR,
    Code::KeyS,
    Code::KeyT,
    Code::KeyU,
    Code::KeyV,
    Code::KeyW,
    Code::KeyX,
    Code::KeyY,
    Code::KeyZ,
];

const DIGITS: [Code; 10] = [
    Code::Digit0,
    Code::Digit1,
    Code::Digit2,
    Code::Digit3,
    Code::Digit4,
    Code::Digit5,
    Code::Digit6,
    Code::Digit7,
    Code::Digit8,
    Code::Digit9,
];

const NUMPAD: [Code; 10] = [
    Code::Numpad0,
    Code::Numpad1,
    Code::Numpad2,
    Code::Numpad3,
    Code::Numpad4,
    Code::Numpad5,
    Code::Numpad6,
    Code::Numpad7,
    Code::Numpad8,
    Code::Numpad9,
];

const FUNCTION_KEYS: [Code; 24] = [
    Code::F1,
    Code::F2,
    Code::F3,
    Code::F4,
    Code::F5,
    Code::F6,
    Code::F7,
    Code::F8,
    Code::F9,
    Code::F10,
    Code::F11,
    Code::F12,
    Code::F13,
    Code::F14,
    Code::F15,
    Code::F16,
    Code::F17,
    Code::F18,
    Code::F19,
    Code::F20,
    Code::F21,
    Code::F22,
    Code::F23,
    Code::F24,
];

/// Map a Windows virtual-key code to a physical key code.
#[must_use]
pub fn code_from_virtual_key(vk: u32) -> Option<Code> {
    let index = |base: u32| usize::try_from(vk - base).ok();
    match vk {
        0x41..=0x5A => index(0x41).map(|i| LETTERS[i]),
        0x30..=0x39 => index(0x30).map(|i| DIGITS[i]),
        0x60..=0x69 => index(0x60).map(|i| NUMPAD[i]),
        0x70..=0x87 => index(0x70).map(|i| FUNCTION_KEYS[i]),
        0x08 => Some(Code::Backspace),
        0x09 => Some(Code::Tab),
        0x0D => Some(Code::Enter),
        0x1B => Some(Code::Escape),
        0x20 => Some(Code::Space),
        0x21 => Some(Code::PageUp),
        0x22 => Some(Code::PageDown),
        0x23 => Some(Code::End),
        0x24 => Some(Code::Home),
        0x25 => Some(Code::ArrowLeft),
        0x26 => Some(Code::ArrowUp),
        0x27 => Some(Code::ArrowRight),
        0x28 => Some(Code::ArrowDown),
        0x2D => Some(Code::Insert),
        0x2E => Some(Code::Delete),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letter_mapping() {
        assert_eq!(code_from_virtual_key(0x4E), Some(Code::KeyN));
        assert_eq!(code_from_virtual_key(0x52), Some(Code::KeyR));
        assert_eq!(code_from_virtual_key(0x41), Some(Code::KeyA));
        assert_eq!(code_from_virtual_key(0x5A), Some(Code::KeyZ));
    }

    #[test]
    fn test_digit_and_function_mapping() {
        assert_eq!(code_from_virtual_key(0x30), Some(Code::Digit0));
        assert_eq!(code_from_virtual_key(0x69), Some(Code::Numpad9));
        assert_eq!(code_from_virtual_key(0x70), Some(Code::F1));
        assert_eq!(code_from_virtual_key(0x87), Some(Code::F24));
    }

    #[test]
    fn test_unmapped_key() {
        assert_eq!(code_from_virtual_key(0xFF), None);
        assert_eq!(code_from_virtual_key(0), None);
    }

    #[test]
    fn test_modifiers_from_bits() {
        let mods = modifiers_from_bits(MOD_ALT | MOD_CONTROL);
        assert!(mods.contains(Modifiers::ALT));
        assert!(mods.contains(Modifiers::CONTROL));
        assert!(!mods.contains(Modifiers::SHIFT));
        assert!(modifiers_from_bits(0).is_empty());
    }

    #[test]
    fn test_build_hotkey_requires_modifier() {
        assert!(matches!(build_hotkey(0, 0x4E), Err(HotkeyError::NoModifiers)));
    }

    #[test]
    fn test_build_hotkey_rejects_unknown_key() {
        assert!(matches!(
            build_hotkey(MOD_CONTROL, 0xFF),
            Err(HotkeyError::UnsupportedKey(0xFF))
        ));
    }

    #[test]
    fn test_build_hotkey_ids_are_stable() {
        let a = build_hotkey(MOD_CONTROL | MOD_ALT, 0x4E).unwrap();
        let b = build_hotkey(MOD_CONTROL | MOD_ALT, 0x4E).unwrap();
        let c = build_hotkey(MOD_CONTROL | MOD_ALT, 0x52).unwrap();
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_hotkey_error_display() {
        assert_eq!(
            HotkeyError::UnsupportedKey(0xFF).to_string(),
            "unsupported virtual key 0xFF"
        );
        assert!(HotkeyError::RegistrationFailed("taken".to_string())
            .to_string()
            .contains("taken"));
    }
}
