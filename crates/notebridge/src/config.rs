//! Configuration management for notebridge.
//!
//! This module provides configuration loading and validation using figment,
//! supporting a TOML config file, the settings file written on save,
//! environment variables, and defaults.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Settings file written whenever settings are saved.
const SETTINGS_FILE_NAME: &str = "settings.json";

/// Default config directory name.
const CONFIG_DIR_NAME: &str = "notebridge";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `NOTEBRIDGE_`, nested keys
///    separated by `__`)
/// 2. The saved settings file next to the config file
/// 3. TOML config file at `~/.config/notebridge/config.toml`
/// 4. Default values
///
/// A loaded `Config` is an immutable snapshot: changes are made by building
/// a new value and handing it to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Master switch for sending and scheduled cleanup.
    pub enabled: bool,
    /// Report successful sends, not only failures.
    pub show_message_on_success: bool,
    /// Remote endpoint configuration.
    pub server: ServerConfig,
    /// Global hotkey bindings.
    pub hotkeys: HotkeyConfig,
    /// Scheduled cleanup configuration.
    pub cleanup: CleanupConfig,
    /// Receive and paste configuration.
    pub receive: ReceiveConfig,
}

/// Remote endpoint configuration.
///
/// Secrets are never serialized, so saved settings never carry them; they
/// are read from the TOML file or the environment only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Endpoint that accepts new notes.
    pub send_url: String,
    /// Endpoint that returns the latest note.
    pub receive_url: String,
    /// Endpoint of the cleanup API.
    pub cleanup_url: String,
    /// Token for the send and receive endpoints.
    #[serde(skip_serializing)]
    pub token: String,
    /// Token for the cleanup endpoint.
    #[serde(skip_serializing)]
    pub cleanup_token: String,
    /// Optional HTTP basic-auth user shared by all endpoints.
    pub basic_user: String,
    /// HTTP basic-auth password.
    #[serde(skip_serializing)]
    pub basic_password: String,
    /// Ask the cleanup API for pretty-printed responses.
    pub cleanup_pretty: bool,
}

/// Modifier key bitset of a hotkey binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Modifiers(u8);

impl Modifiers {
    /// No modifiers.
    pub const NONE: Self = Self(0);
    /// Alt key.
    pub const ALT: Self = Self(notebridge_native::MOD_ALT);
    /// Control key.
    pub const CTRL: Self = Self(notebridge_native::MOD_CONTROL);
    /// Shift key.
    pub const SHIFT: Self = Self(notebridge_native::MOD_SHIFT);

    const ALL: u8 = notebridge_native::MOD_ALT
        | notebridge_native::MOD_CONTROL
        | notebridge_native::MOD_SHIFT;

    /// Build from raw bits, dropping unknown ones.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL)
    }

    /// Raw bit representation.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True when no modifier is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 & Self::ALL == 0
    }

    /// True when every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Modifiers {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A global hotkey binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// Modifier keys; at least one must be set.
    pub modifiers: Modifiers,
    /// Windows-style virtual-key code of the main key.
    pub virtual_key: u32,
    /// Human-readable label, e.g. "Ctrl + Alt + N".
    pub display: String,
}

impl Binding {
    /// Create a binding.
    #[must_use]
    pub fn new(modifiers: Modifiers, virtual_key: u32, display: impl Into<String>) -> Self {
        Self {
            modifiers,
            virtual_key,
            display: display.into(),
        }
    }
}

/// Hotkey bindings for both logical slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    /// Flips the master switch.
    pub toggle: Binding,
    /// Fetches the latest note and pastes it.
    pub receive: Binding,
}

/// Scheduled cleanup configuration, as stored.
///
/// Both flags may be stored as on even though only one mode can run; see
/// [`Config::cleanup_mode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Run once a day at `daily_hour:daily_minute` local time.
    pub daily_enabled: bool,
    /// Hour of the daily run.
    pub daily_hour: u32,
    /// Minute of the daily run.
    pub daily_minute: u32,
    /// Run every `every_minutes` minutes.
    pub every_enabled: bool,
    /// Period of the repeating run, clamped to at least one minute.
    pub every_minutes: u32,
}

/// Receive and paste configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiveConfig {
    /// Inject a paste after the clipboard was written.
    pub auto_paste: bool,
    /// Wait between the clipboard write and the paste; negative counts as 0.
    pub clipboard_stabilize_wait_ms: i64,
}

/// The effective cleanup schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CleanupMode {
    /// No scheduled cleanup.
    Off,
    /// Once a day at a local wall-clock time.
    Daily {
        /// Hour, 0..=23.
        hour: u32,
        /// Minute, 0..=59.
        minute: u32,
    },
    /// Repeating with a fixed period.
    Every {
        /// Period in minutes, at least 1.
        minutes: u32,
    },
}

impl std::fmt::Display for CleanupMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Daily { hour, minute } => write!(f, "daily at {hour:02}:{minute:02}"),
            Self::Every { minutes } => write!(f, "every {minutes} min"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            show_message_on_success: true,
            server: ServerConfig::default(),
            hotkeys: HotkeyConfig::default(),
            cleanup: CleanupConfig::default(),
            receive: ReceiveConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            send_url: String::new(),
            receive_url: String::new(),
            cleanup_url: String::new(),
            token: String::new(),
            cleanup_token: String::new(),
            basic_user: String::new(),
            basic_password: String::new(),
            cleanup_pretty: true,
        }
    }
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            toggle: Binding::new(Modifiers::CTRL | Modifiers::ALT, 0x4E, "Ctrl + Alt + N"),
            receive: Binding::new(Modifiers::CTRL | Modifiers::ALT, 0x52, "Ctrl + Alt + R"),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            daily_enabled: false,
            daily_hour: 2,
            daily_minute: 0,
            every_enabled: false,
            every_minutes: 60,
        }
    }
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            auto_paste: true,
            clipboard_stabilize_wait_ms: 60,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// The settings file is looked up next to the config file.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);
        let settings_file = Self::settings_path_for(&config_file);

        let config: Config = Self::layers(&config_file, Some(&settings_file)).extract()?;
        config.validate()?;
        debug!(path = %config_file.display(), "Configuration loaded");
        Ok(config)
    }

    /// Defaults, the TOML file, the settings overlay when given, then the
    /// environment.
    fn layers(config_file: &Path, settings_file: Option<&Path>) -> Figment {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file));
        if let Some(settings_file) = settings_file {
            figment = figment.merge(Json::file(settings_file));
        }
        figment.merge(Env::prefixed("NOTEBRIDGE_").split("__"))
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Path of the settings file that belongs to `config_file`.
    #[must_use]
    pub fn settings_path_for(config_file: &Path) -> PathBuf {
        config_file.with_file_name(SETTINGS_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.cleanup.daily_hour > 23 {
            return Err(Error::validation(format!(
                "cleanup.daily_hour must be 0..=23, got {}",
                self.cleanup.daily_hour
            )));
        }
        if self.cleanup.daily_minute > 59 {
            return Err(Error::validation(format!(
                "cleanup.daily_minute must be 0..=59, got {}",
                self.cleanup.daily_minute
            )));
        }

        for (name, binding) in [
            ("hotkeys.toggle", &self.hotkeys.toggle),
            ("hotkeys.receive", &self.hotkeys.receive),
        ] {
            if binding.modifiers.is_empty() {
                return Err(Error::validation(format!(
                    "{name} needs at least one modifier key"
                )));
            }
        }

        for (name, url) in [
            ("server.send_url", &self.server.send_url),
            ("server.receive_url", &self.server.receive_url),
            ("server.cleanup_url", &self.server.cleanup_url),
        ] {
            let url = url.trim();
            if !url.is_empty() && reqwest::Url::parse(url).is_err() {
                return Err(Error::validation(format!("{name} is not a valid URL: {url}")));
            }
        }

        Ok(())
    }

    /// The cleanup schedule in effect.
    ///
    /// Off when the master switch is off. When both modes are stored as on,
    /// the daily mode wins.
    #[must_use]
    pub fn cleanup_mode(&self) -> CleanupMode {
        if !self.enabled {
            return CleanupMode::Off;
        }
        if self.cleanup.daily_enabled {
            CleanupMode::Daily {
                hour: self.cleanup.daily_hour,
                minute: self.cleanup.daily_minute,
            }
        } else if self.cleanup.every_enabled {
            CleanupMode::Every {
                minutes: self.cleanup.every_minutes.max(1),
            }
        } else {
            CleanupMode::Off
        }
    }

    /// Wait between writing the clipboard and pasting.
    #[must_use]
    pub fn stabilize_wait(&self) -> Duration {
        Duration::from_millis(u64::try_from(self.receive.clipboard_stabilize_wait_ms).unwrap_or(0))
    }

    /// A copy with the master switch set to `enabled`.
    #[must_use]
    pub fn with_enabled(&self, enabled: bool) -> Self {
        Self {
            enabled,
            ..self.clone()
        }
    }
}

/// Persists saved settings.
pub trait SettingsStore: Send + Sync + std::fmt::Debug {
    /// Persist `config` so that the next load sees it.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings could not be written.
    fn persist(&self, config: &Config) -> Result<()>;
}

/// Writes saved settings as a pretty JSON overlay next to the config file.
///
/// Only `enabled` and the fields that differ from what the config file and
/// environment already say are written, so later edits to `config.toml`
/// still take effect for everything the overlay does not pin.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    config_file: PathBuf,
    path: PathBuf,
}

impl JsonSettingsStore {
    /// Store settings next to `config_file`.
    #[must_use]
    pub fn beside(config_file: &Path) -> Self {
        Self {
            config_file: config_file.to_path_buf(),
            path: Config::settings_path_for(config_file),
        }
    }

    /// Path of the settings file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonSettingsStore {
    fn persist(&self, config: &Config) -> Result<()> {
        let base: Config = Config::layers(&self.config_file, None).extract()?;
        let overlay = settings_overlay(&base, config)?;
        let json = serde_json::to_string_pretty(&overlay)?;
        let save_err = |source| Error::SettingsSave {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(save_err)?;
        }
        std::fs::write(&self.path, json).map_err(save_err)?;
        debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}

/// Section fields of `config` that differ from `base`, plus `enabled`.
fn settings_overlay(base: &Config, config: &Config) -> Result<Value> {
    let base = serde_json::to_value(base)?;
    let next = serde_json::to_value(config)?;
    let mut overlay = match changed_fields(&base, &next, 2) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    overlay.insert("enabled".to_string(), Value::Bool(config.enabled));
    Ok(Value::Object(overlay))
}

/// Compare objects key by key down to `depth` levels; below that, values
/// are replaced whole so a binding never ends up half overridden.
fn changed_fields(base: &Value, next: &Value, depth: usize) -> Option<Value> {
    match (base, next) {
        (Value::Object(base), Value::Object(next)) if depth > 0 => {
            let changed: Map<String, Value> = next
                .iter()
                .filter_map(|(key, value)| {
                    let changed = match base.get(key) {
                        Some(old) => changed_fields(old, value, depth - 1),
                        None => Some(value.clone()),
                    };
                    changed.map(|value| (key.clone(), value))
                })
                .collect();
            (!changed.is_empty()).then_some(Value::Object(changed))
        }
        _ if base == next => None,
        _ => Some(next.clone()),
    }
}

/// Keeps saved settings in memory.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    saved: Mutex<Vec<Config>>,
}

impl MemorySettingsStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every configuration persisted so far, oldest first.
    #[must_use]
    pub fn saved(&self) -> Vec<Config> {
        self.saved
            .lock()
            .map(|saved| saved.clone())
            .unwrap_or_default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn persist(&self, config: &Config) -> Result<()> {
        self.saved
            .lock()
            .map_err(|_| Error::internal("settings store poisoned"))?
            .push(config.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.enabled);
        assert!(config.show_message_on_success);
        assert!(config.server.cleanup_pretty);
        assert!(config.receive.auto_paste);
        assert_eq!(config.receive.clipboard_stabilize_wait_ms, 60);
    }

    #[test]
    fn test_default_hotkeys() {
        let hotkeys = HotkeyConfig::default();

        assert_eq!(hotkeys.toggle.virtual_key, 0x4E);
        assert_eq!(hotkeys.receive.virtual_key, 0x52);
        assert!(hotkeys.toggle.modifiers.contains(Modifiers::CTRL));
        assert!(hotkeys.toggle.modifiers.contains(Modifiers::ALT));
        assert!(!hotkeys.toggle.modifiers.contains(Modifiers::SHIFT));
    }

    #[test]
    fn test_default_cleanup_config() {
        let cleanup = CleanupConfig::default();

        assert!(!cleanup.daily_enabled);
        assert!(!cleanup.every_enabled);
        assert_eq!(cleanup.daily_hour, 2);
        assert_eq!(cleanup.daily_minute, 0);
        assert_eq!(cleanup.every_minutes, 60);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_daily_hour() {
        let mut config = Config::default();
        config.cleanup.daily_hour = 24;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("daily_hour"));
    }

    #[test]
    fn test_validate_daily_minute() {
        let mut config = Config::default();
        config.cleanup.daily_minute = 60;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("daily_minute"));
    }

    #[test]
    fn test_validate_zero_modifier_binding() {
        let mut config = Config::default();
        config.hotkeys.receive.modifiers = Modifiers::NONE;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("hotkeys.receive"));
    }

    #[test]
    fn test_validate_bad_url() {
        let mut config = Config::default();
        config.server.send_url = "not a url".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("server.send_url"));
    }

    #[test]
    fn test_validate_allows_empty_urls() {
        let mut config = Config::default();
        config.server.cleanup_url = "   ".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cleanup_mode_off_when_disabled() {
        let mut config = Config::default();
        config.enabled = false;
        config.cleanup.daily_enabled = true;

        assert_eq!(config.cleanup_mode(), CleanupMode::Off);
    }

    #[test]
    fn test_cleanup_mode_off_when_no_flags() {
        assert_eq!(Config::default().cleanup_mode(), CleanupMode::Off);
    }

    #[test]
    fn test_cleanup_mode_daily_wins_over_every() {
        let mut config = Config::default();
        config.cleanup.daily_enabled = true;
        config.cleanup.every_enabled = true;
        config.cleanup.daily_hour = 3;
        config.cleanup.daily_minute = 15;

        assert_eq!(
            config.cleanup_mode(),
            CleanupMode::Daily {
                hour: 3,
                minute: 15
            }
        );
    }

    #[test]
    fn test_cleanup_mode_every_clamped() {
        let mut config = Config::default();
        config.cleanup.every_enabled = true;
        config.cleanup.every_minutes = 0;

        assert_eq!(config.cleanup_mode(), CleanupMode::Every { minutes: 1 });
    }

    #[test]
    fn test_cleanup_mode_display() {
        assert_eq!(CleanupMode::Off.to_string(), "off");
        assert_eq!(
            CleanupMode::Daily { hour: 2, minute: 5 }.to_string(),
            "daily at 02:05"
        );
        assert_eq!(CleanupMode::Every { minutes: 30 }.to_string(), "every 30 min");
    }

    #[test]
    fn test_stabilize_wait_clamped() {
        let mut config = Config::default();
        config.receive.clipboard_stabilize_wait_ms = -20;
        assert_eq!(config.stabilize_wait(), Duration::ZERO);

        config.receive.clipboard_stabilize_wait_ms = 250;
        assert_eq!(config.stabilize_wait(), Duration::from_millis(250));
    }

    #[test]
    fn test_with_enabled() {
        let config = Config::default();
        let disabled = config.with_enabled(false);
        assert!(!disabled.enabled);
        assert_eq!(disabled.hotkeys, config.hotkeys);
    }

    #[test]
    fn test_modifiers_bits() {
        let mods = Modifiers::CTRL | Modifiers::SHIFT;
        assert_eq!(mods.bits(), 0x06);
        assert!(!mods.is_empty());
        assert!(Modifiers::NONE.is_empty());
        assert_eq!(Modifiers::from_bits(0xF8), Modifiers::NONE);
    }

    #[test]
    fn test_secrets_not_serialized() {
        let mut config = Config::default();
        config.server.token = "secret-token".to_string();
        config.server.basic_password = "hunter2".to_string();

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret-token"));
        assert!(!json.contains("hunter2"));
        assert!(json.contains("send_url"));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("notebridge"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_settings_path_beside_config() {
        let path = Config::settings_path_for(Path::new("/etc/notebridge/config.toml"));
        assert_eq!(path, PathBuf::from("/etc/notebridge/settings.json"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), Config::default());
    }

    #[test]
    fn test_saved_settings_are_loaded_back() {
        let dir = std::env::temp_dir().join(format!("notebridge-test-{}", std::process::id()));
        let config_file = dir.join("config.toml");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            &config_file,
            "[server]\nsend_url = \"https://notes.example/api.php\"\ntoken = \"abc\"\n",
        )
        .unwrap();

        let mut config = Config::load_from(Some(config_file.clone())).unwrap();
        assert_eq!(config.server.token, "abc");

        config.cleanup.every_enabled = true;
        config.cleanup.every_minutes = 15;
        config.enabled = false;
        JsonSettingsStore::beside(&config_file).persist(&config).unwrap();

        let reloaded = Config::load_from(Some(config_file)).unwrap();
        assert!(!reloaded.enabled);
        assert_eq!(reloaded.cleanup.every_minutes, 15);
        // The token still comes from the TOML file.
        assert_eq!(reloaded.server.token, "abc");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_config_edit_after_persist_takes_effect() {
        let dir = std::env::temp_dir().join(format!("notebridge-edit-{}", std::process::id()));
        let config_file = dir.join("config.toml");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            &config_file,
            "[server]\nsend_url = \"https://old.example/api.php\"\n",
        )
        .unwrap();

        let config = Config::load_from(Some(config_file.clone())).unwrap();
        JsonSettingsStore::beside(&config_file)
            .persist(&config.with_enabled(false))
            .unwrap();

        std::fs::write(
            &config_file,
            "[server]\nsend_url = \"https://new.example/api.php\"\n",
        )
        .unwrap();
        let reloaded = Config::load_from(Some(config_file)).unwrap();
        assert_eq!(reloaded.server.send_url, "https://new.example/api.php");
        assert!(!reloaded.enabled);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_settings_overlay_is_sparse() {
        let base = Config::default();
        let mut config = base.with_enabled(false);
        config.cleanup.every_enabled = true;
        config.hotkeys.receive = Binding::new(Modifiers::CTRL | Modifiers::SHIFT, 0x56, "Ctrl + Shift + V");

        let overlay = settings_overlay(&base, &config).unwrap();

        assert_eq!(
            overlay,
            serde_json::json!({
                "enabled": false,
                "cleanup": { "every_enabled": true },
                "hotkeys": {
                    "receive": { "modifiers": 6, "virtual_key": 0x56, "display": "Ctrl + Shift + V" }
                }
            })
        );
    }

    #[test]
    fn test_settings_overlay_always_pins_enabled() {
        let overlay = settings_overlay(&Config::default(), &Config::default()).unwrap();
        assert_eq!(overlay, serde_json::json!({ "enabled": true }));
    }

    #[test]
    fn test_memory_settings_store() {
        let store = MemorySettingsStore::new();
        store.persist(&Config::default()).unwrap();
        store.persist(&Config::default().with_enabled(false)).unwrap();

        let saved = store.saved();
        assert_eq!(saved.len(), 2);
        assert!(!saved[1].enabled);
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("show_message_on_success"));
        assert!(json.contains("clipboard_stabilize_wait_ms"));
    }

    #[test]
    fn test_cleanup_config_deserialize() {
        let json = r#"{"every_enabled": true, "every_minutes": 5}"#;
        let cleanup: CleanupConfig = serde_json::from_str(json).unwrap();
        assert!(cleanup.every_enabled);
        assert_eq!(cleanup.every_minutes, 5);
        assert_eq!(cleanup.daily_hour, 2);
    }
}
