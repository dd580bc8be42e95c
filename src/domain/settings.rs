use crate::domain::directory::{DeviceTarget, Directory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_true")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_true(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

/// GPIO wiring of the door locks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSettings {
    #[serde(default = "default_lock_pin")]
    pub lock_pin: u8,
    #[serde(default = "default_unlock_pin")]
    pub unlock_pin: u8,
    /// Delay between level changes of one pulse sequence
    #[serde(default = "default_pulse_ms")]
    pub pulse_ms: u64,
    /// Program used to drive the pins (wiringPi style `gpio -g ...`)
    #[serde(default = "default_gpio_command")]
    pub gpio_command: String,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            lock_pin: default_lock_pin(),
            unlock_pin: default_unlock_pin(),
            pulse_ms: default_pulse_ms(),
            gpio_command: default_gpio_command(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,

    /// Logical id -> physical target
    #[serde(default = "default_directory")]
    pub directory: BTreeMap<String, DeviceTarget>,

    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    #[serde(default = "default_telemetry_socket")]
    pub telemetry_socket: PathBuf,

    // Timing
    #[serde(default = "default_scan_seconds")]
    pub scan_seconds: u64,
    #[serde(default = "default_drain_period_ms")]
    pub drain_period_ms: u64,
    #[serde(default = "default_worker_poll_timeout_ms")]
    pub worker_poll_timeout_ms: u64,

    #[serde(default)]
    pub locks: LockSettings,

    #[serde(default = "default_true")]
    pub enable_bluetooth: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            directory: default_directory(),
            snapshot_path: default_snapshot_path(),
            telemetry_socket: default_telemetry_socket(),
            scan_seconds: default_scan_seconds(),
            drain_period_ms: default_drain_period_ms(),
            worker_poll_timeout_ms: default_worker_poll_timeout_ms(),
            locks: LockSettings::default(),
            enable_bluetooth: default_true(),
        }
    }
}

impl Settings {
    /// Build the runtime directory, skipping keys that are not a single character
    pub fn directory(&self) -> Directory {
        let entries = self.directory.iter().filter_map(|(key, target)| {
            let mut chars = key.chars();
            match (chars.next(), chars.next()) {
                (Some(id), None) => Some((id, target.clone())),
                _ => {
                    warn!("Ignoring directory entry {:?}: ids are single characters", key);
                    None
                }
            }
        });
        Directory::new(entries)
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "van_automation_hub".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}
fn default_directory() -> BTreeMap<String, DeviceTarget> {
    BTreeMap::from([
        ("P".to_string(), DeviceTarget::Local),
        ("C".to_string(), DeviceTarget::AllControllers),
    ])
}
fn default_snapshot_path() -> PathBuf {
    PathBuf::from("/tmp/van_automation.state.json")
}
fn default_telemetry_socket() -> PathBuf {
    PathBuf::from("/tmp/van_automation.telemetry.sock")
}
fn default_scan_seconds() -> u64 {
    1
}
fn default_drain_period_ms() -> u64 {
    200
}
fn default_worker_poll_timeout_ms() -> u64 {
    100
}
fn default_lock_pin() -> u8 {
    17
}
fn default_unlock_pin() -> u8 {
    27
}
fn default_pulse_ms() -> u64 {
    100
}
fn default_gpio_command() -> String {
    "gpio".to_string()
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    /// Load from the default location, creating it with defaults if missing
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Self::open(settings_path)
    }

    pub fn open(settings_path: PathBuf) -> anyhow::Result<Self> {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) if settings_path.exists() => {
                return Err(e.context(format!("Invalid settings file {:?}", settings_path)))
            }
            Err(_) => {
                let service = Self {
                    settings: Settings::default(),
                    settings_path,
                };
                service.save()?;
                info!("Wrote default settings to {:?}", service.settings_path);
                return Ok(service);
            }
        };

        Ok(Self {
            settings,
            settings_path,
        })
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("van-automation-hub");
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let settings: Settings = serde_json::from_str(
            r#"{"directory": {"O": {"address": "AA:BB:CC:DD:EE:FF"}, "P": "local"}, "scan_seconds": 3}"#,
        )
        .unwrap();
        assert_eq!(settings.scan_seconds, 3);
        assert_eq!(settings.drain_period_ms, 200);
        assert_eq!(settings.locks.pulse_ms, 100);

        let directory = settings.directory();
        assert_eq!(directory.address_of('O'), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(directory.target('P'), Some(&DeviceTarget::Local));
    }

    #[test]
    fn test_multi_char_ids_skipped() {
        let mut settings = Settings::default();
        settings
            .directory
            .insert("XY".to_string(), DeviceTarget::Local);
        let directory = settings.directory();
        assert_eq!(directory.target('X'), None);
        assert_eq!(directory.target('C'), Some(&DeviceTarget::AllControllers));
    }

    #[test]
    fn test_open_creates_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let service = SettingsService::open(path.clone()).unwrap();
        assert!(path.exists());
        assert_eq!(service.get().scan_seconds, 1);

        let reopened = SettingsService::open(path).unwrap();
        assert_eq!(reopened.get().telemetry_socket, service.get().telemetry_socket);
    }

    #[test]
    fn test_open_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        assert!(SettingsService::open(path).is_err());
    }
}
