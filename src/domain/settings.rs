use crate::infrastructure::bluetooth::protocol;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
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
            file_logging_enabled: default_true(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
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
    "grow_tower".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Discovery
    #[serde(default = "default_target_name")]
    pub target_device_name: String,
    /// List every device found instead of auto-connecting to the target name
    #[serde(default = "default_false")]
    pub scan_all_devices: bool,
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,

    // Connection
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_stabilization_delay_ms")]
    pub stabilization_delay_ms: u64,
    #[serde(default = "default_group_resolve_attempts")]
    pub group_resolve_attempts: u32,
    #[serde(default = "default_group_retry_delay_ms")]
    pub group_retry_delay_ms: u64,
    #[serde(default = "default_true")]
    pub read_after_connect: bool,

    /// Talk to the in-process simulated TOWER instead of the radio
    #[serde(default = "default_false")]
    pub simulate_device: bool,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_device_name: default_target_name(),
            scan_all_devices: false,
            scan_timeout_ms: default_scan_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            stabilization_delay_ms: default_stabilization_delay_ms(),
            group_resolve_attempts: default_group_resolve_attempts(),
            group_retry_delay_ms: default_group_retry_delay_ms(),
            read_after_connect: true,
            simulate_device: false,
            log_settings: LogSettings::default(),
        }
    }
}

impl Settings {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn stabilization_delay(&self) -> Duration {
        Duration::from_millis(self.stabilization_delay_ms)
    }

    pub fn group_retry_delay(&self) -> Duration {
        Duration::from_millis(self.group_retry_delay_ms)
    }
}

fn default_target_name() -> String {
    protocol::TARGET_DEVICE_NAME.to_string()
}
fn default_scan_timeout_ms() -> u64 {
    protocol::SCAN_TIMEOUT_MS
}
fn default_connect_timeout_ms() -> u64 {
    protocol::CONNECT_TIMEOUT_MS
}
fn default_stabilization_delay_ms() -> u64 {
    protocol::STABILIZATION_DELAY_MS
}
fn default_group_resolve_attempts() -> u32 {
    protocol::GROUP_RESOLVE_ATTEMPTS
}
fn default_group_retry_delay_ms() -> u64 {
    protocol::GROUP_RETRY_DELAY_MS
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::from_path(settings_path))
    }

    /// Load from an explicit file, falling back to defaults if it is missing
    /// or unreadable.
    pub fn from_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}): {}",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("GrowTower");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_device_timing() {
        let s = Settings::default();
        assert_eq!(s.target_device_name, "TOWER");
        assert_eq!(s.scan_timeout(), Duration::from_secs(10));
        assert_eq!(s.connect_timeout(), Duration::from_secs(10));
        assert_eq!(s.stabilization_delay(), Duration::from_millis(1500));
        assert_eq!(s.group_resolve_attempts, 3);
        assert_eq!(s.group_retry_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let s: Settings =
            serde_json::from_str(r#"{ "scan_all_devices": true, "scan_timeout_ms": 2500 }"#)
                .unwrap();
        assert!(s.scan_all_devices);
        assert_eq!(s.scan_timeout_ms, 2500);
        assert_eq!(s.stabilization_delay_ms, 1500);
        assert_eq!(s.log_settings.rotation, "daily");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join(format!("grow_tower_settings_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.json");

        let mut service = SettingsService::from_path(path.clone());
        service.get_mut().simulate_device = true;
        service.get_mut().group_resolve_attempts = 5;
        service.save().unwrap();

        let reloaded = SettingsService::from_path(path);
        assert!(reloaded.get().simulate_device);
        assert_eq!(reloaded.get().group_resolve_attempts, 5);

        let _ = fs::remove_dir_all(&dir);
    }
}
