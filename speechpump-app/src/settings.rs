//! Persistent host settings (JSON file in the user data directory).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use speechpump_core::{PumpConfig, ReaderConfig, WavSinkConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub preferred_input_device: Option<String>,
    /// How long a microphone session records before stopping.
    pub capture_seconds: u32,
    pub pump: PumpConfig,
    pub reader: ReaderConfig,
    pub recording: WavSinkConfig,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            preferred_input_device: None,
            capture_seconds: 10,
            pump: PumpConfig::default(),
            reader: ReaderConfig::default(),
            recording: WavSinkConfig::default(),
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.capture_seconds = self.capture_seconds.clamp(1, 3600);
        self.pump.frames_per_second = self.pump.frames_per_second.clamp(1, 100);
        let thread_name = self.pump.thread_name.trim();
        self.pump.thread_name = if thread_name.is_empty() {
            PumpConfig::default().thread_name
        } else {
            thread_name.to_string()
        };
        self.reader.poll_interval_ms = self.reader.poll_interval_ms.clamp(1, 100);
        if self.recording.path.as_os_str().is_empty() {
            self.recording.path = WavSinkConfig::default().path;
        }
        self.preferred_input_device = self
            .preferred_input_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
    }

    /// Apply `SPEECHPUMP_*` overrides. `lookup` is normally `std::env::var`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(fps) = lookup("SPEECHPUMP_FRAMES_PER_SECOND").and_then(|v| v.trim().parse().ok()) {
            self.pump.frames_per_second = fps;
        }
        if let Some(device) = lookup("SPEECHPUMP_INPUT_DEVICE") {
            self.preferred_input_device = Some(device);
        }
        if let Some(path) = lookup("SPEECHPUMP_RECORD_PATH") {
            self.recording.enabled = true;
            self.recording.path = PathBuf::from(path);
        }
        self.normalize();
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("SpeechPump")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("speechpump")
            .join("settings.json")
    }
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = load_settings(&dir.path().join("absent.json"));
        assert_eq!(settings.pump.frames_per_second, 10);
        assert_eq!(settings.capture_seconds, 10);
        assert!(!settings.recording.enabled);
    }

    #[test]
    fn partial_file_is_filled_and_clamped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"pump": {"framesPerSecond": 500, "threadName": "  "}, "preferredInputDevice": "   "}"#,
        )
        .expect("write settings");

        let settings = load_settings(&path);
        assert_eq!(settings.pump.frames_per_second, 100);
        assert_eq!(settings.pump.thread_name, "audio-pump");
        assert_eq!(settings.preferred_input_device, None);
        assert_eq!(settings.reader.poll_interval_ms, 5);
    }

    #[test]
    fn reader_poll_interval_is_stored_in_millis() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"reader": {"pollIntervalMs": 0}}"#).expect("write settings");
        assert_eq!(load_settings(&path).reader.poll_interval_ms, 1);

        save_settings(&path, &AppSettings::default()).expect("save");
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(raw["reader"], serde_json::json!({ "pollIntervalMs": 5 }));
    }

    #[test]
    fn saved_settings_load_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("settings.json");
        let mut settings = AppSettings::default();
        settings.preferred_input_device = Some("USB Mic".into());
        settings.recording.enabled = true;
        save_settings(&path, &settings).expect("save");

        let loaded = load_settings(&path);
        assert_eq!(loaded.preferred_input_device.as_deref(), Some("USB Mic"));
        assert!(loaded.recording.enabled);
    }

    #[test]
    fn env_overrides_win_and_are_normalized() {
        let mut settings = AppSettings::default();
        settings.apply_env_overrides(|key| match key {
            "SPEECHPUMP_FRAMES_PER_SECOND" => Some("0".into()),
            "SPEECHPUMP_RECORD_PATH" => Some("out/take.wav".into()),
            _ => None,
        });
        assert_eq!(settings.pump.frames_per_second, 1);
        assert!(settings.recording.enabled);
        assert_eq!(settings.recording.path, PathBuf::from("out/take.wav"));
        assert_eq!(settings.preferred_input_device, None);
    }
}
