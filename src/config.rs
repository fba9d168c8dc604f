// config.rs - Runtime Settings
//
// Loaded once at startup from a JSON file, then overridden by environment
// variables. Missing fields take their defaults; a broken file is logged and
// replaced by defaults rather than stopping the process.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::app::DesktopSize;
use crate::constants::{capture, region, settings, shm, synthetic};
use crate::region::default_descriptor_path;

/// Capture service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Publish rate of the capture loop
    pub target_fps: f64,
    /// Descriptor poll interval
    pub poll_interval_ms: u64,
    /// Descriptor path; the temp-directory default when unset
    pub region_file: Option<PathBuf>,
    /// Shared-memory segment name
    pub shm_name: String,
    /// Stop when Escape is pressed
    pub escape_to_exit: bool,
    /// Desktop size rendered by the software backend
    pub synthetic_desktop: DesktopSize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_fps: capture::DEFAULT_TARGET_FPS,
            poll_interval_ms: region::DEFAULT_POLL_INTERVAL_MS,
            region_file: None,
            shm_name: shm::DEFAULT_NAME.to_string(),
            escape_to_exit: true,
            synthetic_desktop: DesktopSize {
                width: synthetic::DESKTOP_WIDTH,
                height: synthetic::DESKTOP_HEIGHT,
            },
        }
    }
}

impl Settings {
    /// Settings file location
    pub fn config_path() -> PathBuf {
        match std::env::var_os(settings::FILE_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(settings::APP_DIR)
                .join(settings::COMPONENT_DIR)
                .join(settings::FILE_NAME),
        }
    }

    /// Load from the settings file and apply process environment overrides
    pub fn load() -> Self {
        let mut settings = Self::load_from(&Self::config_path());
        settings.apply_env(|key| std::env::var(key).ok());
        settings
    }

    /// Load from `path`; defaults when the file is missing or unreadable
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let settings = match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Settings>(&contents) {
                Ok(settings) => {
                    info!("Settings loaded from {:?}", path);
                    settings
                }
                Err(e) => {
                    error!("Failed to parse settings {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                error!("Failed to read settings file {:?}: {}", path, e);
                Self::default()
            }
        };
        settings.sanitized()
    }

    /// Apply overrides from `lookup` (the process environment in production)
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(region::FILE_ENV).filter(|v| !v.is_empty()) {
            self.region_file = Some(PathBuf::from(path));
        }
        if let Some(name) = lookup(settings::SHM_NAME_ENV).filter(|v| !v.is_empty()) {
            self.shm_name = name;
        }
        if let Some(raw) = lookup(settings::TARGET_FPS_ENV) {
            match raw.trim().parse::<f64>() {
                Ok(fps) if fps.is_finite() && fps > 0.0 => self.target_fps = fps,
                _ => warn!("Ignoring {}={:?}: not a positive number", settings::TARGET_FPS_ENV, raw),
            }
        }
    }

    /// Replace out-of-range values with defaults
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.target_fps.is_finite() && self.target_fps > 0.0) {
            warn!("target_fps {} out of range, using {}", self.target_fps, defaults.target_fps);
            self.target_fps = defaults.target_fps;
        }
        if self.poll_interval_ms == 0 {
            self.poll_interval_ms = defaults.poll_interval_ms;
        }
        if self.shm_name.is_empty() {
            self.shm_name = defaults.shm_name;
        }
        self
    }

    /// Effective descriptor path
    pub fn region_path(&self) -> PathBuf {
        self.region_file.clone().unwrap_or_else(default_descriptor_path)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ScratchDir;
    use std::collections::HashMap;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = ScratchDir::new("settings_missing");
        let settings = Settings::load_from(&dir.path().join("nope.json"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.poll_interval(), Duration::from_millis(200));
        assert_eq!(settings.target_fps, 15.0);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = ScratchDir::new("settings_partial");
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"target_fps": 30, "synthetic_desktop": {"width": 640, "height": 480}}"#).unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.target_fps, 30.0);
        assert_eq!(settings.synthetic_desktop, DesktopSize { width: 640, height: 480 });
        assert_eq!(settings.poll_interval_ms, 200);
        assert!(settings.escape_to_exit);
    }

    #[test]
    fn malformed_file_gives_defaults() {
        let dir = ScratchDir::new("settings_malformed");
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ target_fps: ").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn out_of_range_values_are_replaced() {
        let dir = ScratchDir::new("settings_range");
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"target_fps": -4, "poll_interval_ms": 0, "shm_name": ""}"#).unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.target_fps, 15.0);
        assert_eq!(settings.poll_interval_ms, 200);
        assert_eq!(settings.shm_name, shm::DEFAULT_NAME);
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("SETJA_REGION_FILE", "/tmp/elsewhere.json"),
            ("SETJA_SHM_NAME", "/custom_frame"),
            ("SETJA_TARGET_FPS", " 24.5 "),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.region_path(), PathBuf::from("/tmp/elsewhere.json"));
        assert_eq!(settings.shm_name, "/custom_frame");
        assert_eq!(settings.target_fps, 24.5);
    }

    #[test]
    fn bad_or_empty_overrides_are_ignored() {
        let mut settings = Settings::default();
        settings.apply_env(|key| match key {
            "SETJA_TARGET_FPS" => Some("fast".to_string()),
            _ => Some(String::new()),
        });
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.region_path(), default_descriptor_path());
    }

    #[test]
    fn serializes_to_pretty_json() {
        let json = serde_json::to_string_pretty(&Settings::default()).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Settings::default());
        assert!(json.contains("\"poll_interval_ms\": 200"));
    }
}
