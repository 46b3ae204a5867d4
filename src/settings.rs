//! Shared settings for the Retina Tagger CLI.
//! Persisted in the platform-specific config directory via `directories::ProjectDirs`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{ConfigError, DeviceProfile};
use crate::image_source::DEFAULT_IMAGE_EXTENSIONS;

/// Environment variable naming a device profile JSON file.
pub const ENV_DEVICE_PROFILE: &str = "RETINA_DEVICE_PROFILE";
/// Environment variable overriding the assumed disc diameter (mm).
pub const ENV_DISC_DIAMETER: &str = "RETINA_DISC_DIAMETER_MM";
/// Environment variable overriding the CSV log path.
pub const ENV_LOG_FILE: &str = "RETINA_LOG_FILE";
/// Environment variable overriding the update manifest URL.
pub const ENV_UPDATE_URL: &str = "RETINA_UPDATE_URL";

/// Application settings that can be saved and loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Camera and calibration profile
    pub device: DeviceProfile,
    /// Append-only CSV log of tagging events
    pub metadata_log_file: String,
    /// Image file extensions to pick up when scanning a folder
    pub image_extensions: Vec<String>,
    /// Write a DICOM copy next to each tagged image
    pub export_dicom: bool,
    /// Offer to rename files to PATIENT_EYE_DATE
    pub rename_files: bool,
    /// Show pending clicks in rendered overlays
    pub live_overlay: bool,
    /// Update manifest URL (empty disables the check)
    pub update_url: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            device: DeviceProfile::default(),
            metadata_log_file: "retina_metadata_log.csv".to_string(),
            image_extensions: DEFAULT_IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            export_dicom: false,
            rename_files: false,
            live_overlay: true,
            update_url: String::new(),
        }
    }
}

impl AppSettings {
    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "retinalogix", "retina-tagger")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the settings file path.
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("settings.json"))
    }

    /// Load settings from the config file, falling back to defaults.
    pub fn load() -> Self {
        Self::settings_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Load settings from a specific file, falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        let defaults = Self::default();

        let mut loaded: Self = fs::read_to_string(path)
            .ok()
            .and_then(|content| match serde_json::from_str(&content) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    tracing::warn!("Ignoring unreadable settings file {}: {}", path.display(), e);
                    None
                }
            })
            .unwrap_or_default();

        // Backfill fields an older or hand-edited file left empty
        if loaded.metadata_log_file.is_empty() {
            loaded.metadata_log_file = defaults.metadata_log_file;
        }
        if loaded.image_extensions.is_empty() {
            loaded.image_extensions = defaults.image_extensions;
        }

        loaded
    }

    /// Save settings to the config file.
    pub fn save(&self) -> Result<PathBuf, String> {
        let dir = Self::config_dir().ok_or("Cannot determine config directory")?;
        self.save_in(&dir)
    }

    /// Save as `settings.json` inside `dir`, creating it if needed.
    pub fn save_in(&self, dir: &Path) -> Result<PathBuf, String> {
        fs::create_dir_all(dir)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;

        let path = dir.join("settings.json");
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save settings to a specific file.
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        fs::write(path, content).map_err(|e| format!("Failed to write settings file: {}", e))?;

        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// A profile file is applied first so that the diameter override wins
    /// over the diameter stored in the file.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(path) = lookup(ENV_DEVICE_PROFILE).filter(|p| !p.is_empty()) {
            self.device = DeviceProfile::load(Path::new(&path))?;
            tracing::info!("Loaded device profile from {}", path);
        }

        if let Some(value) = lookup(ENV_DISC_DIAMETER) {
            let diameter: f64 = value
                .trim()
                .parse()
                .ok()
                .filter(|d: &f64| d.is_finite() && *d > 0.0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: ENV_DISC_DIAMETER.to_string(),
                    value: value.clone(),
                })?;
            self.device.calibration.assumed_disc_diameter_mm = diameter;
        }

        if let Some(log_file) = lookup(ENV_LOG_FILE).filter(|v| !v.is_empty()) {
            self.metadata_log_file = log_file;
        }

        if let Some(url) = lookup(ENV_UPDATE_URL) {
            self.update_url = url;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = AppSettings::default();
        assert_eq!(settings.metadata_log_file, "retina_metadata_log.csv");
        assert_eq!(settings.image_extensions, vec!["jpg", "jpeg", "png", "bmp"]);
        assert!(settings.update_url.is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = AppSettings::default();
        settings.export_dicom = true;
        settings.device = settings.device.with_disc_diameter(1.7);
        settings.save_to(&path).unwrap();

        assert_eq!(AppSettings::load_from(&path), settings);
    }

    #[test]
    fn test_save_in_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("retina-tagger").join("config");

        let mut settings = AppSettings::default();
        settings.export_dicom = true;
        let path = settings.save_in(&nested).unwrap();

        assert_eq!(path, nested.join("settings.json"));
        assert_eq!(AppSettings::load_from(&path), settings);
    }

    #[test]
    fn test_load_backfills_empty_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "metadata_log_file": "", "image_extensions": [] }"#).unwrap();

        let settings = AppSettings::load_from(&path);
        assert_eq!(settings.metadata_log_file, "retina_metadata_log.csv");
        assert_eq!(settings.image_extensions.len(), 4);
    }

    #[test]
    fn test_load_missing_or_corrupt_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            AppSettings::load_from(&dir.path().join("nope.json")),
            AppSettings::default()
        );

        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, "[1, 2").unwrap();
        assert_eq!(AppSettings::load_from(&corrupt), AppSettings::default());
    }

    #[test]
    fn test_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let profile_path = dir.path().join("profile.json");
        fs::write(
            &profile_path,
            r#"{ "camera_model": "Other", "calibration": { "assumed_disc_diameter_mm": 1.9 } }"#,
        )
        .unwrap();
        let profile = profile_path.to_string_lossy().into_owned();

        let mut settings = AppSettings::default();
        settings
            .apply_overrides(lookup_from(&[
                (ENV_DEVICE_PROFILE, profile.as_str()),
                (ENV_DISC_DIAMETER, "1.6"),
                (ENV_LOG_FILE, "out.csv"),
            ]))
            .unwrap();

        assert_eq!(settings.device.camera_model, "Other");
        assert_eq!(settings.device.calibration.assumed_disc_diameter_mm, 1.6);
        assert_eq!(settings.metadata_log_file, "out.csv");
    }

    #[test]
    fn test_invalid_diameter_override() {
        let mut settings = AppSettings::default();
        for bad in ["abc", "0", "-2"] {
            let result = settings.apply_overrides(lookup_from(&[(ENV_DISC_DIAMETER, bad)]));
            assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        }
        assert_eq!(settings.device.calibration.assumed_disc_diameter_mm, 1.5);
    }
}
