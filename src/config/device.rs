//! Fundus camera device profile.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calibration::CalibrationConfig;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Camera sensor characteristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorInfo {
    pub model: String,
    /// Native resolution (width, height) in pixels.
    pub resolution_px: [u32; 2],
    /// Physical sensor size (width, height) in millimeters.
    pub sensor_mm: [f64; 2],
}

impl Default for SensorInfo {
    fn default() -> Self {
        Self {
            model: "Nikon D70s".to_string(),
            resolution_px: [3008, 2000],
            sensor_mm: [23.7, 15.6],
        }
    }
}

/// The camera a batch of photographs was taken with, plus the calibration
/// tuning that goes with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceProfile {
    pub camera_model: String,
    pub default_fov_deg: u32,
    pub non_mydriatic: bool,
    pub sensor_info: SensorInfo,
    pub calibration: CalibrationConfig,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            camera_model: "TOPCON TRC-NW6S + Nikon D70s".to_string(),
            default_fov_deg: 45,
            non_mydriatic: true,
            sensor_info: SensorInfo::default(),
            calibration: CalibrationConfig::default(),
        }
    }
}

impl DeviceProfile {
    /// Load a profile from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Override the assumed optic disc diameter.
    pub fn with_disc_diameter(mut self, diameter_mm: f64) -> Self {
        self.calibration.assumed_disc_diameter_mm = diameter_mm;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile() {
        let profile = DeviceProfile::default();
        assert_eq!(profile.default_fov_deg, 45);
        assert_eq!(profile.calibration.assumed_disc_diameter_mm, 1.5);
        assert_eq!(profile.calibration.detector.min_radius, 30);
        assert_eq!(profile.calibration.detector.max_radius, 150);
        assert_eq!(profile.calibration.clahe.tiles_x, 8);
    }

    #[test]
    fn test_partial_profile_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        fs::write(
            &path,
            r#"{
                "camera_model": "Test Cam",
                "calibration": { "assumed_disc_diameter_mm": 1.8, "detector": { "max_radius": 300 } }
            }"#,
        )
        .unwrap();

        let profile = DeviceProfile::load(&path).unwrap();
        assert_eq!(profile.camera_model, "Test Cam");
        assert_eq!(profile.default_fov_deg, 45);
        assert_eq!(profile.calibration.assumed_disc_diameter_mm, 1.8);
        assert_eq!(profile.calibration.detector.max_radius, 300);
        assert_eq!(profile.calibration.detector.min_radius, 30);
        assert_eq!(profile.calibration.detector.accumulator_threshold, 30);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DeviceProfile::load(&dir.path().join("missing.json")),
            Err(ConfigError::Read { .. })
        ));

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{ not json").unwrap();
        assert!(matches!(DeviceProfile::load(&bad), Err(ConfigError::Parse { .. })));
    }
}
