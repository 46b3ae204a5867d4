//! One tagging event: metadata plus the calibration/measurement snapshot.

use chrono::Local;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DeviceProfile;
use crate::metadata::{Eye, ImageMetadata};
use crate::session::Session;

/// Everything written to the CSV log, the JSON sidecar and the DICOM header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggingRecord {
    pub record_id: String,
    pub filename: String,
    pub full_path: String,
    pub patient_id: String,
    pub eye: Option<Eye>,
    pub capture_date: Option<String>,
    pub diagnosis_tags: String,
    pub notes: String,
    pub device: String,
    pub fov_deg: u32,
    pub image_width: u32,
    pub image_height: u32,
    /// Absent when the image was never calibrated.
    pub pixels_per_mm: Option<f64>,
    pub calibration_method: Option<String>,
    /// Rounded to two decimals, in creation order.
    pub measurements_mm: Vec<f64>,
    pub processed_at: String,
}

impl TaggingRecord {
    /// Snapshot the session's active image, scale and measurements.
    ///
    /// Returns `None` when the session has no image.
    pub fn from_session(meta: &ImageMetadata, session: &Session, profile: &DeviceProfile) -> Option<Self> {
        let image = session.image()?;
        let path = image.path();
        let filename = path
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let full_path = path
            .map(|p| {
                p.canonicalize()
                    .unwrap_or_else(|_| p.to_path_buf())
                    .display()
                    .to_string()
            })
            .unwrap_or_default();
        let scale = session.current_scale();

        Some(Self {
            record_id: Uuid::new_v4().to_string(),
            filename,
            full_path,
            patient_id: meta.patient_id.clone(),
            eye: meta.eye,
            capture_date: meta.capture_date.clone(),
            diagnosis_tags: meta.diagnosis_tags.clone(),
            notes: meta.notes.clone(),
            device: profile.camera_model.clone(),
            fov_deg: profile.default_fov_deg,
            image_width: image.width(),
            image_height: image.height(),
            pixels_per_mm: scale.map(|c| c.pixels_per_mm()),
            calibration_method: scale.map(|c| c.method().name().to_string()),
            measurements_mm: session.ledger().lengths_mm(),
            processed_at: Local::now().to_rfc3339(),
        })
    }

    /// Update the file fields after a rename.
    pub fn set_path(&mut self, path: &std::path::Path) {
        self.filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.full_path = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf())
            .display()
            .to_string();
    }
}
