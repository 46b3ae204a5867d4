//! JSON sidecar files stored next to each image.

use std::fs;
use std::path::{Path, PathBuf};

use super::error::ExportError;
use super::record::TaggingRecord;

/// `scan.jpg` -> `scan.json` in the same folder.
pub fn sidecar_path(image_path: &Path) -> PathBuf {
    image_path.with_extension("json")
}

/// Write the record as pretty JSON next to the image. Returns the file written.
pub fn write_sidecar(record: &TaggingRecord, image_path: &Path) -> Result<PathBuf, ExportError> {
    let path = sidecar_path(image_path);
    let content = serde_json::to_string_pretty(record)?;
    fs::write(&path, content).map_err(ExportError::io(&path))?;
    tracing::info!("Saved metadata to {}", path.display());
    Ok(path)
}

/// Read a sidecar back.
pub fn read_sidecar(path: &Path) -> Result<TaggingRecord, ExportError> {
    let content = fs::read_to_string(path).map_err(ExportError::io(path))?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Eye;

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("/a/b/PAT1_OD_20250101.jpg")),
            PathBuf::from("/a/b/PAT1_OD_20250101.json")
        );
        assert_eq!(sidecar_path(Path::new("scan.v2.png")), PathBuf::from("scan.v2.json"));
    }

    #[test]
    fn test_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("PAT5_OS.png");
        let record = TaggingRecord {
            record_id: "r".to_string(),
            filename: "PAT5_OS.png".to_string(),
            full_path: image.display().to_string(),
            patient_id: "PAT5".to_string(),
            eye: Some(Eye::OS),
            capture_date: Some("2024-02-03".to_string()),
            diagnosis_tags: "Glaucoma".to_string(),
            notes: "ünïcode ok".to_string(),
            device: "Cam".to_string(),
            fov_deg: 45,
            image_width: 10,
            image_height: 10,
            pixels_per_mm: None,
            calibration_method: None,
            measurements_mm: vec![1.25],
            processed_at: "now".to_string(),
        };

        let written = write_sidecar(&record, &image).unwrap();
        assert_eq!(written, dir.path().join("PAT5_OS.json"));

        let raw = fs::read_to_string(&written).unwrap();
        assert!(raw.contains("\"eye\": \"OS\""));
        assert!(raw.contains("ünïcode ok"));
        assert_eq!(read_sidecar(&written).unwrap(), record);
    }
}
