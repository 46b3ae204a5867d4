//! Append-only CSV log of tagging events.
//!
//! The file is opened in append mode for every batch so rows already written
//! survive a crash part way through a folder.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::error::ExportError;
use super::record::TaggingRecord;

/// CSV header row.
pub const CSV_HEADER: [&str; 15] = [
    "record_id",
    "filename",
    "full_path",
    "patient_id",
    "eye",
    "capture_date",
    "diagnosis_tags",
    "notes",
    "device",
    "fov_deg",
    "image_size",
    "pixels_per_mm",
    "calibration_method",
    "measurements_mm",
    "processed_at",
];

/// Tabular log with one row per tagged image.
#[derive(Debug, Clone)]
pub struct CsvLog {
    path: PathBuf,
}

impl CsvLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append rows, writing the header first if the file is missing or empty.
    pub fn append(&self, records: &[TaggingRecord]) -> Result<(), ExportError> {
        let needs_header = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(ExportError::io(&self.path))?;

        let mut out = String::new();
        if needs_header {
            out.push_str(&CSV_HEADER.join(","));
            out.push('\n');
        }
        for record in records {
            out.push_str(&format_row(record));
            out.push('\n');
        }

        file.write_all(out.as_bytes()).map_err(ExportError::io(&self.path))?;
        tracing::info!("Appended {} row(s) to {}", records.len(), self.path.display());
        Ok(())
    }
}

fn format_row(record: &TaggingRecord) -> String {
    let measurements = record
        .measurements_mm
        .iter()
        .map(|mm| format!("{:.2}", mm))
        .collect::<Vec<_>>()
        .join(";");

    let fields = [
        record.record_id.clone(),
        record.filename.clone(),
        record.full_path.clone(),
        record.patient_id.clone(),
        record.eye.map(|e| e.to_string()).unwrap_or_default(),
        record.capture_date.clone().unwrap_or_default(),
        record.diagnosis_tags.clone(),
        record.notes.clone(),
        record.device.clone(),
        record.fov_deg.to_string(),
        format!("{}x{}", record.image_width, record.image_height),
        record
            .pixels_per_mm
            .map(|p| format!("{:.4}", p))
            .unwrap_or_default(),
        record.calibration_method.clone().unwrap_or_default(),
        measurements,
        record.processed_at.clone(),
    ];

    fields.iter().map(|f| escape(f)).collect::<Vec<_>>().join(",")
}

/// Quote a field when it contains a delimiter, quote or line break.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
