//! Patient metadata recovered from image file names.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which eye a photograph shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Eye {
    /// Oculus dexter (right).
    OD,
    /// Oculus sinister (left).
    OS,
    /// Oculus uterque (both).
    OU,
}

impl Eye {
    pub fn as_str(&self) -> &'static str {
        match self {
            Eye::OD => "OD",
            Eye::OS => "OS",
            Eye::OU => "OU",
        }
    }

    /// DICOM laterality code.
    pub fn laterality(&self) -> &'static str {
        match self {
            Eye::OD => "R",
            Eye::OS => "L",
            Eye::OU => "B",
        }
    }
}

impl fmt::Display for Eye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Eye {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "OD" => Ok(Eye::OD),
            "OS" => Ok(Eye::OS),
            "OU" => Ok(Eye::OU),
            other => Err(format!("Invalid eye '{}': expected OD, OS or OU", other)),
        }
    }
}

/// Descriptive metadata attached to one photograph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub patient_id: String,
    pub eye: Option<Eye>,
    /// `YYYY-MM-DD` when it could be parsed, otherwise the raw text.
    pub capture_date: Option<String>,
    pub diagnosis_tags: String,
    pub notes: String,
}

impl ImageMetadata {
    /// Metadata typed in by hand. Blank fields get the usual defaults.
    pub fn manual(
        patient_id: &str,
        eye: Eye,
        capture_date: &str,
        diagnosis_tags: &str,
        notes: &str,
    ) -> Self {
        let or = |value: &str, fallback: &str| {
            let value = value.trim();
            if value.is_empty() {
                fallback.to_string()
            } else {
                value.to_string()
            }
        };
        let today = Local::now().format("%Y-%m-%d").to_string();
        Self {
            patient_id: or(patient_id, "UNKNOWN"),
            eye: Some(eye),
            capture_date: Some(or(capture_date, &today)),
            diagnosis_tags: or(diagnosis_tags, "Not assessed"),
            notes: notes.trim().to_string(),
        }
    }
}

static FILENAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^(?P<patient_id>[A-Za-z0-9]+)_(?P<eye>OD|OS|OU)_(?P<date>\d{8})$",
        r"^(?P<patient_id>[A-Za-z0-9]+)_(?P<eye>OD|OS|OU)$",
        r"^(?P<patient_id>PAT\d+)$",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Extract patient id, eye and capture date from a file name.
///
/// Supported stems: `PAT123_OD_20250405`, `ABC_OS`, `PAT123`. Returns `None`
/// when no pattern matches.
pub fn parse_filename(filename: &str) -> Option<ImageMetadata> {
    let stem = Path::new(filename).file_stem()?.to_str()?;

    FILENAME_PATTERNS.iter().find_map(|re| {
        let caps = re.captures(stem)?;
        let patient_id = caps.name("patient_id")?.as_str().to_string();
        let eye = caps.name("eye").and_then(|m| m.as_str().parse().ok());
        let capture_date = caps.name("date").map(|m| normalize_date(m.as_str()));

        Some(ImageMetadata {
            patient_id,
            eye,
            capture_date,
            diagnosis_tags: "Auto-parsed".to_string(),
            notes: "From filename".to_string(),
        })
    })
}

/// `YYYYMMDD` to `YYYY-MM-DD`; invalid dates are returned unchanged.
fn normalize_date(raw: &str) -> String {
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// File name in the `PATIENT_EYE_YYYYMMDD.ext` convention.
///
/// `extension` may be given with or without the leading dot.
pub fn standard_filename(meta: &ImageMetadata, extension: &str) -> String {
    let mut name = meta.patient_id.clone();
    if let Some(eye) = meta.eye {
        name.push('_');
        name.push_str(eye.as_str());
    }
    if let Some(date) = &meta.capture_date {
        name.push('_');
        name.push_str(&date.replace('-', ""));
    }
    let extension = extension.trim_start_matches('.');
    if !extension.is_empty() {
        name.push('.');
        name.push_str(extension);
    }
    name
}

/// Rename `path` to the standard name in the same folder.
pub fn rename_to_standard(path: &Path, meta: &ImageMetadata) -> io::Result<PathBuf> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    let new_path = path.with_file_name(standard_filename(meta, extension));
    if new_path != path && new_path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", new_path.display()),
        ));
    }
    fs::rename(path, &new_path)?;
    tracing::info!("Renamed {} to {}", path.display(), new_path.display());
    Ok(new_path)
}
