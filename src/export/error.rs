//! Export errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while writing records to disk.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Image too large for DICOM: {width}x{height}")]
    ImageTooLarge { width: u32, height: u32 },
    #[error("DICOM value for {tag} is {len} bytes, limit is {max}")]
    ValueTooLong { tag: String, len: usize, max: usize },
}

impl ExportError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| ExportError::Io { path, source }
    }
}
