//! Loading retinal photographs from disk.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, GenericImageView};
use thiserror::Error;

/// File extensions recognized as retinal images.
pub const DEFAULT_IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Image source errors.
#[derive(Error, Debug)]
pub enum ImageSourceError {
    #[error("Failed to decode {path}: {reason}")]
    DecodeFailure { path: PathBuf, reason: String },
    #[error("Folder not found: {0}")]
    FolderNotFound(PathBuf),
    #[error("Failed to read folder: {0}")]
    Io(#[from] std::io::Error),
}

/// A decoded photograph together with the file it came from, if any.
#[derive(Debug, Clone)]
pub struct RetinalImage {
    path: Option<PathBuf>,
    pixels: DynamicImage,
}

impl RetinalImage {
    /// Decode an image file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageSourceError> {
        let path = path.as_ref();
        let pixels = image::open(path).map_err(|e| ImageSourceError::DecodeFailure {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        tracing::debug!(
            path = %path.display(),
            width = pixels.width(),
            height = pixels.height(),
            "Image decoded"
        );
        Ok(Self {
            path: Some(path.to_path_buf()),
            pixels,
        })
    }

    /// Wrap an in-memory buffer.
    pub fn from_dynamic(pixels: DynamicImage) -> Self {
        Self { path: None, pixels }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn channel_count(&self) -> u8 {
        self.pixels.color().channel_count()
    }
}

/// List image files directly inside `folder`, sorted by file name.
///
/// Extensions are compared case-insensitively against `extensions`
/// (given without the leading dot).
pub fn find_images(folder: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, ImageSourceError> {
    if !folder.is_dir() {
        return Err(ImageSourceError::FolderNotFound(folder.to_path_buf()));
    }

    let wanted: BTreeSet<String> = extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect();

    let mut images = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| wanted.contains(&e.to_lowercase()));
        if matches {
            images.push(path);
        }
    }

    images.sort();
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn default_extensions() -> Vec<String> {
        DEFAULT_IMAGE_EXTENSIONS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_find_images_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b_OD.JPG", "a_OS.png", "notes.txt", "c.bmp", "d.json"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("sub.png")).unwrap();

        let found = find_images(dir.path(), &default_extensions()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a_OS.png", "b_OD.JPG", "c.bmp"]);
    }

    #[test]
    fn test_find_images_missing_folder() {
        let err = find_images(Path::new("/definitely/not/here"), &default_extensions());
        assert!(matches!(err, Err(ImageSourceError::FolderNotFound(_))));
    }

    #[test]
    fn test_open_round_trip_and_decode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("eye.png");
        RgbImage::from_pixel(12, 8, Rgb([1, 2, 3])).save(&good).unwrap();

        let img = RetinalImage::open(&good).unwrap();
        assert_eq!(img.dimensions(), (12, 8));
        assert_eq!(img.channel_count(), 3);
        assert_eq!(img.path(), Some(good.as_path()));

        let bad = dir.path().join("broken.jpg");
        fs::write(&bad, b"not an image").unwrap();
        assert!(matches!(
            RetinalImage::open(&bad),
            Err(ImageSourceError::DecodeFailure { .. })
        ));
    }
}
