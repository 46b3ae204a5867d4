//! Pixel-to-millimeter scale calibration.
//!
//! Two calibration methods are available:
//! - **Automatic**: the optic disc is located with a Hough circle detector and
//!   its diameter is assumed to match a known anatomical size.
//! - **Manual**: two points with a known real-world distance between them.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::clahe::{clahe, ClaheConfig};
use super::hough::{detect_circles, HoughConfig};
use crate::geometry::{Circle, Point};

/// Default optic disc diameter in millimeters.
pub const DEFAULT_DISC_DIAMETER_MM: f64 = 1.5;

/// Calibration errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("No optic disc candidate found; calibrate manually")]
    NotFound,
    #[error("Invalid calibration input: {0}")]
    InvalidInput(String),
}

/// How a calibration was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum CalibrationMethod {
    /// Detected optic disc.
    Auto { disc: Circle },
    /// Two clicked points and the distance typed for them.
    Manual {
        a: Point,
        b: Point,
        real_distance_mm: f64,
    },
}

impl CalibrationMethod {
    pub fn name(&self) -> &'static str {
        match self {
            CalibrationMethod::Auto { .. } => "auto",
            CalibrationMethod::Manual { .. } => "manual",
        }
    }
}

/// A valid spatial scale. Only constructible with a finite, positive value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pixels_per_mm: f64,
    method: CalibrationMethod,
}

impl Calibration {
    /// Returns `None` for zero, negative or non-finite scales.
    pub fn new(pixels_per_mm: f64, method: CalibrationMethod) -> Option<Self> {
        (pixels_per_mm.is_finite() && pixels_per_mm > 0.0).then_some(Self {
            pixels_per_mm,
            method,
        })
    }

    pub fn pixels_per_mm(&self) -> f64 {
        self.pixels_per_mm
    }

    pub fn method(&self) -> &CalibrationMethod {
        &self.method
    }

    /// Convert a pixel length to millimeters.
    pub fn to_mm(&self, pixels: f64) -> f64 {
        pixels / self.pixels_per_mm
    }

    /// Pixel spacing in millimeters per pixel along (row, column).
    pub fn pixel_spacing_mm(&self) -> (f64, f64) {
        let spacing = 1.0 / self.pixels_per_mm;
        (spacing, spacing)
    }
}

/// Configuration for the calibration engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Assumed real optic disc diameter in millimeters.
    pub assumed_disc_diameter_mm: f64,
    /// Contrast normalization before detection.
    pub clahe: ClaheConfig,
    /// Circle detector tuning.
    pub detector: HoughConfig,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            assumed_disc_diameter_mm: DEFAULT_DISC_DIAMETER_MM,
            clahe: ClaheConfig::default(),
            detector: HoughConfig::default(),
        }
    }
}

impl CalibrationConfig {
    pub fn with_disc_diameter(mut self, diameter_mm: f64) -> Self {
        self.assumed_disc_diameter_mm = diameter_mm;
        self
    }

    pub fn with_radius_range(mut self, min_radius: u32, max_radius: u32) -> Self {
        self.detector.min_radius = min_radius;
        self.detector.max_radius = max_radius;
        self
    }

    pub fn with_detector(mut self, detector: HoughConfig) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_clahe(mut self, clahe: ClaheConfig) -> Self {
        self.clahe = clahe;
        self
    }
}

/// Result of a successful automatic calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoCalibration {
    pub calibration: Calibration,
    pub disc: Circle,
}

/// Produces calibrations from images or manual input.
#[derive(Debug, Clone, Default)]
pub struct CalibrationEngine {
    config: CalibrationConfig,
}

impl CalibrationEngine {
    /// Create a new engine with the given configuration.
    pub fn new(config: CalibrationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Calibrate from the optic disc.
    ///
    /// The first circle reported by the detector is used. Candidates are not
    /// ranked by size or distance from the image center.
    pub fn auto_calibrate(&self, image: &DynamicImage) -> Result<AutoCalibration, CalibrationError> {
        let diameter_mm = self.config.assumed_disc_diameter_mm;
        if !(diameter_mm.is_finite() && diameter_mm > 0.0) {
            return Err(CalibrationError::InvalidInput(format!(
                "assumed disc diameter must be positive, got {}",
                diameter_mm
            )));
        }

        let gray = image.to_luma8();
        let equalized = clahe(&gray, &self.config.clahe);
        let circles = detect_circles(&equalized, &self.config.detector, Some(1));

        let disc = circles.first().copied().ok_or_else(|| {
            tracing::info!(
                width = gray.width(),
                height = gray.height(),
                "No optic disc candidate found"
            );
            CalibrationError::NotFound
        })?;

        let pixels_per_mm = disc.diameter() as f64 / diameter_mm;
        let calibration = Calibration::new(pixels_per_mm, CalibrationMethod::Auto { disc })
            .ok_or(CalibrationError::NotFound)?;

        tracing::info!(
            center_x = disc.center_x,
            center_y = disc.center_y,
            radius = disc.radius,
            pixels_per_mm,
            "Auto calibration succeeded"
        );

        Ok(AutoCalibration { calibration, disc })
    }

    /// Calibrate from two points a known distance apart.
    pub fn manual_calibrate(
        &self,
        a: Point,
        b: Point,
        real_distance_mm: f64,
    ) -> Result<Calibration, CalibrationError> {
        if !(real_distance_mm.is_finite() && real_distance_mm > 0.0) {
            return Err(CalibrationError::InvalidInput(format!(
                "real distance must be a positive number of millimeters, got {}",
                real_distance_mm
            )));
        }
        if a == b {
            return Err(CalibrationError::InvalidInput(
                "calibration points must be distinct".to_string(),
            ));
        }

        let pixel_distance = a.distance_to(&b);
        let pixels_per_mm = pixel_distance / real_distance_mm;
        let calibration = Calibration::new(
            pixels_per_mm,
            CalibrationMethod::Manual {
                a,
                b,
                real_distance_mm,
            },
        )
        .ok_or_else(|| {
            CalibrationError::InvalidInput(format!("scale {} is not usable", pixels_per_mm))
        })?;

        tracing::info!(%a, %b, real_distance_mm, pixels_per_mm, "Manual calibration set");
        Ok(calibration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use imageproc::drawing::draw_filled_circle_mut;

    #[test]
    fn test_manual_calibrate_scale() {
        let engine = CalibrationEngine::default();
        let cases = [
            (Point::new(0, 0), Point::new(30, 40), 5.0),
            (Point::new(10, 10), Point::new(10, 110), 2.5),
            (Point::new(7, 3), Point::new(1, 200), 0.3),
        ];
        for (a, b, d) in cases {
            let cal = engine.manual_calibrate(a, b, d).unwrap();
            assert_eq!(cal.pixels_per_mm(), a.distance_to(&b) / d);
            assert!(cal.pixels_per_mm() > 0.0);
            assert_eq!(cal.method().name(), "manual");
        }
    }

    #[test]
    fn test_manual_calibrate_same_point_rejected() {
        let engine = CalibrationEngine::default();
        let a = Point::new(12, 34);
        for d in [0.1, 1.0, 100.0] {
            assert!(matches!(
                engine.manual_calibrate(a, a, d),
                Err(CalibrationError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn test_manual_calibrate_non_positive_distance_rejected() {
        let engine = CalibrationEngine::default();
        let a = Point::new(0, 0);
        let b = Point::new(10, 0);
        for d in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                engine.manual_calibrate(a, b, d),
                Err(CalibrationError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn test_calibration_rejects_non_positive_scale() {
        let method = CalibrationMethod::Auto {
            disc: Circle::new(0.0, 0.0, 0.0),
        };
        assert!(Calibration::new(0.0, method).is_none());
        assert!(Calibration::new(-3.0, method).is_none());
        assert!(Calibration::new(f64::NAN, method).is_none());
        assert!(Calibration::new(2.0, method).is_some());
    }

    #[test]
    fn test_pixel_spacing() {
        let engine = CalibrationEngine::default();
        let cal = engine
            .manual_calibrate(Point::new(0, 0), Point::new(100, 0), 10.0)
            .unwrap();
        assert_eq!(cal.pixel_spacing_mm(), (0.1, 0.1));
        assert_eq!(cal.to_mm(50.0), 5.0);
    }

    #[test]
    fn test_auto_calibrate_synthetic_disc() {
        let radius = 55;
        let mut img = RgbImage::from_pixel(360, 300, Rgb([40, 20, 10]));
        draw_filled_circle_mut(&mut img, (190, 140), radius, Rgb([230, 200, 120]));

        let engine = CalibrationEngine::default();
        let result = engine
            .auto_calibrate(&DynamicImage::ImageRgb8(img))
            .unwrap();

        let expected = (2.0 * radius as f64) / DEFAULT_DISC_DIAMETER_MM;
        let got = result.calibration.pixels_per_mm();
        assert!(
            (got - expected).abs() / expected < 0.06,
            "expected ~{expected}, got {got}"
        );
        assert!((result.disc.center_x - 190.0).abs() <= 3.0);
        assert!((result.disc.center_y - 140.0).abs() <= 3.0);
    }

    #[test]
    fn test_auto_calibrate_respects_configured_diameter() {
        let mut img = GrayImage::from_pixel(300, 300, Luma([25u8]));
        draw_filled_circle_mut(&mut img, (150, 150), 60, Luma([220u8]));
        let image = DynamicImage::ImageLuma8(img);

        let default = CalibrationEngine::default().auto_calibrate(&image).unwrap();
        let wide = CalibrationEngine::new(CalibrationConfig::default().with_disc_diameter(3.0))
            .auto_calibrate(&image)
            .unwrap();

        let ratio = default.calibration.pixels_per_mm() / wide.calibration.pixels_per_mm();
        assert!((ratio - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_auto_calibrate_blank_image_not_found() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(320, 240, Rgb([90, 60, 40])));
        assert_eq!(
            CalibrationEngine::default().auto_calibrate(&img),
            Err(CalibrationError::NotFound)
        );
    }

    #[test]
    fn test_auto_calibrate_small_images_not_found() {
        let engine = CalibrationEngine::default();
        for (w, h) in [(9, 9), (20, 20), (49, 64), (9, 64)] {
            let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(w, h, Luma([100u8])));
            assert_eq!(engine.auto_calibrate(&img), Err(CalibrationError::NotFound), "{}x{}", w, h);
        }
    }

    #[test]
    fn test_auto_calibrate_invalid_diameter() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(64, 64));
        let engine = CalibrationEngine::new(CalibrationConfig::default().with_disc_diameter(0.0));
        assert!(matches!(
            engine.auto_calibrate(&img),
            Err(CalibrationError::InvalidInput(_))
        ));
    }
}
