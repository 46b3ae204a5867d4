//! The active image together with its calibration and measurements.
//!
//! A [`Session`] is the only place where image identity, scale and
//! measurements meet. Loading an image invalidates everything derived from
//! the previous one. Every failing call leaves the session untouched.

use image::RgbImage;
use thiserror::Error;

use crate::calibration::overlay::{
    draw_disc, draw_point, draw_segment, CALIBRATION_COLOR, MEASUREMENT_COLOR, PENDING_COLOR,
};
use crate::calibration::{
    AutoCalibration, Calibration, CalibrationEngine, CalibrationError, CalibrationMethod,
    ManualCalibration, ManualCalibrationState,
};
use crate::config::DeviceProfile;
use crate::geometry::Point;
use crate::image_source::RetinalImage;
use crate::measurement::{Measurement, MeasurementError, MeasurementLedger};

/// Session errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("No image loaded")]
    NoImage,
    #[error("Point {point} is outside the {width}x{height} image")]
    PointOutOfBounds { point: Point, width: u32, height: u32 },
    #[error("Manual calibration is not waiting for a distance")]
    NoCalibrationPoints,
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Measurement(#[from] MeasurementError),
}

/// Front-end options for a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    /// Draw the pending measurement start and calibration clicks in overlays.
    pub live_overlay: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { live_overlay: true }
    }
}

/// Calibration and measurement state for one active image.
#[derive(Debug)]
pub struct Session {
    engine: CalibrationEngine,
    options: SessionOptions,
    image: Option<RetinalImage>,
    calibration: Option<Calibration>,
    manual: ManualCalibration,
    ledger: MeasurementLedger,
}

impl Session {
    /// Create a session for the given device profile.
    pub fn new(profile: &DeviceProfile, options: SessionOptions) -> Self {
        Self {
            engine: CalibrationEngine::new(profile.calibration.clone()),
            options,
            image: None,
            calibration: None,
            manual: ManualCalibration::new(),
            ledger: MeasurementLedger::new(),
        }
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    pub fn engine(&self) -> &CalibrationEngine {
        &self.engine
    }

    /// Make `image` the active image.
    ///
    /// Calibration, measurements and any partial manual calibration belong to
    /// the previous image and are discarded.
    pub fn load_image(&mut self, image: RetinalImage) {
        tracing::info!(
            path = ?image.path(),
            width = image.width(),
            height = image.height(),
            "Image loaded"
        );
        self.image = Some(image);
        self.calibration = None;
        self.manual.reset();
        self.ledger.clear();
    }

    pub fn image(&self) -> Option<&RetinalImage> {
        self.image.as_ref()
    }

    /// The active scale; `None` means uncalibrated.
    pub fn current_scale(&self) -> Option<Calibration> {
        self.calibration
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    fn require_image(&self) -> Result<&RetinalImage, SessionError> {
        self.image.as_ref().ok_or(SessionError::NoImage)
    }

    fn check_point(&self, point: Point) -> Result<(), SessionError> {
        let image = self.require_image()?;
        let (width, height) = image.dimensions();
        if point.is_within(width, height) {
            Ok(())
        } else {
            Err(SessionError::PointOutOfBounds {
                point,
                width,
                height,
            })
        }
    }

    // ---- calibration ----

    /// Detect the optic disc in the active image and adopt its scale.
    ///
    /// On `NotFound` the previous calibration (if any) stays in place.
    pub fn auto_calibrate(&mut self) -> Result<AutoCalibration, SessionError> {
        let image = self.require_image()?;
        let result = self.engine.auto_calibrate(image.pixels())?;
        self.calibration = Some(result.calibration);
        Ok(result)
    }

    /// Calibrate directly from two points and a known distance.
    pub fn manual_calibrate(
        &mut self,
        a: Point,
        b: Point,
        real_distance_mm: f64,
    ) -> Result<Calibration, SessionError> {
        self.check_point(a)?;
        self.check_point(b)?;
        let calibration = self.engine.manual_calibrate(a, b, real_distance_mm)?;
        self.calibration = Some(calibration);
        self.manual.reset();
        Ok(calibration)
    }

    /// Start collecting two calibration clicks.
    pub fn begin_manual_calibration(&mut self) -> Result<ManualCalibrationState, SessionError> {
        self.require_image()?;
        self.manual.begin();
        Ok(self.manual.state())
    }

    /// Feed a calibration click.
    pub fn add_calibration_point(&mut self, point: Point) -> Result<ManualCalibrationState, SessionError> {
        self.check_point(point)?;
        Ok(self.manual.add_point(point))
    }

    /// Supply the real distance between the two collected clicks.
    ///
    /// On `InvalidInput` the clicks are kept so the caller can prompt again
    /// or cancel.
    pub fn submit_calibration_distance(&mut self, real_distance_mm: f64) -> Result<Calibration, SessionError> {
        let (a, b) = self
            .manual
            .pending_pair()
            .ok_or(SessionError::NoCalibrationPoints)?;
        let calibration = self.engine.manual_calibrate(a, b, real_distance_mm)?;
        self.calibration = Some(calibration);
        self.manual.reset();
        Ok(calibration)
    }

    /// Abort manual calibration and discard collected clicks.
    pub fn cancel_manual_calibration(&mut self) {
        self.manual.reset();
    }

    pub fn manual_calibration_state(&self) -> ManualCalibrationState {
        self.manual.state()
    }

    // ---- measurement ----

    pub fn begin_measurement(&mut self, point: Point) -> Result<(), SessionError> {
        self.check_point(point)?;
        self.ledger.begin_measurement(point);
        Ok(())
    }

    pub fn end_measurement(&mut self, point: Point) -> Result<Measurement, SessionError> {
        self.check_point(point)?;
        Ok(self.ledger.end_measurement(point, self.calibration.as_ref())?)
    }

    pub fn cancel_measurement(&mut self) {
        self.ledger.cancel_measurement();
    }

    /// Convenience for front ends that collect both points at once.
    pub fn measure(&mut self, start: Point, end: Point) -> Result<Measurement, SessionError> {
        self.check_point(start)?;
        self.check_point(end)?;
        Ok(self.ledger.record(start, end, self.calibration.as_ref())?)
    }

    pub fn measurements(&self) -> &[Measurement] {
        self.ledger.measurements()
    }

    pub fn ledger(&self) -> &MeasurementLedger {
        &self.ledger
    }

    pub fn clear_measurements(&mut self) {
        self.ledger.clear();
    }

    // ---- display ----

    /// Render the active image with calibration and measurements drawn on it.
    pub fn render_overlay(&self) -> Option<RgbImage> {
        let image = self.image.as_ref()?;
        let mut canvas = image.pixels().to_rgb8();

        match self.calibration.as_ref().map(Calibration::method) {
            Some(CalibrationMethod::Auto { disc }) => draw_disc(&mut canvas, disc),
            Some(CalibrationMethod::Manual { a, b, .. }) => {
                draw_segment(&mut canvas, a, b, CALIBRATION_COLOR)
            }
            None => {}
        }

        for m in self.ledger.measurements() {
            draw_segment(&mut canvas, &m.start, &m.end, MEASUREMENT_COLOR);
        }

        if self.options.live_overlay {
            for click in self.manual.state().clicks() {
                draw_point(&mut canvas, &click, CALIBRATION_COLOR);
            }
            if let Some(start) = self.ledger.pending_start() {
                draw_point(&mut canvas, &start, PENDING_COLOR);
            }
        }

        Some(canvas)
    }
}
