//! Calibrated distance measurements for the active image.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calibration::Calibration;
use crate::geometry::Point;

/// Measurement errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeasurementError {
    #[error("Calibration required before measuring")]
    CalibrationRequired,
    #[error("No measurement start point recorded")]
    NoPendingStart,
}

/// A finished measurement. The length is fixed at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub start: Point,
    pub end: Point,
    pub pixel_length: f64,
    pub length_mm: f64,
}

impl Measurement {
    /// Length rounded to two decimals, as written to reports.
    pub fn rounded_mm(&self) -> f64 {
        round2(self.length_mm)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Two-click measurement gesture.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum GestureState {
    #[default]
    NoPendingStart,
    PendingStart(Point),
}

/// Ordered list of measurements plus the in-progress gesture.
#[derive(Debug, Clone, Default)]
pub struct MeasurementLedger {
    measurements: Vec<Measurement>,
    gesture: GestureState,
}

impl MeasurementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of a measurement.
    ///
    /// Does nothing while a start is already pending; the first start wins.
    pub fn begin_measurement(&mut self, point: Point) {
        match self.gesture {
            GestureState::NoPendingStart => {
                self.gesture = GestureState::PendingStart(point);
            }
            GestureState::PendingStart(existing) => {
                tracing::debug!(%existing, ignored = %point, "Measurement already in progress");
            }
        }
    }

    /// Finish the pending measurement at `point`.
    ///
    /// Fails without touching the ledger when uncalibrated or when no start
    /// point was recorded.
    pub fn end_measurement(
        &mut self,
        point: Point,
        calibration: Option<&Calibration>,
    ) -> Result<Measurement, MeasurementError> {
        let calibration = calibration.ok_or(MeasurementError::CalibrationRequired)?;
        let GestureState::PendingStart(start) = self.gesture else {
            return Err(MeasurementError::NoPendingStart);
        };

        let measurement = self.push(start, point, calibration);
        self.gesture = GestureState::NoPendingStart;
        Ok(measurement)
    }

    /// Append a measurement from both endpoints at once, leaving any pending
    /// gesture alone.
    pub fn record(
        &mut self,
        start: Point,
        end: Point,
        calibration: Option<&Calibration>,
    ) -> Result<Measurement, MeasurementError> {
        let calibration = calibration.ok_or(MeasurementError::CalibrationRequired)?;
        Ok(self.push(start, end, calibration))
    }

    fn push(&mut self, start: Point, end: Point, calibration: &Calibration) -> Measurement {
        let pixel_length = start.distance_to(&end);
        let measurement = Measurement {
            start,
            end,
            pixel_length,
            length_mm: calibration.to_mm(pixel_length),
        };
        self.measurements.push(measurement);
        tracing::info!(
            %start,
            %end,
            length_mm = measurement.length_mm,
            "Measurement recorded"
        );
        measurement
    }

    /// Abandon the pending start, if any.
    pub fn cancel_measurement(&mut self) {
        self.gesture = GestureState::NoPendingStart;
    }

    /// Drop all measurements and any pending start.
    pub fn clear(&mut self) {
        self.measurements.clear();
        self.gesture = GestureState::NoPendingStart;
    }

    /// Measurements in creation order.
    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn gesture(&self) -> GestureState {
        self.gesture
    }

    pub fn pending_start(&self) -> Option<Point> {
        match self.gesture {
            GestureState::PendingStart(p) => Some(p),
            GestureState::NoPendingStart => None,
        }
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    /// Lengths in millimeters rounded to two decimals.
    pub fn lengths_mm(&self) -> Vec<f64> {
        self.measurements.iter().map(Measurement::rounded_mm).collect()
    }
}
