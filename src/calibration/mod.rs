//! Optic-disc and two-point scale calibration.

mod calibrator;
mod clahe;
mod hough;
mod manual;
pub mod overlay;

pub use calibrator::{
    AutoCalibration, Calibration, CalibrationConfig, CalibrationEngine, CalibrationError,
    CalibrationMethod, DEFAULT_DISC_DIAMETER_MM,
};
pub use clahe::{clahe, ClaheConfig};
pub use hough::{detect_circles, HoughConfig};
pub use manual::{ManualCalibration, ManualCalibrationState};
