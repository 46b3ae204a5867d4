// Copyright 2025 RetinaLogix
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Retina Tagger
//!
//! Tagging, scale calibration and distance measurement for retinal fundus
//! photographs.
//!
//! A [`Session`] owns the active image. Its scale comes either from the optic
//! disc (CLAHE contrast enhancement followed by a gradient Hough circle
//! search, assuming a typical disc diameter) or from two clicked points at a
//! known distance. Measurements are converted to millimeters with the scale
//! in force when they were taken.
//!
//! ## Example
//!
//! ```rust,no_run
//! use retina_tagger::{DeviceProfile, Point, RetinalImage, Session, SessionOptions};
//!
//! fn main() -> anyhow::Result<()> {
//!     let profile = DeviceProfile::default();
//!     let mut session = Session::new(&profile, SessionOptions::default());
//!
//!     session.load_image(RetinalImage::open("PAT001_OD_20250405.jpg")?);
//!     if session.auto_calibrate().is_err() {
//!         session.manual_calibrate(Point::new(100, 100), Point::new(400, 100), 3.0)?;
//!     }
//!
//!     let m = session.measure(Point::new(120, 80), Point::new(320, 240))?;
//!     println!("{:.2} mm", m.length_mm);
//!     Ok(())
//! }
//! ```

pub mod calibration;
pub mod config;
pub mod export;
pub mod geometry;
pub mod image_source;
pub mod measurement;
pub mod metadata;
pub mod session;
pub mod settings;
pub mod update;

pub use calibration::{
    AutoCalibration, Calibration, CalibrationConfig, CalibrationEngine, CalibrationError,
    CalibrationMethod,
};
pub use config::{ConfigError, DeviceProfile};
pub use export::{CsvLog, ExportError, TaggingRecord};
pub use geometry::{Circle, Point};
pub use image_source::{find_images, ImageSourceError, RetinalImage};
pub use measurement::{Measurement, MeasurementError, MeasurementLedger};
pub use metadata::{parse_filename, Eye, ImageMetadata};
pub use session::{Session, SessionError, SessionOptions};
pub use settings::AppSettings;
pub use update::{spawn_update_check, UpdateInfo};
