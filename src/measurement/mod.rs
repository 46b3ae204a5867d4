//! Measurement ledger for the active image.

mod ledger;

pub use ledger::{GestureState, Measurement, MeasurementError, MeasurementLedger};
