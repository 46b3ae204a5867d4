//! Configuration module for Retina Tagger.

mod device;

pub use device::{ConfigError, DeviceProfile, SensorInfo};
