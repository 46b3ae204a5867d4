//! Pixel geometry shared by calibration and measurement.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors when parsing a point from text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PointParseError {
    #[error("Expected two coordinates separated by a comma, got: {0}")]
    Malformed(String),
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),
}

/// An integer pixel coordinate. Origin is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point, in pixels.
    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        dx.hypot(dy)
    }

    /// Whether the point lies inside `[0, width) x [0, height)`.
    pub fn is_within(&self, width: u32, height: u32) -> bool {
        self.x < width && self.y < height
    }

    pub(crate) fn as_f32(&self) -> (f32, f32) {
        (self.x as f32, self.y as f32)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Accepts `x,y`, `x, y` and `(x, y)`.
impl FromStr for Point {
    type Err = PointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('(').trim_end_matches(')');
        let (x, y) = trimmed
            .split_once(',')
            .ok_or_else(|| PointParseError::Malformed(s.to_string()))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| PointParseError::InvalidCoordinate(v.trim().to_string()))
        };
        Ok(Point::new(parse(x)?, parse(y)?))
    }
}

/// A circle found in an image, in pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center_x: f32,
    pub center_y: f32,
    pub radius: f32,
}

impl Circle {
    pub fn new(center_x: f32, center_y: f32, radius: f32) -> Self {
        Self {
            center_x,
            center_y,
            radius,
        }
    }

    pub fn diameter(&self) -> f32 {
        self.radius * 2.0
    }

    /// Center rounded to the nearest pixel.
    pub fn center_px(&self) -> (i32, i32) {
        (self.center_x.round() as i32, self.center_y.round() as i32)
    }
}
