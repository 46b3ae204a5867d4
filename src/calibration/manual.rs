//! Click collection for two-point manual calibration.

use serde::{Deserialize, Serialize};

use crate::geometry::Point;

/// Where the manual calibration gesture currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum ManualCalibrationState {
    #[default]
    Idle,
    AwaitingFirstPoint,
    AwaitingSecondPoint {
        first: Point,
    },
    /// Both points collected; the caller should prompt for the real distance.
    AwaitingDistance {
        first: Point,
        second: Point,
    },
}

impl ManualCalibrationState {
    /// Points collected so far (0 to 2).
    pub fn clicks(&self) -> Vec<Point> {
        match *self {
            Self::Idle | Self::AwaitingFirstPoint => Vec::new(),
            Self::AwaitingSecondPoint { first } => vec![first],
            Self::AwaitingDistance { first, second } => vec![first, second],
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Drives [`ManualCalibrationState`] from point events.
#[derive(Debug, Clone, Default)]
pub struct ManualCalibration {
    state: ManualCalibrationState,
}

impl ManualCalibration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ManualCalibrationState {
        self.state
    }

    /// Start collecting points, discarding any earlier partial attempt.
    pub fn begin(&mut self) {
        self.state = ManualCalibrationState::AwaitingFirstPoint;
    }

    /// Feed a clicked point. Returns the new state.
    ///
    /// Points are ignored when idle or when both points are already held.
    pub fn add_point(&mut self, point: Point) -> ManualCalibrationState {
        self.state = match self.state {
            ManualCalibrationState::AwaitingFirstPoint => {
                ManualCalibrationState::AwaitingSecondPoint { first: point }
            }
            ManualCalibrationState::AwaitingSecondPoint { first } => {
                ManualCalibrationState::AwaitingDistance {
                    first,
                    second: point,
                }
            }
            other => {
                tracing::debug!(state = ?other, %point, "Calibration click ignored");
                other
            }
        };
        self.state
    }

    /// The two points, once both have been collected.
    pub fn pending_pair(&self) -> Option<(Point, Point)> {
        match self.state {
            ManualCalibrationState::AwaitingDistance { first, second } => Some((first, second)),
            _ => None,
        }
    }

    /// Abort or finish: back to idle with an empty click buffer.
    pub fn reset(&mut self) {
        self.state = ManualCalibrationState::Idle;
    }
}
