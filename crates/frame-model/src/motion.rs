//! Motion results delivered to handlers.

use framewatch_common::clock::{MediaClock, TimestampNs};
use serde::{Deserialize, Serialize};

use crate::geometry::Point2D;

/// Motion measured on one sampled frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionResult {
    /// Magnitude-weighted centre of change, normalized to the unit square.
    pub centroid: Point2D,

    /// Non-negative summary of how much changed.
    pub intensity: f64,

    /// Timestamp of the frame this result was computed from.
    #[serde(rename = "t")]
    pub timestamp_ns: TimestampNs,
}

impl MotionResult {
    /// The result reported for a frame with no change at all.
    pub fn still(timestamp_ns: TimestampNs) -> Self {
        Self {
            centroid: Point2D::CENTER,
            intensity: 0.0,
            timestamp_ns,
        }
    }

    pub fn time_secs(&self) -> f64 {
        MediaClock::ns_to_secs(self.timestamp_ns)
    }

    /// Whether the intensity reaches `threshold`.
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.intensity >= threshold && self.intensity > 0.0
    }
}
