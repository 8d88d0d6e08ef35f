//! Spatial reduction of a diff frame.
//!
//! Collapses a diff frame into an intensity and the centroid of change,
//! with each pixel weighted by its magnitude.

use framewatch_common::config::IntensityMode;
use framewatch_frame_model::geometry::Point2D;

use crate::frame_difference::DiffFrame;
use crate::stage::FrameStage;

/// Outcome of reducing one diff frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reduction {
    pub intensity: f64,
    pub centroid: Point2D,
    /// Sum of all magnitudes; zero means nothing changed.
    pub total_weight: f64,
}

impl Reduction {
    /// The reduction of a frame in which nothing changed.
    pub const STILL: Reduction = Reduction {
        intensity: 0.0,
        centroid: Point2D::CENTER,
        total_weight: 0.0,
    };

    pub fn is_still(&self) -> bool {
        self.total_weight == 0.0
    }
}

/// Reduces diff frames to an intensity and a weighted centroid.
#[derive(Debug, Clone, Copy, Default)]
pub struct AverageColorReducer {
    mode: IntensityMode,
}

impl AverageColorReducer {
    pub fn new(mode: IntensityMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> IntensityMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: IntensityMode) {
        self.mode = mode;
    }

    /// Reduce `diff` to an intensity and centroid.
    ///
    /// Positions are pixel centres normalized over the frame extents.
    /// A frame whose magnitudes sum to zero reduces to
    /// [`Reduction::STILL`] rather than a 0/0 centroid.
    pub fn reduce(&self, diff: &DiffFrame) -> Reduction {
        let width = diff.dimensions.width as usize;
        let count = diff.samples.len();
        if width == 0 || count == 0 {
            return Reduction::STILL;
        }

        let inv_w = 1.0 / diff.dimensions.width as f64;
        let inv_h = 1.0 / diff.dimensions.height.max(1) as f64;

        let mut sum_w = 0.0_f64;
        let mut sum_w2 = 0.0_f64;
        let mut sum_wx = 0.0_f64;
        let mut sum_wy = 0.0_f64;

        for (row, samples) in diff.samples.chunks(width).enumerate() {
            let py = (row as f64 + 0.5) * inv_h;
            let mut row_w = 0.0_f64;
            let mut row_wx = 0.0_f64;
            for (col, &sample) in samples.iter().enumerate() {
                // Negative or NaN samples carry no weight.
                if sample.is_nan() || sample <= 0.0 {
                    continue;
                }
                let w = sample as f64;
                row_w += w;
                row_wx += w * (col as f64 + 0.5) * inv_w;
                sum_w2 += w * w;
            }
            sum_w += row_w;
            sum_wx += row_wx;
            sum_wy += row_w * py;
        }

        if sum_w <= 0.0 || !sum_w.is_finite() {
            return Reduction::STILL;
        }

        let intensity = match self.mode {
            IntensityMode::Mean => sum_w / count as f64,
            IntensityMode::Weighted => sum_w2 / sum_w,
        };

        Reduction {
            intensity,
            centroid: Point2D::new(sum_wx / sum_w, sum_wy / sum_w).clamped(),
            total_weight: sum_w,
        }
    }
}

impl FrameStage for AverageColorReducer {
    fn name(&self) -> &'static str {
        "average_color"
    }
}
