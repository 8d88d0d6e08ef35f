//! Frame differencing against the running average.

use framewatch_common::clock::TimestampNs;
use framewatch_common::config::{validate_unit, DifferenceMetric};
use framewatch_common::error::{FramewatchError, FramewatchResult};
use framewatch_frame_model::frame::{Dimensions, Frame};

use crate::low_pass::AverageFrame;
use crate::stage::FrameStage;

/// Rec.601 luma weights for red, green, blue.
const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Per-pixel magnitude of change, one sample per pixel in `[0.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffFrame {
    pub dimensions: Dimensions,
    pub timestamp_ns: TimestampNs,
    pub samples: Vec<f32>,
}

impl DiffFrame {
    /// An all-zero diff frame.
    pub fn zeros(dimensions: Dimensions, timestamp_ns: TimestampNs) -> Self {
        Self {
            dimensions,
            timestamp_ns,
            samples: vec![0.0; dimensions.pixel_count()],
        }
    }

    /// Wrap existing samples, checking the count against the dimensions.
    pub fn from_samples(
        dimensions: Dimensions,
        timestamp_ns: TimestampNs,
        samples: Vec<f32>,
    ) -> FramewatchResult<Self> {
        if samples.len() != dimensions.pixel_count() {
            return Err(FramewatchError::configuration(format!(
                "{} samples do not fill a {} diff frame",
                samples.len(),
                dimensions
            )));
        }
        Ok(Self {
            dimensions,
            timestamp_ns,
            samples,
        })
    }

    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.dimensions.width || y >= self.dimensions.height {
            return None;
        }
        self.samples
            .get(y as usize * self.dimensions.width as usize + x as usize)
            .copied()
    }

    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        if x >= self.dimensions.width || y >= self.dimensions.height {
            return;
        }
        let idx = y as usize * self.dimensions.width as usize + x as usize;
        self.samples[idx] = value;
    }
}

/// Compares a frame against the running average.
#[derive(Debug, Clone, Default)]
pub struct FrameDifference {
    metric: DifferenceMetric,
    noise_threshold: f32,
}

impl FrameDifference {
    pub fn new(metric: DifferenceMetric) -> Self {
        Self {
            metric,
            noise_threshold: 0.0,
        }
    }

    pub fn metric(&self) -> DifferenceMetric {
        self.metric
    }

    pub fn set_metric(&mut self, metric: DifferenceMetric) {
        self.metric = metric;
    }

    pub fn noise_threshold(&self) -> f64 {
        self.noise_threshold as f64
    }

    /// Magnitudes strictly below `threshold` are reported as zero.
    pub fn set_noise_threshold(&mut self, threshold: f64) -> FramewatchResult<()> {
        validate_unit("noise threshold", threshold)?;
        self.noise_threshold = threshold as f32;
        Ok(())
    }

    /// Per-pixel magnitude of change between `current` and `average`.
    ///
    /// Every sample is non-negative and exactly zero where the inputs are
    /// identical. Fails when dimensions or pixel formats differ.
    pub fn compare(
        &self,
        current: &Frame,
        average: &AverageFrame,
    ) -> FramewatchResult<DiffFrame> {
        average.check_compatible(current)?;
        current.validate()?;

        let bpp = current.format.bytes_per_pixel();
        let offsets = current.format.rgb_offsets();
        let samples = current
            .data
            .chunks_exact(bpp)
            .zip(average.data.chunks_exact(bpp))
            .map(|(px, avg)| {
                let magnitude = match offsets {
                    None => (px[0] as f32 - avg[0]).abs() / 255.0,
                    Some(offsets) => {
                        let delta = offsets.map(|o| px[o] as f32 - avg[o]);
                        self.color_magnitude(delta)
                    }
                };
                let magnitude = magnitude.clamp(0.0, 1.0);
                if magnitude < self.noise_threshold {
                    0.0
                } else {
                    magnitude
                }
            })
            .collect();

        Ok(DiffFrame {
            dimensions: current.dimensions,
            timestamp_ns: current.timestamp_ns,
            samples,
        })
    }

    /// Magnitude of an RGB delta, normalized to `[0.0, 1.0]`.
    fn color_magnitude(&self, delta: [f32; 3]) -> f32 {
        match self.metric {
            DifferenceMetric::Luminance => {
                let luma: f32 = delta
                    .iter()
                    .zip(LUMA_WEIGHTS)
                    .map(|(d, w)| d * w)
                    .sum();
                luma.abs() / 255.0
            }
            DifferenceMetric::MaxChannel => {
                delta.iter().map(|d| d.abs()).fold(0.0, f32::max) / 255.0
            }
            DifferenceMetric::Euclidean => {
                let squared: f32 = delta.iter().map(|d| d * d).sum();
                squared.sqrt() / (255.0 * 3f32.sqrt())
            }
        }
    }
}

impl FrameStage for FrameDifference {
    fn name(&self) -> &'static str {
        "frame_difference"
    }
}
