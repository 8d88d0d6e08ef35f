//! Temporal low-pass filtering.
//!
//! Keeps an exponentially weighted running average of the frame stream.
//! The average is the baseline that later frames are compared against:
//! anything that stays put long enough fades into it, anything that moves
//! stands out.

use framewatch_common::clock::TimestampNs;
use framewatch_common::config::validate_unit;
use framewatch_common::error::{FramewatchError, FramewatchResult};
use framewatch_frame_model::frame::{Dimensions, Frame, PixelFormat};

use crate::stage::FrameStage;

/// Default blend weight of the newest frame.
pub const DEFAULT_STRENGTH: f64 = 0.5;

/// The running average, stored at full float precision per byte of the
/// source format so that small strengths still accumulate.
#[derive(Debug, Clone, PartialEq)]
pub struct AverageFrame {
    pub dimensions: Dimensions,
    pub format: PixelFormat,
    /// Timestamp of the last frame blended in.
    pub timestamp_ns: TimestampNs,
    pub data: Vec<f32>,
}

impl AverageFrame {
    /// Seed an average from a single frame.
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            dimensions: frame.dimensions,
            format: frame.format,
            timestamp_ns: frame.timestamp_ns,
            data: frame.data.iter().map(|&b| b as f32).collect(),
        }
    }

    /// Fail with a configuration error unless `frame` has this average's
    /// dimensions and pixel format.
    pub fn check_compatible(&self, frame: &Frame) -> FramewatchResult<()> {
        if frame.dimensions != self.dimensions {
            return Err(FramewatchError::configuration(format!(
                "frame dimensions {} do not match running average {}",
                frame.dimensions, self.dimensions
            )));
        }
        if frame.format != self.format {
            return Err(FramewatchError::configuration(format!(
                "frame format {} does not match running average {}",
                frame.format, self.format
            )));
        }
        Ok(())
    }

    /// Largest absolute difference between this average and `frame`,
    /// in 8-bit units.
    pub fn max_deviation(&self, frame: &Frame) -> f32 {
        self.data
            .iter()
            .zip(&frame.data)
            .map(|(&a, &b)| (a - b as f32).abs())
            .fold(0.0, f32::max)
    }
}

/// Exponentially weighted moving average over frames.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    strength: f64,
    average: Option<AverageFrame>,
}

impl LowPassFilter {
    /// Create a filter; `strength` must lie in `[0.0, 1.0]`.
    pub fn new(strength: f64) -> FramewatchResult<Self> {
        validate_unit("low-pass strength", strength)?;
        Ok(Self {
            strength,
            average: None,
        })
    }

    pub fn strength(&self) -> f64 {
        self.strength
    }

    /// Change the blend weight. History already accumulated is kept as is;
    /// the new weight applies from the next frame.
    pub fn set_strength(&mut self, strength: f64) -> FramewatchResult<()> {
        validate_unit("low-pass strength", strength)?;
        self.strength = strength;
        Ok(())
    }

    /// The current running average, if any frame has been consumed.
    pub fn average(&self) -> Option<&AverageFrame> {
        self.average.as_ref()
    }

    /// Blend `frame` into the running average and return the result.
    ///
    /// The first frame becomes the average outright. After that,
    /// `average' = average * (1 - strength) + frame * strength`.
    /// On error the average is left unchanged.
    pub fn consume(&mut self, frame: &Frame) -> FramewatchResult<&AverageFrame> {
        frame.validate()?;

        let strength = self.strength as f32;
        let average = match self.average.take() {
            None => AverageFrame::from_frame(frame),
            Some(mut average) => {
                if let Err(e) = average.check_compatible(frame) {
                    self.average = Some(average);
                    return Err(e);
                }
                // Written as a step toward the frame; algebraically the same
                // blend, but it settles exactly on constant input.
                for (avg, &px) in average.data.iter_mut().zip(&frame.data) {
                    *avg += (px as f32 - *avg) * strength;
                }
                average.timestamp_ns = frame.timestamp_ns;
                average
            }
        };

        Ok(self.average.insert(average))
    }
}

impl Default for LowPassFilter {
    fn default() -> Self {
        Self {
            strength: DEFAULT_STRENGTH,
            average: None,
        }
    }
}

impl FrameStage for LowPassFilter {
    fn name(&self) -> &'static str {
        "low_pass"
    }

    fn reset(&mut self) {
        self.average = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn luma(ts: u64, values: &[u8]) -> Frame {
        Frame::luma(values.len() as u32, 1, ts, values.to_vec()).unwrap()
    }

    #[test]
    fn first_frame_seeds_average() {
        let mut filter = LowPassFilter::new(0.1).unwrap();
        let avg = filter.consume(&luma(0, &[10, 200])).unwrap();
        assert_eq!(avg.data, vec![10.0, 200.0]);
    }

    #[test]
    fn blends_with_strength() {
        let mut filter = LowPassFilter::new(0.25).unwrap();
        filter.consume(&luma(0, &[0, 100])).unwrap();
        let avg = filter.consume(&luma(1, &[100, 0])).unwrap();
        assert!((avg.data[0] - 25.0).abs() < 1e-4);
        assert!((avg.data[1] - 75.0).abs() < 1e-4);
        assert_eq!(avg.timestamp_ns, 1);
    }

    #[test]
    fn zero_strength_freezes_history() {
        let mut filter = LowPassFilter::new(0.0).unwrap();
        filter.consume(&luma(0, &[50])).unwrap();
        let avg = filter.consume(&luma(1, &[250])).unwrap();
        assert_eq!(avg.data, vec![50.0]);
    }

    #[test]
    fn strength_change_is_not_retroactive() {
        let mut filter = LowPassFilter::new(0.5).unwrap();
        filter.consume(&luma(0, &[0])).unwrap();
        filter.consume(&luma(1, &[100])).unwrap(); // 50
        filter.set_strength(1.0).unwrap();
        assert_eq!(filter.average().unwrap().data, vec![50.0]);
        let avg = filter.consume(&luma(2, &[10])).unwrap();
        assert_eq!(avg.data, vec![10.0]);
    }

    #[test]
    fn rejects_invalid_strength() {
        assert!(LowPassFilter::new(-0.1).unwrap_err().is_configuration());
        let mut filter = LowPassFilter::default();
        assert!(filter.set_strength(1.01).is_err());
        assert!(filter.set_strength(f64::NAN).is_err());
        assert_eq!(filter.strength(), DEFAULT_STRENGTH);
    }

    #[test]
    fn dimension_mismatch_keeps_average() {
        let mut filter = LowPassFilter::default();
        filter.consume(&luma(0, &[1, 2, 3])).unwrap();
        let err = filter.consume(&luma(1, &[1, 2])).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(filter.average().unwrap().data, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn format_mismatch_is_configuration_error() {
        let mut filter = LowPassFilter::default();
        filter.consume(&luma(0, &[1, 2, 3])).unwrap();
        let rgb = Frame::new(1, 1, PixelFormat::Rgb8, 1, vec![1, 2, 3]).unwrap();
        assert!(filter.consume(&rgb).unwrap_err().is_configuration());
    }

    #[test]
    fn reset_reseeds_from_next_frame() {
        let mut filter = LowPassFilter::new(0.1).unwrap();
        filter.consume(&luma(0, &[0, 0])).unwrap();
        filter.reset();
        assert!(filter.average().is_none());
        let avg = filter.consume(&luma(1, &[9])).unwrap();
        assert_eq!(avg.data, vec![9.0]);
    }

    #[test]
    fn constant_input_converges() {
        let mut filter = LowPassFilter::new(0.3).unwrap();
        filter.consume(&luma(0, &[0, 255])).unwrap();
        let target = luma(1, &[128, 128]);
        for _ in 0..200 {
            filter.consume(&target).unwrap();
        }
        assert!(filter.average().unwrap().max_deviation(&target) < 0.01);
    }
}
