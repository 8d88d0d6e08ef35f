//! Framewatch Processing Core — the motion pipeline
//!
//! Turns a frame stream into a continuous motion signal:
//! - **Low-pass filter:** Exponentially weighted running average of frames
//! - **Frame difference:** Per-pixel magnitude of change against that average
//! - **Average color reduction:** Intensity and weighted centroid of the change
//! - **Motion detector:** Wires the stages, throttles sampling, and delivers results
//!
//! This crate is pure computation with no I/O and no platform dependencies.
//! Frames come in; motion results go out through a registered handler.

pub mod average_color;
pub mod frame_difference;
pub mod low_pass;
pub mod motion_detector;
pub mod stage;

pub use average_color::{AverageColorReducer, Reduction};
pub use frame_difference::{DiffFrame, FrameDifference};
pub use low_pass::{AverageFrame, LowPassFilter};
pub use motion_detector::{
    DetectorSettings, DetectorState, DetectorStats, FrameOutcome, HandlerRegistration,
    MotionDetector,
};
pub use stage::FrameStage;
