//! Common surface of the pipeline stages.

/// A single step of the motion pipeline.
///
/// Stages are independent values composed by the detector; each one
/// processes a frame (or a derived frame) per call. This trait covers the
/// lifecycle hooks they share, not the processing signature, which differs
/// per stage.
pub trait FrameStage {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Drop any state carried between frames.
    fn reset(&mut self) {}
}
