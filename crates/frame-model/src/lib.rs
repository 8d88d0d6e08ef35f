//! Framewatch Frame Model
//!
//! Defines the data contracts shared by the motion pipeline and its callers:
//! - **Frames:** Timestamped pixel buffers in a handful of 8-bit formats
//! - **Geometry:** Points normalized to the unit square
//! - **Motion:** The per-sample result delivered to handlers
//! - **Sources:** The interface frame producers implement
//!
//! All positions are normalized to `[0.0, 1.0]` relative to the frame
//! extents so results survive resolution changes.

pub mod frame;
pub mod geometry;
pub mod motion;
pub mod source;

pub use frame::*;
pub use geometry::*;
pub use motion::*;
pub use source::*;
