//! Frame buffers.
//!
//! A frame is a tightly packed, row-major 8-bit pixel buffer with a
//! timestamp on the source's media clock. Frames are borrowed by the
//! motion pipeline for a single pass and never retained.

use std::fmt;

use framewatch_common::clock::TimestampNs;
use framewatch_common::error::{FramewatchError, FramewatchResult};
use serde::{Deserialize, Serialize};

/// Pixel layout of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Single 8-bit luminance channel.
    Luma8,
    /// 8-bit red, green, blue.
    Rgb8,
    /// 8-bit red, green, blue, alpha.
    Rgba8,
    /// 8-bit blue, green, red, alpha (the usual camera output layout).
    Bgra8,
}

impl PixelFormat {
    /// Bytes occupied by one pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Luma8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
        }
    }

    /// Byte offsets of the red, green, and blue channels within a pixel.
    ///
    /// `None` for single-channel formats.
    pub fn rgb_offsets(self) -> Option<[usize; 3]> {
        match self {
            PixelFormat::Luma8 => None,
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => Some([0, 1, 2]),
            PixelFormat::Bgra8 => Some([2, 1, 0]),
        }
    }

    /// Whether the last byte of each pixel is alpha.
    pub fn has_alpha(self) -> bool {
        matches!(self, PixelFormat::Rgba8 | PixelFormat::Bgra8)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Luma8 => "luma8",
            PixelFormat::Rgb8 => "rgb8",
            PixelFormat::Rgba8 => "rgba8",
            PixelFormat::Bgra8 => "bgra8",
        };
        f.write_str(name)
    }
}

/// Width and height of a frame in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A single timestamped video frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub dimensions: Dimensions,
    pub format: PixelFormat,
    /// Capture time on the source's media clock.
    pub timestamp_ns: TimestampNs,
    /// Row-major pixel bytes, `width * height * bytes_per_pixel` long.
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a frame, checking that the buffer matches the dimensions.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        timestamp_ns: TimestampNs,
        data: Vec<u8>,
    ) -> FramewatchResult<Self> {
        let frame = Self {
            dimensions: Dimensions::new(width, height),
            format,
            timestamp_ns,
            data,
        };
        frame.validate()?;
        Ok(frame)
    }

    /// A single-channel frame.
    pub fn luma(
        width: u32,
        height: u32,
        timestamp_ns: TimestampNs,
        data: Vec<u8>,
    ) -> FramewatchResult<Self> {
        Self::new(width, height, PixelFormat::Luma8, timestamp_ns, data)
    }

    /// A frame with every byte set to `value`.
    pub fn filled(
        dimensions: Dimensions,
        format: PixelFormat,
        timestamp_ns: TimestampNs,
        value: u8,
    ) -> Self {
        Self {
            dimensions,
            format,
            timestamp_ns,
            data: vec![value; dimensions.pixel_count() * format.bytes_per_pixel()],
        }
    }

    pub fn width(&self) -> u32 {
        self.dimensions.width
    }

    pub fn height(&self) -> u32 {
        self.dimensions.height
    }

    /// Expected buffer length for this frame's dimensions and format.
    pub fn expected_len(&self) -> usize {
        self.dimensions.pixel_count() * self.format.bytes_per_pixel()
    }

    /// Check that the frame is well formed.
    ///
    /// A malformed frame is a transient error: it says nothing about the
    /// stream's configuration, only that this one buffer is unusable.
    pub fn validate(&self) -> FramewatchResult<()> {
        if self.dimensions.is_empty() {
            return Err(FramewatchError::transient_frame(format!(
                "frame at {}ns has empty dimensions {}",
                self.timestamp_ns, self.dimensions
            )));
        }
        if self.data.len() != self.expected_len() {
            return Err(FramewatchError::transient_frame(format!(
                "frame at {}ns holds {} bytes, expected {} for {} {}",
                self.timestamp_ns,
                self.data.len(),
                self.expected_len(),
                self.dimensions,
                self.format
            )));
        }
        Ok(())
    }

    /// Bytes of the pixel at `(x, y)`, or `None` when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let start = (y as usize * self.width() as usize + x as usize) * bpp;
        self.data.get(start..start + bpp)
    }

    /// Mutable bytes of the pixel at `(x, y)`.
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> Option<&mut [u8]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let start = (y as usize * self.width() as usize + x as usize) * bpp;
        self.data.get_mut(start..start + bpp)
    }

    /// Same pixels, different timestamp.
    pub fn with_timestamp(mut self, timestamp_ns: TimestampNs) -> Self {
        self.timestamp_ns = timestamp_ns;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_short_buffer() {
        let err = Frame::new(4, 4, PixelFormat::Rgb8, 10, vec![0; 47]).unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("expected 48"));
    }

    #[test]
    fn new_rejects_empty_dimensions() {
        assert!(Frame::luma(0, 4, 0, vec![]).unwrap_err().is_transient());
    }

    #[test]
    fn pixel_access_is_row_major() {
        let mut frame = Frame::filled(Dimensions::new(3, 2), PixelFormat::Rgba8, 0, 0);
        frame.pixel_mut(2, 1).unwrap().copy_from_slice(&[1, 2, 3, 4]);

        assert_eq!(frame.pixel(2, 1).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(&frame.data[20..24], &[1, 2, 3, 4]);
        assert!(frame.pixel(3, 0).is_none());
    }

    #[test]
    fn bgra_offsets_swap_red_and_blue() {
        assert_eq!(PixelFormat::Bgra8.rgb_offsets(), Some([2, 1, 0]));
        assert_eq!(PixelFormat::Luma8.rgb_offsets(), None);
        assert!(PixelFormat::Bgra8.has_alpha());
        assert!(!PixelFormat::Rgb8.has_alpha());
    }

    #[test]
    fn format_serializes_snake_case() {
        let json = serde_json::to_string(&PixelFormat::Bgra8).unwrap();
        assert_eq!(json, "\"bgra8\"");
    }
}
