//! Synthetic frame generation

use std::time::Duration;

use framewatch_common::clock::MediaClock;
use framewatch_frame_model::frame::{Dimensions, Frame, PixelFormat};
use framewatch_frame_model::geometry::Point2D;
use framewatch_frame_model::source::FrameSource;

const BACKGROUND: [u8; 4] = [40, 40, 50, 255];
const SQUARE: [u8; 4] = [50, 255, 50, 255];

/// A bright square sweeping diagonally across a dark background.
pub struct MovingSquareSource {
    dimensions: Dimensions,
    fps: f64,
    total: u64,
    index: u64,
    side: u32,
    /// Present when pacing frames in real time.
    clock: Option<MediaClock>,
}

impl MovingSquareSource {
    pub fn new(dimensions: Dimensions, fps: f64, total: u64, side: u32) -> Self {
        Self {
            dimensions,
            fps: fps.max(1.0),
            total,
            index: 0,
            side: side.clamp(1, dimensions.width.min(dimensions.height).max(1)),
            clock: None,
        }
    }

    /// Sleep between frames and stamp them with a media clock.
    pub fn realtime(mut self) -> Self {
        self.clock = Some(MediaClock::start());
        self
    }

    /// Top-left corner of the square in frame `index`.
    fn square_origin(&self, index: u64) -> (u32, u32) {
        let span_x = self.dimensions.width - self.side;
        let span_y = self.dimensions.height - self.side;
        let t = if self.total <= 1 {
            0.0
        } else {
            index as f64 / (self.total - 1) as f64
        };
        (
            (span_x as f64 * t).round() as u32,
            (span_y as f64 * t).round() as u32,
        )
    }

    /// Normalized centre of the square in frame `index`.
    pub fn square_center(&self, index: u64) -> Point2D {
        let (x, y) = self.square_origin(index);
        Point2D::new(
            (x as f64 + self.side as f64 / 2.0) / self.dimensions.width as f64,
            (y as f64 + self.side as f64 / 2.0) / self.dimensions.height as f64,
        )
    }

    fn render(&self, index: u64, timestamp_ns: u64) -> Frame {
        let mut frame = Frame::filled(self.dimensions, PixelFormat::Rgba8, timestamp_ns, 0);
        for px in frame.data.chunks_exact_mut(4) {
            px.copy_from_slice(&BACKGROUND);
        }

        let (x0, y0) = self.square_origin(index);
        for y in y0..y0 + self.side {
            for x in x0..x0 + self.side {
                if let Some(px) = frame.pixel_mut(x, y) {
                    px.copy_from_slice(&SQUARE);
                }
            }
        }
        frame
    }
}

impl FrameSource for MovingSquareSource {
    fn next_frame(&mut self) -> Option<Frame> {
        if self.index >= self.total {
            return None;
        }
        let index = self.index;
        self.index += 1;

        let nominal_ns = MediaClock::frame_timestamp_ns(index, self.fps);
        let timestamp_ns = match &self.clock {
            Some(clock) => {
                let now = clock.elapsed_ns();
                if nominal_ns > now {
                    std::thread::sleep(Duration::from_nanos(nominal_ns - now));
                }
                clock.elapsed_ns()
            }
            None => nominal_ns,
        };

        Some(self.render(index, timestamp_ns))
    }

    fn dimensions(&self) -> Option<Dimensions> {
        Some(self.dimensions)
    }
}
