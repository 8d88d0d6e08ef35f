//! Image-sequence frame source.
//!
//! Reads every PNG, JPEG, or BMP file in a directory in file-name order
//! and timestamps them at a fixed frame rate.

use std::path::{Path, PathBuf};

use framewatch_common::clock::MediaClock;
use framewatch_common::error::{FramewatchError, FramewatchResult};
use framewatch_frame_model::frame::{Frame, PixelFormat};
use framewatch_frame_model::source::FrameSource;

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    fps: f64,
    index: usize,
    /// Files that could not be decoded.
    pub skipped: Vec<PathBuf>,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path, fps: f64) -> FramewatchResult<Self> {
        if !dir.is_dir() {
            return Err(FramewatchError::FileNotFound {
                path: dir.to_path_buf(),
            });
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_image(path))
            .collect();
        files.sort();

        Ok(Self {
            files,
            fps: fps.max(1e-3),
            index: 0,
            skipped: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    fn load(path: &Path, timestamp_ns: u64) -> FramewatchResult<Frame> {
        let image = image::open(path)
            .map_err(|e| FramewatchError::image(format!("{}: {e}", path.display())))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        Frame::new(
            width,
            height,
            PixelFormat::Rgba8,
            timestamp_ns,
            image.into_raw(),
        )
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Option<Frame> {
        // Undecodable files are skipped; their slot on the timeline stays empty.
        while self.index < self.files.len() {
            let index = self.index;
            self.index += 1;

            let path = &self.files[index];
            let timestamp_ns = MediaClock::frame_timestamp_ns(index as u64, self.fps);
            match Self::load(path, timestamp_ns) {
                Ok(frame) => return Some(frame),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Skipping frame: {e}");
                    self.skipped.push(path.clone());
                }
            }
        }
        None
    }
}
