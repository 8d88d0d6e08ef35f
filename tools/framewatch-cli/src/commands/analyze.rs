//! Run the detector over an image sequence.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use framewatch_common::config::AppConfig;
use framewatch_frame_model::FrameSource;
use framewatch_processing_core::MotionDetector;

use crate::commands::DetectorArgs;
use crate::output::Reporter;
use crate::sequence::ImageSequenceSource;

pub fn run(
    config: &AppConfig,
    path: PathBuf,
    fps: f64,
    args: DetectorArgs,
) -> anyhow::Result<()> {
    if fps <= 0.0 {
        anyhow::bail!("Frame rate must be positive, got {fps}");
    }

    let mut source = ImageSequenceSource::open(&path, fps)
        .map_err(|e| anyhow::anyhow!("Failed to open sequence: {e}"))?;

    if !args.json {
        println!("Analyzing {} frames in: {}", source.len(), path.display());
    }
    if source.len() == 0 {
        if !args.json {
            println!("  No frames to analyze.");
        }
        return Ok(());
    }

    let detector = MotionDetector::new(args.settings(config)?)?;
    let reporter = Reporter::new(args.json);

    let printer = reporter.clone();
    detector.set_handler(move |result| printer.report(result))?;

    // A resolution change mid-sequence pauses the detector; resume on the
    // new size rather than dropping the rest of the sequence.
    let paused = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&paused);
    detector.set_error_sink(move |e| {
        *sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(e.to_string());
    })?;

    while let Some(frame) = source.next_frame() {
        detector.process_frame(&frame);

        let error = paused
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(error) = error {
            tracing::warn!("Resetting detector after: {error}");
            detector.reset()?;
            detector.process_frame(&frame);
        }
    }

    reporter.summary(&detector.stats());
    if !source.skipped.is_empty() && !args.json {
        println!("  Unreadable files: {}", source.skipped.len());
    }
    detector.teardown();

    Ok(())
}
