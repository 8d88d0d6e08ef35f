//! Run the detector on a synthetic moving square.

use std::sync::{Arc, Mutex, PoisonError};

use framewatch_common::config::AppConfig;
use framewatch_frame_model::frame::Dimensions;
use framewatch_processing_core::MotionDetector;

use crate::commands::DetectorArgs;
use crate::output::Reporter;
use crate::synthetic::MovingSquareSource;

#[allow(clippy::too_many_arguments)]
pub fn run(
    config: &AppConfig,
    width: u32,
    height: u32,
    fps: f64,
    frames: u64,
    square: u32,
    realtime: bool,
    args: DetectorArgs,
) -> anyhow::Result<()> {
    if width == 0 || height == 0 {
        anyhow::bail!("Frame dimensions must be non-zero, got {width}x{height}");
    }
    if fps <= 0.0 {
        anyhow::bail!("Frame rate must be positive, got {fps}");
    }

    let settings = args.settings(config)?;
    let detector = MotionDetector::new(settings)?;

    let dimensions = Dimensions::new(width, height);
    let mut source = MovingSquareSource::new(dimensions, fps, frames, square);
    if realtime {
        source = source.realtime();
    }

    if !args.json {
        println!("Simulating {frames} frames of {dimensions} at {fps}fps (square {square}px)");
    }

    let reporter = Reporter::new(args.json);
    let errors = Arc::new(Mutex::new(Vec::new()));

    let printer = reporter.clone();
    // Kept for the tracking-error line of the summary.
    let samples = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&samples);
    detector.set_handler(move |result| {
        printer.report(result);
        recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*result);
    })?;

    let sink = Arc::clone(&errors);
    detector.set_error_sink(move |e| {
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(e.to_string());
    })?;

    detector.run(&mut source);
    reporter.summary(&detector.stats());
    detector.teardown();

    let errors = errors.lock().unwrap_or_else(PoisonError::into_inner);
    for error in errors.iter() {
        eprintln!("Detector error: {error}");
    }

    if !args.json {
        let samples = samples.lock().unwrap_or_else(PoisonError::into_inner);
        let moving: Vec<f64> = samples
            .iter()
            .filter(|r| r.intensity > 0.0)
            .map(|r| {
                let index = (r.time_secs() * fps).round() as u64;
                r.centroid.distance_to(&source.square_center(index))
            })
            .collect();
        if !moving.is_empty() {
            let mean = moving.iter().sum::<f64>() / moving.len() as f64;
            println!("  Mean distance to square centre: {mean:.4}");
        }
    }

    Ok(())
}
