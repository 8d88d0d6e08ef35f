//! Result printing for the commands that run the detector.

use std::sync::{Arc, Mutex, PoisonError};

use framewatch_frame_model::motion::MotionResult;
use framewatch_processing_core::DetectorStats;

#[derive(Debug, Default)]
struct Tally {
    results: u64,
    peak: Option<MotionResult>,
    intensity_sum: f64,
}

/// Prints each result as it arrives and keeps a running tally.
#[derive(Debug, Clone)]
pub struct Reporter {
    json: bool,
    tally: Arc<Mutex<Tally>>,
}

impl Reporter {
    pub fn new(json: bool) -> Self {
        Self {
            json,
            tally: Arc::new(Mutex::new(Tally::default())),
        }
    }

    /// Print one result.
    pub fn report(&self, result: &MotionResult) {
        if self.json {
            match serde_json::to_string(result) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("Failed to serialize result: {e}"),
            }
        } else {
            println!(
                "  t={:>8.3}s  centroid=({:.3}, {:.3})  intensity={:.5}",
                result.time_secs(),
                result.centroid.x,
                result.centroid.y,
                result.intensity
            );
        }

        let mut tally = self.tally.lock().unwrap_or_else(PoisonError::into_inner);
        tally.results += 1;
        tally.intensity_sum += result.intensity;
        if tally.peak.map_or(true, |p| result.intensity > p.intensity) {
            tally.peak = Some(*result);
        }
    }

    /// Print the closing summary (suppressed in JSON mode).
    pub fn summary(&self, stats: &DetectorStats) {
        if self.json {
            return;
        }
        let tally = self.tally.lock().unwrap_or_else(PoisonError::into_inner);

        println!();
        println!("Summary:");
        println!("  Frames received: {}", stats.frames_received);
        println!("  Frames sampled: {}", stats.frames_sampled);
        println!("  Frames skipped: {}", stats.frames_skipped);
        println!("  Frames dropped: {}", stats.frames_dropped);
        if stats.configuration_errors > 0 {
            println!("  Configuration errors: {}", stats.configuration_errors);
        }
        if tally.results > 0 {
            println!(
                "  Mean intensity: {:.5}",
                tally.intensity_sum / tally.results as f64
            );
        }
        if let Some(peak) = tally.peak {
            println!(
                "  Peak intensity: {:.5} at t={:.3}s, centroid ({:.3}, {:.3})",
                peak.intensity,
                peak.time_secs(),
                peak.centroid.x,
                peak.centroid.y
            );
        }
    }
}
