//! Media clock and sampling utilities.
//!
//! Frame timestamps are nanoseconds on a monotonic media clock anchored
//! at the moment a source started producing frames. This module provides:
//! - The clock itself, for live sources that stamp their own frames
//! - Conversions between nanoseconds and seconds
//! - The sample throttle that limits how often motion is evaluated

use std::time::{Duration, Instant};

/// Monotonic timestamp in nanoseconds since the media clock epoch.
pub type TimestampNs = u64;

/// A media clock that provides monotonic timestamps relative to
/// a fixed epoch (the moment the source started).
#[derive(Debug, Clone)]
pub struct MediaClock {
    /// The instant the source started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl MediaClock {
    /// Create a new media clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Get nanoseconds elapsed since the epoch.
    pub fn elapsed_ns(&self) -> TimestampNs {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Wall-clock time at the epoch.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// Convert a nanosecond value to seconds.
    pub fn ns_to_secs(ns: TimestampNs) -> f64 {
        ns as f64 / 1_000_000_000.0
    }

    /// Convert seconds to nanoseconds.
    pub fn secs_to_ns(secs: f64) -> TimestampNs {
        (secs * 1_000_000_000.0) as u64
    }

    /// Timestamp of the `index`-th frame of a constant-rate stream.
    pub fn frame_timestamp_ns(index: u64, fps: f64) -> TimestampNs {
        if fps <= 0.0 {
            return 0;
        }
        Self::secs_to_ns(index as f64 / fps)
    }
}

/// Convert a duration to whole nanoseconds, saturating at `u64::MAX`.
pub fn duration_to_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Decide whether a frame at `now_ns` should be sampled.
///
/// An interval of zero samples every frame, and the first frame
/// (no previous sample) is always sampled. A timestamp earlier than the
/// last sample counts as zero elapsed time.
pub fn should_sample(
    last_sample_ns: Option<TimestampNs>,
    now_ns: TimestampNs,
    interval: Duration,
) -> bool {
    let interval_ns = duration_to_ns(interval);
    match last_sample_ns {
        None => true,
        Some(_) if interval_ns == 0 => true,
        Some(last) => now_ns.saturating_sub(last) >= interval_ns,
    }
}

/// Sample throttle driven purely by frame timestamps.
///
/// There is no timer: the decision for each frame depends only on the
/// delta to the last sampled frame.
#[derive(Debug, Clone, Default)]
pub struct SampleThrottle {
    interval: Duration,
    last_sample_ns: Option<TimestampNs>,
}

impl SampleThrottle {
    /// Create a throttle with the given minimum spacing between samples.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sample_ns: None,
        }
    }

    /// Check whether `now_ns` is due for a sample.
    /// Returns true and records the sample time if so.
    pub fn should_sample(&mut self, now_ns: TimestampNs) -> bool {
        if should_sample(self.last_sample_ns, now_ns, self.interval) {
            self.last_sample_ns = Some(now_ns);
            true
        } else {
            false
        }
    }

    /// Change the spacing. Applies from the next frame; the last sample
    /// time is kept.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_sample_ns(&self) -> Option<TimestampNs> {
        self.last_sample_ns
    }

    /// Forget the last sample so the next frame is sampled unconditionally.
    pub fn reset(&mut self) {
        self.last_sample_ns = None;
    }
}
