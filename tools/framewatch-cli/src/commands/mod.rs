pub mod analyze;
pub mod config;
pub mod simulate;

use clap::Args;
use framewatch_common::config::{AppConfig, DifferenceMetric, IntensityMode, SkipPolicy};
use framewatch_processing_core::DetectorSettings;

/// Detector overrides shared by the commands that run the pipeline.
#[derive(Args, Debug, Clone)]
pub struct DetectorArgs {
    /// Low-pass filter strength [0.0, 1.0]
    #[arg(long)]
    pub strength: Option<f64>,

    /// Minimum milliseconds between motion samples (0 = every frame)
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Difference metric: luminance|max-channel|euclidean
    #[arg(long)]
    pub metric: Option<DifferenceMetric>,

    /// Changes below this magnitude are ignored [0.0, 1.0]
    #[arg(long)]
    pub noise_threshold: Option<f64>,

    /// Intensity summary: mean|weighted
    #[arg(long)]
    pub intensity: Option<IntensityMode>,

    /// Whether throttled frames update the baseline: freeze|track
    #[arg(long)]
    pub skip_policy: Option<SkipPolicy>,

    /// Print results as JSON lines
    #[arg(long)]
    pub json: bool,
}

impl DetectorArgs {
    /// Apply the overrides on top of the configured defaults.
    pub fn settings(&self, config: &AppConfig) -> anyhow::Result<DetectorSettings> {
        let mut defaults = config.detector.clone();
        if let Some(strength) = self.strength {
            defaults.strength = strength;
        }
        if let Some(interval_ms) = self.interval_ms {
            defaults.sample_interval_ms = interval_ms;
        }
        if let Some(metric) = self.metric {
            defaults.metric = metric;
        }
        if let Some(threshold) = self.noise_threshold {
            defaults.noise_threshold = threshold;
        }
        if let Some(mode) = self.intensity {
            defaults.intensity_mode = mode;
        }
        if let Some(policy) = self.skip_policy {
            defaults.skip_policy = policy;
        }

        DetectorSettings::from_defaults(&defaults)
            .map_err(|e| anyhow::anyhow!("Invalid detector settings: {e}"))
    }
}
