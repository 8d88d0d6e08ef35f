//! Application configuration.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FramewatchError, FramewatchResult};

/// Global application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default motion detector parameters.
    #[serde(default)]
    pub detector: DetectorDefaults,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the change between a frame and the running average is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceMetric {
    /// Absolute difference of Rec.601 luminance.
    #[default]
    Luminance,
    /// Largest absolute difference over the color channels.
    MaxChannel,
    /// Euclidean distance between the color vectors.
    Euclidean,
}

/// How a diff frame is summarized into a single intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityMode {
    /// Mean magnitude over every sample of the frame.
    #[default]
    Mean,
    /// Magnitude-weighted mean magnitude: `Σw² / Σw`. A lone changed pixel
    /// reports its own magnitude.
    Weighted,
}

/// Whether frames skipped by the sample throttle still feed the running average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipPolicy {
    /// Skipped frames are ignored entirely; the baseline only moves on sampled frames.
    #[default]
    FreezeBaseline,
    /// Skipped frames still update the baseline, they only produce no result.
    TrackBaseline,
}

macro_rules! impl_from_str {
    ($ty:ty, $what:literal, { $($name:literal => $variant:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = FramewatchError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
                    $($name => Ok($variant),)+
                    other => Err(FramewatchError::configuration(format!(
                        concat!("unknown ", $what, " '{}'"),
                        other
                    ))),
                }
            }
        }
    };
}

impl_from_str!(DifferenceMetric, "difference metric", {
    "luminance" => DifferenceMetric::Luminance,
    "max_channel" => DifferenceMetric::MaxChannel,
    "euclidean" => DifferenceMetric::Euclidean,
});

impl_from_str!(IntensityMode, "intensity mode", {
    "mean" => IntensityMode::Mean,
    "weighted" => IntensityMode::Weighted,
});

impl_from_str!(SkipPolicy, "skip policy", {
    "freeze_baseline" => SkipPolicy::FreezeBaseline,
    "freeze" => SkipPolicy::FreezeBaseline,
    "track_baseline" => SkipPolicy::TrackBaseline,
    "track" => SkipPolicy::TrackBaseline,
});

/// Default motion detector parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorDefaults {
    /// Low-pass filter strength in `[0.0, 1.0]`.
    pub strength: f64,

    /// Minimum spacing between motion samples in milliseconds. 0 samples every frame.
    pub sample_interval_ms: u64,

    pub metric: DifferenceMetric,

    /// Magnitudes below this value count as no change.
    pub noise_threshold: f64,

    pub intensity_mode: IntensityMode,

    pub skip_policy: SkipPolicy,
}

impl Default for DetectorDefaults {
    fn default() -> Self {
        Self {
            strength: 0.5,
            sample_interval_ms: 0,
            metric: DifferenceMetric::default(),
            noise_threshold: 0.0,
            intensity_mode: IntensityMode::default(),
            skip_policy: SkipPolicy::default(),
        }
    }
}

impl DetectorDefaults {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    /// Check parameter domains.
    pub fn validate(&self) -> FramewatchResult<()> {
        validate_unit("strength", self.strength)?;
        validate_unit("noise threshold", self.noise_threshold)?;
        Ok(())
    }
}

/// Reject values outside `[0.0, 1.0]`, NaN included.
pub fn validate_unit(name: &str, value: f64) -> FramewatchResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(FramewatchError::configuration(format!(
            "{name} must be within [0.0, 1.0], got {value}"
        )))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "framewatch=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_or_default(&config_file_path())
    }

    /// Load config from `path`, falling back to defaults when the file is
    /// missing, unreadable, or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config at {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Load and validate config from an explicit path.
    pub fn load_from(path: &Path) -> FramewatchResult<Self> {
        if !path.exists() {
            return Err(FramewatchError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.detector.validate()?;
        Ok(config)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> FramewatchResult<PathBuf> {
        let path = config_file_path();
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config to an explicit path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> FramewatchResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("framewatch").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("framewatch-config-{}-{name}", std::process::id()))
            .join("config.json")
    }

    #[test]
    fn defaults_match_documented_values() {
        let defaults = DetectorDefaults::default();
        assert_eq!(defaults.strength, 0.5);
        assert_eq!(defaults.sample_interval(), Duration::ZERO);
        assert_eq!(defaults.skip_policy, SkipPolicy::FreezeBaseline);
        assert!(defaults.validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_strength() {
        let defaults = DetectorDefaults {
            strength: 1.5,
            ..Default::default()
        };
        assert!(defaults.validate().unwrap_err().is_configuration());
        assert!(validate_unit("strength", f64::NAN).is_err());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"detector":{"strength":0.25,"metric":"max_channel"}}"#)
                .unwrap();
        assert_eq!(config.detector.strength, 0.25);
        assert_eq!(config.detector.metric, DifferenceMetric::MaxChannel);
        assert_eq!(config.detector.sample_interval_ms, 0);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn save_and_load_from_path() {
        let path = temp_path("roundtrip");
        let mut config = AppConfig::default();
        config.detector.sample_interval_ms = 250;
        config.detector.skip_policy = SkipPolicy::TrackBaseline;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let path = temp_path("invalid");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"detector":{"strength":7.0}}"#).unwrap();

        assert!(AppConfig::load_from(&path).is_err());
        assert_eq!(AppConfig::load_or_default(&path), AppConfig::default());
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn policy_names_parse() {
        assert_eq!(
            "max-channel".parse::<DifferenceMetric>().unwrap(),
            DifferenceMetric::MaxChannel
        );
        assert_eq!("Weighted".parse::<IntensityMode>().unwrap(), IntensityMode::Weighted);
        assert_eq!("track".parse::<SkipPolicy>().unwrap(), SkipPolicy::TrackBaseline);
        assert!("sobel".parse::<DifferenceMetric>().is_err());
    }
}
