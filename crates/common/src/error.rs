//! Error types shared across Framewatch crates.

use std::path::PathBuf;

/// Top-level error type for Framewatch operations.
#[derive(Debug, thiserror::Error)]
pub enum FramewatchError {
    /// Dimension mismatch or an invalid parameter. Pauses a detector
    /// until it is reset.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A single malformed frame. The frame is skipped and processing
    /// continues with the next one.
    #[error("Transient frame error: {message}")]
    TransientFrame { message: String },

    #[error("Detector has been torn down")]
    TornDown,

    #[error("Image error: {message}")]
    Image { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using FramewatchError.
pub type FramewatchResult<T> = Result<T, FramewatchError>;

impl FramewatchError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    pub fn transient_frame(msg: impl Into<String>) -> Self {
        Self::TransientFrame {
            message: msg.into(),
        }
    }

    pub fn image(msg: impl Into<String>) -> Self {
        Self::Image {
            message: msg.into(),
        }
    }

    /// Whether this error pauses a detector (as opposed to dropping one frame).
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientFrame { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_pick_the_right_variant() {
        let err = FramewatchError::configuration("frame is 4x4, baseline is 8x8");
        assert!(err.is_configuration());
        assert!(!err.is_transient());
        assert_eq!(
            err.to_string(),
            "Configuration error: frame is 4x4, baseline is 8x8"
        );

        let err = FramewatchError::transient_frame("short buffer");
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "Transient frame error: short buffer");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: FramewatchError = io.into();
        assert!(matches!(err, FramewatchError::Io(_)));
    }
}
