use thiserror::Error;

/// Errors raised by the detection core
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DetectionError {
    /// Input grid is empty, mis-shaped or too small for the configured kernels
    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },

    /// Distance field has a zero maximum (no foreground in the raw mask)
    #[error("degenerate mask: distance field maximum is zero")]
    DegenerateMask,

    /// A configuration value makes the pipeline undefined
    #[error("invalid configuration for `{field}`: {reason}")]
    ConfigurationError { field: &'static str, reason: String },
}

impl DetectionError {
    pub fn invalid_frame(reason: impl Into<String>) -> Self {
        Self::InvalidFrame {
            reason: reason.into(),
        }
    }

    pub fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::ConfigurationError {
            field,
            reason: reason.into(),
        }
    }
}

/// A per-frame failure, tagged with the frame it happened on
#[derive(Debug, Error)]
#[error("frame {frame}: {source}")]
pub struct FrameError {
    pub frame: String,
    #[source]
    pub source: DetectionError,
}

pub type Result<T> = std::result::Result<T, DetectionError>;
