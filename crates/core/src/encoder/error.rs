//! Error types for the encoder module.

use thiserror::Error;

/// Errors that can occur while encoding an image.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// No ImageMagick binary could be located.
    #[error("ImageMagick not found: install `magick` or `convert`")]
    MagickNotFound,

    /// A job setting failed validation for the target encoder.
    #[error("invalid option {option}={value}: {reason}")]
    InvalidOption {
        option: String,
        value: String,
        reason: String,
    },

    /// The encode process failed.
    #[error("encode failed: {reason}")]
    EncodeFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// The encode process ran past its deadline and was killed.
    #[error("encode timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// I/O error while preparing or finalizing output files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EncoderError {
    pub fn invalid_option(
        option: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidOption {
            option: option.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn encode_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::EncodeFailed {
            reason: reason.into(),
            stderr,
        }
    }
}
