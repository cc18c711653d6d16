//! Image encoders.
//!
//! Workers hand an input file and a job to an [`Encode`] implementation
//! and get back the path of the produced rendition. The stock
//! implementation shells out to ImageMagick; tests swap in a mock.

mod avif;
mod error;
mod jpeg;
mod magick;
mod webp;

pub use avif::AvifSettings;
pub use error::EncoderError;
pub use jpeg::JpegSettings;
pub use magick::MagickEncoder;
pub use webp::WebpSettings;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::job::Job;

/// Trait for producing one rendition of an input image.
#[async_trait]
pub trait Encode: Send + Sync {
    /// Encode `input` according to the job's kind, resolution and
    /// settings. Returns the path of the finished output file.
    async fn encode(&self, input: &Path, job: &Job) -> Result<PathBuf, EncoderError>;
}
