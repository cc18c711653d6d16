//! ImageMagick-based encoder implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::avif::AvifSettings;
use super::error::EncoderError;
use super::jpeg::JpegSettings;
use super::webp::WebpSettings;
use super::Encode;
use crate::job::{Job, JobKind};

/// Encoder that shells out to ImageMagick.
pub struct MagickEncoder {
    binary: PathBuf,
    timeout: Duration,
}

impl MagickEncoder {
    /// Create an encoder using an explicit binary path, or locate one
    /// on `$PATH` (`magick` first, then the ImageMagick 6 `convert`).
    pub fn new(binary: Option<PathBuf>, timeout: Duration) -> Result<Self, EncoderError> {
        let binary = match binary {
            Some(path) => path,
            None => find_magick()?,
        };
        Ok(Self { binary, timeout })
    }

    pub fn with_defaults() -> Result<Self, EncoderError> {
        Self::new(None, Duration::from_secs(120))
    }

    /// Output path for a job's rendition, next to the input:
    /// `<stem>_<width>_<height>.<ext>`, or `<stem>_orig.<ext>` for a
    /// zero resolution (encode without resizing).
    fn output_path(input: &Path, job: &Job) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = if job.resolution.width == 0 && job.resolution.height == 0 {
            format!("{}_orig.{}", stem, job.kind.extension())
        } else {
            format!(
                "{}_{}_{}.{}",
                stem,
                job.resolution.width,
                job.resolution.height,
                job.kind.extension()
            )
        };
        input.with_file_name(name)
    }

    /// Build the full argument list for one job. The output argument
    /// carries an explicit format prefix so the temp file's name does
    /// not decide the encoded format.
    fn build_args(input: &Path, job: &Job, tmp_output: &Path) -> Result<Vec<String>, EncoderError> {
        let mut args = vec![input.to_string_lossy().to_string()];

        if !(job.resolution.width == 0 && job.resolution.height == 0) {
            // Fit within the box, preserving aspect ratio.
            args.extend([
                "-resize".to_string(),
                format!("{}x{}", job.resolution.width, job.resolution.height),
            ]);
        }

        match job.kind {
            JobKind::Jpeg => args.extend(JpegSettings::from_settings(&job.settings)?.to_args()),
            JobKind::Webp => args.extend(WebpSettings::from_settings(&job.settings)?.to_args()),
            JobKind::Avif => args.extend(AvifSettings::from_settings(&job.settings)?.to_args()),
        }

        args.push(format!(
            "{}:{}",
            job.kind.as_str(),
            tmp_output.to_string_lossy()
        ));
        Ok(args)
    }
}

#[async_trait]
impl Encode for MagickEncoder {
    async fn encode(&self, input: &Path, job: &Job) -> Result<PathBuf, EncoderError> {
        let start = Instant::now();
        let output = Self::output_path(input, job);
        let tmp_output = output.with_extension(format!("{}.tmp", job.kind.extension()));
        let args = Self::build_args(input, job, &tmp_output)?;

        debug!(job_id = %job.id, binary = %self.binary.display(), ?args, "running encoder");

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EncoderError::MagickNotFound
                } else {
                    EncoderError::Io(e)
                }
            })?;

        let result = timeout(self.timeout, child.wait_with_output()).await;

        let process_output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(EncoderError::Io(e)),
            Err(_) => {
                // Dropping the timed-out future kills the child
                // (kill_on_drop above).
                let _ = tokio::fs::remove_file(&tmp_output).await;
                return Err(EncoderError::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        if !process_output.status.success() {
            let _ = tokio::fs::remove_file(&tmp_output).await;
            let stderr = String::from_utf8_lossy(&process_output.stderr).into_owned();
            return Err(EncoderError::encode_failed(
                format!(
                    "ImageMagick exited with code {:?}",
                    process_output.status.code()
                ),
                if stderr.is_empty() { None } else { Some(stderr) },
            ));
        }

        // Finished renditions appear atomically at the final path.
        tokio::fs::rename(&tmp_output, &output).await?;

        debug!(
            job_id = %job.id,
            output = %output.display(),
            duration_ms = start.elapsed().as_millis() as u64,
            "encode complete"
        );
        Ok(output)
    }
}

/// Locate the ImageMagick binary: `magick` (v7) first, falling back
/// to `convert` (v6).
fn find_magick() -> Result<PathBuf, EncoderError> {
    which::which("magick")
        .or_else(|_| which::which("convert"))
        .map_err(|_| EncoderError::MagickNotFound)
}

/// Parse a numeric setting, bounded inclusively.
pub(super) fn parse_u32_option(
    settings: &HashMap<String, String>,
    option: &str,
    min: u32,
    max: u32,
) -> Result<Option<u32>, EncoderError> {
    let Some(raw) = settings.get(option) else {
        return Ok(None);
    };
    let value: u32 = raw.parse().map_err(|_| {
        EncoderError::invalid_option(option, raw, "expected an unsigned integer")
    })?;
    if value < min || value > max {
        return Err(EncoderError::invalid_option(
            option,
            raw,
            format!("expected a value in {}..={}", min, max),
        ));
    }
    Ok(Some(value))
}

/// Parse a boolean setting ("true"/"false").
pub(super) fn parse_bool_option(
    settings: &HashMap<String, String>,
    option: &str,
) -> Result<Option<bool>, EncoderError> {
    let Some(raw) = settings.get(option) else {
        return Ok(None);
    };
    match raw.as_str() {
        "true" => Ok(Some(true)),
        "false" => Ok(Some(false)),
        _ => Err(EncoderError::invalid_option(
            option,
            raw,
            "expected true or false",
        )),
    }
}
