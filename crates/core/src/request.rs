//! Conversion request model and ingress validation.
//!
//! A [`ConversionRequest`] is the top-level document a client submits.
//! It is validated once at ingress and discarded after expansion into
//! jobs; nothing downstream ever looks at it again.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::JobKind;

/// Errors produced while loading or validating a conversion request.
///
/// Validation is fail-fast: only the first violation encountered is
/// reported, in the order the variants are checked.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("callbackUrl is required")]
    MissingCallbackUrl,

    #[error("invalid callbackUrl: {0}")]
    InvalidCallbackUrl(#[from] url::ParseError),

    #[error("at least one backend is required")]
    NoBackends,

    #[error("at least one conversion job is required")]
    NoConversionJobs,

    #[error("failed to read request file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse request: {0}")]
    Parse(#[from] serde_json::Error),
}

/// An image size, referenced by name from conversion specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// One conversion to perform, prior to fan-out against named
/// resolutions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionSpec {
    /// Encoder kind. The supported set is closed; unknown kinds are
    /// rejected when the request is parsed.
    #[serde(rename = "type")]
    pub kind: JobKind,
    /// Names of resolutions to expand against, resolved via
    /// [`ConversionRequest::resolutions`].
    #[serde(default)]
    pub resolutions: Vec<String>,
    /// Transformer names; only the first is used.
    #[serde(default)]
    pub transformers: Vec<String>,
    #[serde(default)]
    pub destination_backends: Vec<String>,
    #[serde(default)]
    pub keep_original: bool,
    /// Free-form encoder options. Values are opaque to the queue
    /// core; each encoder parses and validates its own subset.
    #[serde(default)]
    pub settings: HashMap<String, String>,
}

/// Top-level conversion request submitted by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRequest {
    pub callback_url: String,
    #[serde(default)]
    pub backends: HashMap<String, String>,
    #[serde(default)]
    pub transformers: HashMap<String, String>,
    #[serde(default)]
    pub resolutions: HashMap<String, Resolution>,
    #[serde(default)]
    pub conversion_jobs: Vec<ConversionSpec>,
}

impl ConversionRequest {
    /// Parse a JSON request document from a file.
    pub fn from_json_file(path: &Path) -> Result<Self, RequestError> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Basic sanity checks, fail-fast in a fixed order: missing
    /// callback URL, malformed callback URL, empty backends, empty
    /// conversion jobs.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.callback_url.is_empty() {
            return Err(RequestError::MissingCallbackUrl);
        }
        url::Url::parse(&self.callback_url)?;
        if self.backends.is_empty() {
            return Err(RequestError::NoBackends);
        }
        if self.conversion_jobs.is_empty() {
            return Err(RequestError::NoConversionJobs);
        }
        Ok(())
    }

    /// Look up a named resolution.
    pub fn resolution(&self, name: &str) -> Option<Resolution> {
        self.resolutions.get(name).copied()
    }

    /// Look up a backend identifier by name.
    pub fn backend(&self, name: &str) -> Option<&str> {
        self.backends.get(name).map(String::as_str)
    }
}
