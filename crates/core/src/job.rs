//! Job model and fan-out expansion.
//!
//! A [`Job`] is the atomic unit of work: one encoder kind at one
//! resolution, fully self-contained so a worker needs no other
//! context to process it. Expansion turns one validated
//! [`ConversionRequest`] into a flat list of jobs, one per (spec,
//! known resolution name) pair, in request order.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::request::{ConversionRequest, ConversionSpec, Resolution};

/// The closed set of supported encoder kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Jpeg,
    Webp,
    Avif,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Jpeg => "jpeg",
            JobKind::Webp => "webp",
            JobKind::Avif => "avif",
        }
    }

    /// File extension for this kind's output.
    pub fn extension(&self) -> &'static str {
        match self {
            JobKind::Jpeg => "jpg",
            JobKind::Webp => "webp",
            JobKind::Avif => "avif",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jpeg" | "jpg" => Ok(JobKind::Jpeg),
            "webp" => Ok(JobKind::Webp),
            "avif" => Ok(JobKind::Avif),
            other => Err(format!("unsupported job kind: {}", other)),
        }
    }
}

/// Job processing status. Transitions only move forward:
/// pending -> delivered -> succeeded | failed. Queue redelivery never
/// resets it; the status lives in the task registry, not the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Delivered,
    Succeeded,
    Failed,
}

impl JobStatus {
    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Delivered => 1,
            JobStatus::Succeeded | JobStatus::Failed => 2,
        }
    }

    /// Whether moving to `next` is a forward transition. Re-applying
    /// the current status is allowed (idempotent redelivery).
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        *self == next || next.rank() > self.rank()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Delivered => "delivered",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A single unit of conversion work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Globally unique, time-ordered id (UUIDv7). Permanent once
    /// assigned.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub status: JobStatus,
    /// Encoder options, copied verbatim from the conversion spec.
    pub settings: HashMap<String, String>,
    /// First transformer of the spec, or empty.
    pub transformer_id: String,
    pub resolution: Resolution,
    pub destination_backend_ids: Vec<String>,
}

/// Queue wire field holding the JSON-serialized job.
pub const PAYLOAD_FIELD: &str = "payload";
/// Queue wire field holding the produce timestamp (RFC3339).
pub const TIMESTAMP_FIELD: &str = "ts";
/// Queue wire field naming the input file a job operates on.
pub const INPUT_FIELD: &str = "input";

/// Errors decoding a job from queue message values.
#[derive(Debug, Error)]
pub enum JobDecodeError {
    #[error("message has no {PAYLOAD_FIELD} field")]
    MissingPayload,

    #[error("failed to parse job payload: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Job {
    fn from_spec(spec: &ConversionSpec, resolution: Resolution) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            kind: spec.kind,
            status: JobStatus::Pending,
            settings: spec.settings.clone(),
            transformer_id: spec.transformers.first().cloned().unwrap_or_default(),
            resolution,
            destination_backend_ids: spec.destination_backends.clone(),
        }
    }

    /// Flatten the job into the string map carried by a queue
    /// message: the JSON payload plus a produce timestamp. Producers
    /// may add further fields; consumers treat unknown fields as
    /// opaque.
    pub fn to_values(&self) -> HashMap<String, String> {
        let mut values = HashMap::new();
        values.insert(
            PAYLOAD_FIELD.to_string(),
            serde_json::to_string(self).unwrap_or_default(),
        );
        values.insert(TIMESTAMP_FIELD.to_string(), Utc::now().to_rfc3339());
        values
    }

    /// Decode a job from queue message values.
    pub fn from_values(values: &HashMap<String, String>) -> Result<Self, JobDecodeError> {
        let payload = values
            .get(PAYLOAD_FIELD)
            .ok_or(JobDecodeError::MissingPayload)?;
        Ok(serde_json::from_str(payload)?)
    }
}

/// Expand a request into independently schedulable jobs.
///
/// Output order is a documented guarantee: jobs appear in (spec
/// order, resolution order) exactly as declared in the request, so
/// the first job for a kind is its primary rendition. Resolution
/// names the request does not define contribute no job and no error.
pub fn expand(request: &ConversionRequest) -> Vec<Job> {
    let mut jobs = Vec::new();
    for spec in &request.conversion_jobs {
        for name in &spec.resolutions {
            let Some(resolution) = request.resolution(name) else {
                continue;
            };
            jobs.push(Job::from_spec(spec, resolution));
        }
    }
    jobs
}
