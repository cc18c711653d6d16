//! Mock encoder for testing.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::encoder::{Encode, EncoderError};
use crate::job::Job;

/// A recorded encode call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedEncode {
    pub input: PathBuf,
    pub job_id: String,
}

/// Mock implementation of the [`Encode`] trait.
///
/// Clones share state, so a test can keep one handle for assertions
/// while the worker owns another. Behavior is scripted: queued
/// failures are consumed first, then every call succeeds (or, for a
/// [`MockEncoder::failing`] mock, keeps failing).
#[derive(Debug, Clone)]
pub struct MockEncoder {
    calls: Arc<Mutex<Vec<RecordedEncode>>>,
    queued_failures: Arc<Mutex<VecDeque<String>>>,
    always_fail: Option<String>,
}

impl MockEncoder {
    /// An encoder where every call succeeds.
    pub fn succeeding() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            queued_failures: Arc::new(Mutex::new(VecDeque::new())),
            always_fail: None,
        }
    }

    /// An encoder where every call fails with `reason`.
    pub fn failing(reason: &str) -> Self {
        Self {
            always_fail: Some(reason.to_string()),
            ..Self::succeeding()
        }
    }

    /// Queue a one-shot failure; calls after the queue drains succeed.
    pub fn fail_next_with(&self, reason: &str) {
        self.queued_failures
            .lock()
            .unwrap()
            .push_back(reason.to_string());
    }

    /// All encode calls made so far, in order.
    pub fn calls(&self) -> Vec<RecordedEncode> {
        self.calls.lock().unwrap().clone()
    }

    /// Output path matching the real encoder's naming scheme.
    fn output_for(input: &Path, job: &Job) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        input.with_file_name(format!(
            "{}_{}_{}.{}",
            stem,
            job.resolution.width,
            job.resolution.height,
            job.kind.extension()
        ))
    }
}

#[async_trait]
impl Encode for MockEncoder {
    async fn encode(&self, input: &Path, job: &Job) -> Result<PathBuf, EncoderError> {
        self.calls.lock().unwrap().push(RecordedEncode {
            input: input.to_path_buf(),
            job_id: job.id.clone(),
        });

        if let Some(reason) = self.queued_failures.lock().unwrap().pop_front() {
            return Err(EncoderError::encode_failed(reason, None));
        }
        if let Some(ref reason) = self.always_fail {
            return Err(EncoderError::encode_failed(reason.clone(), None));
        }
        Ok(Self::output_for(input, job))
    }
}
