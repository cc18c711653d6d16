//! Request intake: validate, expand and enqueue.
//!
//! The single write path into the system. Every accepted request is
//! registered job-by-job before the corresponding queue message is
//! produced, so a consumer can always resolve a delivered job id in
//! the registry.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::job::{self, Job, INPUT_FIELD};
use crate::metrics;
use crate::queue::{MessageId, QueueError, WorkQueue};
use crate::registry::{RegistryError, TaskRegistry};
use crate::request::{ConversionRequest, RequestError};

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// One job accepted into the system, with the queue message that
/// carries it.
#[derive(Debug, Clone)]
pub struct SubmittedJob {
    pub job: Job,
    pub message_id: MessageId,
}

pub struct Intake {
    queue: Arc<dyn WorkQueue>,
    registry: Arc<TaskRegistry>,
}

impl Intake {
    pub fn new(queue: Arc<dyn WorkQueue>, registry: Arc<TaskRegistry>) -> Self {
        Self { queue, registry }
    }

    /// Validate a request, expand it into jobs, and enqueue each one
    /// against `input` (the path of the uploaded source image).
    ///
    /// Fails fast on the first error; jobs already enqueued at that
    /// point stay enqueued. An expansion yielding zero jobs (all
    /// resolution names unknown) is accepted and returns an empty
    /// list.
    pub async fn submit(
        &self,
        request: &ConversionRequest,
        input: &str,
    ) -> Result<Vec<SubmittedJob>, IntakeError> {
        request.validate()?;

        let jobs = job::expand(request);
        debug!(job_count = jobs.len(), input, "expanded request");

        let mut submitted = Vec::with_capacity(jobs.len());
        for job in jobs {
            self.registry.insert(&job)?;

            let mut values: HashMap<String, String> = job.to_values();
            values.insert(INPUT_FIELD.to_string(), input.to_string());

            let message_id = self.queue.produce(values).await?;
            metrics::JOBS_PRODUCED.inc();
            submitted.push(SubmittedJob { job, message_id });
        }

        info!(
            job_count = submitted.len(),
            stream = self.queue.stream(),
            "request accepted"
        );
        Ok(submitted)
    }
}
