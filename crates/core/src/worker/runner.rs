//! Worker loop implementation.
//!
//! Drives jobs through their lifecycle: read (or reclaim) a batch,
//! decode each message, encode the image, record the outcome in the
//! history ledger and the registry, then acknowledge. Every failure
//! short of shutdown is logged and survived; the loop itself never
//! exits on error.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::encoder::Encode;
use crate::history::HistoryLedger;
use crate::job::{Job, JobStatus, INPUT_FIELD};
use crate::metrics;
use crate::queue::{QueueMessage, WorkQueue};
use crate::registry::{RegistryError, TaskRegistry};
use crate::store::StoreError;

use super::config::WorkerConfig;

/// The job worker - pulls jobs off the queue and encodes them.
pub struct Worker {
    config: WorkerConfig,
    queue: Arc<dyn WorkQueue>,
    registry: Arc<TaskRegistry>,
    history: Arc<HistoryLedger>,
    encoder: Arc<dyn Encode>,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Worker {
    pub fn new(
        config: WorkerConfig,
        queue: Arc<dyn WorkQueue>,
        registry: Arc<TaskRegistry>,
        history: Arc<HistoryLedger>,
        encoder: Arc<dyn Encode>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            queue,
            registry,
            history,
            encoder,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Start the worker loop (spawns a background task).
    pub fn start(&self) -> JoinHandle<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Worker already running");
            return tokio::spawn(async {});
        }

        let config = self.config.clone();
        let queue = Arc::clone(&self.queue);
        let registry = Arc::clone(&self.registry);
        let history = Arc::clone(&self.history);
        let encoder = Arc::clone(&self.encoder);
        let running = Arc::clone(&self.running);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(consumer = queue.consumer(), "Worker loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Worker loop received shutdown signal");
                        break;
                    }
                    result = queue.read_next(
                        Duration::from_secs(config.read_block_secs),
                        config.batch_size,
                    ) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        match result {
                            Ok(messages) => {
                                let messages = if messages.is_empty() {
                                    Self::reclaim_stale(&queue, &config).await
                                } else {
                                    metrics::JOBS_DELIVERED.inc_by(messages.len() as u64);
                                    messages
                                };
                                for message in messages {
                                    Self::process_message(
                                        &queue, &registry, &history, &encoder, &config, &message,
                                    )
                                    .await;
                                }
                            }
                            Err(e) => {
                                warn!("Queue read failed: {}", e);
                                tokio::time::sleep(Duration::from_secs(
                                    config.read_retry_backoff_secs,
                                ))
                                .await;
                            }
                        }
                    }
                }
            }
            info!("Worker loop stopped");
        })
    }

    /// Stop the worker gracefully.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Worker not running");
            return;
        }
        let _ = self.shutdown_tx.send(());
    }

    /// Take over stale pending jobs left behind by dead consumers.
    async fn reclaim_stale(queue: &Arc<dyn WorkQueue>, config: &WorkerConfig) -> Vec<QueueMessage> {
        match queue
            .reclaim(
                Duration::from_secs(config.reclaim_idle_secs),
                config.batch_size,
            )
            .await
        {
            Ok(messages) => {
                if !messages.is_empty() {
                    info!(count = messages.len(), "Reclaimed stale jobs");
                    metrics::JOBS_RECLAIMED.inc_by(messages.len() as u64);
                }
                messages
            }
            Err(e) => {
                warn!("Reclaim failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Process one delivered message end to end. Never returns an
    /// error: every failure is recorded (or at least logged) and the
    /// loop moves on.
    async fn process_message(
        queue: &Arc<dyn WorkQueue>,
        registry: &Arc<TaskRegistry>,
        history: &Arc<HistoryLedger>,
        encoder: &Arc<dyn Encode>,
        config: &WorkerConfig,
        message: &QueueMessage,
    ) {
        let job = match Job::from_values(&message.values) {
            Ok(job) => job,
            Err(e) => {
                // Undecodable messages would otherwise circulate
                // forever; drop them.
                warn!(message_id = message.id, "Dropping undecodable message: {}", e);
                Self::ack_one(queue, message.id).await;
                return;
            }
        };

        Self::mark_status(registry, &job, JobStatus::Delivered);

        let Some(input) = message.values.get(INPUT_FIELD) else {
            warn!(job_id = %job.id, "Message carries no input file");
            Self::record_failure(
                registry,
                history,
                &job,
                "message carries no input file",
            );
            if config.ack_on_failure {
                Self::ack_one(queue, message.id).await;
            }
            return;
        };

        debug!(job_id = %job.id, kind = %job.kind, input, "Encoding job");
        let start = Instant::now();
        let result = encoder.encode(Path::new(input), &job).await;
        metrics::ENCODE_DURATION.observe(start.elapsed().as_secs_f64());

        match result {
            Ok(output) => {
                metrics::ENCODES_TOTAL.with_label_values(&["success"]).inc();
                let output = output.to_string_lossy().into_owned();
                if let Err(e) = history.add_success(&job.id, output.as_bytes()) {
                    warn!(job_id = %job.id, "Failed to record success: {}", e);
                }
                Self::mark_status(registry, &job, JobStatus::Succeeded);
                Self::ack_one(queue, message.id).await;
                info!(job_id = %job.id, output, "Job succeeded");
            }
            Err(e) => {
                metrics::ENCODES_TOTAL.with_label_values(&["failed"]).inc();
                warn!(job_id = %job.id, "Encode failed: {}", e);
                Self::record_failure(registry, history, &job, &e.to_string());
                if config.ack_on_failure {
                    Self::ack_one(queue, message.id).await;
                }
            }
        }
    }

    fn record_failure(
        registry: &Arc<TaskRegistry>,
        history: &Arc<HistoryLedger>,
        job: &Job,
        reason: &str,
    ) {
        if let Err(e) = history.add_failure(&job.id, reason.as_bytes()) {
            warn!(job_id = %job.id, "Failed to record failure: {}", e);
        }
        Self::mark_status(registry, job, JobStatus::Failed);
    }

    /// Move a job's registry status forward, tolerating the cases
    /// redelivery produces.
    fn mark_status(registry: &Arc<TaskRegistry>, job: &Job, status: JobStatus) {
        match registry.update_status(&job.id, status) {
            Ok(_) => {}
            // A job produced by another process may not be in this
            // registry yet; insert it at the status it just reached.
            Err(RegistryError::Store(StoreError::NotFound)) => {
                let mut job = job.clone();
                job.status = status;
                if let Err(e) = registry.insert(&job) {
                    warn!(job_id = %job.id, "Failed to register job: {}", e);
                }
            }
            // A reclaimed delivery racing a finished one; the final
            // status already stands.
            Err(RegistryError::InvalidTransition { from, to, .. }) => {
                debug!(job_id = %job.id, %from, %to, "Skipping backward status move");
            }
            Err(e) => {
                warn!(job_id = %job.id, "Failed to update status: {}", e);
            }
        }
    }

    async fn ack_one(queue: &Arc<dyn WorkQueue>, id: crate::queue::MessageId) {
        match queue.ack(&[id]).await {
            Ok(()) => metrics::JOBS_ACKED.inc(),
            Err(e) => warn!(message_id = id, "Ack failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Outcome;
    use crate::queue::SqliteWorkQueue;
    use crate::registry::TASKS_PREFIX;
    use crate::store::SqliteKeyedStore;
    use crate::testing::MockEncoder;
    use std::collections::HashMap;

    fn create_test_worker(encoder: &MockEncoder, config: WorkerConfig) -> Worker {
        let queue: Arc<dyn WorkQueue> =
            Arc::new(SqliteWorkQueue::in_memory("jobs", "workers", "consumer-1").unwrap());
        let registry = Arc::new(TaskRegistry::new(Arc::new(
            SqliteKeyedStore::in_memory(TASKS_PREFIX).unwrap(),
        )));
        let history = Arc::new(HistoryLedger::new(
            Arc::new(SqliteKeyedStore::in_memory("success:").unwrap()),
            Arc::new(SqliteKeyedStore::in_memory("failure:").unwrap()),
        ));
        Worker::new(config, queue, registry, history, Arc::new(encoder.clone()))
    }

    fn sample_job() -> Job {
        let request: crate::request::ConversionRequest =
            serde_json::from_value(serde_json::json!({
                "callbackUrl": "https://example.com/done",
                "backends": {"s3": "backend-1"},
                "resolutions": {"thumb": {"width": 100, "height": 80}},
                "conversionJobs": [{"type": "jpeg", "resolutions": ["thumb"]}]
            }))
            .unwrap();
        crate::job::expand(&request).remove(0)
    }

    fn message_for(job: &Job, input: Option<&str>) -> QueueMessage {
        let mut values = job.to_values();
        if let Some(input) = input {
            values.insert(INPUT_FIELD.to_string(), input.to_string());
        }
        QueueMessage { id: 1, values }
    }

    #[tokio::test]
    async fn test_process_success_path() {
        let worker = create_test_worker(&MockEncoder::succeeding(), WorkerConfig::default());
        let job = sample_job();
        worker.registry.insert(&job).unwrap();

        Worker::process_message(
            &worker.queue,
            &worker.registry,
            &worker.history,
            &worker.encoder,
            &worker.config,
            &message_for(&job, Some("uploads/cat.png")),
        )
        .await;

        assert_eq!(
            worker.registry.get(&job.id).unwrap().status,
            JobStatus::Succeeded
        );
        assert!(worker.history.get(Outcome::Success, &job.id).is_ok());
        assert!(matches!(
            worker.history.get(Outcome::Failure, &job.id),
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_process_failure_path() {
        let worker = create_test_worker(
            &MockEncoder::failing("encoder exploded"),
            WorkerConfig::default(),
        );
        let job = sample_job();
        worker.registry.insert(&job).unwrap();

        Worker::process_message(
            &worker.queue,
            &worker.registry,
            &worker.history,
            &worker.encoder,
            &worker.config,
            &message_for(&job, Some("uploads/cat.png")),
        )
        .await;

        assert_eq!(
            worker.registry.get(&job.id).unwrap().status,
            JobStatus::Failed
        );
        let failure = worker.history.get(Outcome::Failure, &job.id).unwrap();
        assert!(String::from_utf8_lossy(&failure).contains("encoder exploded"));
    }

    #[tokio::test]
    async fn test_missing_input_is_a_failure() {
        let encoder = MockEncoder::succeeding();
        let worker = create_test_worker(&encoder, WorkerConfig::default());
        let job = sample_job();
        worker.registry.insert(&job).unwrap();

        Worker::process_message(
            &worker.queue,
            &worker.registry,
            &worker.history,
            &worker.encoder,
            &worker.config,
            &message_for(&job, None),
        )
        .await;

        assert_eq!(
            worker.registry.get(&job.id).unwrap().status,
            JobStatus::Failed
        );
        // The encoder never ran.
        assert!(encoder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_job_is_registered_on_delivery() {
        let worker = create_test_worker(&MockEncoder::succeeding(), WorkerConfig::default());
        let job = sample_job();
        // Not inserted into the registry: simulates a producer with
        // its own registry instance.

        Worker::process_message(
            &worker.queue,
            &worker.registry,
            &worker.history,
            &worker.encoder,
            &worker.config,
            &message_for(&job, Some("uploads/cat.png")),
        )
        .await;

        assert_eq!(
            worker.registry.get(&job.id).unwrap().status,
            JobStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn test_finished_job_is_not_demoted_by_redelivery() {
        let worker = create_test_worker(
            &MockEncoder::failing("late delivery"),
            WorkerConfig::default(),
        );
        let job = sample_job();
        worker.registry.insert(&job).unwrap();
        worker
            .registry
            .update_status(&job.id, JobStatus::Succeeded)
            .unwrap();

        Worker::process_message(
            &worker.queue,
            &worker.registry,
            &worker.history,
            &worker.encoder,
            &worker.config,
            &message_for(&job, Some("uploads/cat.png")),
        )
        .await;

        // Succeeded is terminal; the late failure does not override it.
        assert_eq!(
            worker.registry.get(&job.id).unwrap().status,
            JobStatus::Succeeded
        );
    }
}
