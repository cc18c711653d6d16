//! Worker lifecycle integration tests.
//!
//! These tests verify the complete job lifecycle end to end:
//! submit -> produce -> deliver -> encode -> history/registry -> ack,
//! including the failure and reclaim paths, using a mock encoder.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use pixerd_core::{
    testing::MockEncoder, ConversionRequest, HistoryLedger, Intake, Job, JobStatus, Outcome,
    SqliteKeyedStore, SqliteWorkQueue, TaskRegistry, Worker, WorkerConfig, WorkQueue,
    TASKS_PREFIX,
};

/// Test helper wiring every component onto one database file.
struct TestHarness {
    queue: Arc<dyn WorkQueue>,
    registry: Arc<TaskRegistry>,
    history: Arc<HistoryLedger>,
    encoder: MockEncoder,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new(encoder: MockEncoder) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("pixerd.db");

        let queue: Arc<dyn WorkQueue> = Arc::new(
            SqliteWorkQueue::new(&db_path, "jobs", "workers", "consumer-1")
                .expect("Failed to create queue"),
        );
        let registry = Arc::new(TaskRegistry::new(Arc::new(
            SqliteKeyedStore::new(&db_path, TASKS_PREFIX).expect("Failed to create store"),
        )));
        let history =
            Arc::new(HistoryLedger::open_sqlite(&db_path).expect("Failed to create ledger"));

        Self {
            queue,
            registry,
            history,
            encoder,
            _temp_dir: temp_dir,
        }
    }

    fn intake(&self) -> Intake {
        Intake::new(Arc::clone(&self.queue), Arc::clone(&self.registry))
    }

    fn worker(&self, config: WorkerConfig) -> Worker {
        Worker::new(
            config,
            Arc::clone(&self.queue),
            Arc::clone(&self.registry),
            Arc::clone(&self.history),
            Arc::new(self.encoder.clone()),
        )
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            read_block_secs: 1,
            batch_size: 10,
            reclaim_idle_secs: 0,
            read_retry_backoff_secs: 1,
            ack_on_failure: true,
        }
    }

    async fn wait_for_status(&self, job_id: &str, expected: JobStatus, timeout: Duration) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if let Ok(job) = self.registry.get(job_id) {
                if job.status == expected {
                    return true;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }
}

fn sample_request() -> ConversionRequest {
    serde_json::from_value(serde_json::json!({
        "callbackUrl": "https://example.com/done",
        "backends": {"s3": "backend-1"},
        "resolutions": {
            "thumb": {"width": 100, "height": 80},
            "large": {"width": 1600, "height": 1200}
        },
        "conversionJobs": [
            {"type": "jpeg", "resolutions": ["thumb"]},
            {"type": "webp", "resolutions": ["thumb", "large"]}
        ]
    }))
    .unwrap()
}

#[tokio::test]
async fn test_submitted_jobs_run_to_success() {
    let harness = TestHarness::new(MockEncoder::succeeding());
    let submitted = harness
        .intake()
        .submit(&sample_request(), "uploads/cat.png")
        .await
        .unwrap();
    assert_eq!(submitted.len(), 3);

    let worker = harness.worker(TestHarness::fast_config());
    let handle = worker.start();

    for s in &submitted {
        assert!(
            harness
                .wait_for_status(&s.job.id, JobStatus::Succeeded, Duration::from_secs(5))
                .await,
            "job {} never succeeded",
            s.job.id
        );
        let output = harness.history.get(Outcome::Success, &s.job.id).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert!(output.starts_with("uploads/cat_"));
        assert!(output.ends_with(s.job.kind.extension()));
    }

    // Everything acked: nothing left to reclaim.
    assert!(harness
        .queue
        .reclaim(Duration::ZERO, 10)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(harness.encoder.calls().len(), 3);

    worker.stop();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_failed_job_is_recorded_and_acked() {
    let harness = TestHarness::new(MockEncoder::failing("no such input"));
    let submitted = harness
        .intake()
        .submit(&sample_request(), "uploads/missing.png")
        .await
        .unwrap();

    let worker = harness.worker(TestHarness::fast_config());
    let handle = worker.start();

    for s in &submitted {
        assert!(
            harness
                .wait_for_status(&s.job.id, JobStatus::Failed, Duration::from_secs(5))
                .await
        );
        let reason = harness.history.get(Outcome::Failure, &s.job.id).unwrap();
        assert!(String::from_utf8_lossy(&reason).contains("no such input"));
        assert!(harness.history.get(Outcome::Success, &s.job.id).is_err());
    }

    worker.stop();
    handle.await.unwrap();

    // ack_on_failure keeps failed jobs out of circulation.
    assert!(harness
        .queue
        .reclaim(Duration::ZERO, 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_unacked_failure_is_retried_via_reclaim() {
    let encoder = MockEncoder::succeeding();
    encoder.fail_next_with("transient encoder error");
    let harness = TestHarness::new(encoder);

    let request: ConversionRequest = serde_json::from_value(serde_json::json!({
        "callbackUrl": "https://example.com/done",
        "backends": {"s3": "backend-1"},
        "resolutions": {"thumb": {"width": 100, "height": 80}},
        "conversionJobs": [{"type": "avif", "resolutions": ["thumb"]}]
    }))
    .unwrap();
    let submitted = harness
        .intake()
        .submit(&request, "uploads/cat.png")
        .await
        .unwrap();
    let job_id = submitted[0].job.id.clone();

    let config = WorkerConfig {
        ack_on_failure: false,
        ..TestHarness::fast_config()
    };
    let worker = harness.worker(config);
    let handle = worker.start();

    // First delivery fails and stays pending; the reclaim path picks
    // it up and the second attempt succeeds.
    let start = std::time::Instant::now();
    while harness.encoder.calls().len() < 2 && start.elapsed() < Duration::from_secs(10) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(harness.encoder.calls().len() >= 2, "job was never retried");

    // Both outcomes are on the ledger.
    let start = std::time::Instant::now();
    while harness.history.get(Outcome::Success, &job_id).is_err()
        && start.elapsed() < Duration::from_secs(5)
    {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(harness.history.get(Outcome::Success, &job_id).is_ok());
    assert!(harness.history.get(Outcome::Failure, &job_id).is_ok());

    // The first terminal status stands; redelivery cannot rewrite it.
    assert_eq!(
        harness.registry.get(&job_id).unwrap().status,
        JobStatus::Failed
    );

    worker.stop();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_worker_survives_undecodable_message() {
    let harness = TestHarness::new(MockEncoder::succeeding());

    // A poison message straight onto the queue.
    harness
        .queue
        .produce(std::collections::HashMap::from([(
            "payload".to_string(),
            "{not json".to_string(),
        )]))
        .await
        .unwrap();

    // Followed by a healthy submission.
    let request: ConversionRequest = serde_json::from_value(serde_json::json!({
        "callbackUrl": "https://example.com/done",
        "backends": {"s3": "backend-1"},
        "resolutions": {"thumb": {"width": 100, "height": 80}},
        "conversionJobs": [{"type": "jpeg", "resolutions": ["thumb"]}]
    }))
    .unwrap();
    let submitted = harness
        .intake()
        .submit(&request, "uploads/cat.png")
        .await
        .unwrap();

    let worker = harness.worker(TestHarness::fast_config());
    let handle = worker.start();

    assert!(
        harness
            .wait_for_status(
                &submitted[0].job.id,
                JobStatus::Succeeded,
                Duration::from_secs(5)
            )
            .await,
        "healthy job blocked by poison message"
    );

    worker.stop();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_job_ids_resolve_in_registry_after_delivery() {
    let harness = TestHarness::new(MockEncoder::succeeding());
    let submitted = harness
        .intake()
        .submit(&sample_request(), "uploads/cat.png")
        .await
        .unwrap();

    // Before any worker runs, every enqueued job resolves in the
    // registry as pending.
    for s in &submitted {
        let job: Job = harness.registry.get(&s.job.id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
    }
}
