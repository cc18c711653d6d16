//! Task registry: the authoritative record of every expanded job.
//!
//! Jobs are stored as JSON under their job id in a dedicated keyed
//! store namespace. The registry is the only place job status lives;
//! the queue knows nothing about it. Status moves forward only, so a
//! redelivered job can never be demoted by a slow consumer.

use std::sync::Arc;

use thiserror::Error;

use crate::job::{Job, JobStatus};
use crate::store::{KeyedStore, StoreError};

/// Namespace prefix for registry entries.
pub const TASKS_PREFIX: &str = "tasks:";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode or decode job: {0}")]
    Codec(#[from] serde_json::Error),

    /// Refused backward status move, e.g. a reclaimed delivery trying
    /// to mark an already-succeeded job as delivered again.
    #[error("job {id}: invalid status transition {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },
}

pub struct TaskRegistry {
    store: Arc<dyn KeyedStore>,
}

impl TaskRegistry {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    /// Persist a job under its id, overwriting any previous entry.
    pub fn insert(&self, job: &Job) -> Result<(), RegistryError> {
        let encoded = serde_json::to_vec(job)?;
        self.store.set(job.id.as_bytes(), &encoded)?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Job, RegistryError> {
        let raw = self.store.get(id.as_bytes())?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Move a job's status forward. Re-applying the current status is
    /// a no-op; a backward move is rejected without writing.
    pub fn update_status(&self, id: &str, status: JobStatus) -> Result<Job, RegistryError> {
        let mut job = self.get(id)?;
        if !job.status.can_transition_to(status) {
            return Err(RegistryError::InvalidTransition {
                id: id.to_string(),
                from: job.status,
                to: status,
            });
        }
        if job.status != status {
            job.status = status;
            self.insert(&job)?;
        }
        Ok(job)
    }

    pub fn list(&self) -> Result<Vec<Job>, RegistryError> {
        let entries = self.store.list()?;
        let mut jobs = Vec::with_capacity(entries.len());
        for entry in entries {
            jobs.push(serde_json::from_slice(&entry.value)?);
        }
        Ok(jobs)
    }

    pub fn remove(&self, id: &str) -> Result<(), RegistryError> {
        self.store.del(id.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::expand;
    use crate::request::ConversionRequest;
    use crate::store::SqliteKeyedStore;

    fn create_test_registry() -> TaskRegistry {
        TaskRegistry::new(Arc::new(SqliteKeyedStore::in_memory(TASKS_PREFIX).unwrap()))
    }

    fn sample_job() -> Job {
        let request: ConversionRequest = serde_json::from_value(serde_json::json!({
            "callbackUrl": "https://example.com/done",
            "backends": {"s3": "backend-1"},
            "resolutions": {"thumb": {"width": 100, "height": 80}},
            "conversionJobs": [{
                "type": "webp",
                "resolutions": ["thumb"],
                "settings": {"quality": "75"}
            }]
        }))
        .unwrap();
        expand(&request).remove(0)
    }

    #[test]
    fn test_insert_get_roundtrip() {
        let registry = create_test_registry();
        let job = sample_job();
        registry.insert(&job).unwrap();

        let loaded = registry.get(&job.id).unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded.kind, job.kind);
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.settings.get("quality").unwrap(), "75");
    }

    #[test]
    fn test_get_missing_job() {
        let registry = create_test_registry();
        assert!(matches!(
            registry.get("absent"),
            Err(RegistryError::Store(StoreError::NotFound))
        ));
    }

    #[test]
    fn test_status_moves_forward() {
        let registry = create_test_registry();
        let job = sample_job();
        registry.insert(&job).unwrap();

        let delivered = registry.update_status(&job.id, JobStatus::Delivered).unwrap();
        assert_eq!(delivered.status, JobStatus::Delivered);

        let succeeded = registry.update_status(&job.id, JobStatus::Succeeded).unwrap();
        assert_eq!(succeeded.status, JobStatus::Succeeded);
        assert_eq!(registry.get(&job.id).unwrap().status, JobStatus::Succeeded);
    }

    #[test]
    fn test_backward_transition_rejected() {
        let registry = create_test_registry();
        let job = sample_job();
        registry.insert(&job).unwrap();
        registry.update_status(&job.id, JobStatus::Succeeded).unwrap();

        let result = registry.update_status(&job.id, JobStatus::Delivered);
        assert!(matches!(
            result,
            Err(RegistryError::InvalidTransition { .. })
        ));
        // The stored job is untouched.
        assert_eq!(registry.get(&job.id).unwrap().status, JobStatus::Succeeded);
    }

    #[test]
    fn test_reapplying_current_status_is_noop() {
        let registry = create_test_registry();
        let job = sample_job();
        registry.insert(&job).unwrap();
        registry.update_status(&job.id, JobStatus::Delivered).unwrap();

        // Redelivery of an in-flight job.
        let again = registry.update_status(&job.id, JobStatus::Delivered).unwrap();
        assert_eq!(again.status, JobStatus::Delivered);
    }

    #[test]
    fn test_list_and_remove() {
        let registry = create_test_registry();
        let a = sample_job();
        let b = sample_job();
        registry.insert(&a).unwrap();
        registry.insert(&b).unwrap();

        assert_eq!(registry.list().unwrap().len(), 2);

        registry.remove(&a.id).unwrap();
        let remaining = registry.list().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b.id);
    }
}
