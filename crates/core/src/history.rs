//! Durable ledger of terminal job outcomes.
//!
//! Successes and failures live in two separate keyed-store
//! namespaces, keyed by job id. Records persist until explicitly
//! deleted; completing a job never removes its registry entry or its
//! history record.

use std::path::Path;
use std::sync::Arc;

use crate::store::{KeyedStore, SqliteKeyedStore, StoreError, StoredEntry};

/// Namespace prefix for success records.
pub const SUCCESS_PREFIX: &str = "success:";
/// Namespace prefix for failure records.
pub const FAILURE_PREFIX: &str = "failure:";

/// Which side of the ledger a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// One ledger entry: a job id and its outcome payload. For successes
/// the payload is the produced artifact description; for failures it
/// is the error detail.
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub job_id: String,
    pub outcome: Outcome,
    pub payload: Vec<u8>,
}

/// Ledger over two keyed-store namespaces.
pub struct HistoryLedger {
    success: Arc<dyn KeyedStore>,
    failure: Arc<dyn KeyedStore>,
}

impl HistoryLedger {
    pub fn new(success: Arc<dyn KeyedStore>, failure: Arc<dyn KeyedStore>) -> Self {
        Self { success, failure }
    }

    /// Open a ledger backed by two namespaces in one SQLite file.
    pub fn open_sqlite(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(
            Arc::new(SqliteKeyedStore::new(path, SUCCESS_PREFIX)?),
            Arc::new(SqliteKeyedStore::new(path, FAILURE_PREFIX)?),
        ))
    }

    fn store(&self, outcome: Outcome) -> &dyn KeyedStore {
        match outcome {
            Outcome::Success => self.success.as_ref(),
            Outcome::Failure => self.failure.as_ref(),
        }
    }

    /// Record an outcome for a job. Recording the same job id twice
    /// overwrites the previous payload on that side; it does not touch
    /// the other side, so a job redelivered after a failure can carry
    /// records on both.
    pub fn add(&self, outcome: Outcome, job_id: &str, payload: &[u8]) -> Result<(), StoreError> {
        self.store(outcome).set(job_id.as_bytes(), payload)
    }

    pub fn add_success(&self, job_id: &str, payload: &[u8]) -> Result<(), StoreError> {
        self.add(Outcome::Success, job_id, payload)
    }

    pub fn add_failure(&self, job_id: &str, payload: &[u8]) -> Result<(), StoreError> {
        self.add(Outcome::Failure, job_id, payload)
    }

    pub fn get(&self, outcome: Outcome, job_id: &str) -> Result<Vec<u8>, StoreError> {
        self.store(outcome).get(job_id.as_bytes())
    }

    pub fn del(&self, outcome: Outcome, job_id: &str) -> Result<(), StoreError> {
        self.store(outcome).del(job_id.as_bytes())
    }

    fn list(&self, outcome: Outcome) -> Result<Vec<HistoryRecord>, StoreError> {
        let entries = self.store(outcome).list()?;
        Ok(entries.into_iter().map(|e| to_record(e, outcome)).collect())
    }

    pub fn list_successes(&self) -> Result<Vec<HistoryRecord>, StoreError> {
        self.list(Outcome::Success)
    }

    pub fn list_failures(&self) -> Result<Vec<HistoryRecord>, StoreError> {
        self.list(Outcome::Failure)
    }
}

fn to_record(entry: StoredEntry, outcome: Outcome) -> HistoryRecord {
    HistoryRecord {
        job_id: String::from_utf8_lossy(&entry.key).into_owned(),
        outcome,
        payload: entry.value,
    }
}
