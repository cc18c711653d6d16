//! Worker configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the job worker loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// How long one read blocks waiting for new jobs (seconds).
    #[serde(default = "default_read_block")]
    pub read_block_secs: u64,

    /// Maximum jobs taken per read or reclaim.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pending jobs idle at least this long (seconds) are considered
    /// abandoned and eligible for reclaim.
    #[serde(default = "default_reclaim_idle")]
    pub reclaim_idle_secs: u64,

    /// Backoff after a failed queue read (seconds).
    #[serde(default = "default_read_retry_backoff")]
    pub read_retry_backoff_secs: u64,

    /// Acknowledge jobs whose encode failed. When false, failed jobs
    /// stay pending and circulate via reclaim until a delivery
    /// succeeds.
    #[serde(default = "default_ack_on_failure")]
    pub ack_on_failure: bool,
}

fn default_read_block() -> u64 {
    5
}

fn default_batch_size() -> usize {
    10
}

fn default_reclaim_idle() -> u64 {
    30
}

fn default_read_retry_backoff() -> u64 {
    1
}

fn default_ack_on_failure() -> bool {
    true
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            read_block_secs: default_read_block(),
            batch_size: default_batch_size(),
            reclaim_idle_secs: default_reclaim_idle(),
            read_retry_backoff_secs: default_read_retry_backoff(),
            ack_on_failure: default_ack_on_failure(),
        }
    }
}
