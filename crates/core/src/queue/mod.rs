//! Competing-consumers work queue.
//!
//! Models at-least-once delivery on top of a single ordered,
//! append-only log with consumer-group tracking. Each handle is bound
//! to one (stream, group, consumer) triple. A produced message is
//! delivered to exactly one live group member at a time; an
//! unacknowledged delivery becomes eligible for [`WorkQueue::reclaim`]
//! once it has sat idle past a threshold. Idle time alone governs
//! recovery; there is no heartbeat or lease-renewal protocol.

mod sqlite;

pub use sqlite::SqliteWorkQueue;

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

/// Broker-assigned message id, strictly increasing across all
/// produces to the same stream.
pub type MessageId = u64;

/// Error type for queue operations.
#[derive(Debug)]
pub enum QueueError {
    /// The backing storage is unavailable or rejected the operation.
    /// Callers retry with backoff; this is never fatal to a worker.
    Database(String),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Database(msg) => write!(f, "queue storage error: {}", msg),
        }
    }
}

impl std::error::Error for QueueError {}

/// Wire envelope for one job inside the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: MessageId,
    /// Flat string mapping; unknown fields are opaque to consumers.
    pub values: HashMap<String, String>,
}

/// Trait for competing-consumers delivery channels.
///
/// Per-message state machine, from the queue's perspective:
/// `unclaimed -> pending(consumer) -> acked`, with
/// `pending -> reclaimed -> pending(new consumer)` cycles in between.
/// `acked` is terminal; a message with no surviving consumer cycles
/// through reclaim indefinitely (no dead-letter cap is built in).
#[async_trait]
pub trait WorkQueue: Send + Sync {
    fn stream(&self) -> &str;
    fn group(&self) -> &str;
    fn consumer(&self) -> &str;

    /// Append one message; returns its id.
    async fn produce(&self, values: HashMap<String, String>) -> Result<MessageId, QueueError>;

    /// Deliver up to `count` messages this group has never seen,
    /// claiming them for this consumer. Blocks up to `block` waiting
    /// for new data; an empty result on timeout is not an error.
    /// First-time delivery follows produce order.
    async fn read_next(
        &self,
        block: Duration,
        count: usize,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Remove the given ids from the group's pending list. Acking an
    /// id that is not pending is a no-op, not an error.
    async fn ack(&self, ids: &[MessageId]) -> Result<(), QueueError>;

    /// Re-assign up to `count` pending messages idle for at least
    /// `min_idle` to this consumer and return them for reprocessing.
    /// Delivery follows idle-scan order, not produce order. Finding
    /// nothing idle returns an empty sequence.
    async fn reclaim(
        &self,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<QueueMessage>, QueueError>;
}
