//! SQLite-backed work queue implementation.
//!
//! One `messages` table is the append-only log; `group_cursors`
//! tracks how far each consumer group has read; `pending_entries` is
//! the group's pending-entries list (one row per unacked delivery).
//! Claiming and reclaiming run inside immediate transactions so that
//! concurrent consumers on separate connections never claim the same
//! message.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, TransactionBehavior};
use tracing::debug;

use super::{MessageId, QueueError, QueueMessage, WorkQueue};

/// How often a blocking read re-checks the log for new messages.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// SQLite-backed competing-consumers queue handle, bound to one
/// (stream, group, consumer) triple. Multiple handles (and multiple
/// processes) may share one database file.
pub struct SqliteWorkQueue {
    conn: Mutex<Connection>,
    stream: String,
    group: String,
    consumer: String,
}

impl SqliteWorkQueue {
    /// Open (or create) the queue database and ensure the stream's
    /// consumer group exists. Registering a group that already exists
    /// is a no-op.
    pub fn new(
        path: &Path,
        stream: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Self, QueueError> {
        let conn = Connection::open(path).map_err(|e| QueueError::Database(e.to_string()))?;
        Self::from_connection(conn, stream, group, consumer)
    }

    /// Create an in-memory queue (useful for single-consumer tests;
    /// in-memory databases cannot be shared between handles).
    pub fn in_memory(stream: &str, group: &str, consumer: &str) -> Result<Self, QueueError> {
        let conn =
            Connection::open_in_memory().map_err(|e| QueueError::Database(e.to_string()))?;
        Self::from_connection(conn, stream, group, consumer)
    }

    fn from_connection(
        conn: Connection,
        stream: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Self, QueueError> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| QueueError::Database(e.to_string()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| QueueError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;

        conn.execute(
            "INSERT OR IGNORE INTO group_cursors (stream, group_name, last_delivered_id) VALUES (?, ?, 0)",
            params![stream, group],
        )
        .map_err(|e| QueueError::Database(e.to_string()))?;

        debug!(stream, group, consumer, "queue handle ready");

        Ok(Self {
            conn: Mutex::new(conn),
            stream: stream.to_string(),
            group: group.to_string(),
            consumer: consumer.to_string(),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), QueueError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                stream TEXT NOT NULL,
                values_json TEXT NOT NULL,
                produced_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_stream ON messages(stream, id);

            CREATE TABLE IF NOT EXISTS group_cursors (
                stream TEXT NOT NULL,
                group_name TEXT NOT NULL,
                last_delivered_id INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (stream, group_name)
            );

            CREATE TABLE IF NOT EXISTS pending_entries (
                stream TEXT NOT NULL,
                group_name TEXT NOT NULL,
                message_id INTEGER NOT NULL,
                consumer TEXT NOT NULL,
                delivered_at_ms INTEGER NOT NULL,
                delivery_count INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (stream, group_name, message_id)
            );

            CREATE INDEX IF NOT EXISTS idx_pending_idle
                ON pending_entries(stream, group_name, delivered_at_ms);
            "#,
        )
        .map_err(|e| QueueError::Database(e.to_string()))?;
        Ok(())
    }

    /// One non-blocking attempt to claim new messages for this
    /// consumer. Runs as an immediate transaction so the cursor
    /// advance and the pending inserts are atomic across connections.
    fn try_claim_new(&self, count: usize) -> Result<Vec<QueueMessage>, QueueError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let cursor: i64 = tx
            .query_row(
                "SELECT last_delivered_id FROM group_cursors WHERE stream = ? AND group_name = ?",
                params![self.stream, self.group],
                |row| row.get(0),
            )
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let rows: Vec<(i64, String)> = {
            let mut stmt = tx
                .prepare(
                    "SELECT id, values_json FROM messages
                     WHERE stream = ? AND id > ?
                     ORDER BY id ASC LIMIT ?",
                )
                .map_err(|e| QueueError::Database(e.to_string()))?;
            let mapped = stmt
                .query_map(params![self.stream, cursor, count as i64], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|e| QueueError::Database(e.to_string()))?;
            mapped
                .collect::<Result<_, _>>()
                .map_err(|e| QueueError::Database(e.to_string()))?
        };

        if rows.is_empty() {
            tx.commit().map_err(|e| QueueError::Database(e.to_string()))?;
            return Ok(Vec::new());
        }

        let now_ms = Utc::now().timestamp_millis();
        let mut out = Vec::with_capacity(rows.len());
        let mut last_id = cursor;
        for (id, values_json) in rows {
            tx.execute(
                "INSERT INTO pending_entries
                     (stream, group_name, message_id, consumer, delivered_at_ms, delivery_count)
                 VALUES (?, ?, ?, ?, ?, 1)",
                params![self.stream, self.group, id, self.consumer, now_ms],
            )
            .map_err(|e| QueueError::Database(e.to_string()))?;
            out.push(decode_message(id, &values_json)?);
            last_id = id;
        }

        tx.execute(
            "UPDATE group_cursors SET last_delivered_id = ? WHERE stream = ? AND group_name = ?",
            params![last_id, self.stream, self.group],
        )
        .map_err(|e| QueueError::Database(e.to_string()))?;

        tx.commit().map_err(|e| QueueError::Database(e.to_string()))?;
        Ok(out)
    }
}

fn decode_message(id: i64, values_json: &str) -> Result<QueueMessage, QueueError> {
    let values: HashMap<String, String> = serde_json::from_str(values_json)
        .map_err(|e| QueueError::Database(format!("corrupt message {}: {}", id, e)))?;
    Ok(QueueMessage {
        id: id as MessageId,
        values,
    })
}

#[async_trait::async_trait]
impl WorkQueue for SqliteWorkQueue {
    fn stream(&self) -> &str {
        &self.stream
    }

    fn group(&self) -> &str {
        &self.group
    }

    fn consumer(&self) -> &str {
        &self.consumer
    }

    async fn produce(&self, values: HashMap<String, String>) -> Result<MessageId, QueueError> {
        let values_json =
            serde_json::to_string(&values).map_err(|e| QueueError::Database(e.to_string()))?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO messages (stream, values_json, produced_at) VALUES (?, ?, ?)",
            params![self.stream, values_json, Utc::now().to_rfc3339()],
        )
        .map_err(|e| QueueError::Database(e.to_string()))?;
        Ok(conn.last_insert_rowid() as MessageId)
    }

    async fn read_next(
        &self,
        block: Duration,
        count: usize,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let deadline = tokio::time::Instant::now() + block;
        loop {
            let messages = self.try_claim_new(count)?;
            if !messages.is_empty() || tokio::time::Instant::now() >= deadline {
                return Ok(messages);
            }
            let remaining = deadline - tokio::time::Instant::now();
            tokio::time::sleep(remaining.min(POLL_INTERVAL)).await;
        }
    }

    async fn ack(&self, ids: &[MessageId]) -> Result<(), QueueError> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.conn.lock().unwrap();
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "DELETE FROM pending_entries
             WHERE stream = ? AND group_name = ? AND message_id IN ({})",
            placeholders
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let mut bindings: Vec<&dyn rusqlite::ToSql> = vec![&self.stream, &self.group];
        let id_params: Vec<i64> = ids.iter().map(|id| *id as i64).collect();
        for id in &id_params {
            bindings.push(id);
        }
        stmt.execute(bindings.as_slice())
            .map_err(|e| QueueError::Database(e.to_string()))?;
        Ok(())
    }

    async fn reclaim(
        &self,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let cutoff_ms = Utc::now().timestamp_millis() - min_idle.as_millis() as i64;

        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| QueueError::Database(e.to_string()))?;

        // Scan the pending list oldest-delivery-first; reclaimed
        // messages come back in that order, not produce order.
        let stale: Vec<(i64, i64)> = {
            let mut stmt = tx
                .prepare(
                    "SELECT message_id, delivery_count FROM pending_entries
                     WHERE stream = ? AND group_name = ? AND delivered_at_ms <= ?
                     ORDER BY delivered_at_ms ASC LIMIT ?",
                )
                .map_err(|e| QueueError::Database(e.to_string()))?;
            let mapped = stmt
                .query_map(
                    params![self.stream, self.group, cutoff_ms, count as i64],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
                )
                .map_err(|e| QueueError::Database(e.to_string()))?;
            mapped
                .collect::<Result<_, _>>()
                .map_err(|e| QueueError::Database(e.to_string()))?
        };

        let now_ms = Utc::now().timestamp_millis();
        let mut out = Vec::with_capacity(stale.len());
        for (id, delivery_count) in stale {
            tx.execute(
                "UPDATE pending_entries
                 SET consumer = ?, delivered_at_ms = ?, delivery_count = delivery_count + 1
                 WHERE stream = ? AND group_name = ? AND message_id = ?",
                params![self.consumer, now_ms, self.stream, self.group, id],
            )
            .map_err(|e| QueueError::Database(e.to_string()))?;

            let values_json: String = tx
                .query_row(
                    "SELECT values_json FROM messages WHERE id = ?",
                    params![id],
                    |row| row.get(0),
                )
                .map_err(|e| QueueError::Database(e.to_string()))?;

            debug!(
                message_id = id,
                delivery_count = delivery_count + 1,
                consumer = %self.consumer,
                "reclaimed stale pending message"
            );
            out.push(decode_message(id, &values_json)?);
        }

        tx.commit().map_err(|e| QueueError::Database(e.to_string()))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(payload: &str) -> HashMap<String, String> {
        HashMap::from([
            ("payload".to_string(), payload.to_string()),
            ("ts".to_string(), Utc::now().to_rfc3339()),
        ])
    }

    fn test_queue(consumer: &str) -> SqliteWorkQueue {
        SqliteWorkQueue::in_memory("jobs", "workers", consumer).unwrap()
    }

    #[tokio::test]
    async fn test_produce_assigns_increasing_ids() {
        let queue = test_queue("consumer-1");
        let a = queue.produce(values("a")).await.unwrap();
        let b = queue.produce(values("b")).await.unwrap();
        let c = queue.produce(values("c")).await.unwrap();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn test_read_delivers_in_produce_order() {
        let queue = test_queue("consumer-1");
        for payload in ["a", "b", "c"] {
            queue.produce(values(payload)).await.unwrap();
        }

        let messages = queue.read_next(Duration::ZERO, 10).await.unwrap();
        assert_eq!(messages.len(), 3);
        let payloads: Vec<_> = messages
            .iter()
            .map(|m| m.values["payload"].clone())
            .collect();
        assert_eq!(payloads, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_pending_message_not_redelivered_as_new() {
        let queue = test_queue("consumer-1");
        queue.produce(values("a")).await.unwrap();

        let first = queue.read_next(Duration::ZERO, 10).await.unwrap();
        assert_eq!(first.len(), 1);

        // The message is pending for this consumer now, not "new".
        let second = queue.read_next(Duration::ZERO, 10).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_read_respects_count_cap() {
        let queue = test_queue("consumer-1");
        for i in 0..5 {
            queue.produce(values(&i.to_string())).await.unwrap();
        }

        let batch = queue.read_next(Duration::ZERO, 2).await.unwrap();
        assert_eq!(batch.len(), 2);
        let rest = queue.read_next(Duration::ZERO, 10).await.unwrap();
        assert_eq!(rest.len(), 3);
    }

    #[tokio::test]
    async fn test_read_times_out_empty() {
        let queue = test_queue("consumer-1");
        let start = tokio::time::Instant::now();
        let messages = queue
            .read_next(Duration::from_millis(120), 10)
            .await
            .unwrap();
        assert!(messages.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn test_blocking_read_picks_up_late_produce() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("queue.db");

        let consumer = SqliteWorkQueue::new(&db_path, "jobs", "workers", "consumer-1").unwrap();
        let producer = SqliteWorkQueue::new(&db_path, "jobs", "workers", "producer-1").unwrap();

        let read = tokio::spawn(async move {
            consumer.read_next(Duration::from_secs(2), 10).await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        producer.produce(values("late")).await.unwrap();

        let messages = read.await.unwrap().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].values["payload"], "late");
    }

    #[tokio::test]
    async fn test_competing_consumers_split_messages() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("queue.db");

        let a = SqliteWorkQueue::new(&db_path, "jobs", "workers", "consumer-a").unwrap();
        let b = SqliteWorkQueue::new(&db_path, "jobs", "workers", "consumer-b").unwrap();

        for i in 0..4 {
            a.produce(values(&i.to_string())).await.unwrap();
        }

        let got_a = a.read_next(Duration::ZERO, 2).await.unwrap();
        let got_b = b.read_next(Duration::ZERO, 10).await.unwrap();
        assert_eq!(got_a.len(), 2);
        assert_eq!(got_b.len(), 2);

        let mut ids: Vec<_> = got_a.iter().chain(got_b.iter()).map(|m| m.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4, "no message delivered to both consumers");
    }

    #[tokio::test]
    async fn test_ack_removes_from_pending() {
        let queue = test_queue("consumer-1");
        queue.produce(values("a")).await.unwrap();

        let messages = queue.read_next(Duration::ZERO, 10).await.unwrap();
        queue.ack(&[messages[0].id]).await.unwrap();

        // Nothing left to reclaim at any idle threshold.
        let reclaimed = queue.reclaim(Duration::ZERO, 10).await.unwrap();
        assert!(reclaimed.is_empty());
    }

    #[tokio::test]
    async fn test_ack_is_idempotent() {
        let queue = test_queue("consumer-1");
        queue.produce(values("a")).await.unwrap();

        let messages = queue.read_next(Duration::ZERO, 10).await.unwrap();
        let id = messages[0].id;
        queue.ack(&[id]).await.unwrap();
        queue.ack(&[id]).await.unwrap();
        queue.ack(&[9999]).await.unwrap();

        let reclaimed = queue.reclaim(Duration::ZERO, 10).await.unwrap();
        assert!(reclaimed.is_empty());
    }

    #[tokio::test]
    async fn test_reclaim_only_after_idle_threshold() {
        let queue = test_queue("consumer-1");
        queue.produce(values("a")).await.unwrap();
        queue.read_next(Duration::ZERO, 10).await.unwrap();

        // Too fresh to reclaim.
        let early = queue.reclaim(Duration::from_secs(30), 10).await.unwrap();
        assert!(early.is_empty());

        tokio::time::sleep(Duration::from_millis(80)).await;
        let reclaimed = queue
            .reclaim(Duration::from_millis(50), 10)
            .await
            .unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].values["payload"], "a");
    }

    #[tokio::test]
    async fn test_reclaim_moves_lease_between_consumers() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("queue.db");

        let dead = SqliteWorkQueue::new(&db_path, "jobs", "workers", "dead-consumer").unwrap();
        let live = SqliteWorkQueue::new(&db_path, "jobs", "workers", "live-consumer").unwrap();

        dead.produce(values("orphaned")).await.unwrap();
        let claimed = dead.read_next(Duration::ZERO, 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        // dead-consumer never acks (simulated crash).

        tokio::time::sleep(Duration::from_millis(80)).await;
        let reclaimed = live
            .reclaim(Duration::from_millis(50), 10)
            .await
            .unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, claimed[0].id);

        // The fresh lease belongs to live-consumer; it is no longer
        // stale for anyone else.
        let again = dead.reclaim(Duration::from_millis(50), 10).await.unwrap();
        assert!(again.is_empty());

        live.ack(&[reclaimed[0].id]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        let after_ack = live
            .reclaim(Duration::from_millis(50), 10)
            .await
            .unwrap();
        assert!(after_ack.is_empty(), "acked message never resurrects");
    }

    #[tokio::test]
    async fn test_ack_of_reclaimed_id_by_old_consumer_is_noop() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("queue.db");

        let old = SqliteWorkQueue::new(&db_path, "jobs", "workers", "old").unwrap();
        let new = SqliteWorkQueue::new(&db_path, "jobs", "workers", "new").unwrap();

        old.produce(values("a")).await.unwrap();
        let claimed = old.read_next(Duration::ZERO, 10).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        let reclaimed = new.reclaim(Duration::from_millis(40), 10).await.unwrap();
        assert_eq!(reclaimed.len(), 1);

        // The original consumer finally acks; the group-level pending
        // entry is removed either way and nothing errors.
        old.ack(&[claimed[0].id]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let after = new.reclaim(Duration::from_millis(40), 10).await.unwrap();
        assert!(after.is_empty());
    }

    #[tokio::test]
    async fn test_reclaim_increments_delivery_count() {
        let queue = test_queue("consumer-1");
        queue.produce(values("a")).await.unwrap();
        queue.read_next(Duration::ZERO, 10).await.unwrap();

        for _ in 0..2 {
            tokio::time::sleep(Duration::from_millis(60)).await;
            let reclaimed = queue
                .reclaim(Duration::from_millis(40), 10)
                .await
                .unwrap();
            assert_eq!(reclaimed.len(), 1);
        }

        let conn = queue.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT delivery_count FROM pending_entries WHERE stream = 'jobs'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_reclaim_caps_batch_and_scans_oldest_first() {
        let queue = test_queue("consumer-1");
        for payload in ["a", "b", "c"] {
            queue.produce(values(payload)).await.unwrap();
            queue.read_next(Duration::ZERO, 1).await.unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
        }

        let first = queue.reclaim(Duration::from_millis(10), 2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].values["payload"], "a");
        assert_eq!(first[1].values["payload"], "b");
    }

    #[tokio::test]
    async fn test_groups_are_independent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("queue.db");

        let workers = SqliteWorkQueue::new(&db_path, "jobs", "workers", "w-1").unwrap();
        let auditors = SqliteWorkQueue::new(&db_path, "jobs", "auditors", "a-1").unwrap();

        workers.produce(values("shared")).await.unwrap();

        let w = workers.read_next(Duration::ZERO, 10).await.unwrap();
        let a = auditors.read_next(Duration::ZERO, 10).await.unwrap();
        assert_eq!(w.len(), 1);
        assert_eq!(a.len(), 1, "each group gets its own delivery");
    }
}
