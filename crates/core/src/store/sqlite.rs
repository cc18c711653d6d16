//! SQLite-backed keyed store implementation.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, Connection};

use super::{KeyedStore, StoreError, StoredEntry};

/// SQLite-backed keyed store. One instance per namespace; multiple
/// namespaces may share the same database file.
pub struct SqliteKeyedStore {
    conn: Mutex<Connection>,
    prefix: String,
    idx_key: String,
}

impl SqliteKeyedStore {
    /// Open (or create) a store at `path` writing under `prefix`.
    /// Example: `prefix = "tasks:"` stores values under keys like
    /// `tasks:<hex>`.
    pub fn new(path: &Path, prefix: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        Self::from_connection(conn, prefix)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory(prefix: &str) -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;
        Self::from_connection(conn, prefix)
    }

    fn from_connection(conn: Connection, prefix: &str) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            prefix: prefix.to_string(),
            idx_key: format!("{}index", prefix),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| StoreError::Database(e.to_string()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                k TEXT PRIMARY KEY,
                v BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv_index (
                idx TEXT NOT NULL,
                member TEXT NOT NULL,
                PRIMARY KEY (idx, member)
            );
            "#,
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    fn storage_key(&self, hex_key: &str) -> String {
        format!("{}{}", self.prefix, hex_key)
    }
}

impl KeyedStore for SqliteKeyedStore {
    fn namespace(&self) -> &str {
        &self.prefix
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let hex_key = hex::encode(key);
        let conn = self.conn.lock().unwrap();

        // Value first, then index membership. Deliberately two
        // statements, not one transaction: a crash in between leaves
        // either an orphaned value or an orphaned index member, both
        // of which `list` and a later `set` tolerate.
        conn.execute(
            "INSERT OR REPLACE INTO kv (k, v) VALUES (?, ?)",
            params![self.storage_key(&hex_key), value],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        conn.execute(
            "INSERT OR IGNORE INTO kv_index (idx, member) VALUES (?, ?)",
            params![self.idx_key, hex_key],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>, StoreError> {
        let hex_key = hex::encode(key);
        let conn = self.conn.lock().unwrap();

        let result = conn.query_row(
            "SELECT v FROM kv WHERE k = ?",
            params![self.storage_key(&hex_key)],
            |row| row.get::<_, Vec<u8>>(0),
        );

        match result {
            Ok(value) => Ok(value),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(StoreError::NotFound),
            Err(e) => Err(StoreError::Database(e.to_string())),
        }
    }

    fn del(&self, key: &[u8]) -> Result<(), StoreError> {
        let hex_key = hex::encode(key);
        let conn = self.conn.lock().unwrap();

        let deleted = conn
            .execute(
                "DELETE FROM kv WHERE k = ?",
                params![self.storage_key(&hex_key)],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        conn.execute(
            "DELETE FROM kv_index WHERE idx = ? AND member = ?",
            params![self.idx_key, hex_key],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        if deleted == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<StoredEntry>, StoreError> {
        let members: Vec<String> = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn
                .prepare("SELECT member FROM kv_index WHERE idx = ? ORDER BY member")
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let rows = stmt
                .query_map(params![self.idx_key], |row| row.get::<_, String>(0))
                .map_err(|e| StoreError::Database(e.to_string()))?;
            rows.collect::<Result<_, _>>()
                .map_err(|e| StoreError::Database(e.to_string()))?
        };

        let mut out = Vec::new();
        for member in members {
            let Ok(key) = hex::decode(&member) else {
                continue;
            };
            match self.get(&key) {
                Ok(value) => out.push(StoredEntry { key, value }),
                // Deleted concurrently, or an orphaned index member
                // from a crash between the two writes in `set`.
                Err(StoreError::NotFound) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }
}
