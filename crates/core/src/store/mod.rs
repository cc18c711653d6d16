//! Namespaced durable key/value storage with secondary enumeration.
//!
//! Every store instance owns one namespace prefix. Binary keys are
//! hex-encoded before being combined with the prefix, so arbitrary
//! byte sequences are valid keys. Alongside each value the store
//! maintains a membership index under `<prefix>index`, which backs
//! [`KeyedStore::list`].

mod sqlite;

pub use sqlite::SqliteKeyedStore;

use std::fmt;

/// Error type for keyed store operations.
#[derive(Debug)]
pub enum StoreError {
    /// No value stored under the requested key.
    NotFound,
    /// Database error.
    Database(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "key not found"),
            StoreError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// One stored key/value pair, as returned by [`KeyedStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Trait for namespaced key/value storage backends.
///
/// The index and the value set are not updated atomically: a crash
/// between the two writes can leave an orphaned index entry (skipped
/// by `list`) or an orphaned value (invisible to `list` but still
/// reachable by exact key). Callers must tolerate this.
pub trait KeyedStore: Send + Sync {
    /// The namespace prefix this store writes under.
    fn namespace(&self) -> &str;

    /// Durably store a value, overwriting any existing value for the
    /// same key, and add the key to the enumeration index.
    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Retrieve a previously stored value.
    fn get(&self, key: &[u8]) -> Result<Vec<u8>, StoreError>;

    /// Remove the value and its index entry. Deleting an absent key
    /// returns [`StoreError::NotFound`], which callers may ignore.
    fn del(&self, key: &[u8]) -> Result<(), StoreError>;

    /// Enumerate every currently-set entry in the namespace. Index
    /// members whose key no longer resolves are silently skipped.
    fn list(&self) -> Result<Vec<StoredEntry>, StoreError>;
}
