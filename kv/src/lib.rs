//! Key-value storage shared by the review ledger, the album store, scan job
//! state and the KV-backed similarity collections.
//!
//! Keys are UTF-8 strings, values are opaque bytes. Callers that store
//! structured records use [`encode`] / [`decode`] (msgpack) and group related
//! writes into one [`KVStore::apply`] call so a record and its secondary index
//! keys commit together.

pub mod memory;
pub mod redb;

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors that can occur in KV store operations.
#[derive(Error, Debug)]
pub enum KVError {
    #[error("kv: not found")]
    NotFound,

    #[error("kv: storage error: {0}")]
    Storage(String),

    #[error("kv: serialization error: {0}")]
    Serialization(String),
}

/// Result type for KV operations.
pub type KVResult<T> = Result<T, KVError>;

/// A single mutation inside an atomic [`KVStore::apply`] batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

impl WriteOp {
    pub fn put(key: impl Into<String>, value: Vec<u8>) -> Self {
        WriteOp::Put {
            key: key.into(),
            value,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        WriteOp::Delete { key: key.into() }
    }

    /// Marker entry with an empty value, used for secondary index keys.
    pub fn mark(key: impl Into<String>) -> Self {
        WriteOp::Put {
            key: key.into(),
            value: Vec::new(),
        }
    }
}

/// Key-value store trait.
///
/// Implementations must be safe for concurrent use. Scans return keys in
/// ascending lexicographic order.
pub trait KVStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>>;

    /// Set a key-value pair.
    fn set(&self, key: &str, value: &[u8]) -> KVResult<()>;

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> KVResult<()>;

    /// Return every entry whose key starts with `prefix`.
    fn scan(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>>;

    /// Return at most `limit` entries under `prefix` whose key sorts strictly
    /// after `after` (or from the start of the prefix when `after` is None).
    fn scan_page(
        &self,
        prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> KVResult<Vec<(String, Vec<u8>)>>;

    /// Apply all operations in one commit. Either every op is visible
    /// afterwards or none is.
    fn apply(&self, ops: &[WriteOp]) -> KVResult<()>;
}

impl fmt::Debug for dyn KVStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KVStore {{ ... }}")
    }
}

/// Encode a record as msgpack with named fields.
pub fn encode<T: Serialize>(value: &T) -> KVResult<Vec<u8>> {
    rmp_serde::to_vec_named(value).map_err(|e| KVError::Serialization(e.to_string()))
}

/// Decode a msgpack record written by [`encode`].
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> KVResult<T> {
    rmp_serde::from_slice(data).map_err(|e| KVError::Serialization(e.to_string()))
}

/// Load and decode a record, returning None when the key is absent.
pub fn get_record<T: DeserializeOwned>(store: &dyn KVStore, key: &str) -> KVResult<Option<T>> {
    match store.get(key)? {
        Some(data) => decode(&data).map(Some),
        None => Ok(None),
    }
}

/// Return the keys under `prefix` with the prefix stripped.
pub fn suffixes(entries: &[(String, Vec<u8>)], prefix: &str) -> Vec<String> {
    entries
        .iter()
        .filter_map(|(k, _)| k.strip_prefix(prefix).map(str::to_string))
        .collect()
}

pub use memory::MemoryStore;
pub use redb::RedbStore;
