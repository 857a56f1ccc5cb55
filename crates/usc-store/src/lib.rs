#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **usc-store** – Generic durable key/value storage abstraction.
//!
//! This crate provides the storage contract shared by every durable concept
//! in the system — credentials (`usc-auth`), the universe registry
//! (`usc-manager`) — without assuming anything about what the bytes mean.
//! A thin core trait with two drivers living in the same crate rather than
//! split one-crate-per-driver: an in-memory map for tests and
//! process-local use, and a sqlite-backed driver for durability across
//! restarts.

use async_trait::async_trait;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend failed to read or write.
    #[error("store backend error: {0}")]
    Backend(#[from] anyhow::Error),
    /// A value existed but failed to (de)serialize as the caller expected.
    #[error("value codec error: {0}")]
    Codec(String),
}

/// Generic async key/value store.
///
/// Keys are opaque UTF-8 strings chosen by the caller (e.g.
/// `"credential:oauth"`, `"universe:alpha"`); values are opaque bytes. The
/// store itself performs no interpretation, versioning, or migration of
/// value contents — that is the caller's responsibility.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch the current value for `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write `value` for `key`, replacing any previous value.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Remove `key`, if present. A no-op if it was already absent.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// List every key currently stored under `prefix`.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Serialize `value` as JSON and store it under `key`.
pub async fn put_json<S, T>(store: &S, key: &str, value: &T) -> Result<(), StoreError>
where
    S: Store + ?Sized,
    T: serde::Serialize + Sync,
{
    let bytes = serde_json::to_vec(value).map_err(|e| StoreError::Codec(e.to_string()))?;
    store.put(key, bytes).await
}

/// Fetch and deserialize a JSON value stored under `key`.
pub async fn get_json<S, T>(store: &S, key: &str) -> Result<Option<T>, StoreError>
where
    S: Store + ?Sized,
    T: for<'de> serde::Deserialize<'de>,
{
    match store.get(key).await? {
        Some(bytes) => {
            let value = serde_json::from_slice(&bytes).map_err(|e| StoreError::Codec(e.to_string()))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}
