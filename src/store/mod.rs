//! Key-value persistence for engine state.
//!
//! The task queue persists its whole state as one serialized value under a
//! fixed key, and engine settings are read from the same store. Hosts that
//! already own a key-value store implement [`KeyValueStore`]; the crate ships
//! a SQLite-backed store and an in-memory one.
//!
//! # Example
//!
//! ```no_run
//! use shelfsync_core::Database;
//! use shelfsync_core::store::{KeyValueStore, SqliteKvStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new_in_memory().await?;
//! let store = SqliteKvStore::new(db);
//! store.set("last_update_time", "2024-01-05 10:00:00").await?;
//! assert_eq!(store.get("last_update_time").await?.as_deref(), Some("2024-01-05 10:00:00"));
//! # Ok(())
//! # }
//! ```

mod error;
mod memory;
mod sqlite;

pub use error::{DbErrorKind, StoreError};
pub use memory::MemoryKvStore;
pub use sqlite::SqliteKvStore;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// String key → string value store.
///
/// `set` must replace the whole value atomically: readers only ever see a
/// complete previous or complete new value.
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Reads and decodes a JSON value.
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] when the stored text is not valid
/// JSON for `T`, or the store's own error.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|error| StoreError::serialization(key, &error))
}

/// Encodes and writes a JSON value.
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] if encoding fails, or the store's own error.
pub async fn set_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|error| StoreError::serialization(key, &error))?;
    store.set(key, &raw).await
}
