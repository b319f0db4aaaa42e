//! Local key-value storage layer for Brief
//!
//! Every persisted structure (history replica, pending queue, session) is
//! stored as one JSON document under one key. A single `set` is the unit of
//! atomicity the storage engine guarantees, so each of those structures is
//! always written whole.

mod memory;
mod replica;
mod sqlite;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

pub use memory::MemoryStore;
pub use replica::{compact_history, LocalReplica};
pub use sqlite::SqliteStore;

/// Key holding the local history replica
pub const HISTORY_KEY: &str = "history";
/// Key holding the pending mutation queue
pub const QUEUE_KEY: &str = "sync_queue";
/// Key holding the signed-in session
pub const SESSION_KEY: &str = "session";

/// Trait for simple persistent key-value storage
pub trait KeyValueStore: Send + Sync {
    /// Read the raw value stored under `key`
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`
    ///
    /// Fails with [`crate::Error::QuotaExceeded`] when the store is full.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete `key` if present
    fn remove(&self, key: &str) -> Result<()>;

    /// Read and deserialize a JSON value, returning `default` when absent
    fn get_json<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: DeserializeOwned,
        Self: Sized,
    {
        match self.get(key)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(default),
        }
    }

    /// Serialize and store a JSON value
    fn set_json<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
        Self: Sized,
    {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw)
    }
}

fn check_quota(key: &str, quota: Option<usize>, used_elsewhere: usize, needed: usize) -> Result<()> {
    let Some(quota) = quota else {
        return Ok(());
    };
    let available = quota.saturating_sub(used_elsewhere);
    if needed > available {
        tracing::warn!(
            "Storage quota exceeded writing '{}': {} bytes needed, {} available",
            key,
            needed,
            available
        );
        return Err(crate::Error::QuotaExceeded {
            key: key.to_string(),
            needed,
            available,
        });
    }
    Ok(())
}
