//! In-memory key-value store

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{check_quota, KeyValueStore};
use crate::error::{Error, Result};

/// Thread-safe in-memory store with an optional byte quota.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that refuses writes beyond `quota_bytes` (keys + values)
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Arc::default(),
            quota_bytes: Some(quota_bytes),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|error| Error::Storage(error.to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.lock()?;
        let used_elsewhere = entries
            .iter()
            .filter(|(existing, _)| existing.as_str() != key)
            .map(|(existing, stored)| existing.len() + stored.len())
            .sum();
        check_quota(key, self.quota_bytes, used_elsewhere, key.len() + value.len())?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}
