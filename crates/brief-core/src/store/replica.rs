//! Local history replica persisted as one document.

use std::collections::HashMap;

use super::{KeyValueStore, HISTORY_KEY};
use crate::error::Result;
use crate::models::{Record, RecordId};

/// The local copy of the history collection.
#[derive(Debug, Clone)]
pub struct LocalReplica<K: KeyValueStore> {
    store: K,
    retention_limit: usize,
}

impl<K: KeyValueStore> LocalReplica<K> {
    pub const fn new(store: K, retention_limit: usize) -> Self {
        Self {
            store,
            retention_limit,
        }
    }

    /// Load all records, newest first
    pub fn load(&self) -> Result<Vec<Record>> {
        self.store.get_json(HISTORY_KEY, Vec::new())
    }

    /// Compact and persist `records` in a single write, returning what was stored.
    pub fn save(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        let compacted = compact_history(records, self.retention_limit);
        self.store.set_json(HISTORY_KEY, &compacted)?;
        Ok(compacted)
    }
}

/// Deduplicate by id (keeping the newest copy), sort newest first and
/// truncate to `retention_limit` entries.
pub fn compact_history(records: Vec<Record>, retention_limit: usize) -> Vec<Record> {
    let mut newest: HashMap<RecordId, Record> = HashMap::with_capacity(records.len());
    for record in records {
        match newest.get(&record.id) {
            Some(existing) if existing.timestamp >= record.timestamp => {}
            _ => {
                newest.insert(record.id.clone(), record);
            }
        }
    }

    let mut compacted: Vec<Record> = newest.into_values().collect();
    compacted.sort_by(|left, right| {
        right
            .timestamp
            .cmp(&left.timestamp)
            .then_with(|| left.id.cmp(&right.id))
    });
    compacted.truncate(retention_limit);
    compacted
}
