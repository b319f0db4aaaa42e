//! Durable queue of local mutations waiting for upload.
//!
//! The queue is persisted as one document, so every mutating call writes the
//! whole queue in a single store operation: after a crash the stored queue is
//! either the one before the call or the one after it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::models::{EntryId, PendingEntry, Record, RecordId};
use crate::store::{KeyValueStore, QUEUE_KEY};
use crate::util::unix_millis_now;

/// Ordered, persisted list of pending mutations.
#[derive(Debug, Clone)]
pub struct PendingQueue<K: KeyValueStore> {
    store: K,
    // Serializes read-modify-write cycles from clones sharing one store.
    write_lock: Arc<Mutex<()>>,
}

impl<K: KeyValueStore> PendingQueue<K> {
    pub fn new(store: K) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Append a record to the tail, marking it pending, and persist.
    pub fn enqueue(&self, record: Record) -> Result<PendingEntry> {
        let mut entries = self.enqueue_many(vec![record])?;
        entries
            .pop()
            .ok_or_else(|| Error::Storage("queue append produced no entry".to_string()))
    }

    /// Append several records in order with a single persist.
    pub fn enqueue_many(&self, records: Vec<Record>) -> Result<Vec<PendingEntry>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let _guard = self.lock()?;
        let mut entries = self.load()?;
        let queued_at = unix_millis_now();
        let added: Vec<PendingEntry> = records
            .into_iter()
            .map(|record| PendingEntry::new(record, queued_at))
            .collect();
        entries.extend(added.iter().cloned());
        self.store.set_json(QUEUE_KEY, &entries)?;
        tracing::debug!("Queued {} record(s), {} pending", added.len(), entries.len());
        Ok(added)
    }

    /// All entries in enqueue order
    pub fn entries(&self) -> Result<Vec<PendingEntry>> {
        self.load()
    }

    /// Number of queued entries
    pub fn count(&self) -> Result<usize> {
        Ok(self.load()?.len())
    }

    /// Remove exactly the entries whose identity is in `succeeded`.
    ///
    /// The current persisted queue is re-read first, so entries appended while
    /// an upload was in flight are kept.
    pub fn remove_succeeded(&self, succeeded: &HashSet<EntryId>) -> Result<usize> {
        if succeeded.is_empty() {
            return Ok(0);
        }
        self.retain(|entry| !succeeded.contains(&entry.entry_id))
    }

    /// Drop every entry for one record, e.g. after it was deleted remotely.
    pub fn remove_record(&self, id: &RecordId) -> Result<usize> {
        self.retain(|entry| &entry.record.id != id)
    }

    fn retain(&self, keep: impl Fn(&PendingEntry) -> bool) -> Result<usize> {
        let _guard = self.lock()?;
        let mut entries = self.load()?;
        let before = entries.len();
        entries.retain(keep);
        let removed = before - entries.len();
        if removed > 0 {
            self.store.set_json(QUEUE_KEY, &entries)?;
        }
        Ok(removed)
    }

    fn load(&self) -> Result<Vec<PendingEntry>> {
        self.store.get_json(QUEUE_KEY, Vec::new())
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|error| Error::Storage(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::SummaryLength;
    use crate::store::MemoryStore;

    fn record(id: &str) -> Record {
        let mut record = Record::new("https://example.com", id, "summary", SummaryLength::Short);
        record.id = RecordId::from(id);
        record
    }

    fn record_ids(entries: &[PendingEntry]) -> Vec<&str> {
        entries.iter().map(|entry| entry.record.id.as_str()).collect()
    }

    #[test]
    fn enqueue_appends_in_order_and_marks_pending() {
        let queue = PendingQueue::new(MemoryStore::new());
        queue.enqueue(record("a")).unwrap();
        queue.enqueue(record("b")).unwrap();

        let entries = queue.entries().unwrap();
        assert_eq!(record_ids(&entries), vec!["a", "b"]);
        assert!(entries.iter().all(|entry| entry.record.pending_sync));
    }

    #[test]
    fn enqueue_persists_before_returning() {
        let store = MemoryStore::new();
        let queue = PendingQueue::new(store.clone());
        queue.enqueue(record("a")).unwrap();

        let reopened = PendingQueue::new(store);
        assert_eq!(record_ids(&reopened.entries().unwrap()), vec!["a"]);
    }

    #[test]
    fn remove_succeeded_matches_identity_not_position() {
        let queue = PendingQueue::new(MemoryStore::new());
        let first = queue.enqueue(record("a")).unwrap();
        queue.enqueue(record("b")).unwrap();

        // A drain snapshot is taken, then the application edits "a" again.
        let snapshot = queue.entries().unwrap();
        queue.enqueue(record("a")).unwrap();

        let succeeded: HashSet<EntryId> = [first.entry_id].into_iter().collect();
        assert_eq!(queue.remove_succeeded(&succeeded).unwrap(), 1);

        let remaining = queue.entries().unwrap();
        assert_eq!(record_ids(&remaining), vec!["b", "a"]);
        assert_ne!(remaining[1].entry_id, snapshot[0].entry_id);
    }

    #[test]
    fn remove_record_drops_all_entries_for_id() {
        let queue = PendingQueue::new(MemoryStore::new());
        queue
            .enqueue_many(vec![record("a"), record("b"), record("a")])
            .unwrap();
        assert_eq!(queue.remove_record(&RecordId::from("a")).unwrap(), 2);
        assert_eq!(record_ids(&queue.entries().unwrap()), vec!["b"]);
        assert_eq!(queue.count().unwrap(), 1);
    }

    #[test]
    fn quota_failure_leaves_queue_unchanged() {
        let store = MemoryStore::with_quota(2048);
        let queue = PendingQueue::new(store);
        queue.enqueue(record("a")).unwrap();

        let mut large = record("big");
        large.summary = "x".repeat(4096);
        let error = queue.enqueue(large).unwrap_err();
        assert!(matches!(error, Error::QuotaExceeded { .. }));
        assert_eq!(record_ids(&queue.entries().unwrap()), vec!["a"]);
    }
}
