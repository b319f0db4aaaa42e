//! Local history: the replica plus the queue of mutations waiting for upload.
//!
//! Writes go to the replica before the queue. A record in the replica marked
//! `pending_sync` is re-queued by the next reconcile, so a failed queue write
//! is recoverable while a queued record missing from the replica is not.

use crate::error::{Error, Result};
use crate::models::{PendingEntry, Record};
use crate::queue::PendingQueue;
use crate::store::{KeyValueStore, LocalReplica};

#[derive(Debug, Clone)]
pub struct LocalHistory<K: KeyValueStore> {
    queue: PendingQueue<K>,
    replica: LocalReplica<K>,
}

impl<K: KeyValueStore + Clone> LocalHistory<K> {
    pub fn new(store: K, retention_limit: usize) -> Self {
        Self {
            queue: PendingQueue::new(store.clone()),
            replica: LocalReplica::new(store, retention_limit),
        }
    }
}

impl<K: KeyValueStore> LocalHistory<K> {
    pub const fn queue(&self) -> &PendingQueue<K> {
        &self.queue
    }

    pub const fn replica(&self) -> &LocalReplica<K> {
        &self.replica
    }

    /// Store a locally edited record and queue it for upload.
    ///
    /// Needs no network and no configured remote.
    pub fn save(&self, mut record: Record) -> Result<PendingEntry> {
        record.validate().map_err(Error::InvalidInput)?;
        record.pending_sync = true;

        let mut records = self.replica.load()?;
        records.retain(|existing| existing.id != record.id);
        records.push(record.clone());
        self.replica.save(records)?;

        let entry = self.queue.enqueue(record)?;
        tracing::debug!("Saved {} locally, queued as {}", entry.record.id, entry.entry_id);
        Ok(entry)
    }

    /// Merge reconciled records into the replica, then queue the uploads.
    ///
    /// `records` must already carry `pending_sync` for every record in
    /// `to_enqueue`.
    pub fn apply_merge(
        &self,
        records: Vec<Record>,
        to_enqueue: Vec<Record>,
    ) -> Result<MergeReport> {
        let stored = self.replica.save(records)?.len();
        let queued = self.queue.enqueue_many(to_enqueue)?.len();
        Ok(MergeReport { stored, queued })
    }
}

/// Sizes written by [`LocalHistory::apply_merge`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    pub stored: usize,
    pub queued: usize,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::{RecordId, SummaryLength};
    use crate::store::{MemoryStore, HISTORY_KEY, QUEUE_KEY};

    fn record(id: &str, timestamp: i64) -> Record {
        let mut record = Record::new("https://example.com", id, "summary", SummaryLength::Short);
        record.id = RecordId::from(id);
        record.timestamp = timestamp;
        record
    }

    #[test]
    fn save_works_with_only_a_store() {
        let history = LocalHistory::new(MemoryStore::new(), 10);
        let entry = history.save(record("a", 1)).unwrap();

        assert!(entry.record.pending_sync);
        let records = history.replica().load().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].pending_sync);
        assert_eq!(history.queue().count().unwrap(), 1);
    }

    #[test]
    fn save_rejects_invalid_record_without_writing() {
        let store = MemoryStore::new();
        let history = LocalHistory::new(store.clone(), 10);
        let mut broken = record("a", 1);
        broken.url = String::new();

        assert!(matches!(history.save(broken), Err(Error::InvalidInput(_))));
        assert_eq!(store.get(HISTORY_KEY).unwrap(), None);
        assert_eq!(store.get(QUEUE_KEY).unwrap(), None);
    }

    #[test]
    fn full_replica_write_queues_nothing() {
        let store = MemoryStore::with_quota(1024);
        let history = LocalHistory::new(store.clone(), 10);
        let mut large = record("big", 1);
        large.summary = "x".repeat(2048);

        assert!(matches!(
            history.save(large.clone()),
            Err(Error::QuotaExceeded { .. })
        ));
        assert_eq!(store.get(QUEUE_KEY).unwrap(), None);

        let merged = history.apply_merge(vec![large.clone()], vec![large]);
        assert!(matches!(merged, Err(Error::QuotaExceeded { .. })));
        assert_eq!(store.get(QUEUE_KEY).unwrap(), None);
        assert_eq!(store.get(HISTORY_KEY).unwrap(), None);
    }
}
