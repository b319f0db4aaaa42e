//! Pending mutation queue entry model

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::Record;

/// Identity of a single queue entry.
///
/// A record that is edited twice is queued twice; each entry gets its own id
/// so that confirming the first upload never removes the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A local mutation waiting to be uploaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEntry {
    pub entry_id: EntryId,
    #[serde(flatten)]
    pub record: Record,
    /// Time the entry was queued (Unix ms)
    pub queued_at: i64,
}

impl PendingEntry {
    /// Wrap a record as a new queue entry, marking it pending.
    #[must_use]
    pub fn new(mut record: Record, queued_at: i64) -> Self {
        record.pending_sync = true;
        Self {
            entry_id: EntryId::new(),
            record,
            queued_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SummaryLength;

    #[test]
    fn new_entry_marks_record_pending() {
        let record = Record::new("https://example.com", "t", "s", SummaryLength::Short);
        let entry = PendingEntry::new(record, 42);
        assert!(entry.record.pending_sync);
        assert_eq!(entry.queued_at, 42);
    }

    #[test]
    fn entry_serializes_flat() {
        let record = Record::new("https://example.com", "t", "s", SummaryLength::Short);
        let entry = PendingEntry::new(record, 42);
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["queuedAt"], 42);
        assert_eq!(value["url"], "https://example.com");
        assert!(value.get("record").is_none());

        let parsed: PendingEntry = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, entry);
    }
}
