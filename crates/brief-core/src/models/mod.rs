//! Data models for Brief

mod pending;
mod record;
mod remote;

pub use pending::{EntryId, PendingEntry};
pub use record::{QaEntry, Record, RecordId, RecordMetadata, SummaryLength};
pub use remote::{RemoteRecord, RemoteTimestamp};
