//! Last-write-wins reconciliation of the local and remote replicas.
//!
//! [`resolve`] is pure: it never touches storage or the network and returns
//! the same partition for the same inputs.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{Record, RecordId, RemoteRecord};

/// Which replica a conflict was settled in favor of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Local record has unsynced edits and overrides the remote copy
    LocalWins,
    /// Remote copy is newer and replaces the local record
    RemoteWins,
}

/// A record present on both sides where one side was picked over the other
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictObservation {
    pub id: RecordId,
    pub resolution: ConflictResolution,
    /// Local record timestamp (Unix ms)
    pub local_timestamp: i64,
    /// Normalized remote `createdAt` (Unix ms), when parseable
    pub remote_timestamp: Option<i64>,
}

/// Three-way partition of the two replicas
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Local records already in agreement with the remote side
    pub to_keep: Vec<Record>,
    /// Local records the remote side must receive
    pub to_upload: Vec<Record>,
    /// Remote records that replace or extend the local replica
    pub to_download: Vec<RemoteRecord>,
    pub conflicts: Vec<ConflictObservation>,
}

impl Resolution {
    pub fn is_noop(&self) -> bool {
        self.to_upload.is_empty() && self.to_download.is_empty()
    }
}

/// Partition `local` and `remote` into records to keep, upload and download.
///
/// For each local record: pending edits are always uploaded; records the
/// remote side has never seen are uploaded; otherwise the remote copy is
/// downloaded only when its timestamp is strictly newer. Remote records with
/// no local counterpart are downloaded. Equal timestamps keep the local copy.
pub fn resolve(local: &[Record], remote: &[RemoteRecord]) -> Resolution {
    let mut remote_by_id: HashMap<&RecordId, &RemoteRecord> = HashMap::with_capacity(remote.len());
    for record in remote {
        remote_by_id.entry(&record.id).or_insert(record);
    }

    let mut resolution = Resolution::default();
    let mut local_ids: HashSet<&RecordId> = HashSet::with_capacity(local.len());

    for record in local {
        local_ids.insert(&record.id);
        let remote_match = remote_by_id.get(&record.id);

        if record.pending_sync {
            if let Some(remote_record) = remote_match {
                resolution.conflicts.push(ConflictObservation {
                    id: record.id.clone(),
                    resolution: ConflictResolution::LocalWins,
                    local_timestamp: record.timestamp,
                    remote_timestamp: remote_record.created_at_millis(),
                });
            }
            resolution.to_upload.push(record.clone());
            continue;
        }

        let Some(remote_record) = remote_match else {
            resolution.to_upload.push(record.clone());
            continue;
        };

        let remote_timestamp = remote_record.created_at_millis();
        if remote_timestamp.is_some_and(|remote_ts| remote_ts > record.timestamp) {
            resolution.conflicts.push(ConflictObservation {
                id: record.id.clone(),
                resolution: ConflictResolution::RemoteWins,
                local_timestamp: record.timestamp,
                remote_timestamp,
            });
            resolution.to_download.push((*remote_record).clone());
        } else {
            resolution.to_keep.push(record.clone());
        }
    }

    let mut downloaded: HashSet<&RecordId> = HashSet::new();
    for record in remote {
        if !local_ids.contains(&record.id) && downloaded.insert(&record.id) {
            resolution.to_download.push(record.clone());
        }
    }

    resolution
}
