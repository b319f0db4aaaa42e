//! Sync progress events and their subscribers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;

use crate::models::RecordId;
use crate::resolver::ConflictResolution;

/// Which coordinator operation produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Drain,
    Reconcile,
    Delete,
}

/// Upload or apply failure for one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub id: RecordId,
    pub error: String,
}

/// Result of one sync attempt. Reported through events, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub synced: usize,
    pub failed: usize,
    pub errors: Vec<ItemError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    Started {
        operation: SyncOperation,
        total: usize,
    },
    Progress {
        current: usize,
        total: usize,
        item: RecordId,
    },
    Completed {
        operation: SyncOperation,
        #[serde(flatten)]
        outcome: SyncOutcome,
    },
    Failed {
        operation: SyncOperation,
        error: String,
        reauthenticate: bool,
    },
    Conflict {
        id: RecordId,
        resolution: ConflictResolution,
        local: i64,
        remote: Option<i64>,
    },
}

impl SyncEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Progress { .. } => "progress",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Conflict { .. } => "conflict",
        }
    }
}

type Listener = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Registered-callback list for [`SyncEvent`]s.
///
/// Listeners run synchronously in registration order on the emitting task.
#[derive(Clone, Default)]
pub struct SyncEvents {
    listeners: Arc<Mutex<Listeners>>,
}

impl std::fmt::Debug for SyncEvents {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncEvents")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl SyncEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback; it stays registered until the returned handle is
    /// unsubscribed.
    pub fn subscribe(&self, listener: impl Fn(&SyncEvent) + Send + Sync + 'static) -> Subscription {
        let mut listeners = lock(&self.listeners);
        listeners.next_id += 1;
        let id = listeners.next_id;
        listeners.entries.push((id, Arc::new(listener)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).entries.len()
    }

    pub fn emit(&self, event: &SyncEvent) {
        // Snapshot so listeners may subscribe/unsubscribe while being called.
        let snapshot: Vec<Listener> = lock(&self.listeners)
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }
}

/// Handle returned by [`SyncEvents::subscribe`]
#[derive(Debug)]
#[must_use = "dropping a Subscription keeps the listener registered; call unsubscribe to remove it"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            lock(&listeners).entries.retain(|(id, _)| *id != self.id);
        }
    }
}

fn lock(listeners: &Mutex<Listeners>) -> MutexGuard<'_, Listeners> {
    listeners.lock().unwrap_or_else(PoisonError::into_inner)
}
