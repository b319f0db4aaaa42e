//! Sync coordinator.
//!
//! Sequences sync attempts through a three-state machine
//! (`Idle -> Syncing -> Idle | Error`). Every path that mutates the pending
//! queue or the local replica goes through the same guard, so a periodic
//! drain and a user-triggered reconcile can never interleave.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::api::{ApiError, HistoryApi, HistoryPage};
use crate::auth::AccessTokenSource;
use crate::config::SyncSettings;
use crate::error::{Error, Result};
use crate::events::{ItemError, Subscription, SyncEvent, SyncEvents, SyncOperation, SyncOutcome};
use crate::models::{EntryId, PendingEntry, Record, RecordId, RemoteRecord};
use crate::history::LocalHistory;
use crate::resolver::{resolve, ConflictResolution};
use crate::store::KeyValueStore;

/// Sync state shared by every client surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    /// The last attempt failed; a new attempt may start from here.
    Error,
}

/// Snapshot reported by [`SyncCoordinator::status`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: SyncState,
    pub pending: usize,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct StateCell {
    state: SyncState,
    last_error: Option<String>,
}

/// Orchestrates drains, reconciliations and deletes against the remote API.
pub struct SyncCoordinator<A, C, K>
where
    A: HistoryApi,
    C: AccessTokenSource,
    K: KeyValueStore,
{
    inner: Arc<Inner<A, C, K>>,
}

struct Inner<A, C, K>
where
    A: HistoryApi,
    C: AccessTokenSource,
    K: KeyValueStore,
{
    api: A,
    credentials: C,
    local: LocalHistory<K>,
    events: SyncEvents,
    settings: SyncSettings,
    cell: Mutex<StateCell>,
}

impl<A, C, K> Clone for SyncCoordinator<A, C, K>
where
    A: HistoryApi,
    C: AccessTokenSource,
    K: KeyValueStore,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Exclusive right to run one sync attempt.
///
/// Dropping the permit leaves `Syncing`, so a cancelled attempt never wedges
/// the state machine.
struct SyncPermit<'a> {
    cell: &'a Mutex<StateCell>,
    failure: Option<String>,
}

impl SyncPermit<'_> {
    fn fail(&mut self, error: &Error) {
        self.failure = Some(error.to_string());
    }
}

impl Drop for SyncPermit<'_> {
    fn drop(&mut self) {
        let mut cell = lock_cell(self.cell);
        cell.state = if self.failure.is_some() {
            SyncState::Error
        } else {
            SyncState::Idle
        };
        cell.last_error = self.failure.take();
    }
}

fn lock_cell(cell: &Mutex<StateCell>) -> MutexGuard<'_, StateCell> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<A, C, K> SyncCoordinator<A, C, K>
where
    A: HistoryApi,
    C: AccessTokenSource,
    K: KeyValueStore + Clone,
{
    pub fn new(api: A, credentials: C, store: K, settings: SyncSettings) -> Self {
        let local = LocalHistory::new(store, settings.retention_limit);
        Self {
            inner: Arc::new(Inner {
                api,
                credentials,
                local,
                events: SyncEvents::new(),
                settings,
                cell: Mutex::new(StateCell::default()),
            }),
        }
    }
}

impl<A, C, K> SyncCoordinator<A, C, K>
where
    A: HistoryApi,
    C: AccessTokenSource,
    K: KeyValueStore,
{
    pub fn state(&self) -> SyncState {
        lock_cell(&self.inner.cell).state
    }

    pub fn status(&self) -> Result<SyncStatus> {
        let pending = self.inner.local.queue().count()?;
        let cell = lock_cell(&self.inner.cell);
        Ok(SyncStatus {
            state: cell.state,
            pending,
            last_error: cell.last_error.clone(),
        })
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    /// Register a sync event listener.
    pub fn subscribe(&self, listener: impl Fn(&SyncEvent) + Send + Sync + 'static) -> Subscription {
        self.inner.events.subscribe(listener)
    }

    /// Local replica contents, newest first
    pub fn history(&self) -> Result<Vec<Record>> {
        self.inner.local.replica().load()
    }

    pub fn pending(&self) -> Result<Vec<PendingEntry>> {
        self.inner.local.queue().entries()
    }

    /// Record a local mutation: store it in the replica and queue it for upload.
    ///
    /// Rejected with [`Error::Busy`] while a sync is running.
    pub fn save_local(&self, record: Record) -> Result<PendingEntry> {
        // Held for the whole write so no sync can start halfway through.
        let cell = lock_cell(&self.inner.cell);
        if cell.state == SyncState::Syncing {
            return Err(Error::Busy);
        }
        let entry = self.inner.local.save(record);
        drop(cell);
        entry
    }

    /// Upload every queued entry in order, keeping only the failures queued.
    pub async fn drain_only(&self) -> Result<SyncOutcome> {
        let mut permit = self.begin()?;
        let result = self.run_drain().await;
        self.finish(&mut permit, SyncOperation::Drain, result)
    }

    /// Merge the remote replica into the local one.
    ///
    /// Downloads overwrite local records by id, uploads are queued for the
    /// next drain. Nothing local is written unless the whole remote replica
    /// was fetched.
    pub async fn reconcile(&self) -> Result<SyncOutcome> {
        let mut permit = self.begin()?;
        let result = self.run_reconcile().await;
        self.finish(&mut permit, SyncOperation::Reconcile, result)
    }

    /// Delete a record remotely, then locally. A remote 404 counts as deleted.
    pub async fn delete(&self, id: &RecordId) -> Result<SyncOutcome> {
        if id.is_empty() {
            return Err(Error::InvalidInput("record id is required".to_string()));
        }
        let mut permit = self.begin()?;
        let result = self.run_delete(id).await;
        self.finish(&mut permit, SyncOperation::Delete, result)
    }

    fn begin(&self) -> Result<SyncPermit<'_>> {
        let mut cell = lock_cell(&self.inner.cell);
        if cell.state == SyncState::Syncing {
            tracing::debug!("Sync requested while another sync is running");
            return Err(Error::Busy);
        }
        cell.state = SyncState::Syncing;
        Ok(SyncPermit {
            cell: &self.inner.cell,
            failure: None,
        })
    }

    fn finish(
        &self,
        permit: &mut SyncPermit<'_>,
        operation: SyncOperation,
        result: Result<SyncOutcome>,
    ) -> Result<SyncOutcome> {
        match &result {
            Ok(outcome) => {
                tracing::info!(
                    "{operation:?} finished: {} synced, {} failed",
                    outcome.synced,
                    outcome.failed
                );
                self.inner.events.emit(&SyncEvent::Completed {
                    operation,
                    outcome: outcome.clone(),
                });
            }
            Err(error) => {
                tracing::warn!("{operation:?} failed: {error}");
                permit.fail(error);
                self.inner.events.emit(&SyncEvent::Failed {
                    operation,
                    error: error.to_string(),
                    reauthenticate: error.requires_reauthentication(),
                });
            }
        }
        result
    }

    async fn run_drain(&self) -> Result<SyncOutcome> {
        let inner = &self.inner;
        let entries = inner.local.queue().entries()?;
        if entries.is_empty() {
            return Ok(SyncOutcome::default());
        }

        let credential = inner.credentials.acquire().await?;
        let total = entries.len();
        inner.events.emit(&SyncEvent::Started {
            operation: SyncOperation::Drain,
            total,
        });

        let mut outcome = SyncOutcome::default();
        let mut succeeded: HashSet<EntryId> = HashSet::new();
        let mut uploaded: Vec<(RecordId, i64)> = Vec::new();

        for (index, entry) in entries.iter().enumerate() {
            let record = &entry.record;
            inner.events.emit(&SyncEvent::Progress {
                current: index + 1,
                total,
                item: record.id.clone(),
            });

            let result = match record.validate() {
                Ok(()) => self.upload(&credential.access_token, record).await,
                Err(message) => Err(ApiError::Validation(message)),
            };
            match result {
                Ok(()) => {
                    succeeded.insert(entry.entry_id);
                    uploaded.push((record.id.clone(), record.timestamp));
                    outcome.synced += 1;
                }
                Err(error) => {
                    if matches!(error, ApiError::Unauthorized(_)) {
                        inner.credentials.invalidate();
                    }
                    tracing::warn!("Upload of {} failed: {error}", record.id);
                    outcome.failed += 1;
                    outcome.errors.push(ItemError {
                        id: record.id.clone(),
                        error: error.to_string(),
                    });
                }
            }
        }

        if !succeeded.is_empty() {
            inner.local.queue().remove_succeeded(&succeeded)?;
            self.mark_uploaded(&uploaded)?;
        }
        Ok(outcome)
    }

    async fn run_reconcile(&self) -> Result<SyncOutcome> {
        let inner = &self.inner;
        let credential = inner.credentials.acquire().await?;
        let remote = self.fetch_remote(&credential.access_token).await?;
        let local = inner.local.replica().load()?;
        let resolution = resolve(&local, &remote);

        for conflict in &resolution.conflicts {
            inner.events.emit(&SyncEvent::Conflict {
                id: conflict.id.clone(),
                resolution: conflict.resolution,
                local: conflict.local_timestamp,
                remote: conflict.remote_timestamp,
            });
            if conflict.resolution == ConflictResolution::RemoteWins {
                tracing::debug!("Remote copy of {} is newer, downloading", conflict.id);
            }
        }

        let total = resolution.to_upload.len() + resolution.to_download.len();
        inner.events.emit(&SyncEvent::Started {
            operation: SyncOperation::Reconcile,
            total,
        });
        if resolution.is_noop() {
            return Ok(SyncOutcome::default());
        }

        let already_queued: HashSet<RecordId> = inner
            .local
            .queue()
            .entries()?
            .into_iter()
            .map(|entry| entry.record.id)
            .collect();

        let mut merged = resolution.to_keep;
        let mut to_enqueue = Vec::new();
        let mut current = 0;
        for mut record in resolution.to_upload {
            current += 1;
            inner.events.emit(&SyncEvent::Progress {
                current,
                total,
                item: record.id.clone(),
            });
            record.pending_sync = true;
            if !already_queued.contains(&record.id) {
                to_enqueue.push(record.clone());
            }
            merged.push(record);
        }
        let downloaded = resolution.to_download.len();
        for remote_record in resolution.to_download {
            current += 1;
            inner.events.emit(&SyncEvent::Progress {
                current,
                total,
                item: remote_record.id.clone(),
            });
            merged.push(remote_record.into_record());
        }

        let report = inner.local.apply_merge(merged, to_enqueue)?;
        tracing::info!(
            "Reconciled {} remote record(s): {downloaded} downloaded, {} queued, {} kept locally",
            remote.len(),
            report.queued,
            report.stored
        );

        Ok(SyncOutcome {
            synced: downloaded,
            failed: 0,
            errors: Vec::new(),
        })
    }

    async fn run_delete(&self, id: &RecordId) -> Result<SyncOutcome> {
        let inner = &self.inner;
        let credential = inner.credentials.acquire().await?;
        inner.events.emit(&SyncEvent::Started {
            operation: SyncOperation::Delete,
            total: 1,
        });

        let result = with_timeout(
            inner.settings.request_timeout(),
            inner.api.delete(&credential.access_token, id),
            "delete",
        )
        .await;
        match result {
            Ok(()) => {}
            Err(ApiError::NotFound(_)) => {
                tracing::debug!("{id} was already absent remotely");
            }
            Err(error) => {
                if matches!(error, ApiError::Unauthorized(_)) {
                    inner.credentials.invalidate();
                }
                return Err(error.into());
            }
        }

        inner.local.queue().remove_record(id)?;
        let mut records = inner.local.replica().load()?;
        let before = records.len();
        records.retain(|record| &record.id != id);
        if records.len() != before {
            inner.local.replica().save(records)?;
        }

        Ok(SyncOutcome {
            synced: 1,
            failed: 0,
            errors: Vec::new(),
        })
    }

    async fn upload(&self, access_token: &str, record: &Record) -> std::result::Result<(), ApiError> {
        with_timeout(
            self.inner.settings.request_timeout(),
            self.inner.api.upload(access_token, record),
            "upload",
        )
        .await
    }

    async fn fetch_remote(&self, access_token: &str) -> Result<Vec<RemoteRecord>> {
        let inner = &self.inner;
        let page_size = inner.settings.page_size;
        let mut items: Vec<RemoteRecord> = Vec::new();

        for page in 1..=inner.settings.max_pages {
            let result = with_timeout(
                inner.settings.request_timeout(),
                inner.api.fetch_page(access_token, page, page_size),
                "history fetch",
            )
            .await;
            let batch: HistoryPage = match result {
                Ok(batch) => batch,
                Err(error) => {
                    if matches!(error, ApiError::Unauthorized(_)) {
                        inner.credentials.invalidate();
                    }
                    return Err(error.into());
                }
            };

            let received = batch.items.len();
            items.extend(batch.items);
            let reached_total = batch
                .total
                .is_some_and(|total| u64::try_from(items.len()).unwrap_or(u64::MAX) >= total);
            if !batch.has_more || received == 0 || reached_total {
                return Ok(items);
            }
        }

        tracing::warn!(
            "Stopped fetching remote history after {} pages ({} records)",
            inner.settings.max_pages,
            items.len()
        );
        Ok(items)
    }

    /// Clear `pending_sync` on replica records whose uploaded copy is still current.
    fn mark_uploaded(&self, uploaded: &[(RecordId, i64)]) -> Result<()> {
        let mut records = self.inner.local.replica().load()?;
        let mut changed = false;
        for record in records.iter_mut().filter(|record| record.pending_sync) {
            if uploaded
                .iter()
                .any(|(id, timestamp)| id == &record.id && *timestamp == record.timestamp)
            {
                record.pending_sync = false;
                changed = true;
            }
        }
        if changed {
            self.inner.local.replica().save(records)?;
        }
        Ok(())
    }
}

async fn with_timeout<T>(
    limit: Duration,
    request: impl Future<Output = std::result::Result<T, ApiError>>,
    what: &str,
) -> std::result::Result<T, ApiError> {
    tokio::time::timeout(limit, request)
        .await
        .unwrap_or_else(|_| Err(ApiError::Transient(format!("{what} timed out after {limit:?}"))))
}
