//! Sync orchestrator
//!
//! The [`SyncOrchestrator`] reconciles local state with the server.
//!
//! ## Sync Flow
//!
//! 1. **Gate**: return immediately when offline, or when another round is
//!    already running (single-flight, no follow-up is queued).
//! 2. **Pull**: for each tracked collection, fetch records changed after the
//!    cursor, draining every page, and upsert them under last-write-wins
//!    (tombstones delete). The cursor advances to the highest `updatedAt`
//!    seen, only once pagination is fully drained. A failing collection does
//!    not stop the others.
//! 3. **Push**: drain the outbox in enqueue order. Successes are removed and
//!    their server snapshot stored, unless later edits of the same record
//!    are still queued; a create also records the server id so later items
//!    are redirected. A failing item gets its retry count bumped
//!    and the drain moves on, except for transport failures and missing
//!    credentials, which leave the rest of the queue for the next round.
//! 4. **Report**: release the guard, then notify completion listeners.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use tether_core::config::Config;
use tether_core::domain::{
    CollectionName, CollectionQuery, DomainError, OpType, OutboxItem, Record, RecordId, Timestamp,
};
use tether_core::ports::{ApplyOutcome, ICursorStore, IEntityStore, IOutboxStore, IQueryCache};

use crate::api::RemoteRecords;
use crate::connectivity::ConnectivityMonitor;
use crate::observers::{Observers, Subscription};
use crate::retry::RetryPolicy;
use crate::SyncError;

// ============================================================================
// Wiring types
// ============================================================================

/// The four durable stores the engine owns
#[derive(Clone)]
pub struct SyncStores {
    pub entities: Arc<dyn IEntityStore>,
    pub query_cache: Arc<dyn IQueryCache>,
    pub outbox: Arc<dyn IOutboxStore>,
    pub cursors: Arc<dyn ICursorStore>,
}

/// Tunables shared by the orchestrator and the record repository
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub collections: Vec<CollectionName>,
    pub page_size: u32,
    pub retry: RetryPolicy,
    pub query_ttl: Duration,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            collections: config.collections(),
            page_size: config.sync.page_size,
            retry: RetryPolicy::from_config(&config.retry),
            query_ttl: config.query_ttl(),
        }
    }
}

// ============================================================================
// SyncReport / SyncOutcome
// ============================================================================

/// Summary of one completed sync round
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    /// Records received during the pull phase
    pub pulled: u64,
    /// Pulled records that were inserted or replaced a local copy
    pub applied: u64,
    /// Pulled records older than the local copy
    pub skipped_stale: u64,
    /// Local copies removed by pulled tombstones
    pub deleted: u64,
    /// Outbox items accepted by the server
    pub pushed: u64,
    /// Outbox items that failed and stay queued
    pub failed: u64,
    /// Outbox items the server refused as invalid
    pub rejected: u64,
    /// Items skipped this round (rejected earlier, backing off, or waiting
    /// for their create to be acknowledged)
    pub deferred: u64,
    /// True if the push phase stopped early
    pub aborted: bool,
    /// True if the server refused the credentials at least once
    pub auth_required: bool,
    /// Non-fatal errors, one line each
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// Result of a `sync()` call
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// The connectivity monitor reported offline; nothing was attempted
    SkippedOffline,
    /// Another round was in flight; this call did nothing
    AlreadyRunning,
}

// ============================================================================
// Single-flight guard
// ============================================================================

/// Held for the duration of a round; released on drop, including when the
/// sync future is cancelled or panics
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// State carried across the pull and push phases of one round
#[derive(Default)]
struct Round {
    auth_notified: bool,
    touched: BTreeSet<CollectionName>,
}

// ============================================================================
// SyncOrchestrator
// ============================================================================

/// Runs pull/push rounds, at most one at a time
pub struct SyncOrchestrator {
    api: RemoteRecords,
    stores: SyncStores,
    connectivity: Arc<ConnectivityMonitor>,
    settings: SyncSettings,
    in_flight: AtomicBool,
    completed: Observers<SyncReport>,
    auth_required: Observers<SyncError>,
    item_rejected: Observers<OutboxItem>,
}

impl SyncOrchestrator {
    pub fn new(
        api: RemoteRecords,
        stores: SyncStores,
        connectivity: Arc<ConnectivityMonitor>,
        settings: SyncSettings,
    ) -> Self {
        info!(
            collections = settings.collections.len(),
            page_size = settings.page_size,
            retry = ?settings.retry,
            "Creating sync orchestrator"
        );
        Self {
            api,
            stores,
            connectivity,
            settings,
            in_flight: AtomicBool::new(false),
            completed: Observers::new(),
            auth_required: Observers::new(),
            item_rejected: Observers::new(),
        }
    }

    /// True while a round is running
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Called after every completed round
    pub fn on_completed<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SyncReport) + Send + Sync + 'static,
    {
        self.completed.subscribe(listener)
    }

    /// Called at most once per round when the server refuses the credentials
    pub fn on_auth_required<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SyncError) + Send + Sync + 'static,
    {
        self.auth_required.subscribe(listener)
    }

    /// Called when an outbox item is rejected as invalid
    pub fn on_item_rejected<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&OutboxItem) + Send + Sync + 'static,
    {
        self.item_rejected.subscribe(listener)
    }

    pub(crate) fn item_rejected_observers(&self) -> &Observers<OutboxItem> {
        &self.item_rejected
    }

    /// Run one sync round
    #[tracing::instrument(skip(self))]
    pub async fn sync(&self) -> SyncOutcome {
        if !self.connectivity.is_online() {
            debug!("Offline, sync skipped");
            return SyncOutcome::SkippedOffline;
        }

        let report = {
            let Some(_guard) = FlightGuard::acquire(&self.in_flight) else {
                debug!("Sync already in flight, skipped");
                return SyncOutcome::AlreadyRunning;
            };

            let start = Instant::now();
            let mut report = SyncReport::default();
            let mut round = Round::default();

            info!("Starting sync round");
            self.pull_all(&mut report, &mut round).await;
            self.push_all(&mut report, &mut round).await;

            for collection in &round.touched {
                if let Err(err) = self
                    .stores
                    .query_cache
                    .invalidate(&CollectionQuery::cache_prefix(collection))
                    .await
                {
                    report.errors.push(format!("invalidate {collection}: {err:#}"));
                }
            }

            report.duration_ms = start.elapsed().as_millis() as u64;
            report
        };

        info!(
            pulled = report.pulled,
            applied = report.applied,
            deleted = report.deleted,
            pushed = report.pushed,
            failed = report.failed,
            rejected = report.rejected,
            deferred = report.deferred,
            aborted = report.aborted,
            duration_ms = report.duration_ms,
            "Sync round completed"
        );

        self.completed.notify(&report);
        SyncOutcome::Completed(report)
    }

    // ------------------------------------------------------------------------
    // Pull phase
    // ------------------------------------------------------------------------

    async fn pull_all(&self, report: &mut SyncReport, round: &mut Round) {
        for collection in &self.settings.collections {
            if let Err(err) = self.pull_collection(collection, report, round).await {
                warn!(collection = %collection, error = %err, "Pull failed");
                self.note_auth_failure(&err, report, round);
                report.errors.push(format!("pull {collection}: {err}"));
            }
        }
    }

    #[tracing::instrument(skip(self, report, round), fields(collection = %collection))]
    async fn pull_collection(
        &self,
        collection: &CollectionName,
        report: &mut SyncReport,
        round: &mut Round,
    ) -> Result<(), SyncError> {
        let since = self
            .stores
            .cursors
            .get(collection)
            .await?
            .map(|cursor| cursor.last_sync_at)
            .unwrap_or(Timestamp::EPOCH);

        let mut page = 1;
        let mut newest: Option<Timestamp> = None;

        loop {
            let batch = self
                .api
                .fetch_changes(collection, since, page, self.settings.page_size)
                .await?;
            debug!(page, items = batch.items.len(), has_more = batch.has_more, "Fetched page");

            for record in &batch.items {
                report.pulled += 1;
                newest = newest.max(Some(record.updated_at));
                match self.stores.entities.apply(collection, record).await? {
                    ApplyOutcome::Inserted | ApplyOutcome::Updated => report.applied += 1,
                    ApplyOutcome::Deleted => report.deleted += 1,
                    ApplyOutcome::Ignored => report.skipped_stale += 1,
                }
            }

            if !batch.has_more || batch.items.is_empty() {
                break;
            }
            page += 1;
        }

        if let Some(newest) = newest {
            self.stores.cursors.advance(collection, newest).await?;
            round.touched.insert(collection.clone());
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Push phase
    // ------------------------------------------------------------------------

    async fn push_all(&self, report: &mut SyncReport, round: &mut Round) {
        let queued = match self.stores.outbox.peek_all().await {
            Ok(items) => items,
            Err(err) => {
                report.errors.push(format!("read outbox: {err:#}"));
                return;
            }
        };
        if queued.is_empty() {
            return;
        }

        debug!(items = queued.len(), "Draining outbox");
        let now = Timestamp::now();

        for snapshot in queued {
            // Re-read: an earlier create in this round may have redirected
            // the target, or the item may have been discarded meanwhile.
            let item = match self.stores.outbox.get(snapshot.id).await {
                Ok(Some(item)) => item,
                Ok(None) => continue,
                Err(err) => {
                    report.errors.push(format!("read outbox item {}: {err:#}", snapshot.id));
                    continue;
                }
            };

            if item.rejected || !self.settings.retry.is_due(&item, now) || waits_for_create(&item)
            {
                report.deferred += 1;
                continue;
            }

            match self.push_item(&item).await {
                Ok(()) => {
                    report.pushed += 1;
                    round.touched.insert(item.collection.clone());
                }
                Err(SyncError::Offline(reason)) => {
                    info!(reason = %reason, "No credentials, leaving outbox for later");
                    report.aborted = true;
                    report.errors.push(format!("push aborted: {reason}"));
                    break;
                }
                Err(err) => {
                    self.record_failure(&item, &err, report, round).await;
                    if err.aborts_batch() {
                        warn!(item = %item.id, error = %err, "Network failure, aborting push");
                        report.aborted = true;
                        break;
                    }
                }
            }
        }
    }

    #[tracing::instrument(skip(self, item), fields(item = %item.id, op = %item.op_type))]
    async fn push_item(&self, item: &OutboxItem) -> Result<(), SyncError> {
        let collection = &item.collection;
        let entities = &self.stores.entities;
        let outbox = &self.stores.outbox;

        match item.op_type {
            OpType::Create => {
                let created = self.api.create(collection, &item.payload).await?;
                let local_id = item
                    .target_record_id
                    .clone()
                    .unwrap_or_else(|| created.id.clone());
                if local_id != created.id {
                    outbox.record_id_mapping(&local_id, &created.id).await?;
                }
                outbox.remove(item.id).await?;

                // Queued edits of the new record keep their local state; the
                // server copy is stored once the last of them is accepted.
                let local = if outbox.has_pending_for(&created.id).await? {
                    entities.get(&local_id).await?.any()
                } else {
                    None
                };
                match local {
                    Some(mut local) => {
                        let deleted_at = local.tombstone.then_some(local.updated_at);
                        local.id = created.id.clone();
                        local.tombstone = false;
                        entities.rekey(&local_id, collection, &local).await?;
                        if let Some(at) = deleted_at {
                            entities.mark_deleted(&created.id, at).await?;
                        }
                    }
                    None => entities.rekey(&local_id, collection, &created).await?,
                }
                debug!(server_id = %created.id, "Create accepted");
            }
            OpType::Update => {
                let target = required_target(item)?;
                let updated = self.api.update(collection, target, &item.payload).await?;
                outbox.remove(item.id).await?;
                if outbox.has_pending_for(target).await? {
                    debug!(id = %target, "Later edits still queued, keeping local copy");
                } else {
                    entities.apply(collection, &updated).await?;
                }
            }
            OpType::Delete => {
                let target = required_target(item)?;
                self.api.delete(collection, target).await?;
                outbox.remove(item.id).await?;
                if !outbox.has_pending_for(target).await? {
                    entities.remove(target).await?;
                }
            }
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        item: &OutboxItem,
        err: &SyncError,
        report: &mut SyncReport,
        round: &mut Round,
    ) {
        let message = err.to_string();
        let now = Timestamp::now();

        let stored = if matches!(err, SyncError::Validation { .. }) {
            report.rejected += 1;
            self.stores.outbox.mark_rejected(item.id, &message, now).await
        } else {
            report.failed += 1;
            self.stores.outbox.bump_retry(item.id, &message, now).await
        };
        if let Err(store_err) = stored {
            report
                .errors
                .push(format!("record failure of item {}: {store_err:#}", item.id));
        }

        warn!(item = %item.id, op = %item.op_type, error = %err, "Outbox item failed");
        report.errors.push(format!("item {}: {err}", item.id));
        self.note_auth_failure(err, report, round);

        if matches!(err, SyncError::Validation { .. }) {
            let mut rejected = item.clone();
            rejected.rejected = true;
            rejected.retry_count += 1;
            rejected.last_error = Some(message);
            rejected.last_attempt_at = Some(now);
            self.item_rejected.notify(&rejected);
        }
    }

    fn note_auth_failure(&self, err: &SyncError, report: &mut SyncReport, round: &mut Round) {
        if matches!(err, SyncError::Auth { .. }) {
            report.auth_required = true;
            if !round.auth_notified {
                round.auth_notified = true;
                self.auth_required.notify(err);
            }
        }
    }
}

/// Updates and deletes of a record whose create is still queued must wait
/// for the server id
fn waits_for_create(item: &OutboxItem) -> bool {
    item.op_type != OpType::Create
        && item
            .target_record_id
            .as_ref()
            .is_some_and(|id| id.is_local())
}

fn required_target(item: &OutboxItem) -> Result<&RecordId, SyncError> {
    item.target_record_id.as_ref().ok_or_else(|| {
        SyncError::Domain(DomainError::ValidationFailed(format!(
            "outbox item {} has no target record",
            item.id
        )))
    })
}

/// Store a server snapshot for `collection`; used by the record repository
/// after a direct (non-queued) write
pub(crate) async fn store_server_snapshot(
    stores: &SyncStores,
    collection: &CollectionName,
    local_id: Option<&RecordId>,
    snapshot: &Record,
) -> Result<(), SyncError> {
    match local_id {
        Some(local) if local != &snapshot.id => {
            stores.outbox.record_id_mapping(local, &snapshot.id).await?;
            stores.entities.rekey(local, collection, snapshot).await?;
        }
        _ => {
            stores.entities.apply(collection, snapshot).await?;
        }
    }
    Ok(())
}
