//! Record repository: the read/write path used by UI code
//!
//! ## Reads
//!
//! [`RecordRepository::get_records`] is cache-first. Query results are
//! cached as id lists (plus paging metadata) and hydrated from the entity
//! store, so a record updated by a pull or a push event shows its newest
//! snapshot even through an older listing entry.
//!
//! | Source   | When                                                       |
//! |----------|------------------------------------------------------------|
//! | `Cache`  | the query cache holds a fresh entry                        |
//! | `Remote` | fetched from the server (online, credentials available)    |
//! | `Stale`  | the fetch failed but an expired cache entry exists         |
//! | `Local`  | nothing cached; filtered and paged from the entity store   |
//!
//! Records created offline that the server has not acknowledged yet are
//! always part of the first page.
//!
//! ## Writes
//!
//! A write is applied to the entity store first, then sent directly when
//! online. When the direct call fails, or the record already has queued
//! operations, the operation goes to the outbox instead; a user's edit is
//! never dropped. Updates carry only the fields the draft changed, so the
//! server merges queued edits in order.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use tether_core::domain::{
    CollectionName, CollectionQuery, NewOutboxItem, OutboxItem, Record, RecordId, Timestamp,
};

use crate::api::RemoteRecords;
use crate::connectivity::ConnectivityMonitor;
use crate::observers::Observers;
use crate::orchestrator::{store_server_snapshot, SyncStores};
use crate::SyncError;

// ============================================================================
// Public types
// ============================================================================

/// Where a page of records came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSource {
    Cache,
    Remote,
    Stale,
    Local,
}

/// A page of records returned by [`RecordRepository::get_records`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordsPage {
    pub records: Vec<Record>,
    pub source: PageSource,
    pub has_more: bool,
}

/// A record as edited by the user
///
/// `id` is `None` for a new record. `fields` is merged over the current
/// local snapshot, so a draft may carry only the changed fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordDraft {
    pub id: Option<RecordId>,
    pub owner_id: Option<String>,
    pub fields: Map<String, Value>,
}

impl RecordDraft {
    /// A record that does not exist yet
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            id: None,
            owner_id: None,
            fields,
        }
    }

    /// Changes to an existing record
    pub fn existing(id: RecordId, fields: Map<String, Value>) -> Self {
        Self {
            id: Some(id),
            owner_id: None,
            fields,
        }
    }

    pub fn owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }
}

/// Result of a save or delete
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// Accepted by the server; carries the server snapshot
    Saved(Record),
    /// Stored locally and queued for the next sync
    Queued(OutboxItem),
    /// Not even the local write succeeded
    Failed(SyncError),
}

impl SaveOutcome {
    /// True unless the edit was lost
    pub fn is_persisted(&self) -> bool {
        !matches!(self, SaveOutcome::Failed(_))
    }
}

/// Query-cache value: ids in server order plus paging metadata
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedPage {
    ids: Vec<RecordId>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    total: u64,
}

// ============================================================================
// RecordRepository
// ============================================================================

pub struct RecordRepository {
    api: RemoteRecords,
    stores: SyncStores,
    connectivity: Arc<ConnectivityMonitor>,
    query_ttl: Duration,
    item_rejected: Observers<OutboxItem>,
}

impl RecordRepository {
    pub fn new(
        api: RemoteRecords,
        stores: SyncStores,
        connectivity: Arc<ConnectivityMonitor>,
        query_ttl: Duration,
        item_rejected: Observers<OutboxItem>,
    ) -> Self {
        Self {
            api,
            stores,
            connectivity,
            query_ttl,
            item_rejected,
        }
    }

    fn can_reach_server(&self) -> bool {
        self.connectivity.is_online() && self.api.has_credentials()
    }

    async fn invalidate(&self, collection: &CollectionName) -> Result<(), SyncError> {
        self.stores
            .query_cache
            .invalidate(&CollectionQuery::cache_prefix(collection))
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// One page of a collection listing
    #[tracing::instrument(skip(self), fields(collection = %query.collection, page = query.page))]
    pub async fn get_records(&self, query: &CollectionQuery) -> Result<RecordsPage, SyncError> {
        query.validate()?;
        let key = query.cache_key();
        let cached = self.stores.query_cache.get(&key).await?;

        if cached.is_fresh() {
            if let Some(page) = cached.fresh().and_then(decode_cached) {
                return self.hydrate(query, page, PageSource::Cache).await;
            }
            return self.local_page(query).await;
        }

        if self.can_reach_server() {
            match self.fetch_and_cache(query, &key).await {
                Ok(page) => return self.hydrate(query, page, PageSource::Remote).await,
                Err(err) => warn!(error = %err, "Listing fetch failed, falling back"),
            }
        }

        match cached.any().and_then(decode_cached) {
            Some(page) => self.hydrate(query, page, PageSource::Stale).await,
            None => self.local_page(query).await,
        }
    }

    async fn fetch_and_cache(
        &self,
        query: &CollectionQuery,
        key: &str,
    ) -> Result<CachedPage, SyncError> {
        let remote = self.api.list(query).await?;
        for record in &remote.items {
            self.stores.entities.apply(&query.collection, record).await?;
        }

        let page = CachedPage {
            ids: remote.items.iter().map(|r| r.id.clone()).collect(),
            has_more: remote.has_more,
            total: remote.total,
        };
        let value = serde_json::to_value(&page).map_err(|e| SyncError::Malformed(e.to_string()))?;
        self.stores.query_cache.put(key, &value, self.query_ttl).await?;
        debug!(items = page.ids.len(), "Cached listing page");
        Ok(page)
    }

    async fn hydrate(
        &self,
        query: &CollectionQuery,
        page: CachedPage,
        source: PageSource,
    ) -> Result<RecordsPage, SyncError> {
        let mut records = Vec::with_capacity(page.ids.len());
        for id in &page.ids {
            if let Some(record) = self.stores.entities.get(id).await?.any() {
                if !record.tombstone {
                    records.push(record);
                }
            }
        }

        if query.page == 1 {
            let pending = self.pending_creates(query).await?;
            let mut merged: Vec<Record> = pending
                .into_iter()
                .filter(|p| !records.iter().any(|r| r.id == p.id))
                .collect();
            merged.append(&mut records);
            records = merged;
        }

        Ok(RecordsPage {
            records,
            source,
            has_more: page.has_more,
        })
    }

    /// Local records not yet acknowledged by the server
    async fn pending_creates(&self, query: &CollectionQuery) -> Result<Vec<Record>, SyncError> {
        Ok(self
            .stores
            .entities
            .list(&query.collection)
            .await?
            .into_iter()
            .filter(|r| r.id.is_local() && matches_query(r, query))
            .collect())
    }

    async fn local_page(&self, query: &CollectionQuery) -> Result<RecordsPage, SyncError> {
        let matching: Vec<Record> = self
            .stores
            .entities
            .list(&query.collection)
            .await?
            .into_iter()
            .filter(|r| matches_query(r, query))
            .collect();

        let size = query.page_size as usize;
        let start = (query.page as usize - 1).saturating_mul(size);
        let has_more = matching.len() > start.saturating_add(size);
        let records = matching.into_iter().skip(start).take(size).collect();

        Ok(RecordsPage {
            records,
            source: PageSource::Local,
            has_more,
        })
    }

    /// A single record, refreshed from the server when the local copy expired
    pub async fn get_record(
        &self,
        collection: &CollectionName,
        id: &RecordId,
    ) -> Result<Option<Record>, SyncError> {
        let id = self.stores.outbox.resolve_id(id).await?;
        let local = self.stores.entities.get(&id).await?;
        let live = |record: Record| (!record.tombstone).then_some(record);

        if local.is_fresh() || id.is_local() || !self.can_reach_server() {
            return Ok(local.any().and_then(live));
        }

        match self.api.fetch_one(collection, &id).await {
            Ok(remote) => {
                self.stores.entities.apply(collection, &remote).await?;
                Ok(self.stores.entities.get(&id).await?.any().and_then(live))
            }
            Err(err) if !local.is_missing() => {
                warn!(id = %id, error = %err, "Refresh failed, serving stale record");
                Ok(local.any().and_then(live))
            }
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Number of queued outbox items
    pub async fn pending_count(&self) -> Result<u64, SyncError> {
        Ok(self.stores.outbox.count().await?)
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Create or update a record
    #[tracing::instrument(skip(self, draft), fields(collection = %collection))]
    pub async fn save_record(&self, collection: &CollectionName, draft: RecordDraft) -> SaveOutcome {
        match self.try_save(collection, draft).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "Save failed locally");
                SaveOutcome::Failed(err)
            }
        }
    }

    async fn try_save(
        &self,
        collection: &CollectionName,
        draft: RecordDraft,
    ) -> Result<SaveOutcome, SyncError> {
        let id = match &draft.id {
            Some(id) => self.stores.outbox.resolve_id(id).await?,
            None => RecordId::generate_local(),
        };
        let previous = self.stores.entities.get(&id).await?.any();
        let has_pending = self.stores.outbox.has_pending_for(&id).await?;
        let changed: Vec<String> = draft.fields.keys().cloned().collect();

        let mut fields = previous
            .as_ref()
            .map(|p| p.fields.clone())
            .unwrap_or_default();
        fields.extend(draft.fields);

        let mut record = Record::new(
            id.clone(),
            Timestamp::next_after(previous.as_ref().map(|p| p.updated_at)),
            fields,
        );
        record.owner_id = draft
            .owner_id
            .or_else(|| previous.as_ref().and_then(|p| p.owner_id.clone()));

        self.stores.entities.apply(collection, &record).await?;
        self.invalidate(collection).await?;

        let is_create = id.is_local() && !has_pending;
        let payload = if is_create {
            record.to_payload()
        } else {
            record.to_partial_payload(&changed)
        };
        let queued_item = if is_create {
            NewOutboxItem::create(collection.clone(), id.clone(), payload.clone())
        } else {
            NewOutboxItem::update(collection.clone(), id.clone(), payload.clone())
        };

        if has_pending || !self.can_reach_server() {
            return self.enqueue(queued_item, None).await;
        }

        let sent = if is_create {
            self.api.create(collection, &payload).await
        } else {
            self.api.update(collection, &id, &payload).await
        };

        match sent {
            Ok(snapshot) => {
                store_server_snapshot(&self.stores, collection, Some(&id), &snapshot).await?;
                self.invalidate(collection).await?;
                info!(id = %snapshot.id, "Record saved");
                Ok(SaveOutcome::Saved(snapshot))
            }
            Err(err) => {
                info!(id = %id, error = %err, "Direct save failed, queued for sync");
                self.enqueue(queued_item, Some(err)).await
            }
        }
    }

    /// Delete a record locally and on the server
    #[tracing::instrument(skip(self), fields(collection = %collection))]
    pub async fn delete_record(&self, collection: &CollectionName, id: &RecordId) -> SaveOutcome {
        match self.try_delete(collection, id).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "Delete failed locally");
                SaveOutcome::Failed(err)
            }
        }
    }

    async fn try_delete(
        &self,
        collection: &CollectionName,
        id: &RecordId,
    ) -> Result<SaveOutcome, SyncError> {
        let id = self.stores.outbox.resolve_id(id).await?;
        let previous = self.stores.entities.get(&id).await?.any();
        let at = Timestamp::next_after(previous.as_ref().map(|p| p.updated_at));
        let has_pending = self.stores.outbox.has_pending_for(&id).await?;

        self.stores.entities.mark_deleted(&id, at).await?;
        self.invalidate(collection).await?;

        let queued_item = NewOutboxItem::delete(collection.clone(), id.clone());
        if has_pending || id.is_local() || !self.can_reach_server() {
            return self.enqueue(queued_item, None).await;
        }

        match self.api.delete(collection, &id).await {
            Ok(server_tombstone) => {
                self.stores.entities.remove(&id).await?;
                let tombstone = server_tombstone.unwrap_or_else(|| {
                    let base = previous.unwrap_or_else(|| Record::new(id.clone(), at, Map::new()));
                    base.into_tombstone(at)
                });
                info!(id = %id, "Record deleted");
                Ok(SaveOutcome::Saved(tombstone))
            }
            Err(err) => {
                info!(id = %id, error = %err, "Direct delete failed, queued for sync");
                self.enqueue(queued_item, Some(err)).await
            }
        }
    }

    /// Queue `item`; a validation failure from a direct attempt marks it
    /// rejected straight away
    async fn enqueue(
        &self,
        item: NewOutboxItem,
        failure: Option<SyncError>,
    ) -> Result<SaveOutcome, SyncError> {
        let mut queued = self.stores.outbox.enqueue(item).await?;

        if let Some(err) = failure {
            let message = err.to_string();
            let now = Timestamp::now();
            if matches!(err, SyncError::Validation { .. }) {
                self.stores.outbox.mark_rejected(queued.id, &message, now).await?;
                queued.rejected = true;
            } else {
                self.stores.outbox.bump_retry(queued.id, &message, now).await?;
            }
            queued.retry_count += 1;
            queued.last_error = Some(message);
            queued.last_attempt_at = Some(now);

            if queued.rejected {
                self.item_rejected.notify(&queued);
            }
        }

        Ok(SaveOutcome::Queued(queued))
    }
}

fn decode_cached(value: Value) -> Option<CachedPage> {
    serde_json::from_value(value).ok()
}

/// Client-side version of the server's search and filter semantics:
/// case-insensitive substring search over string fields, exact match on
/// filters
fn matches_query(record: &Record, query: &CollectionQuery) -> bool {
    if let Some(search) = &query.search {
        let needle = search.to_lowercase();
        let hit = record.fields.values().any(|value| match value {
            Value::String(s) => s.to_lowercase().contains(&needle),
            _ => false,
        });
        if !hit {
            return false;
        }
    }

    query.filters.iter().all(|(field, expected)| {
        match record.fields.get(field) {
            Some(Value::String(s)) => s == expected,
            Some(other) => other.to_string() == *expected,
            None => false,
        }
    })
}
