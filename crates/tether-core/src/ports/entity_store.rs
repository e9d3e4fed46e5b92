//! Local entity store port
//!
//! Durable key-to-snapshot store holding the latest known version of every
//! record, whether it came from the server or from a local edit.
//!
//! ## Design Notes
//!
//! - Every write goes through the last-write-wins rule, so `updatedAt`
//!   never decreases for a given id whatever the write path.
//! - Reads classify entries against the store's TTL and return
//!   [`CacheLookup::Expired`] rather than dropping old snapshots.
//! - Implementations serialize writes behind a single lock per store.

use crate::domain::{CacheLookup, CollectionName, Record, RecordId, Timestamp};

/// What a last-write-wins upsert did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// No local copy existed; the record was stored
    Inserted,
    /// The incoming version won and replaced the local copy
    Updated,
    /// The local copy is newer; nothing changed
    Ignored,
    /// A tombstone removed the local copy
    Deleted,
}

impl ApplyOutcome {
    /// True if the store changed
    #[must_use]
    pub fn changed(&self) -> bool {
        !matches!(self, ApplyOutcome::Ignored)
    }
}

/// Port trait for the durable entity store
#[async_trait::async_trait]
pub trait IEntityStore: Send + Sync {
    /// Upsert `record` under last-write-wins (`incoming >= local` wins)
    ///
    /// A tombstoned record deletes the local copy instead of storing it.
    async fn apply(&self, collection: &CollectionName, record: &Record)
        -> anyhow::Result<ApplyOutcome>;

    /// Look up a record by id, classified against the store's TTL
    async fn get(&self, id: &RecordId) -> anyhow::Result<CacheLookup<Record>>;

    /// All live (non-tombstoned) records of a collection, newest first
    async fn list(&self, collection: &CollectionName) -> anyhow::Result<Vec<Record>>;

    /// Mark a record deleted locally, keeping the tombstone until the server confirms
    ///
    /// Returns false if the record is unknown or already newer than `at`.
    async fn mark_deleted(&self, id: &RecordId, at: Timestamp) -> anyhow::Result<bool>;

    /// Remove a record unconditionally
    async fn remove(&self, id: &RecordId) -> anyhow::Result<bool>;

    /// Replace the local copy stored under `old_id` by the server snapshot
    /// `record` (whose id is the server-assigned one), atomically
    async fn rekey(
        &self,
        old_id: &RecordId,
        collection: &CollectionName,
        record: &Record,
    ) -> anyhow::Result<()>;

    /// Number of stored records (tombstones included)
    async fn count(&self) -> anyhow::Result<u64>;
}
