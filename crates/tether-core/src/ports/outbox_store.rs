//! Outbox store port
//!
//! Durable, append-only ordered log of pending mutations, plus the table
//! mapping locally generated ids to the ids the server assigned on create.
//!
//! ## Design Notes
//!
//! - `enqueue` never touches the network.
//! - `peek_all` returns items in enqueue order.
//! - Items are removed only by `remove` (server acceptance or human discard).
//! - There is no automatic eviction: `bump_retry` only counts failures.

use crate::domain::{NewOutboxItem, OutboxId, OutboxItem, RecordId, Timestamp};

/// Port trait for the outbox queue
#[async_trait::async_trait]
pub trait IOutboxStore: Send + Sync {
    /// Append a mutation; assigns its id and enqueue time
    async fn enqueue(&self, item: NewOutboxItem) -> anyhow::Result<OutboxItem>;

    /// Every queued item in enqueue order
    async fn peek_all(&self) -> anyhow::Result<Vec<OutboxItem>>;

    /// A single item by id
    async fn get(&self, id: OutboxId) -> anyhow::Result<Option<OutboxItem>>;

    /// Remove an item; returns false if it was not queued
    async fn remove(&self, id: OutboxId) -> anyhow::Result<bool>;

    /// Record a failed attempt: increments `retry_count`, stores the error
    async fn bump_retry(&self, id: OutboxId, error: &str, at: Timestamp) -> anyhow::Result<()>;

    /// Record a failed attempt the server will never accept as-is
    async fn mark_rejected(&self, id: OutboxId, error: &str, at: Timestamp)
        -> anyhow::Result<()>;

    /// Clear the rejected flag and attempt time so the item is retried next sync
    async fn reset(&self, id: OutboxId) -> anyhow::Result<bool>;

    /// Number of queued items
    async fn count(&self) -> anyhow::Result<u64>;

    /// True if any queued item targets `record_id`
    async fn has_pending_for(&self, record_id: &RecordId) -> anyhow::Result<bool>;

    /// Persist `local_id -> server_id` and point queued items at the server id
    ///
    /// Returns the number of queued items redirected.
    async fn record_id_mapping(
        &self,
        local_id: &RecordId,
        server_id: &RecordId,
    ) -> anyhow::Result<u64>;

    /// Resolve an id through the mapping table (identity if unmapped)
    async fn resolve_id(&self, id: &RecordId) -> anyhow::Result<RecordId>;
}
