//! Cursor store port

use crate::domain::{CollectionName, SyncCursor, Timestamp};

/// Port trait for per-collection pull cursors
#[async_trait::async_trait]
pub trait ICursorStore: Send + Sync {
    /// The cursor for `collection`, if a pull ever completed
    async fn get(&self, collection: &CollectionName) -> anyhow::Result<Option<SyncCursor>>;

    /// Advance the cursor to `to` unless it is already further; returns the
    /// stored cursor after the write
    async fn advance(&self, collection: &CollectionName, to: Timestamp)
        -> anyhow::Result<SyncCursor>;

    /// All stored cursors, ordered by collection name
    async fn list(&self) -> anyhow::Result<Vec<SyncCursor>>;

    /// Forget the cursor so the next pull fetches everything
    async fn reset(&self, collection: &CollectionName) -> anyhow::Result<bool>;
}
