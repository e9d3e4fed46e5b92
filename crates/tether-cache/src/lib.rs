//! Tether Cache - durable local state
//!
//! SQLite-based persistence for:
//! - Record snapshots (`entities`) with last-write-wins upserts
//! - Listing caches (`query_cache`) with embedded expiry
//! - The outbox of pending mutations and the local/server id map
//! - Per-collection pull cursors
//!
//! ## Architecture
//!
//! This crate implements the storage ports of `tether-core`
//! (`IEntityStore`, `IQueryCache`, `IOutboxStore`, `ICursorStore`). It is a
//! driven (secondary) adapter in the hexagonal architecture.
//!
//! Each store serializes its writes behind one async mutex, so concurrent
//! writers (UI saves, the push channel, the orchestrator) never interleave
//! partially. Reads go straight to the pool.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use std::time::Duration;
//! use tether_cache::{DatabasePool, SqliteEntityStore, SqliteOutboxStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/tether/tether.db")).await?;
//! let entities = SqliteEntityStore::new(pool.pool().clone(), Duration::from_secs(1800));
//! let outbox = SqliteOutboxStore::new(pool.pool().clone());
//! # Ok(())
//! # }
//! ```

pub mod cursor_store;
pub mod entity_store;
pub mod outbox;
pub mod pool;
pub mod query_cache;

pub use cursor_store::SqliteCursorStore;
pub use entity_store::SqliteEntityStore;
pub use outbox::SqliteOutboxStore;
pub use pool::DatabasePool;
pub use query_cache::SqliteQueryCache;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}

impl From<tether_core::domain::DomainError> for CacheError {
    fn from(e: tether_core::domain::DomainError) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}
