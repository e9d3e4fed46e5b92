//! Domain entities and invariants
//!
//! This module contains the core domain types of the sync engine:
//! - Newtypes for identifiers and timestamps
//! - Records and their last-write-wins ordering
//! - Outbox items (pending mutations)
//! - Sync cursors, cache entries and listing queries
//! - Domain-specific error types

pub mod cache_entry;
pub mod connectivity;
pub mod cursor;
pub mod errors;
pub mod newtypes;
pub mod outbox;
pub mod query;
pub mod record;

// Re-export commonly used types
pub use cache_entry::{CacheEntry, CacheLookup};
pub use connectivity::ConnectivityStatus;
pub use cursor::SyncCursor;
pub use errors::DomainError;
pub use newtypes::*;
pub use outbox::{NewOutboxItem, OpType, OutboxItem};
pub use query::CollectionQuery;
pub use record::Record;
