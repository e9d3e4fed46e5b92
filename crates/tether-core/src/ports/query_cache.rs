//! Query-result cache port
//!
//! Short-lived cache of listing responses keyed by the canonical query
//! string (see `CollectionQuery::cache_key`). Entries carry their own TTL.

use std::time::Duration;

use serde_json::Value;

use crate::domain::CacheLookup;

/// Port trait for listing caches
#[async_trait::async_trait]
pub trait IQueryCache: Send + Sync {
    /// Store `value` under `key`, valid for `ttl`
    async fn put(&self, key: &str, value: &Value, ttl: Duration) -> anyhow::Result<()>;

    /// Read `key`; expired entries are returned as `Expired`, not deleted
    async fn get(&self, key: &str) -> anyhow::Result<CacheLookup<Value>>;

    /// Expire every entry whose key starts with `prefix`, keeping the
    /// values available as stale fallbacks. Returns the number touched.
    async fn invalidate(&self, prefix: &str) -> anyhow::Result<u64>;

    /// Delete every entry whose key starts with `prefix`
    async fn clear_all(&self, prefix: &str) -> anyhow::Result<u64>;
}
