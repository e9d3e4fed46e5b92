//! SQLite implementation of IQueryCache
//!
//! Each row stores the cached JSON value, the time it was written and the
//! time it stops being fresh. Invalidation zeroes `expires_at` and keeps
//! the value, so a later failed fetch can still fall back to it.

use std::time::Duration;

use serde_json::Value;
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use tether_core::domain::{CacheEntry, CacheLookup, Timestamp};
use tether_core::ports::IQueryCache;

/// SQLite-backed listing cache
pub struct SqliteQueryCache {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl SqliteQueryCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait::async_trait]
impl IQueryCache for SqliteQueryCache {
    async fn put(&self, key: &str, value: &Value, ttl: Duration) -> anyhow::Result<()> {
        let now = Timestamp::now();
        let expires_at = now.saturating_add(ttl);
        let json = serde_json::to_string(value)?;

        let _guard = self.write_lock.lock().await;
        sqlx::query(
            "INSERT INTO query_cache (cache_key, value, fetched_at, expires_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(cache_key) DO UPDATE SET \
                value = excluded.value, \
                fetched_at = excluded.fetched_at, \
                expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(json)
        .bind(now.as_millis())
        .bind(expires_at.as_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<CacheLookup<Value>> {
        let row = sqlx::query(
            "SELECT value, fetched_at, expires_at FROM query_cache WHERE cache_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(CacheLookup::Missing);
        };

        let json: String = row.try_get("value")?;
        let fetched_at: i64 = row.try_get("fetched_at")?;
        let expires_at: i64 = row.try_get("expires_at")?;
        let entry = CacheEntry::new(
            serde_json::from_str(&json)?,
            Timestamp::from_millis(fetched_at),
        );

        if Timestamp::now().as_millis() < expires_at {
            Ok(CacheLookup::Fresh(entry))
        } else {
            Ok(CacheLookup::Expired(entry))
        }
    }

    async fn invalidate(&self, prefix: &str) -> anyhow::Result<u64> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query(
            "UPDATE query_cache SET expires_at = 0 \
             WHERE substr(cache_key, 1, length(?)) = ? AND expires_at > 0",
        )
        .bind(prefix)
        .bind(prefix)
        .execute(&self.pool)
        .await?;

        let touched = result.rows_affected();
        if touched > 0 {
            tracing::debug!(prefix, touched, "Invalidated query cache entries");
        }
        Ok(touched)
    }

    async fn clear_all(&self, prefix: &str) -> anyhow::Result<u64> {
        let _guard = self.write_lock.lock().await;
        let result =
            sqlx::query("DELETE FROM query_cache WHERE substr(cache_key, 1, length(?)) = ?")
                .bind(prefix)
                .bind(prefix)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}
