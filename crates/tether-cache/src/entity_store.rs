//! SQLite implementation of IEntityStore
//!
//! ## Type Mapping
//!
//! | Domain Type     | SQL Type | Strategy                              |
//! |-----------------|----------|---------------------------------------|
//! | RecordId        | TEXT     | `.as_str()` / `RecordId::new()`       |
//! | CollectionName  | TEXT     | `.as_str()` / `CollectionName::new()` |
//! | Timestamp       | INTEGER  | milliseconds since epoch              |
//! | fields (Map)    | TEXT     | serde_json object                     |
//! | tombstone       | INTEGER  | 0 / 1                                 |
//!
//! `fetched_at` is the local time of the last write and drives the TTL
//! classification in [`IEntityStore::get`].

use std::time::Duration;

use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tokio::sync::Mutex;

use tether_core::domain::{
    CacheEntry, CacheLookup, CollectionName, Record, RecordId, Timestamp,
};
use tether_core::ports::{ApplyOutcome, IEntityStore};

use crate::CacheError;

/// SQLite-backed store of record snapshots
pub struct SqliteEntityStore {
    pool: SqlitePool,
    ttl: Duration,
    write_lock: Mutex<()>,
}

impl SqliteEntityStore {
    /// Create a store whose snapshots stay fresh for `ttl`
    pub fn new(pool: SqlitePool, ttl: Duration) -> Self {
        Self {
            pool,
            ttl,
            write_lock: Mutex::new(()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn record_from_row(row: &SqliteRow) -> Result<CacheEntry<Record>, CacheError> {
    let id: String = row.try_get("id")?;
    let owner_id: Option<String> = row.try_get("owner_id")?;
    let fields_json: String = row.try_get("fields")?;
    let updated_at: i64 = row.try_get("updated_at")?;
    let tombstone: bool = row.try_get("tombstone")?;
    let fetched_at: i64 = row.try_get("fetched_at")?;

    let fields: Map<String, Value> = serde_json::from_str(&fields_json)?;
    let record = Record {
        id: RecordId::new(id)?,
        owner_id,
        updated_at: Timestamp::from_millis(updated_at),
        tombstone,
        fields,
    };
    Ok(CacheEntry::new(record, Timestamp::from_millis(fetched_at)))
}

/// Last-write-wins upsert inside an open transaction
async fn apply_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    collection: &CollectionName,
    record: &Record,
    now: Timestamp,
) -> Result<ApplyOutcome, CacheError> {
    let existing: Option<i64> = sqlx::query_scalar("SELECT updated_at FROM entities WHERE id = ?")
        .bind(record.id.as_str())
        .fetch_optional(&mut **tx)
        .await?;

    if record.tombstone {
        return match existing {
            Some(local) if record.updated_at.as_millis() >= local => {
                sqlx::query("DELETE FROM entities WHERE id = ?")
                    .bind(record.id.as_str())
                    .execute(&mut **tx)
                    .await?;
                Ok(ApplyOutcome::Deleted)
            }
            _ => Ok(ApplyOutcome::Ignored),
        };
    }

    let outcome = match existing {
        None => ApplyOutcome::Inserted,
        Some(local) if record.updated_at.as_millis() >= local => ApplyOutcome::Updated,
        Some(_) => return Ok(ApplyOutcome::Ignored),
    };

    let fields = serde_json::to_string(&record.fields)?;
    sqlx::query(
        "INSERT INTO entities (id, collection, owner_id, fields, updated_at, tombstone, fetched_at) \
         VALUES (?, ?, ?, ?, ?, 0, ?) \
         ON CONFLICT(id) DO UPDATE SET \
            collection = excluded.collection, \
            owner_id = excluded.owner_id, \
            fields = excluded.fields, \
            updated_at = excluded.updated_at, \
            tombstone = 0, \
            fetched_at = excluded.fetched_at",
    )
    .bind(record.id.as_str())
    .bind(collection.as_str())
    .bind(record.owner_id.as_deref())
    .bind(fields)
    .bind(record.updated_at.as_millis())
    .bind(now.as_millis())
    .execute(&mut **tx)
    .await?;

    Ok(outcome)
}

// ============================================================================
// IEntityStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IEntityStore for SqliteEntityStore {
    async fn apply(
        &self,
        collection: &CollectionName,
        record: &Record,
    ) -> anyhow::Result<ApplyOutcome> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let outcome = apply_in_tx(&mut tx, collection, record, Timestamp::now()).await?;
        tx.commit().await?;

        tracing::trace!(
            id = %record.id,
            collection = %collection,
            updated_at = record.updated_at.as_millis(),
            outcome = ?outcome,
            "Applied record"
        );
        Ok(outcome)
    }

    async fn get(&self, id: &RecordId) -> anyhow::Result<CacheLookup<Record>> {
        let row = sqlx::query("SELECT * FROM entities WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(record_from_row(&row)?.classify(Timestamp::now(), self.ttl)),
            None => Ok(CacheLookup::Missing),
        }
    }

    async fn list(&self, collection: &CollectionName) -> anyhow::Result<Vec<Record>> {
        let rows = sqlx::query(
            "SELECT * FROM entities WHERE collection = ? AND tombstone = 0 \
             ORDER BY updated_at DESC, id ASC",
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| record_from_row(row).map(|entry| entry.value))
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    async fn mark_deleted(&self, id: &RecordId, at: Timestamp) -> anyhow::Result<bool> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query(
            "UPDATE entities SET tombstone = 1, updated_at = ?, fetched_at = ? \
             WHERE id = ? AND updated_at <= ?",
        )
        .bind(at.as_millis())
        .bind(Timestamp::now().as_millis())
        .bind(id.as_str())
        .bind(at.as_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove(&self, id: &RecordId) -> anyhow::Result<bool> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM entities WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn rekey(
        &self,
        old_id: &RecordId,
        collection: &CollectionName,
        record: &Record,
    ) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        if old_id != &record.id {
            sqlx::query("DELETE FROM entities WHERE id = ?")
                .bind(old_id.as_str())
                .execute(&mut *tx)
                .await?;
        }
        let outcome = apply_in_tx(&mut tx, collection, record, Timestamp::now()).await?;
        tx.commit().await?;

        tracing::debug!(
            old_id = %old_id,
            new_id = %record.id,
            outcome = ?outcome,
            "Re-keyed local record"
        );
        Ok(())
    }

    async fn count(&self) -> anyhow::Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entities")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}
