//! SQLite implementation of IOutboxStore
//!
//! Items live in the `outbox` table keyed by an AUTOINCREMENT sequence, so
//! ids are never reused and `ORDER BY seq` is enqueue order even across
//! restarts. The `id_map` table remembers which server id replaced each
//! locally generated one.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use tether_core::domain::{
    CollectionName, NewOutboxItem, OutboxId, OutboxItem, RecordId, Timestamp,
};
use tether_core::ports::IOutboxStore;

use crate::CacheError;

const SELECT_ITEM: &str = "SELECT seq, op_type, collection, target_record_id, payload, \
     enqueued_at, retry_count, last_error, last_attempt_at, rejected FROM outbox";

/// SQLite-backed outbox queue
pub struct SqliteOutboxStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl SqliteOutboxStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn item_from_row(row: &SqliteRow) -> Result<OutboxItem, CacheError> {
    let seq: i64 = row.try_get("seq")?;
    let op_type: String = row.try_get("op_type")?;
    let collection: String = row.try_get("collection")?;
    let target: Option<String> = row.try_get("target_record_id")?;
    let payload: String = row.try_get("payload")?;
    let enqueued_at: i64 = row.try_get("enqueued_at")?;
    let retry_count: i64 = row.try_get("retry_count")?;
    let last_error: Option<String> = row.try_get("last_error")?;
    let last_attempt_at: Option<i64> = row.try_get("last_attempt_at")?;
    let rejected: bool = row.try_get("rejected")?;

    Ok(OutboxItem {
        id: OutboxId::new(seq),
        op_type: op_type.parse()?,
        collection: CollectionName::new(collection)?,
        target_record_id: target.map(RecordId::new).transpose()?,
        payload: serde_json::from_str(&payload)?,
        enqueued_at: Timestamp::from_millis(enqueued_at),
        retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
        last_error,
        last_attempt_at: last_attempt_at.map(Timestamp::from_millis),
        rejected,
    })
}

// ============================================================================
// IOutboxStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IOutboxStore for SqliteOutboxStore {
    async fn enqueue(&self, item: NewOutboxItem) -> anyhow::Result<OutboxItem> {
        item.validate()?;
        let payload = serde_json::to_string(&item.payload)?;
        let enqueued_at = Timestamp::now();

        let _guard = self.write_lock.lock().await;
        let result = sqlx::query(
            "INSERT INTO outbox (op_type, collection, target_record_id, payload, enqueued_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(item.op_type.as_str())
        .bind(item.collection.as_str())
        .bind(item.target_record_id.as_ref().map(RecordId::as_str))
        .bind(payload)
        .bind(enqueued_at.as_millis())
        .execute(&self.pool)
        .await?;

        let queued = OutboxItem {
            id: OutboxId::new(result.last_insert_rowid()),
            op_type: item.op_type,
            collection: item.collection,
            target_record_id: item.target_record_id,
            payload: item.payload,
            enqueued_at,
            retry_count: 0,
            last_error: None,
            last_attempt_at: None,
            rejected: false,
        };

        tracing::debug!(
            id = %queued.id,
            op = %queued.op_type,
            collection = %queued.collection,
            target = ?queued.target_record_id.as_ref().map(RecordId::as_str),
            "Enqueued outbox item"
        );
        Ok(queued)
    }

    async fn peek_all(&self) -> anyhow::Result<Vec<OutboxItem>> {
        let rows = sqlx::query(&format!("{SELECT_ITEM} ORDER BY seq ASC"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(item_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    async fn get(&self, id: OutboxId) -> anyhow::Result<Option<OutboxItem>> {
        let row = sqlx::query(&format!("{SELECT_ITEM} WHERE seq = ?"))
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(item_from_row).transpose()?)
    }

    async fn remove(&self, id: OutboxId) -> anyhow::Result<bool> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM outbox WHERE seq = ?")
            .bind(id.value())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn bump_retry(&self, id: OutboxId, error: &str, at: Timestamp) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query(
            "UPDATE outbox SET retry_count = retry_count + 1, last_error = ?, last_attempt_at = ? \
             WHERE seq = ?",
        )
        .bind(error)
        .bind(at.as_millis())
        .bind(id.value())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_rejected(
        &self,
        id: OutboxId,
        error: &str,
        at: Timestamp,
    ) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query(
            "UPDATE outbox SET retry_count = retry_count + 1, last_error = ?, \
                last_attempt_at = ?, rejected = 1 \
             WHERE seq = ?",
        )
        .bind(error)
        .bind(at.as_millis())
        .bind(id.value())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset(&self, id: OutboxId) -> anyhow::Result<bool> {
        let _guard = self.write_lock.lock().await;
        let result =
            sqlx::query("UPDATE outbox SET rejected = 0, last_attempt_at = NULL WHERE seq = ?")
                .bind(id.value())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> anyhow::Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn has_pending_for(&self, record_id: &RecordId) -> anyhow::Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT seq FROM outbox WHERE target_record_id = ? LIMIT 1")
                .bind(record_id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn record_id_mapping(
        &self,
        local_id: &RecordId,
        server_id: &RecordId,
    ) -> anyhow::Result<u64> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO id_map (local_id, server_id, mapped_at) VALUES (?, ?, ?) \
             ON CONFLICT(local_id) DO UPDATE SET \
                server_id = excluded.server_id, mapped_at = excluded.mapped_at",
        )
        .bind(local_id.as_str())
        .bind(server_id.as_str())
        .bind(Timestamp::now().as_millis())
        .execute(&mut *tx)
        .await?;

        let redirected = sqlx::query("UPDATE outbox SET target_record_id = ? WHERE target_record_id = ?")
            .bind(server_id.as_str())
            .bind(local_id.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        tracing::info!(
            local_id = %local_id,
            server_id = %server_id,
            redirected,
            "Recorded server id mapping"
        );
        Ok(redirected)
    }

    async fn resolve_id(&self, id: &RecordId) -> anyhow::Result<RecordId> {
        let mapped: Option<String> =
            sqlx::query_scalar("SELECT server_id FROM id_map WHERE local_id = ?")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        match mapped {
            Some(server_id) => Ok(RecordId::new(server_id)?),
            None => Ok(id.clone()),
        }
    }
}
