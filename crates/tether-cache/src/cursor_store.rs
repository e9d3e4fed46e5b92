//! SQLite implementation of ICursorStore
//!
//! `advance` keeps the cursor monotonic in SQL (`MAX(old, new)`), so a late
//! writer can never move it backwards.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use tether_core::domain::{CollectionName, SyncCursor, Timestamp};
use tether_core::ports::ICursorStore;

use crate::CacheError;

pub struct SqliteCursorStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl SqliteCursorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }
}

fn cursor_from_row(row: &SqliteRow) -> Result<SyncCursor, CacheError> {
    let collection: String = row.try_get("collection")?;
    let last_sync_at: i64 = row.try_get("last_sync_at")?;
    Ok(SyncCursor {
        collection: CollectionName::new(collection)?,
        last_sync_at: Timestamp::from_millis(last_sync_at),
    })
}

#[async_trait::async_trait]
impl ICursorStore for SqliteCursorStore {
    async fn get(&self, collection: &CollectionName) -> anyhow::Result<Option<SyncCursor>> {
        let row = sqlx::query("SELECT collection, last_sync_at FROM cursors WHERE collection = ?")
            .bind(collection.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(cursor_from_row).transpose()?)
    }

    async fn advance(
        &self,
        collection: &CollectionName,
        to: Timestamp,
    ) -> anyhow::Result<SyncCursor> {
        let _guard = self.write_lock.lock().await;
        sqlx::query(
            "INSERT INTO cursors (collection, last_sync_at, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(collection) DO UPDATE SET \
                last_sync_at = MAX(cursors.last_sync_at, excluded.last_sync_at), \
                updated_at = excluded.updated_at",
        )
        .bind(collection.as_str())
        .bind(to.as_millis())
        .bind(Timestamp::now().as_millis())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT collection, last_sync_at FROM cursors WHERE collection = ?")
            .bind(collection.as_str())
            .fetch_one(&self.pool)
            .await?;
        let cursor = cursor_from_row(&row)?;

        tracing::debug!(
            collection = %collection,
            last_sync_at = cursor.last_sync_at.as_millis(),
            "Cursor advanced"
        );
        Ok(cursor)
    }

    async fn list(&self) -> anyhow::Result<Vec<SyncCursor>> {
        let rows = sqlx::query("SELECT collection, last_sync_at FROM cursors ORDER BY collection")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(cursor_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    async fn reset(&self, collection: &CollectionName) -> anyhow::Result<bool> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM cursors WHERE collection = ?")
            .bind(collection.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
