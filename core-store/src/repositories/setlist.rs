//! Setlist repository trait and implementation
//!
//! Setlist items live in a JSON column on the setlist row so a single upsert
//! stays atomic; there is no join table to keep in step.

use crate::error::{Result, StoreError};
use crate::models::{CachedSetlist, SyncState};
use crate::query::{BindValue, SetlistQuery};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const SETLIST_COLUMNS: &str = "id, name, songs, is_public, share_token, usage_count, last_used_at, \
     created_by, server_id, server_version, created_at, updated_at, sync_state, \
     last_synced_at, version";

/// Setlist repository interface for the `setlists` store
#[async_trait]
pub trait SetlistRepository: Send + Sync {
    /// Upsert a setlist by id (the store's `put`). Atomic per record.
    async fn upsert(&self, setlist: &CachedSetlist) -> Result<()>;

    /// Find a setlist by its id
    async fn find_by_id(&self, id: &str) -> Result<Option<CachedSetlist>>;

    /// Query setlists with filtering, sorting and pagination
    async fn query(&self, query: &SetlistQuery) -> Result<Vec<CachedSetlist>>;

    /// Delete a setlist by id. Idempotent; returns whether a row was removed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Remove every setlist
    async fn clear(&self) -> Result<u64>;

    /// Count all setlists
    async fn count(&self) -> Result<u64>;

    /// Count setlists in a given sync state
    async fn count_by_sync_state(&self, state: SyncState) -> Result<u64>;

    /// Approximate stored bytes (length of the serialized item column)
    async fn total_bytes(&self) -> Result<u64>;

    /// Record a use: bump `usage_count` and stamp `last_used_at`
    async fn record_use(&self, id: &str, now: i64) -> Result<()>;

    /// Setlists not updated since `cutoff` and not used after
    /// `protected_after` (the age sweep)
    async fn find_stale(&self, cutoff: i64, protected_after: i64) -> Result<Vec<CachedSetlist>>;
}

/// SQLite implementation of SetlistRepository
pub struct SqliteSetlistRepository {
    pool: SqlitePool,
}

impl SqliteSetlistRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Map a database row onto a `CachedSetlist`
pub(crate) fn row_to_setlist(row: &SqliteRow) -> Result<CachedSetlist> {
    let id: String = row.try_get("id")?;
    let songs_json: String = row.try_get("songs")?;
    let songs = serde_json::from_str(&songs_json).map_err(|e| StoreError::CorruptRecord {
        id: id.clone(),
        message: format!("songs column: {}", e),
    })?;

    let sync_state: String = row.try_get("sync_state")?;

    Ok(CachedSetlist {
        id,
        name: row.try_get("name")?,
        songs,
        is_public: row.try_get("is_public")?,
        share_token: row.try_get("share_token")?,
        usage_count: row.try_get("usage_count")?,
        last_used_at: row.try_get("last_used_at")?,
        created_by: row.try_get("created_by")?,
        server_id: row.try_get("server_id")?,
        server_version: row.try_get("server_version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        sync_state: sync_state.parse()?,
        last_synced_at: row.try_get("last_synced_at")?,
        version: row.try_get("version")?,
    })
}

#[async_trait]
impl SetlistRepository for SqliteSetlistRepository {
    async fn upsert(&self, setlist: &CachedSetlist) -> Result<()> {
        setlist.validate().map_err(|e| StoreError::InvalidInput {
            field: "CachedSetlist".to_string(),
            message: e,
        })?;

        let songs_json = serde_json::to_string(&setlist.songs)?;

        sqlx::query(
            r#"
            INSERT INTO setlists (
                id, name, songs, is_public, share_token, usage_count, last_used_at,
                created_by, server_id, server_version, created_at, updated_at,
                sync_state, last_synced_at, version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                songs = excluded.songs,
                is_public = excluded.is_public,
                share_token = excluded.share_token,
                usage_count = excluded.usage_count,
                last_used_at = excluded.last_used_at,
                created_by = excluded.created_by,
                server_id = excluded.server_id,
                server_version = excluded.server_version,
                updated_at = excluded.updated_at,
                sync_state = excluded.sync_state,
                last_synced_at = excluded.last_synced_at,
                version = excluded.version
            "#,
        )
        .bind(&setlist.id)
        .bind(&setlist.name)
        .bind(&songs_json)
        .bind(setlist.is_public)
        .bind(&setlist.share_token)
        .bind(setlist.usage_count)
        .bind(setlist.last_used_at)
        .bind(&setlist.created_by)
        .bind(&setlist.server_id)
        .bind(setlist.server_version)
        .bind(setlist.created_at)
        .bind(setlist.updated_at)
        .bind(setlist.sync_state.as_str())
        .bind(setlist.last_synced_at)
        .bind(setlist.version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<CachedSetlist>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM setlists WHERE id = ?",
            SETLIST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_setlist(&row)?)),
            None => Ok(None),
        }
    }

    async fn query(&self, query: &SetlistQuery) -> Result<Vec<CachedSetlist>> {
        let spec = query.to_spec();
        let sql = format!(
            "SELECT {} FROM setlists{}",
            SETLIST_COLUMNS,
            spec.render_tail()
        );

        let mut stmt = sqlx::query(&sql);
        for bind in &spec.binds {
            stmt = match bind {
                BindValue::Text(value) => stmt.bind(value),
                BindValue::I64(value) => stmt.bind(value),
            };
        }

        let rows = stmt.fetch_all(&self.pool).await?;

        let mut setlists = Vec::with_capacity(rows.len());
        for row in rows {
            setlists.push(row_to_setlist(&row)?);
        }

        Ok(setlists)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM setlists WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM setlists")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM setlists")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    async fn count_by_sync_state(&self, state: SyncState) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM setlists WHERE sync_state = ?")
                .bind(state.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(count as u64)
    }

    async fn total_bytes(&self) -> Result<u64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(LENGTH(songs) + LENGTH(name)), 0) FROM setlists",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(total.max(0) as u64)
    }

    async fn record_use(&self, id: &str, now: i64) -> Result<()> {
        sqlx::query(
            "UPDATE setlists SET usage_count = usage_count + 1, last_used_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_stale(&self, cutoff: i64, protected_after: i64) -> Result<Vec<CachedSetlist>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM setlists
            WHERE updated_at < ? AND COALESCE(last_used_at, 0) < ?
            ORDER BY updated_at ASC
            "#,
            SETLIST_COLUMNS
        ))
        .bind(cutoff)
        .bind(protected_after)
        .fetch_all(&self.pool)
        .await?;

        let mut setlists = Vec::with_capacity(rows.len());
        for row in rows {
            setlists.push(row_to_setlist(&row)?);
        }

        Ok(setlists)
    }
}
