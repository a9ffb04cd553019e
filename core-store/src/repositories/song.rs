//! Song repository trait and implementation

use crate::error::{Result, StoreError};
use crate::models::{CachedSong, SyncState};
use crate::query::{BindValue, SongQuery};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const SONG_COLUMNS: &str = "id, title, artist, key_signature, tempo, tags, lyrics, chord_sheet, \
     access_count, last_accessed_at, is_favorite, file_size, checksum, \
     server_id, server_version, created_at, updated_at, sync_state, last_synced_at, version";

/// Song repository interface for the `songs` store
#[async_trait]
pub trait SongRepository: Send + Sync {
    /// Upsert a song by id (the store's `put`). Atomic per record.
    async fn upsert(&self, song: &CachedSong) -> Result<()>;

    /// Find a song by its id
    ///
    /// # Returns
    /// - `Ok(Some(song))` if found
    /// - `Ok(None)` if not found
    async fn find_by_id(&self, id: &str) -> Result<Option<CachedSong>>;

    /// Query songs with filtering, sorting and pagination
    async fn query(&self, query: &SongQuery) -> Result<Vec<CachedSong>>;

    /// Delete a song by id
    ///
    /// Idempotent; returns whether a row was removed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Remove every song. Used by replace-import and test teardown.
    async fn clear(&self) -> Result<u64>;

    /// Count all songs
    async fn count(&self) -> Result<u64>;

    /// Count songs in a given sync state
    async fn count_by_sync_state(&self, state: SyncState) -> Result<u64>;

    /// Total serialized bytes across all songs
    async fn total_bytes(&self) -> Result<u64>;

    /// Record a cache read: bump `access_count` and stamp `last_accessed_at`
    async fn record_access(&self, id: &str, now: i64) -> Result<()>;

    /// Least-recently-accessed songs not accessed after `protected_after`,
    /// never-accessed items ordered by creation time
    async fn find_eviction_candidates(
        &self,
        protected_after: i64,
        limit: u32,
    ) -> Result<Vec<CachedSong>>;

    /// Songs not updated since `cutoff` and not accessed after
    /// `protected_after` (the age sweep)
    async fn find_stale(&self, cutoff: i64, protected_after: i64) -> Result<Vec<CachedSong>>;
}

/// SQLite implementation of SongRepository
pub struct SqliteSongRepository {
    pool: SqlitePool,
}

impl SqliteSongRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Map a database row onto a `CachedSong`
pub(crate) fn row_to_song(row: &SqliteRow) -> Result<CachedSong> {
    let id: String = row.try_get("id")?;
    let tags_json: String = row.try_get("tags")?;
    let tags = serde_json::from_str(&tags_json).map_err(|e| StoreError::CorruptRecord {
        id: id.clone(),
        message: format!("tags column: {}", e),
    })?;

    let sync_state: String = row.try_get("sync_state")?;

    Ok(CachedSong {
        id,
        title: row.try_get("title")?,
        artist: row.try_get("artist")?,
        key_signature: row.try_get("key_signature")?,
        tempo: row.try_get("tempo")?,
        tags,
        lyrics: row.try_get("lyrics")?,
        chord_sheet: row.try_get("chord_sheet")?,
        access_count: row.try_get("access_count")?,
        last_accessed_at: row.try_get("last_accessed_at")?,
        is_favorite: row.try_get("is_favorite")?,
        file_size: row.try_get("file_size")?,
        checksum: row.try_get("checksum")?,
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
impl SongRepository for SqliteSongRepository {
    async fn upsert(&self, song: &CachedSong) -> Result<()> {
        song.validate().map_err(|e| StoreError::InvalidInput {
            field: "CachedSong".to_string(),
            message: e,
        })?;

        let tags_json = serde_json::to_string(&song.tags)?;

        sqlx::query(
            r#"
            INSERT INTO songs (
                id, title, artist, key_signature, tempo, tags, lyrics, chord_sheet,
                access_count, last_accessed_at, is_favorite, file_size, checksum,
                server_id, server_version, created_at, updated_at, sync_state,
                last_synced_at, version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                artist = excluded.artist,
                key_signature = excluded.key_signature,
                tempo = excluded.tempo,
                tags = excluded.tags,
                lyrics = excluded.lyrics,
                chord_sheet = excluded.chord_sheet,
                access_count = excluded.access_count,
                last_accessed_at = excluded.last_accessed_at,
                is_favorite = excluded.is_favorite,
                file_size = excluded.file_size,
                checksum = excluded.checksum,
                server_id = excluded.server_id,
                server_version = excluded.server_version,
                updated_at = excluded.updated_at,
                sync_state = excluded.sync_state,
                last_synced_at = excluded.last_synced_at,
                version = excluded.version
            "#,
        )
        .bind(&song.id)
        .bind(&song.title)
        .bind(&song.artist)
        .bind(&song.key_signature)
        .bind(song.tempo)
        .bind(&tags_json)
        .bind(&song.lyrics)
        .bind(&song.chord_sheet)
        .bind(song.access_count)
        .bind(song.last_accessed_at)
        .bind(song.is_favorite)
        .bind(song.file_size)
        .bind(&song.checksum)
        .bind(&song.server_id)
        .bind(song.server_version)
        .bind(song.created_at)
        .bind(song.updated_at)
        .bind(song.sync_state.as_str())
        .bind(song.last_synced_at)
        .bind(song.version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<CachedSong>> {
        let row = sqlx::query(&format!("SELECT {} FROM songs WHERE id = ?", SONG_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row_to_song(&row)?)),
            None => Ok(None),
        }
    }

    async fn query(&self, query: &SongQuery) -> Result<Vec<CachedSong>> {
        let spec = query.to_spec();
        let sql = format!("SELECT {} FROM songs{}", SONG_COLUMNS, spec.render_tail());

        let mut stmt = sqlx::query(&sql);
        for bind in &spec.binds {
            stmt = match bind {
                BindValue::Text(value) => stmt.bind(value),
                BindValue::I64(value) => stmt.bind(value),
            };
        }

        let rows = stmt.fetch_all(&self.pool).await?;

        let mut songs = Vec::with_capacity(rows.len());
        for row in rows {
            songs.push(row_to_song(&row)?);
        }

        Ok(songs)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM songs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM songs").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM songs")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    async fn count_by_sync_state(&self, state: SyncState) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM songs WHERE sync_state = ?")
            .bind(state.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    async fn total_bytes(&self) -> Result<u64> {
        let total: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(file_size), 0) FROM songs")
            .fetch_one(&self.pool)
            .await?;

        Ok(total.max(0) as u64)
    }

    async fn record_access(&self, id: &str, now: i64) -> Result<()> {
        sqlx::query(
            "UPDATE songs SET access_count = access_count + 1, last_accessed_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_eviction_candidates(
        &self,
        protected_after: i64,
        limit: u32,
    ) -> Result<Vec<CachedSong>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM songs
            WHERE COALESCE(last_accessed_at, 0) < ?
            ORDER BY COALESCE(last_accessed_at, created_at) ASC
            LIMIT ?
            "#,
            SONG_COLUMNS
        ))
        .bind(protected_after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut songs = Vec::with_capacity(rows.len());
        for row in rows {
            songs.push(row_to_song(&row)?);
        }

        Ok(songs)
    }

    async fn find_stale(&self, cutoff: i64, protected_after: i64) -> Result<Vec<CachedSong>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM songs
            WHERE updated_at < ? AND COALESCE(last_accessed_at, 0) < ?
            ORDER BY updated_at ASC
            "#,
            SONG_COLUMNS
        ))
        .bind(cutoff)
        .bind(protected_after)
        .fetch_all(&self.pool)
        .await?;

        let mut songs = Vec::with_capacity(rows.len());
        for row in rows {
            songs.push(row_to_song(&row)?);
        }

        Ok(songs)
    }
}
