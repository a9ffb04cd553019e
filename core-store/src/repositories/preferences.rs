//! User preferences repository trait and implementation

use crate::error::{Result, StoreError};
use crate::models::UserPreferences;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// Preferences repository interface for the `preferences` store
#[async_trait]
pub trait PreferencesRepository: Send + Sync {
    /// Upsert a user's preferences (the store's `put`). Atomic per record.
    async fn upsert(&self, prefs: &UserPreferences) -> Result<()>;

    /// Find preferences by user id
    async fn find_by_user(&self, user_id: &str) -> Result<Option<UserPreferences>>;

    /// Return all stored preference records
    async fn find_all(&self) -> Result<Vec<UserPreferences>>;

    /// Delete a user's preferences. Idempotent.
    async fn delete(&self, user_id: &str) -> Result<bool>;

    /// Remove every record
    async fn clear(&self) -> Result<u64>;

    /// Count stored records
    async fn count(&self) -> Result<u64>;
}

/// SQLite implementation of PreferencesRepository
pub struct SqlitePreferencesRepository {
    pool: SqlitePool,
}

impl SqlitePreferencesRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_preferences(row: &SqliteRow) -> Result<UserPreferences> {
    let sync_state: String = row.try_get("sync_state")?;

    Ok(UserPreferences {
        user_id: row.try_get("user_id")?,
        theme: row.try_get("theme")?,
        font_size: row.try_get("font_size")?,
        show_chords: row.try_get("show_chords")?,
        auto_sync: row.try_get("auto_sync")?,
        sync_on_cellular: row.try_get("sync_on_cellular")?,
        default_export_format: row.try_get("default_export_format")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        sync_state: sync_state.parse()?,
        last_synced_at: row.try_get("last_synced_at")?,
        version: row.try_get("version")?,
    })
}

#[async_trait]
impl PreferencesRepository for SqlitePreferencesRepository {
    async fn upsert(&self, prefs: &UserPreferences) -> Result<()> {
        prefs.validate().map_err(|e| StoreError::InvalidInput {
            field: "UserPreferences".to_string(),
            message: e,
        })?;

        sqlx::query(
            r#"
            INSERT INTO preferences (
                user_id, theme, font_size, show_chords, auto_sync, sync_on_cellular,
                default_export_format, created_at, updated_at, sync_state,
                last_synced_at, version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                theme = excluded.theme,
                font_size = excluded.font_size,
                show_chords = excluded.show_chords,
                auto_sync = excluded.auto_sync,
                sync_on_cellular = excluded.sync_on_cellular,
                default_export_format = excluded.default_export_format,
                updated_at = excluded.updated_at,
                sync_state = excluded.sync_state,
                last_synced_at = excluded.last_synced_at,
                version = excluded.version
            "#,
        )
        .bind(&prefs.user_id)
        .bind(&prefs.theme)
        .bind(prefs.font_size)
        .bind(prefs.show_chords)
        .bind(prefs.auto_sync)
        .bind(prefs.sync_on_cellular)
        .bind(&prefs.default_export_format)
        .bind(prefs.created_at)
        .bind(prefs.updated_at)
        .bind(prefs.sync_state.as_str())
        .bind(prefs.last_synced_at)
        .bind(prefs.version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_user(&self, user_id: &str) -> Result<Option<UserPreferences>> {
        let row = sqlx::query("SELECT * FROM preferences WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row_to_preferences(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_all(&self) -> Result<Vec<UserPreferences>> {
        let rows = sqlx::query("SELECT * FROM preferences ORDER BY user_id ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut all = Vec::with_capacity(rows.len());
        for row in rows {
            all.push(row_to_preferences(&row)?);
        }

        Ok(all)
    }

    async fn delete(&self, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM preferences WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM preferences")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM preferences")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }
}
