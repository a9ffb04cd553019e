//! Metadata repository for quota/version bookkeeping
//!
//! The `store_meta` store is a small key/value table holding the schema
//! version and import backups. It is not an entity store; values are opaque
//! strings.

use crate::db::SCHEMA_VERSION;
use crate::error::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Key under which the schema version is recorded
pub const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Metadata repository interface for the `store_meta` store
#[async_trait]
pub trait MetaRepository: Send + Sync {
    /// Set a key to a value, replacing any previous value
    async fn set(&self, key: &str, value: &str, now: i64) -> Result<()>;

    /// Get a value by key
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Delete a key. Idempotent.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Read the recorded schema version (None before first stamp)
    async fn schema_version(&self) -> Result<Option<i64>>;

    /// Stamp the current schema version
    async fn stamp_schema_version(&self, now: i64) -> Result<()>;
}

/// SQLite implementation of MetaRepository
pub struct SqliteMetaRepository {
    pool: SqlitePool,
}

impl SqliteMetaRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetaRepository for SqliteMetaRepository {
    async fn set(&self, key: &str, value: &str, now: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO store_meta (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM store_meta WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM store_meta WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn schema_version(&self) -> Result<Option<i64>> {
        let value = self.get(SCHEMA_VERSION_KEY).await?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    async fn stamp_schema_version(&self, now: i64) -> Result<()> {
        self.set(SCHEMA_VERSION_KEY, &SCHEMA_VERSION.to_string(), now)
            .await
    }
}
