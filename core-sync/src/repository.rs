//! Durable persistence for the sync queue
//!
//! The `sync_queue` store carries a monotonic `seq` column (AUTOINCREMENT)
//! so drain order is the enqueue order across all resources, regardless of
//! timestamp resolution.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::operation::{OperationId, OperationStatus, SyncOperation};

const OPERATION_COLUMNS: &str = "id, op_type, resource, resource_id, payload, status, \
     retry_count, max_retries, last_error, created_at, updated_at";

/// Repository trait for persisting the sync queue
#[async_trait]
pub trait SyncQueueRepository: Send + Sync {
    /// Insert an operation at the queue tail
    async fn insert(&self, operation: &SyncOperation) -> Result<()>;

    /// Update an operation's mutable fields
    async fn update(&self, operation: &SyncOperation) -> Result<()>;

    /// Find an operation by ID
    async fn find_by_id(&self, id: OperationId) -> Result<Option<SyncOperation>>;

    /// Get the next pending operation in enqueue order (FIFO across the
    /// whole queue; no per-resource reordering)
    async fn next_pending(&self) -> Result<Option<SyncOperation>>;

    /// Count operations by status
    async fn count_by_status(&self, status: OperationStatus) -> Result<u64>;

    /// Get all failed operations, oldest first
    async fn find_failed(&self) -> Result<Vec<SyncOperation>>;

    /// Flip failed operations back to pending with a fresh retry budget;
    /// returns the number reset
    async fn reset_failed(&self, now: i64) -> Result<u64>;

    /// Reset interrupted `syncing` operations back to `pending`.
    ///
    /// Called during initialization: an operation persisted as `syncing` was
    /// interrupted by a crash or shutdown, not confirmed.
    async fn reset_interrupted(&self, now: i64) -> Result<u64>;

    /// Delete terminal `completed` operations (housekeeping)
    async fn delete_completed(&self) -> Result<u64>;

    /// Delete every operation (destructive reset for logout/account switch)
    async fn delete_all(&self) -> Result<u64>;
}

/// SQLite implementation of the sync queue repository
pub struct SqliteSyncQueueRepository {
    pool: SqlitePool,
}

impl SqliteSyncQueueRepository {
    /// Create a new repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the queue store if it doesn't exist
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_queue (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                op_type TEXT NOT NULL,
                resource TEXT NOT NULL,
                resource_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL,
                last_error TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_sync_queue_status
            ON sync_queue(status, seq ASC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_operation(row: &SqliteRow) -> Result<SyncOperation> {
    let payload_json: String = row.try_get("payload")?;
    let payload = serde_json::from_str(&payload_json)
        .map_err(|e| SyncError::Payload(format!("stored payload: {}", e)))?;

    let resource: String = row.try_get("resource")?;

    Ok(SyncOperation {
        id: OperationId::from_string(&row.try_get::<String, _>("id")?)?,
        op_type: row.try_get::<String, _>("op_type")?.parse()?,
        resource: resource
            .parse()
            .map_err(|_| SyncError::InvalidResource(resource.clone()))?,
        resource_id: row.try_get("resource_id")?,
        payload,
        status: row.try_get::<String, _>("status")?.parse()?,
        retry_count: row.try_get::<i64, _>("retry_count")? as u32,
        max_retries: row.try_get::<i64, _>("max_retries")? as u32,
        last_error: row.try_get("last_error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl SyncQueueRepository for SqliteSyncQueueRepository {
    async fn insert(&self, operation: &SyncOperation) -> Result<()> {
        let payload_json = serde_json::to_string(&operation.payload)
            .map_err(|e| SyncError::Payload(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO sync_queue (
                id, op_type, resource, resource_id, payload, status,
                retry_count, max_retries, last_error, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(operation.id.as_str())
        .bind(operation.op_type.as_str())
        .bind(operation.resource.as_str())
        .bind(&operation.resource_id)
        .bind(&payload_json)
        .bind(operation.status.as_str())
        .bind(operation.retry_count as i64)
        .bind(operation.max_retries as i64)
        .bind(&operation.last_error)
        .bind(operation.created_at)
        .bind(operation.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, operation: &SyncOperation) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sync_queue SET
                status = ?,
                retry_count = ?,
                last_error = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(operation.status.as_str())
        .bind(operation.retry_count as i64)
        .bind(&operation.last_error)
        .bind(operation.updated_at)
        .bind(operation.id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: OperationId) -> Result<Option<SyncOperation>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM sync_queue WHERE id = ?",
            OPERATION_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_operation(&row)?)),
            None => Ok(None),
        }
    }

    async fn next_pending(&self) -> Result<Option<SyncOperation>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM sync_queue
            WHERE status = 'pending'
            ORDER BY seq ASC
            LIMIT 1
            "#,
            OPERATION_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_operation(&row)?)),
            None => Ok(None),
        }
    }

    async fn count_by_status(&self, status: OperationStatus) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    async fn find_failed(&self) -> Result<Vec<SyncOperation>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM sync_queue
            WHERE status = 'failed'
            ORDER BY seq ASC
            "#,
            OPERATION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut operations = Vec::with_capacity(rows.len());
        for row in rows {
            operations.push(row_to_operation(&row)?);
        }

        Ok(operations)
    }

    async fn reset_failed(&self, now: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sync_queue
            SET status = 'pending', retry_count = 0, updated_at = ?
            WHERE status = 'failed'
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn reset_interrupted(&self, now: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sync_queue
            SET status = 'pending', updated_at = ?
            WHERE status = 'syncing'
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        let reset = result.rows_affected();
        if reset > 0 {
            info!(reset, "Reset interrupted sync operations to pending");
        }

        Ok(reset)
    }

    async fn delete_completed(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sync_queue WHERE status = 'completed'")
            .execute(&self.pool)
            .await?;

        debug!(deleted = result.rows_affected(), "Pruned completed operations");
        Ok(result.rows_affected())
    }

    async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sync_queue")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationType;
    use bridge_traits::remote::ResourceKind;
    use serde_json::json;

    async fn setup() -> SqliteSyncQueueRepository {
        // One connection: an in-memory database is per-connection
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let repo = SqliteSyncQueueRepository::new(pool);
        repo.initialize().await.unwrap();
        repo
    }

    fn op(resource_id: &str, now: i64) -> SyncOperation {
        SyncOperation::new(
            OperationType::Create,
            ResourceKind::Song,
            resource_id,
            json!({"title": resource_id}),
            3,
            now,
        )
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = setup().await;

        let operation = op("s1", 1000);
        repo.insert(&operation).await.unwrap();

        let found = repo.find_by_id(operation.id).await.unwrap().unwrap();
        assert_eq!(found, operation);
    }

    #[tokio::test]
    async fn test_next_pending_is_fifo_across_resources() {
        let repo = setup().await;

        // Same created_at on purpose; seq must break the tie
        let a = op("a", 1000);
        let mut b = op("b", 1000);
        b.resource = ResourceKind::Setlist;
        let c = op("c", 1000);

        repo.insert(&a).await.unwrap();
        repo.insert(&b).await.unwrap();
        repo.insert(&c).await.unwrap();

        let next = repo.next_pending().await.unwrap().unwrap();
        assert_eq!(next.id, a.id);
    }

    #[tokio::test]
    async fn test_update_round_trip() {
        let repo = setup().await;

        let mut operation = op("s1", 1000);
        repo.insert(&operation).await.unwrap();

        operation.start_syncing(1001).unwrap();
        operation.fail("boom", 1002).unwrap();
        repo.update(&operation).await.unwrap();

        let found = repo.find_by_id(operation.id).await.unwrap().unwrap();
        assert_eq!(found.status, OperationStatus::Pending);
        assert_eq!(found.retry_count, 1);
        assert_eq!(found.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_reset_interrupted() {
        let repo = setup().await;

        let mut operation = op("s1", 1000);
        operation.start_syncing(1001).unwrap();
        repo.insert(&operation).await.unwrap();

        let reset = repo.reset_interrupted(2000).await.unwrap();
        assert_eq!(reset, 1);

        let found = repo.find_by_id(operation.id).await.unwrap().unwrap();
        assert_eq!(found.status, OperationStatus::Pending);
    }

    #[tokio::test]
    async fn test_delete_completed_keeps_pending_and_failed() {
        let repo = setup().await;

        let mut done = op("done", 1000);
        done.start_syncing(1001).unwrap();
        done.complete(1002).unwrap();
        repo.insert(&done).await.unwrap();

        let pending = op("pending", 1000);
        repo.insert(&pending).await.unwrap();

        let mut failed = op("failed", 1000);
        failed.max_retries = 1;
        failed.start_syncing(1001).unwrap();
        failed.fail("x", 1002).unwrap();
        repo.insert(&failed).await.unwrap();

        assert_eq!(repo.delete_completed().await.unwrap(), 1);
        assert_eq!(
            repo.count_by_status(OperationStatus::Pending).await.unwrap(),
            1
        );
        assert_eq!(
            repo.count_by_status(OperationStatus::Failed).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_reset_failed_restores_budget() {
        let repo = setup().await;

        let mut failed = op("failed", 1000);
        failed.max_retries = 1;
        failed.start_syncing(1001).unwrap();
        failed.fail("x", 1002).unwrap();
        repo.insert(&failed).await.unwrap();

        assert_eq!(repo.reset_failed(2000).await.unwrap(), 1);

        let found = repo.find_by_id(failed.id).await.unwrap().unwrap();
        assert_eq!(found.status, OperationStatus::Pending);
        assert_eq!(found.retry_count, 0);
    }

    #[tokio::test]
    async fn test_delete_all() {
        let repo = setup().await;

        repo.insert(&op("a", 1000)).await.unwrap();
        repo.insert(&op("b", 1000)).await.unwrap();

        assert_eq!(repo.delete_all().await.unwrap(), 2);
        assert!(repo.next_pending().await.unwrap().is_none());
    }
}
