//! # Sync Queue
//!
//! Drains queued mutations against the remote API, strictly in enqueue
//! order, with bounded retry. A drain pass is exclusive: a second caller
//! waits for the running pass to finish (and then typically finds the queue
//! empty). An in-flight remote call always resolves before queue state is
//! updated; connectivity loss stops a pass *between* operations, never in
//! the middle of one.

use std::sync::Arc;
use std::time::Duration;

use bridge_traits::remote::RemoteApi;
use bridge_traits::time::Clock;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::operation::{OperationId, OperationStatus, OperationType, SyncOperation};
use crate::repository::SyncQueueRepository;

/// Queue tuning knobs
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Attempt bound stamped onto newly enqueued operations
    pub max_retries: u32,
    /// Base delay before retrying a failed operation
    pub retry_base_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

/// Result of one drain pass
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DrainSummary {
    /// Operations applied to the remote during this pass
    pub completed: u64,
    /// Operations that exhausted their retries during this pass
    pub failed: u64,
    /// Retryable failures recorded during this pass
    pub retried: u64,
    /// Pending operations left when the pass stopped
    pub remaining: u64,
}

/// Per-status queue counts
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub syncing: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.syncing + self.completed + self.failed
    }

    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.syncing == 0
    }
}

/// Durable, ordered queue of pending mutations against remote resources
pub struct SyncQueue {
    repository: Arc<dyn SyncQueueRepository>,
    remote: Arc<dyn RemoteApi>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    drain_lock: Mutex<()>,
    config: QueueConfig,
}

impl SyncQueue {
    /// Create a new sync queue
    pub fn new(
        repository: Arc<dyn SyncQueueRepository>,
        remote: Arc<dyn RemoteApi>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
        config: QueueConfig,
    ) -> Self {
        Self {
            repository,
            remote,
            clock,
            event_bus,
            drain_lock: Mutex::new(()),
            config,
        }
    }

    /// Recover queue state after a restart: interrupted `syncing` operations
    /// were never confirmed and go back to `pending`.
    pub async fn recover(&self) -> Result<u64> {
        self.repository
            .reset_interrupted(self.clock.unix_timestamp())
            .await
    }

    /// Enqueue a mutation with a payload snapshot.
    ///
    /// The enqueue itself never talks to the network; the caller's save has
    /// already succeeded locally by the time this runs.
    #[instrument(skip(self, payload))]
    pub async fn enqueue(
        &self,
        op_type: OperationType,
        resource: bridge_traits::remote::ResourceKind,
        resource_id: &str,
        payload: serde_json::Value,
    ) -> Result<OperationId> {
        let operation = SyncOperation::new(
            op_type,
            resource,
            resource_id,
            payload,
            self.config.max_retries,
            self.clock.unix_timestamp(),
        );

        info!(
            operation_id = %operation.id,
            op_type = op_type.as_str(),
            resource = resource.as_str(),
            resource_id,
            "Enqueuing sync operation"
        );

        self.repository.insert(&operation).await?;
        Ok(operation.id)
    }

    /// Drain the queue until it is empty or `should_continue` reports false.
    ///
    /// Only one pass runs at a time; concurrent callers serialize on the
    /// drain lock. The gate is consulted between operations only.
    #[instrument(skip(self, should_continue))]
    pub async fn drain_gated<F>(&self, should_continue: F) -> Result<DrainSummary>
    where
        F: Fn() -> bool + Send,
    {
        let _guard = self.drain_lock.lock().await;
        let mut summary = DrainSummary::default();

        loop {
            if !should_continue() {
                debug!("Drain gate closed; stopping after in-flight operation");
                break;
            }

            let Some(mut operation) = self.repository.next_pending().await? else {
                break;
            };

            operation.start_syncing(self.clock.unix_timestamp())?;
            self.repository.update(&operation).await?;

            debug!(
                operation_id = %operation.id,
                retry_count = operation.retry_count,
                "Applying sync operation"
            );

            match self.apply_remote(&operation).await {
                Ok(()) => {
                    operation.complete(self.clock.unix_timestamp())?;
                    self.repository.update(&operation).await?;
                    summary.completed += 1;

                    self.event_bus
                        .emit(CoreEvent::Sync(SyncEvent::OperationCompleted {
                            operation_id: operation.id.as_str(),
                            resource: operation.resource.as_str().to_string(),
                            resource_id: operation.resource_id.clone(),
                        }))
                        .ok();
                }
                Err(e) => {
                    let message = e.to_string();
                    operation.fail(message.clone(), self.clock.unix_timestamp())?;
                    self.repository.update(&operation).await?;

                    if operation.status == OperationStatus::Failed {
                        warn!(
                            operation_id = %operation.id,
                            retry_count = operation.retry_count,
                            error = %message,
                            "Sync operation failed permanently"
                        );
                        summary.failed += 1;

                        self.event_bus
                            .emit(CoreEvent::Sync(SyncEvent::OperationFailed {
                                operation_id: operation.id.as_str(),
                                resource: operation.resource.as_str().to_string(),
                                resource_id: operation.resource_id.clone(),
                                message,
                            }))
                            .ok();
                    } else {
                        warn!(
                            operation_id = %operation.id,
                            retry_count = operation.retry_count,
                            error = %message,
                            "Sync operation failed, will retry"
                        );
                        summary.retried += 1;
                        tokio::time::sleep(operation.retry_delay(self.config.retry_base_delay))
                            .await;
                    }
                }
            }
        }

        summary.remaining = self
            .repository
            .count_by_status(OperationStatus::Pending)
            .await?;

        info!(
            completed = summary.completed,
            failed = summary.failed,
            retried = summary.retried,
            remaining = summary.remaining,
            "Drain pass finished"
        );

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::DrainFinished {
                completed: summary.completed,
                failed: summary.failed,
                remaining: summary.remaining,
            }))
            .ok();

        Ok(summary)
    }

    /// Drain without a connectivity gate (manual/forced drains and tests)
    pub async fn drain(&self) -> Result<DrainSummary> {
        self.drain_gated(|| true).await
    }

    async fn apply_remote(&self, operation: &SyncOperation) -> Result<()> {
        match operation.op_type {
            OperationType::Create => {
                self.remote
                    .create(operation.resource, &operation.payload)
                    .await?;
            }
            OperationType::Update => {
                self.remote
                    .update(operation.resource, &operation.resource_id, &operation.payload)
                    .await?;
            }
            OperationType::Delete => {
                self.remote
                    .delete(operation.resource, &operation.resource_id)
                    .await?;
            }
        }
        Ok(())
    }

    /// Flip failed operations back to pending with a fresh retry budget.
    /// Returns the number reset; a subsequent drain picks them up.
    pub async fn retry_failed(&self) -> Result<u64> {
        let reset = self
            .repository
            .reset_failed(self.clock.unix_timestamp())
            .await?;
        info!(reset, "Failed operations queued for manual retry");
        Ok(reset)
    }

    /// Get an operation's current state
    pub async fn get_operation(&self, id: OperationId) -> Result<Option<SyncOperation>> {
        self.repository.find_by_id(id).await
    }

    /// All permanently failed operations, for surfacing to the user
    pub async fn failed_operations(&self) -> Result<Vec<SyncOperation>> {
        self.repository.find_failed().await
    }

    /// Prune terminal `completed` entries. Never touches pending or failed.
    pub async fn clear_completed(&self) -> Result<u64> {
        self.repository.delete_completed().await
    }

    /// Destructive reset, used only for logout/account-switch scenarios
    pub async fn clear_all(&self) -> Result<u64> {
        let removed = self.repository.delete_all().await?;
        warn!(removed, "Sync queue cleared");
        Ok(removed)
    }

    /// Per-status queue counts
    pub async fn stats(&self) -> Result<QueueStats> {
        Ok(QueueStats {
            pending: self
                .repository
                .count_by_status(OperationStatus::Pending)
                .await?,
            syncing: self
                .repository
                .count_by_status(OperationStatus::Syncing)
                .await?,
            completed: self
                .repository
                .count_by_status(OperationStatus::Completed)
                .await?,
            failed: self
                .repository
                .count_by_status(OperationStatus::Failed)
                .await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_stats_helpers() {
        let stats = QueueStats {
            pending: 2,
            syncing: 0,
            completed: 5,
            failed: 1,
        };
        assert_eq!(stats.total(), 8);
        assert!(!stats.is_idle());

        let idle = QueueStats {
            pending: 0,
            syncing: 0,
            completed: 3,
            failed: 0,
        };
        assert!(idle.is_idle());
    }

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_base_delay, Duration::from_millis(500));
    }
}
