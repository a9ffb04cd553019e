//! # Sync Operation State Machine
//!
//! Queued mutations with validated status transitions.
//!
//! ## State Machine
//!
//! ```text
//! Pending → Syncing → Completed
//!              ↓
//!              ├──→ Pending   (retryable failure, retry_count < max_retries)
//!              └──→ Failed    (retry_count >= max_retries)
//! ```
//!
//! `Syncing` is transient and must not persist across a process restart: an
//! operation found in `Syncing` at startup was interrupted, not confirmed,
//! and is reset to `Pending` by the repository's `reset_interrupted`.
//!
//! The payload is a snapshot taken at enqueue time and is immutable for the
//! lifetime of the operation.

use bridge_traits::remote::ResourceKind;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Result, SyncError};

/// Maximum jitter added to the retry delay, in milliseconds
const RETRY_JITTER_MS: u64 = 250;

/// Type-safe sync operation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create a new random operation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an operation ID from a string
    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::InvalidOperationId(e.to_string()))
    }

    /// Get the string representation
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }

    /// Deterministic per-operation jitter in milliseconds
    pub(crate) fn jitter_ms(&self) -> u64 {
        (self.0.as_u128() % RETRY_JITTER_MS as u128) as u64
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of mutation queued against the remote API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    /// Convert to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for OperationType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            _ => Err(SyncError::InvalidOperationType(s.to_string())),
        }
    }
}

/// Sync operation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Operation is queued and waiting to be applied
    Pending,
    /// Operation is currently being applied (transient, never persisted
    /// across restarts)
    Syncing,
    /// Operation was applied to the remote; eligible for pruning
    Completed,
    /// Operation exhausted its retries; waits for an explicit manual retry
    Failed,
}

impl OperationStatus {
    /// Convert status to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Check if status is terminal (completed or failed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if the operation may idle in this status
    pub fn is_restable(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl FromStr for OperationStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "syncing" => Ok(Self::Syncing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A durable, queued intent to mutate a remote resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    /// Unique identifier
    pub id: OperationId,
    /// Mutation kind
    pub op_type: OperationType,
    /// Targeted resource kind
    pub resource: ResourceKind,
    /// Id of the targeted entity
    pub resource_id: String,
    /// Payload snapshot taken at enqueue time; immutable once enqueued
    pub payload: serde_json::Value,
    /// Current status
    pub status: OperationStatus,
    /// Number of failed attempts so far
    pub retry_count: u32,
    /// Attempt bound before the operation lands in `Failed`
    pub max_retries: u32,
    /// Error message from the most recent failure
    pub last_error: Option<String>,
    /// Unix timestamp when enqueued
    pub created_at: i64,
    /// Unix timestamp when last updated
    pub updated_at: i64,
}

impl SyncOperation {
    /// Create a new pending operation
    pub fn new(
        op_type: OperationType,
        resource: ResourceKind,
        resource_id: impl Into<String>,
        payload: serde_json::Value,
        max_retries: u32,
        now: i64,
    ) -> Self {
        Self {
            id: OperationId::new(),
            op_type,
            resource,
            resource_id: resource_id.into(),
            payload,
            status: OperationStatus::Pending,
            retry_count: 0,
            max_retries,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the operation has retry budget left
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Delay before the next attempt: fixed base plus per-operation jitter
    pub fn retry_delay(&self, base: Duration) -> Duration {
        base + Duration::from_millis(self.id.jitter_ms())
    }

    /// Transition `Pending → Syncing`
    pub fn start_syncing(&mut self, now: i64) -> Result<()> {
        if self.status != OperationStatus::Pending {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.to_string(),
                to: OperationStatus::Syncing.to_string(),
                reason: "only pending operations can start syncing".to_string(),
            });
        }
        self.status = OperationStatus::Syncing;
        self.updated_at = now;
        Ok(())
    }

    /// Transition `Syncing → Completed`
    pub fn complete(&mut self, now: i64) -> Result<()> {
        if self.status != OperationStatus::Syncing {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.to_string(),
                to: OperationStatus::Completed.to_string(),
                reason: "only in-flight operations can complete".to_string(),
            });
        }
        self.status = OperationStatus::Completed;
        self.updated_at = now;
        Ok(())
    }

    /// Record a failed attempt: `Syncing → Pending` while retry budget
    /// remains, `Syncing → Failed` once it is exhausted.
    ///
    /// Every failure kind consumes a retry; the queue does not classify
    /// errors. Callers inspect `last_error` for semantics.
    pub fn fail(&mut self, error: impl Into<String>, now: i64) -> Result<()> {
        if self.status != OperationStatus::Syncing {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.to_string(),
                to: OperationStatus::Failed.to_string(),
                reason: "only in-flight operations can fail".to_string(),
            });
        }

        self.retry_count += 1;
        self.last_error = Some(error.into());
        self.updated_at = now;

        if self.retry_count < self.max_retries {
            self.status = OperationStatus::Pending;
        } else {
            self.status = OperationStatus::Failed;
        }

        Ok(())
    }

    /// Reset a failed operation for a manual retry with a fresh budget
    pub fn reset_for_retry(&mut self, now: i64) -> Result<()> {
        if self.status != OperationStatus::Failed {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.to_string(),
                to: OperationStatus::Pending.to_string(),
                reason: "only failed operations can be manually retried".to_string(),
            });
        }
        self.status = OperationStatus::Pending;
        self.retry_count = 0;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op() -> SyncOperation {
        SyncOperation::new(
            OperationType::Create,
            ResourceKind::Song,
            "s1",
            json!({"title": "Test"}),
            3,
            1000,
        )
    }

    #[test]
    fn test_operation_id_round_trip() {
        let id = OperationId::new();
        let parsed = OperationId::from_string(&id.as_str()).unwrap();
        assert_eq!(id, parsed);
        assert!(OperationId::from_string("not-a-uuid").is_err());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            OperationStatus::Pending,
            OperationStatus::Syncing,
            OperationStatus::Completed,
            OperationStatus::Failed,
        ] {
            assert_eq!(
                status.as_str().parse::<OperationStatus>().unwrap(),
                status
            );
        }
        assert!(OperationStatus::Completed.is_terminal());
        assert!(OperationStatus::Failed.is_terminal());
        assert!(OperationStatus::Pending.is_restable());
        assert!(!OperationStatus::Syncing.is_restable());
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut operation = op();
        operation.start_syncing(1001).unwrap();
        assert_eq!(operation.status, OperationStatus::Syncing);

        operation.complete(1002).unwrap();
        assert_eq!(operation.status, OperationStatus::Completed);
        assert_eq!(operation.updated_at, 1002);
    }

    #[test]
    fn test_cannot_complete_from_pending() {
        let mut operation = op();
        assert!(operation.complete(1001).is_err());
    }

    #[test]
    fn test_failure_returns_to_pending_until_budget_exhausted() {
        let mut operation = op();

        for attempt in 1..=2 {
            operation.start_syncing(1000 + attempt).unwrap();
            operation.fail("timeout", 1000 + attempt).unwrap();
            assert_eq!(operation.status, OperationStatus::Pending);
            assert_eq!(operation.retry_count, attempt as u32);
        }

        operation.start_syncing(2000).unwrap();
        operation.fail("timeout", 2000).unwrap();
        assert_eq!(operation.status, OperationStatus::Failed);
        assert_eq!(operation.retry_count, 3);
        assert_eq!(operation.last_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_manual_retry_resets_budget() {
        let mut operation = op();
        operation.max_retries = 1;
        operation.start_syncing(1001).unwrap();
        operation.fail("410 Gone", 1001).unwrap();
        assert_eq!(operation.status, OperationStatus::Failed);

        operation.reset_for_retry(2000).unwrap();
        assert_eq!(operation.status, OperationStatus::Pending);
        assert_eq!(operation.retry_count, 0);

        // Pending operations cannot be manually retried again
        assert!(operation.reset_for_retry(2001).is_err());
    }

    #[test]
    fn test_retry_delay_is_bounded_jitter() {
        let operation = op();
        let base = Duration::from_millis(500);
        let delay = operation.retry_delay(base);
        assert!(delay >= base);
        assert!(delay < base + Duration::from_millis(RETRY_JITTER_MS));

        // Deterministic for the same operation
        assert_eq!(delay, operation.retry_delay(base));
    }
}
