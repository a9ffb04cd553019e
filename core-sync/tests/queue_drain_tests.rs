//! Integration tests for the sync queue and coordinator
//!
//! These tests verify the drain workflow end to end:
//! - FIFO application order against a recording remote stub
//! - The retry bound and terminal failed state
//! - The offline-edit-then-reconnect scenario through the coordinator

use async_trait::async_trait;
use bridge_traits::error::BridgeError;
use bridge_traits::network::{NetworkChangeStream, NetworkMonitor, NetworkStatus};
use bridge_traits::remote::{RemoteApi, RemoteResponse, ResourceKind};
use bridge_traits::time::SystemClock;
use core_runtime::events::EventBus;
use core_sync::coordinator::CoordinatorConfig;
use core_sync::queue::QueueConfig;
use core_sync::{
    ConnectivityMonitor, OperationStatus, OperationType, SqliteSyncQueueRepository,
    SyncCoordinator, SyncQueue,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

// ============================================================================
// Mock Implementations
// ============================================================================

/// Remote stub that records every call and can be told to fail
struct RecordingRemote {
    calls: Arc<AsyncMutex<Vec<String>>>,
    fail: AtomicBool,
    reachable: AtomicBool,
}

impl RecordingRemote {
    fn new() -> Self {
        Self {
            calls: Arc::new(AsyncMutex::new(Vec::new())),
            fail: AtomicBool::new(false),
            reachable: AtomicBool::new(true),
        }
    }

    fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: String) -> bridge_traits::error::Result<()> {
        self.calls.lock().await.push(call);
        if self.fail.load(Ordering::SeqCst) {
            Err(BridgeError::Remote {
                status: 500,
                message: "injected failure".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteApi for RecordingRemote {
    async fn create(
        &self,
        resource: ResourceKind,
        payload: &serde_json::Value,
    ) -> bridge_traits::error::Result<RemoteResponse> {
        let id = payload
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or("?")
            .to_string();
        self.record(format!("POST {}/{}", resource.as_path(), id))
            .await?;
        Ok(RemoteResponse {
            server_id: Some(id),
            server_version: Some(1),
        })
    }

    async fn update(
        &self,
        resource: ResourceKind,
        id: &str,
        _payload: &serde_json::Value,
    ) -> bridge_traits::error::Result<RemoteResponse> {
        self.record(format!("PUT {}/{}", resource.as_path(), id))
            .await?;
        Ok(RemoteResponse {
            server_id: Some(id.to_string()),
            server_version: Some(2),
        })
    }

    async fn delete(
        &self,
        resource: ResourceKind,
        id: &str,
    ) -> bridge_traits::error::Result<()> {
        self.record(format!("DELETE {}/{}", resource.as_path(), id))
            .await
    }

    async fn probe(&self) -> bridge_traits::error::Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BridgeError::Unreachable("probe failed".to_string()))
        }
    }
}

/// Network stub whose status flips on demand, pushing a change event
struct SwitchableNetwork {
    connected: Arc<AtomicBool>,
    change_tx: mpsc::UnboundedSender<NetworkStatus>,
    change_rx: AsyncMutex<Option<mpsc::UnboundedReceiver<NetworkStatus>>>,
}

impl SwitchableNetwork {
    fn new(connected: bool) -> Self {
        let (change_tx, change_rx) = mpsc::unbounded_channel();
        Self {
            connected: Arc::new(AtomicBool::new(connected)),
            change_tx,
            change_rx: AsyncMutex::new(Some(change_rx)),
        }
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
        let status = if connected {
            NetworkStatus::Connected
        } else {
            NetworkStatus::Disconnected
        };
        self.change_tx.send(status).ok();
    }
}

struct ChannelChangeStream {
    rx: mpsc::UnboundedReceiver<NetworkStatus>,
}

#[async_trait]
impl NetworkChangeStream for ChannelChangeStream {
    async fn next(&mut self) -> Option<NetworkStatus> {
        self.rx.recv().await
    }
}

#[async_trait]
impl NetworkMonitor for SwitchableNetwork {
    async fn status(&self) -> bridge_traits::error::Result<NetworkStatus> {
        Ok(if self.connected.load(Ordering::SeqCst) {
            NetworkStatus::Connected
        } else {
            NetworkStatus::Disconnected
        })
    }

    async fn subscribe_changes(
        &self,
    ) -> bridge_traits::error::Result<Box<dyn NetworkChangeStream>> {
        let rx = self
            .change_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| BridgeError::NotAvailable("already subscribed".to_string()))?;
        Ok(Box::new(ChannelChangeStream { rx }))
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn make_queue(remote: Arc<RecordingRemote>, config: QueueConfig) -> Arc<SyncQueue> {
    // One connection: an in-memory database is per-connection
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let repository = SqliteSyncQueueRepository::new(pool);
    repository.initialize().await.unwrap();

    Arc::new(SyncQueue::new(
        Arc::new(repository),
        remote,
        Arc::new(SystemClock),
        EventBus::new(64),
        config,
    ))
}

fn fast_config() -> QueueConfig {
    QueueConfig {
        max_retries: 3,
        retry_base_delay: Duration::from_millis(1),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_drain_applies_operations_in_fifo_order() {
    let remote = Arc::new(RecordingRemote::new());
    let queue = make_queue(remote.clone(), fast_config()).await;

    queue
        .enqueue(
            OperationType::Create,
            ResourceKind::Setlist,
            "l1",
            json!({"id": "l1", "name": "Sunday"}),
        )
        .await
        .unwrap();
    queue
        .enqueue(
            OperationType::Create,
            ResourceKind::Song,
            "s1",
            json!({"id": "s1", "title": "Amazing Grace"}),
        )
        .await
        .unwrap();
    queue
        .enqueue(OperationType::Delete, ResourceKind::Song, "s2", json!({}))
        .await
        .unwrap();

    let summary = queue.drain().await.unwrap();
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.remaining, 0);

    let calls = remote.calls().await;
    assert_eq!(
        calls,
        vec!["POST setlists/l1", "POST songs/s1", "DELETE songs/s2"]
    );
}

#[tokio::test]
async fn test_always_failing_operation_lands_in_failed_after_max_retries() {
    let remote = Arc::new(RecordingRemote::new());
    remote.set_fail(true);
    let queue = make_queue(remote.clone(), fast_config()).await;

    let id = queue
        .enqueue(
            OperationType::Create,
            ResourceKind::Song,
            "s1",
            json!({"id": "s1"}),
        )
        .await
        .unwrap();

    let summary = queue.drain().await.unwrap();
    assert_eq!(summary.completed, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.retried, 2); // two retryable failures, third is terminal

    // Exactly max_retries attempts hit the remote
    assert_eq!(remote.calls().await.len(), 3);

    let operation = queue.get_operation(id).await.unwrap().unwrap();
    assert_eq!(operation.status, OperationStatus::Failed);
    assert_eq!(operation.retry_count, 3);
    assert!(operation.last_error.unwrap().contains("injected failure"));

    // Failed is terminal: another drain makes no further attempts
    queue.drain().await.unwrap();
    assert_eq!(remote.calls().await.len(), 3);
}

#[tokio::test]
async fn test_manual_retry_gives_fresh_budget() {
    let remote = Arc::new(RecordingRemote::new());
    remote.set_fail(true);
    let queue = make_queue(remote.clone(), fast_config()).await;

    let id = queue
        .enqueue(
            OperationType::Update,
            ResourceKind::Song,
            "s1",
            json!({"id": "s1"}),
        )
        .await
        .unwrap();

    queue.drain().await.unwrap();
    assert_eq!(
        queue.get_operation(id).await.unwrap().unwrap().status,
        OperationStatus::Failed
    );

    // Remote recovers; manual retry drains to completion
    remote.set_fail(false);
    assert_eq!(queue.retry_failed().await.unwrap(), 1);
    let summary = queue.drain().await.unwrap();
    assert_eq!(summary.completed, 1);

    let operation = queue.get_operation(id).await.unwrap().unwrap();
    assert_eq!(operation.status, OperationStatus::Completed);
}

#[tokio::test]
async fn test_clear_completed_prunes_only_terminal_success() {
    let remote = Arc::new(RecordingRemote::new());
    let queue = make_queue(remote.clone(), fast_config()).await;

    queue
        .enqueue(
            OperationType::Create,
            ResourceKind::Song,
            "s1",
            json!({"id": "s1"}),
        )
        .await
        .unwrap();
    queue.drain().await.unwrap();

    queue
        .enqueue(
            OperationType::Create,
            ResourceKind::Song,
            "s2",
            json!({"id": "s2"}),
        )
        .await
        .unwrap();

    assert_eq!(queue.clear_completed().await.unwrap(), 1);

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.pending, 1);
}

#[tokio::test]
async fn test_offline_edit_then_reconnect_drains_exactly_once() {
    let remote = Arc::new(RecordingRemote::new());
    let network = Arc::new(SwitchableNetwork::new(false));
    let queue = make_queue(remote.clone(), fast_config()).await;

    let monitor = Arc::new(ConnectivityMonitor::new(
        network.clone(),
        remote.clone(),
        Duration::from_secs(60),
    ));

    let coordinator = Arc::new(SyncCoordinator::new(
        queue.clone(),
        monitor.clone(),
        EventBus::new(64),
        CoordinatorConfig {
            settle_delay: Duration::from_millis(20),
        },
    ));
    coordinator.start().await.unwrap();

    // Offline: the save enqueues but nothing reaches the remote
    queue
        .enqueue(
            OperationType::Create,
            ResourceKind::Song,
            "s1",
            json!({"id": "s1", "title": "Offline Song"}),
        )
        .await
        .unwrap();

    assert!(coordinator.sync_now().await.is_err());
    assert!(remote.calls().await.is_empty());

    // Reconnect; the coordinator settles, then drains
    network.set_connected(true);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if queue.stats().await.unwrap().completed == 1 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "drain did not happen after reconnect"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Exactly one POST for s1
    assert_eq!(remote.calls().await, vec!["POST songs/s1"]);

    coordinator.shutdown().await;
}
