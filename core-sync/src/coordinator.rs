//! # Sync Coordinator
//!
//! Owns the connectivity monitor and the queue, and turns online transitions
//! into drain passes. A short settle delay between the transition and the
//! drain avoids thrashing on flaky connectivity: if the connection drops
//! again inside the window, no drain starts.

use std::sync::Arc;
use std::time::Duration;

use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::monitor::{ConnectivityMonitor, EffectiveStatus};
use crate::queue::{DrainSummary, SyncQueue};

/// Coordinator configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Delay between an online transition and the drain it triggers
    pub settle_delay: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(2),
        }
    }
}

/// Background-sync scheduler binding the monitor to the queue
pub struct SyncCoordinator {
    queue: Arc<SyncQueue>,
    monitor: Arc<ConnectivityMonitor>,
    event_bus: EventBus,
    config: CoordinatorConfig,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncCoordinator {
    pub fn new(
        queue: Arc<SyncQueue>,
        monitor: Arc<ConnectivityMonitor>,
        event_bus: EventBus,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            queue,
            monitor,
            event_bus,
            config,
            task: Mutex::new(None),
        }
    }

    /// Recover queue state, start the monitor and the transition watcher.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Ok(());
        }

        self.queue.recover().await?;
        self.monitor.start().await?;

        let coordinator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut rx = coordinator.monitor.subscribe();
            let mut last = *rx.borrow();

            loop {
                if rx.changed().await.is_err() {
                    break;
                }
                let status = *rx.borrow();
                if status == last {
                    continue;
                }

                coordinator
                    .event_bus
                    .emit(CoreEvent::Sync(SyncEvent::ConnectivityChanged {
                        status: status.as_str().to_string(),
                    }))
                    .ok();

                if status == EffectiveStatus::Online {
                    debug!(
                        settle_ms = coordinator.config.settle_delay.as_millis() as u64,
                        "Online transition; settling before drain"
                    );
                    tokio::time::sleep(coordinator.config.settle_delay).await;

                    if coordinator.monitor.current() == EffectiveStatus::Online {
                        let gate_rx = coordinator.monitor.subscribe();
                        let result = coordinator
                            .queue
                            .drain_gated(move || gate_rx.borrow().is_online())
                            .await;

                        if let Ok(summary) = result {
                            info!(
                                completed = summary.completed,
                                failed = summary.failed,
                                "Reconnect drain finished"
                            );
                        }
                    }
                }

                last = status;
            }
        });

        *task = Some(handle);
        info!("Sync coordinator started");
        Ok(())
    }

    /// Current effective connectivity as last derived by the monitor.
    pub fn connectivity(&self) -> EffectiveStatus {
        self.monitor.current()
    }

    /// Manually trigger a drain. Fails fast when the effective status is not
    /// online; queued operations stay pending for the next reconnect.
    pub async fn sync_now(&self) -> Result<DrainSummary> {
        if self.monitor.current() != EffectiveStatus::Online {
            return Err(SyncError::Offline);
        }

        let gate_rx = self.monitor.subscribe();
        self.queue
            .drain_gated(move || gate_rx.borrow().is_online())
            .await
    }

    /// Flip failed operations to pending and drain if online.
    pub async fn retry_failed(&self) -> Result<u64> {
        let reset = self.queue.retry_failed().await?;

        if reset > 0 && self.monitor.current() == EffectiveStatus::Online {
            let gate_rx = self.monitor.subscribe();
            self.queue
                .drain_gated(move || gate_rx.borrow().is_online())
                .await?;
        }

        Ok(reset)
    }

    /// Stop the watcher and the monitor.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        self.monitor.shutdown().await;
        info!("Sync coordinator stopped");
    }
}
