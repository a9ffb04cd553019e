//! # Connectivity Monitor
//!
//! Merges two independent signals into one effective status:
//!
//! - the host-reported connectivity signal (event-driven, immediate)
//! - an application-level reachability probe against the songbook API
//!   (periodic, only while the host reports a connected network)
//!
//! `Online` requires both signals positive. `Limited` is host-connected but
//! probe-failing (captive portal, API outage). `Offline` is host-
//! disconnected. The sync queue only drains while the effective status is
//! `Online`.

use std::sync::Arc;
use std::time::Duration;

use bridge_traits::network::{NetworkMonitor, NetworkStatus};
use bridge_traits::remote::RemoteApi;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::Result;

/// Derived connectivity status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectiveStatus {
    /// Host network up and the API reachable
    Online,
    /// Host network up but the API not reachable
    Limited,
    /// Host network down
    Offline,
}

impl EffectiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectiveStatus::Online => "online",
            EffectiveStatus::Limited => "limited",
            EffectiveStatus::Offline => "offline",
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, EffectiveStatus::Online)
    }
}

impl std::fmt::Display for EffectiveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Connectivity monitor combining the host signal with an active probe
pub struct ConnectivityMonitor {
    network: Arc<dyn NetworkMonitor>,
    remote: Arc<dyn RemoteApi>,
    probe_interval: Duration,
    status_tx: watch::Sender<EffectiveStatus>,
    status_rx: watch::Receiver<EffectiveStatus>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectivityMonitor {
    /// Create a monitor. The initial status is `Offline` until the first
    /// check runs.
    pub fn new(
        network: Arc<dyn NetworkMonitor>,
        remote: Arc<dyn RemoteApi>,
        probe_interval: Duration,
    ) -> Self {
        let (status_tx, status_rx) = watch::channel(EffectiveStatus::Offline);
        Self {
            network,
            remote,
            probe_interval,
            status_tx,
            status_rx,
            task: Mutex::new(None),
        }
    }

    /// Current effective status
    pub fn current(&self) -> EffectiveStatus {
        *self.status_rx.borrow()
    }

    /// Subscribe to effective-status transitions
    pub fn subscribe(&self) -> watch::Receiver<EffectiveStatus> {
        self.status_rx.clone()
    }

    /// Evaluate both signals once and publish the result.
    ///
    /// The probe only runs while the host reports a connected network; an
    /// offline host is offline regardless of what the API would say.
    pub async fn check_now(&self) -> Result<EffectiveStatus> {
        let host_status = self
            .network
            .status()
            .await
            .unwrap_or(NetworkStatus::Indeterminate);

        let effective = match host_status {
            NetworkStatus::Connected | NetworkStatus::Indeterminate => {
                match self.remote.probe().await {
                    Ok(()) => EffectiveStatus::Online,
                    Err(_) => EffectiveStatus::Limited,
                }
            }
            NetworkStatus::Disconnected => EffectiveStatus::Offline,
        };

        self.publish(effective);
        Ok(effective)
    }

    fn publish(&self, status: EffectiveStatus) {
        let changed = *self.status_rx.borrow() != status;
        if changed {
            info!(status = %status, "Effective connectivity changed");
            self.status_tx.send_replace(status);
        }
    }

    /// Start the background watcher: reacts to host transitions immediately
    /// and re-probes on the configured interval while connected.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Ok(());
        }

        // Initial evaluation so consumers don't wait a full interval
        self.check_now().await.ok();

        let monitor = Arc::clone(self);
        let change_stream = self.network.subscribe_changes().await;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.probe_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            match change_stream {
                Ok(mut stream) => loop {
                    tokio::select! {
                        change = stream.next() => {
                            match change {
                                Some(status) => {
                                    debug!(host_status = ?status, "Host connectivity changed");
                                    monitor.check_now().await.ok();
                                }
                                None => break,
                            }
                        }
                        _ = interval.tick() => {
                            monitor.check_now().await.ok();
                        }
                    }
                },
                Err(_) => loop {
                    // No change stream available; fall back to pure polling
                    interval.tick().await;
                    monitor.check_now().await.ok();
                },
            }
        });

        *task = Some(handle);
        Ok(())
    }

    /// Stop the background watcher
    pub async fn shutdown(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::BridgeError;
    use bridge_traits::network::NetworkChangeStream;
    use bridge_traits::remote::{RemoteResponse, ResourceKind};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubNetwork {
        connected: AtomicBool,
    }

    #[async_trait]
    impl NetworkMonitor for StubNetwork {
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
            Err(BridgeError::NotAvailable("test stub".to_string()))
        }
    }

    struct StubRemote {
        reachable: AtomicBool,
    }

    #[async_trait]
    impl RemoteApi for StubRemote {
        async fn create(
            &self,
            _resource: ResourceKind,
            _payload: &serde_json::Value,
        ) -> bridge_traits::error::Result<RemoteResponse> {
            unreachable!("probe-only stub")
        }

        async fn update(
            &self,
            _resource: ResourceKind,
            _id: &str,
            _payload: &serde_json::Value,
        ) -> bridge_traits::error::Result<RemoteResponse> {
            unreachable!("probe-only stub")
        }

        async fn delete(
            &self,
            _resource: ResourceKind,
            _id: &str,
        ) -> bridge_traits::error::Result<()> {
            unreachable!("probe-only stub")
        }

        async fn probe(&self) -> bridge_traits::error::Result<()> {
            if self.reachable.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(BridgeError::Unreachable("probe failed".to_string()))
            }
        }
    }

    fn monitor(connected: bool, reachable: bool) -> ConnectivityMonitor {
        ConnectivityMonitor::new(
            Arc::new(StubNetwork {
                connected: AtomicBool::new(connected),
            }),
            Arc::new(StubRemote {
                reachable: AtomicBool::new(reachable),
            }),
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn test_both_signals_good_is_online() {
        let monitor = monitor(true, true);
        assert_eq!(
            monitor.check_now().await.unwrap(),
            EffectiveStatus::Online
        );
        assert!(monitor.current().is_online());
    }

    #[tokio::test]
    async fn test_probe_failure_is_limited() {
        let monitor = monitor(true, false);
        assert_eq!(
            monitor.check_now().await.unwrap(),
            EffectiveStatus::Limited
        );
    }

    #[tokio::test]
    async fn test_host_down_is_offline_without_probe() {
        // The stub remote would panic if probed; a disconnected host must
        // short-circuit.
        let monitor = monitor(false, true);
        assert_eq!(
            monitor.check_now().await.unwrap(),
            EffectiveStatus::Offline
        );
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let monitor = monitor(true, true);
        let mut rx = monitor.subscribe();

        monitor.check_now().await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), EffectiveStatus::Online);
    }
}
