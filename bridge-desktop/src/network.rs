//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkChangeStream, NetworkMonitor, NetworkStatus},
};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::debug;

/// Desktop network monitor implementation
///
/// Detects connectivity by attempting a TCP connection to a well-known
/// address. Platform-specific watchers (netlink, SystemConfiguration,
/// Network List Manager) would be more precise but require additional
/// dependencies; for the offline core's purposes a reachability check is
/// the signal that matters.
pub struct DesktopNetworkMonitor {
    check_addr: SocketAddr,
    poll_interval: Duration,
}

impl DesktopNetworkMonitor {
    /// Create a monitor checking against a public DNS endpoint
    pub fn new() -> Self {
        Self {
            check_addr: "8.8.8.8:53".parse().expect("static addr"),
            poll_interval: Duration::from_secs(5),
        }
    }

    /// Create a monitor probing a specific address (test harnesses point
    /// this at a local listener)
    pub fn with_check_addr(check_addr: SocketAddr, poll_interval: Duration) -> Self {
        Self {
            check_addr,
            poll_interval,
        }
    }

    async fn check_connectivity(&self) -> NetworkStatus {
        match tokio::time::timeout(
            Duration::from_secs(5),
            tokio::net::TcpStream::connect(self.check_addr),
        )
        .await
        {
            Ok(Ok(_)) => NetworkStatus::Connected,
            Ok(Err(_)) => NetworkStatus::Disconnected,
            Err(_) => NetworkStatus::Disconnected,
        }
    }
}

impl Default for DesktopNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn status(&self) -> Result<NetworkStatus> {
        let status = self.check_connectivity().await;
        debug!(status = ?status, "Network status checked");
        Ok(status)
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        Ok(Box::new(PollingChangeStream {
            monitor: Self::with_check_addr(self.check_addr, self.poll_interval),
            last_status: None,
        }))
    }
}

/// Change stream that polls for transitions
struct PollingChangeStream {
    monitor: DesktopNetworkMonitor,
    last_status: Option<NetworkStatus>,
}

#[async_trait]
impl NetworkChangeStream for PollingChangeStream {
    async fn next(&mut self) -> Option<NetworkStatus> {
        loop {
            tokio::time::sleep(self.monitor.poll_interval).await;

            let status = self.monitor.check_connectivity().await;
            if self.last_status != Some(status) {
                self.last_status = Some(status);
                return Some(status);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_addr_reports_disconnected() {
        let monitor = DesktopNetworkMonitor::with_check_addr(
            "127.0.0.1:1".parse().unwrap(),
            Duration::from_millis(50),
        );
        let status = monitor.status().await.unwrap();
        assert_eq!(status, NetworkStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_reachable_listener_reports_connected() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let monitor = DesktopNetworkMonitor::with_check_addr(addr, Duration::from_millis(50));
        let status = monitor.status().await.unwrap();
        assert_eq!(status, NetworkStatus::Connected);
    }
}
