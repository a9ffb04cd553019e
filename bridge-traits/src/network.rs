//! Network Monitoring Abstraction
//!
//! Provides the host-level connectivity signal consumed by the sync layer.

use crate::error::Result;

/// Host-reported connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    /// Connected to a network
    Connected,
    /// Not connected to any network
    Disconnected,
    /// Connection status unknown or indeterminate
    Indeterminate,
}

impl NetworkStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, NetworkStatus::Connected)
    }
}

/// Network monitor trait
///
/// Supplies the immediate, event-driven connectivity signal. This is the
/// host's own notion of being online (the browser `online` flag, an OS
/// network interface state); actual reachability of the songbook API is
/// verified separately by the connectivity monitor's active probe.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::network::NetworkMonitor;
///
/// async fn should_attempt_sync(monitor: &dyn NetworkMonitor) -> bool {
///     monitor.status().await.map(|s| s.is_connected()).unwrap_or(false)
/// }
/// ```
#[async_trait::async_trait]
pub trait NetworkMonitor: Send + Sync {
    /// Get the current host-reported connection status
    async fn status(&self) -> Result<NetworkStatus>;

    /// Subscribe to status changes
    ///
    /// Returns a stream that yields whenever the host-reported status
    /// changes. Implementations may poll internally; consumers only see
    /// transitions.
    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>>;
}

/// Stream of network status changes
#[async_trait::async_trait]
pub trait NetworkChangeStream: Send {
    /// Get the next status transition
    ///
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<NetworkStatus>;
}
