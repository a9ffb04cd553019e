//! # Desktop Bridge Implementations
//!
//! Concrete desktop adapters for the bridge traits:
//!
//! - [`HttpRemoteApi`](remote::HttpRemoteApi) - reqwest-backed songbook API
//!   client with bearer-token auth
//! - [`DesktopNetworkMonitor`](network::DesktopNetworkMonitor) - connectivity
//!   detection via TCP reachability checks
//! - [`DiskQuotaProbe`](quota::DiskQuotaProbe) - storage usage from the
//!   database file size against a configured ceiling

pub mod network;
pub mod quota;
pub mod remote;

pub use network::DesktopNetworkMonitor;
pub use quota::DiskQuotaProbe;
pub use remote::HttpRemoteApi;
