//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the offline core and its external
//! collaborators. Each trait represents a capability the core requires but
//! that is provided differently per host (desktop shell, test harness, future
//! mobile shells):
//!
//! - [`RemoteApi`](remote::RemoteApi) - The songbook HTTP API the sync queue
//!   drains against, plus a reachability probe
//! - [`NetworkMonitor`](network::NetworkMonitor) - Host-level connectivity
//!   signal with change notifications
//! - [`QuotaProbe`](quota::QuotaProbe) - Platform storage usage/quota
//!   estimation
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type.
//! Implementations should convert platform-specific errors to `BridgeError`
//! and include actionable context (endpoint, status code, path).
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent
//! usage across async tasks.

pub mod error;
pub mod network;
pub mod quota;
pub mod remote;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use network::{NetworkChangeStream, NetworkMonitor, NetworkStatus};
pub use quota::{QuotaProbe, StorageEstimate};
pub use remote::{RemoteApi, RemoteResponse, ResourceKind};
pub use time::{Clock, SystemClock};
