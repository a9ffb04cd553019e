//! # Sync Module
//!
//! Guarantees that local mutations performed while offline (or speculatively
//! before remote confirmation) are eventually applied to the remote songbook
//! API, in order, with bounded retry.
//!
//! ## Components
//!
//! - **Sync Operation State Machine** (`operation`): Queued mutations with
//!   validated status transitions and retry accounting
//! - **Queue Repository** (`repository`): Durable FIFO persistence for the
//!   `sync_queue` store
//! - **Sync Queue** (`queue`): Exclusive drain passes against the remote API
//! - **Connectivity Monitor** (`monitor`): Derives effective online status
//!   from the host signal plus an active reachability probe
//! - **Sync Coordinator** (`coordinator`): Triggers drains on reconnect after
//!   a settle delay

pub mod coordinator;
pub mod error;
pub mod monitor;
pub mod operation;
pub mod queue;
pub mod repository;

pub use coordinator::SyncCoordinator;
pub use error::{Result, SyncError};
pub use monitor::{ConnectivityMonitor, EffectiveStatus};
pub use operation::{OperationId, OperationStatus, OperationType, SyncOperation};
pub use queue::{DrainSummary, QueueStats, SyncQueue};
pub use repository::{SqliteSyncQueueRepository, SyncQueueRepository};
