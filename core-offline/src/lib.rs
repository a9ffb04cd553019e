//! # Offline Storage Service
//!
//! The central cache manager on top of the persistent store: CRUD with
//! validation and version stamping, a read-through memory cache, storage
//! statistics and quota monitoring, cleanup/eviction, and conflict-aware
//! export/import.
//!
//! ## Components
//!
//! - **Service** (`service`): `OfflineStorage` — CRUD, per-record write
//!   serialization, read-through LRU caches, event emission
//! - **Stats** (`stats`): storage statistics and edge-triggered quota
//!   threshold monitoring
//! - **Cleanup** (`cleanup`): preserve-recent → LRU-under-caps → age-sweep
//!   eviction
//! - **Export/Import** (`export`, `import`): snapshot bundles with checksums
//!   and optional compression; merge with conflict strategies

pub mod cleanup;
pub mod error;
pub mod export;
pub mod import;
pub mod service;
pub mod stats;

pub use cleanup::{CleanupConfig, CleanupReport};
pub use error::{Result, StorageError};
pub use export::{ExportData, ExportOptions, ExportPayload};
pub use import::{ConflictStrategy, ImportConflict, ImportError, ImportOptions, ImportResult};
pub use service::OfflineStorage;
pub use stats::{EntityStats, QuotaLevel, QuotaStatus, StorageStats};
