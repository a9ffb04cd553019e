//! # Persistent Store Module
//!
//! Owns the local cache database and provides repository patterns for data
//! access.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite schema for the named stores (`songs`, `setlists`, `preferences`,
//!   `store_meta`; the sync queue store is owned by `core-sync`)
//! - Repository patterns for cached songs, setlists and user preferences
//! - Query APIs with filtering, sorting, pagination and text search
//! - Schema-version bookkeeping in `store_meta`
//!
//! Every repository operation is individually atomic (a single SQLite
//! statement); there are no cross-store transactions. Callers compensate
//! with idempotent retries at the service layer.

pub mod db;
pub mod error;
pub mod models;
pub mod query;
pub mod repositories;

pub use db::{create_pool, create_test_pool, initialize_schema, DatabaseConfig};
pub use error::{Result, StoreError};
pub use models::{CachedSetlist, CachedSong, SetlistItem, SyncState, UserPreferences};
pub use query::{SetlistQuery, SetlistSort, SongQuery, SongSort};
