//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (remote API,
//! network monitor, quota probe, clock) into the offline core and exposes
//! the consumer-facing operation surface. Every public operation returns an
//! [`OpResult`] — the UI layer never sees a raised error, and a lookup miss
//! is a successful result with no data.
//!
//! Desktop apps typically enable the `desktop-shims` feature (which depends
//! on `bridge-desktop`) and call [`bootstrap_desktop`].

pub mod error;
pub mod result;

pub use error::{CoreError, Result};
pub use result::{OpError, OpErrorKind, OpResult};

use std::sync::Arc;

use bridge_traits::{
    network::NetworkMonitor,
    quota::QuotaProbe,
    remote::{RemoteApi, ResourceKind},
    time::Clock,
};
use core_offline::{
    CleanupConfig, CleanupReport, ExportData, ExportOptions, ImportOptions, ImportResult,
    OfflineStorage, QuotaStatus, StorageStats,
};
use core_runtime::events::{CoreEvent, EventBus, EventStream, StorageEvent};
use core_runtime::CoreConfig;
use core_store::{
    create_pool, CachedSetlist, CachedSong, DatabaseConfig, SetlistItem, SetlistQuery,
    SongQuery, SyncState, UserPreferences,
};
use core_sync::coordinator::CoordinatorConfig;
use core_sync::queue::QueueConfig;
use core_sync::{
    ConnectivityMonitor, DrainSummary, EffectiveStatus, OperationType, QueueStats,
    SqliteSyncQueueRepository, SyncCoordinator, SyncOperation, SyncQueue,
};
use result::{from_storage, from_storage_optional, from_sync};
use tracing::{info, warn};

/// Aggregated handle to all bridge dependencies the core requires.
pub struct CoreDependencies {
    pub remote_api: Arc<dyn RemoteApi>,
    pub network_monitor: Arc<dyn NetworkMonitor>,
    pub quota_probe: Arc<dyn QuotaProbe>,
    pub clock: Arc<dyn Clock>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        remote_api: Arc<dyn RemoteApi>,
        network_monitor: Arc<dyn NetworkMonitor>,
        quota_probe: Arc<dyn QuotaProbe>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            remote_api,
            network_monitor,
            quota_probe,
            clock,
        }
    }
}

/// Primary façade exposed to host applications.
///
/// One long-lived instance, constructed at application start via
/// [`SongbookCore::initialize`] and torn down with [`SongbookCore::close`].
/// Tests construct isolated instances over in-memory databases.
#[derive(Clone)]
pub struct SongbookCore {
    storage: Arc<OfflineStorage>,
    queue: Arc<SyncQueue>,
    coordinator: Arc<SyncCoordinator>,
    event_bus: EventBus,
}

impl SongbookCore {
    /// Open the database, wire the service and sync layers, and start
    /// background sync.
    pub async fn initialize(
        deps: CoreDependencies,
        db_config: DatabaseConfig,
        config: CoreConfig,
    ) -> Result<Self> {
        config.validate()?;

        let pool = create_pool(db_config).await?;
        let event_bus = EventBus::new(config.event_buffer_size);

        let storage = Arc::new(OfflineStorage::new(
            pool.clone(),
            deps.quota_probe,
            deps.clock.clone(),
            event_bus.clone(),
            config.clone(),
        )?);
        storage.initialize().await?;

        let queue_repository = SqliteSyncQueueRepository::new(pool);
        queue_repository.initialize().await?;

        let queue = Arc::new(SyncQueue::new(
            Arc::new(queue_repository),
            deps.remote_api.clone(),
            deps.clock,
            event_bus.clone(),
            QueueConfig {
                max_retries: config.max_retries,
                retry_base_delay: config.retry_base_delay,
            },
        ));

        let monitor = Arc::new(ConnectivityMonitor::new(
            deps.network_monitor,
            deps.remote_api,
            config.probe_interval,
        ));

        let coordinator = Arc::new(SyncCoordinator::new(
            queue.clone(),
            monitor,
            event_bus.clone(),
            CoordinatorConfig {
                settle_delay: config.settle_delay,
            },
        ));
        coordinator.start().await?;

        info!("Songbook core initialized");

        Ok(Self {
            storage,
            queue,
            coordinator,
            event_bus,
        })
    }

    /// Stop background sync and close the database.
    pub async fn close(&self) {
        self.coordinator.shutdown().await;
        self.storage.close().await;
        info!("Songbook core closed");
    }

    /// Subscribe to core events (storage mutations, sync lifecycle, quota
    /// thresholds, maintenance).
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// Current effective connectivity as last derived by the monitor.
    pub fn connectivity(&self) -> EffectiveStatus {
        self.coordinator.connectivity()
    }

    /// Queue a remote mutation mirroring a successful local save.
    ///
    /// Enqueue failures never fail the original operation — the local save
    /// already succeeded; the gap surfaces through the event stream.
    async fn enqueue_mutation(
        &self,
        op_type: OperationType,
        resource: ResourceKind,
        resource_id: &str,
        payload: serde_json::Value,
    ) {
        if let Err(e) = self
            .queue
            .enqueue(op_type, resource, resource_id, payload)
            .await
        {
            warn!(
                resource_id,
                error = %e,
                "Failed to enqueue sync operation for local mutation"
            );
            self.event_bus
                .emit(CoreEvent::Storage(StorageEvent::StorageError {
                    operation: "enqueue_mutation".to_string(),
                    message: e.to_string(),
                }))
                .ok();
        }
    }

    // =========================================================================
    // Songs
    // =========================================================================

    /// Save a song locally and queue the matching remote mutation.
    pub async fn save_song(&self, song: CachedSong) -> OpResult<CachedSong> {
        match self.storage.save_song(song).await {
            Ok(saved) => {
                if saved.sync_state == SyncState::Pending {
                    let op_type = if saved.version == 1 {
                        OperationType::Create
                    } else {
                        OperationType::Update
                    };
                    match serde_json::to_value(&saved) {
                        Ok(payload) => {
                            self.enqueue_mutation(op_type, ResourceKind::Song, &saved.id, payload)
                                .await
                        }
                        Err(e) => warn!(error = %e, "Song payload snapshot failed"),
                    }
                }
                OpResult::ok(saved)
            }
            Err(e) => from_storage(Err(e)),
        }
    }

    /// Look up a song. A miss is `success` with no data.
    pub async fn get_song(&self, id: &str) -> OpResult<CachedSong> {
        from_storage_optional(self.storage.get_song(id).await)
    }

    /// Delete a song locally and queue the remote delete.
    pub async fn delete_song(&self, id: &str) -> OpResult<bool> {
        match self.storage.delete_song(id).await {
            Ok(removed) => {
                if removed {
                    self.enqueue_mutation(
                        OperationType::Delete,
                        ResourceKind::Song,
                        id,
                        serde_json::json!({ "id": id }),
                    )
                    .await;
                }
                OpResult::ok(removed)
            }
            Err(e) => from_storage(Err(e)),
        }
    }

    /// List songs with filtering, sorting, pagination and search.
    pub async fn list_songs(&self, query: SongQuery) -> OpResult<Vec<CachedSong>> {
        from_storage(self.storage.list_songs(&query).await)
    }

    // =========================================================================
    // Setlists
    // =========================================================================

    /// Save a setlist locally and queue the matching remote mutation.
    pub async fn save_setlist(&self, setlist: CachedSetlist) -> OpResult<CachedSetlist> {
        match self.storage.save_setlist(setlist).await {
            Ok(saved) => {
                if saved.sync_state == SyncState::Pending {
                    let op_type = if saved.version == 1 {
                        OperationType::Create
                    } else {
                        OperationType::Update
                    };
                    match serde_json::to_value(&saved) {
                        Ok(payload) => {
                            self.enqueue_mutation(
                                op_type,
                                ResourceKind::Setlist,
                                &saved.id,
                                payload,
                            )
                            .await
                        }
                        Err(e) => warn!(error = %e, "Setlist payload snapshot failed"),
                    }
                }
                OpResult::ok(saved)
            }
            Err(e) => from_storage(Err(e)),
        }
    }

    /// Look up a setlist. A miss is `success` with no data.
    pub async fn get_setlist(&self, id: &str) -> OpResult<CachedSetlist> {
        from_storage_optional(self.storage.get_setlist(id).await)
    }

    /// Delete a setlist locally and queue the remote delete.
    pub async fn delete_setlist(&self, id: &str) -> OpResult<bool> {
        match self.storage.delete_setlist(id).await {
            Ok(removed) => {
                if removed {
                    self.enqueue_mutation(
                        OperationType::Delete,
                        ResourceKind::Setlist,
                        id,
                        serde_json::json!({ "id": id }),
                    )
                    .await;
                }
                OpResult::ok(removed)
            }
            Err(e) => from_storage(Err(e)),
        }
    }

    /// List setlists with filtering, sorting and pagination.
    pub async fn list_setlists(&self, query: SetlistQuery) -> OpResult<Vec<CachedSetlist>> {
        from_storage(self.storage.list_setlists(&query).await)
    }

    /// Append a song to a setlist and queue the arrangement creation.
    pub async fn add_song_to_setlist(
        &self,
        setlist_id: &str,
        item: SetlistItem,
    ) -> OpResult<CachedSetlist> {
        let song_id = item.song_id.clone();
        let payload = serde_json::json!({
            "setlist_id": setlist_id,
            "song_id": song_id,
            "transpose": item.transpose,
            "notes": item.notes,
        });

        match self.storage.add_song_to_setlist(setlist_id, item).await {
            Ok(Some(saved)) => {
                self.enqueue_mutation(
                    OperationType::Create,
                    ResourceKind::Arrangement,
                    &song_id,
                    payload,
                )
                .await;
                OpResult::ok(saved)
            }
            Ok(None) => OpResult::ok_empty(),
            Err(e) => from_storage(Err(e)),
        }
    }

    /// Remove a song from a setlist and queue the arrangement deletion.
    pub async fn remove_song_from_setlist(
        &self,
        setlist_id: &str,
        song_id: &str,
    ) -> OpResult<CachedSetlist> {
        match self
            .storage
            .remove_song_from_setlist(setlist_id, song_id)
            .await
        {
            Ok(Some(saved)) => {
                self.enqueue_mutation(
                    OperationType::Delete,
                    ResourceKind::Arrangement,
                    song_id,
                    serde_json::json!({ "setlist_id": setlist_id, "song_id": song_id }),
                )
                .await;
                OpResult::ok(saved)
            }
            Ok(None) => OpResult::ok_empty(),
            Err(e) => from_storage(Err(e)),
        }
    }

    /// Move a setlist entry and queue the reordered setlist state.
    pub async fn move_song_in_setlist(
        &self,
        setlist_id: &str,
        from: usize,
        to: usize,
    ) -> OpResult<CachedSetlist> {
        match self
            .storage
            .move_song_in_setlist(setlist_id, from, to)
            .await
        {
            Ok(Some(saved)) => {
                match serde_json::to_value(&saved) {
                    Ok(payload) => {
                        self.enqueue_mutation(
                            OperationType::Update,
                            ResourceKind::Setlist,
                            setlist_id,
                            payload,
                        )
                        .await
                    }
                    Err(e) => warn!(error = %e, "Setlist payload snapshot failed"),
                }
                OpResult::ok(saved)
            }
            Ok(None) => OpResult::ok_empty(),
            Err(e) => from_storage(Err(e)),
        }
    }

    // =========================================================================
    // Preferences
    // =========================================================================

    /// Save a user's preferences. Preferences sync outside the mutation
    /// queue (no remote resource maps to them).
    pub async fn save_preferences(&self, prefs: UserPreferences) -> OpResult<UserPreferences> {
        from_storage(self.storage.save_preferences(prefs).await)
    }

    /// Look up a user's preferences.
    pub async fn get_preferences(&self, user_id: &str) -> OpResult<UserPreferences> {
        from_storage_optional(self.storage.get_preferences(user_id).await)
    }

    // =========================================================================
    // Stats, quota, maintenance
    // =========================================================================

    /// Aggregate counts and bytes per entity type.
    pub async fn storage_stats(&self) -> OpResult<StorageStats> {
        from_storage(self.storage.storage_stats().await)
    }

    /// Check quota usage, firing edge-triggered threshold events.
    pub async fn check_quota(&self) -> OpResult<QuotaStatus> {
        from_storage(self.storage.check_storage_quota().await)
    }

    /// Run a cleanup pass.
    pub async fn cleanup(&self, config: CleanupConfig) -> OpResult<CleanupReport> {
        from_storage(self.storage.cleanup(config).await)
    }

    // =========================================================================
    // Data portability
    // =========================================================================

    /// Produce an export bundle.
    pub async fn export_data(&self, options: ExportOptions) -> OpResult<ExportData> {
        from_storage(self.storage.export_data(options).await)
    }

    /// Import a bundle with conflict resolution.
    pub async fn import_data(
        &self,
        data: &ExportData,
        options: ImportOptions,
    ) -> OpResult<ImportResult> {
        from_storage(self.storage.import_data(data, options).await)
    }

    // =========================================================================
    // Sync queue
    // =========================================================================

    /// Per-status queue counts.
    pub async fn queue_stats(&self) -> OpResult<QueueStats> {
        from_sync(self.queue.stats().await)
    }

    /// Permanently failed operations, for surfacing to the user.
    pub async fn failed_operations(&self) -> OpResult<Vec<SyncOperation>> {
        from_sync(self.queue.failed_operations().await)
    }

    /// Reset failed operations and drain if online.
    pub async fn retry_failed(&self) -> OpResult<u64> {
        from_sync(self.coordinator.retry_failed().await)
    }

    /// Prune completed queue entries.
    pub async fn clear_completed(&self) -> OpResult<u64> {
        from_sync(self.queue.clear_completed().await)
    }

    /// Destructive queue reset (logout/account switch).
    pub async fn clear_queue(&self) -> OpResult<u64> {
        from_sync(self.queue.clear_all().await)
    }

    /// Manually trigger a drain. Fails with an `offline` error when the
    /// effective status is not online.
    pub async fn sync_now(&self) -> OpResult<DrainSummary> {
        from_sync(self.coordinator.sync_now().await)
    }
}

/// Convenience bootstrapper for desktop hosts.
///
/// Builds the reqwest-backed API client, the TCP network monitor and the
/// disk quota probe from `bridge-desktop`, then initializes the core.
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(
    api_base_url: impl Into<String>,
    database_path: impl Into<std::path::PathBuf>,
    quota_bytes: u64,
    config: CoreConfig,
) -> Result<SongbookCore> {
    use bridge_desktop::{DesktopNetworkMonitor, DiskQuotaProbe, HttpRemoteApi};
    use bridge_traits::time::SystemClock;

    let database_path = database_path.into();
    let deps = CoreDependencies::new(
        Arc::new(HttpRemoteApi::new(api_base_url)),
        Arc::new(DesktopNetworkMonitor::new()),
        Arc::new(DiskQuotaProbe::new(database_path.clone(), quota_bytes)),
        Arc::new(SystemClock),
    );

    SongbookCore::initialize(deps, DatabaseConfig::new(database_path), config).await
}
