//! # Offline Storage Service
//!
//! The cache manager all UI-facing operations go through. The persistent
//! store is the source of truth; the in-process LRU caches are derived,
//! recomputable projections.
//!
//! ## Write serialization
//!
//! All mutations to one record are serialized through a per-`(store, id)`
//! async lock, so interleaved read-modify-write cycles cannot lose updates.
//! Access-stat bumps are fire-and-forget tasks that take the same lock.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use bridge_traits::quota::QuotaProbe;
use bridge_traits::time::Clock;
use core_runtime::events::{CoreEvent, EventBus, EventStream, StorageEvent};
use core_runtime::CoreConfig;
use core_store::repositories::{
    MetaRepository, PreferencesRepository, SetlistRepository, SongRepository,
    SqliteMetaRepository, SqlitePreferencesRepository, SqliteSetlistRepository,
    SqliteSongRepository,
};
use core_store::{
    db, CachedSetlist, CachedSong, SetlistItem, SetlistQuery, SongQuery, SyncState,
    UserPreferences,
};
use lru::LruCache;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, StorageError};
use crate::stats::QuotaLevel;

/// Named store a write lock belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum StoreKind {
    Songs,
    Setlists,
    Preferences,
}

pub(crate) type WriteLocks = Mutex<HashMap<(StoreKind, String), Arc<Mutex<()>>>>;

/// Get (or create) the write lock for one record
pub(crate) async fn entity_lock(
    locks: &WriteLocks,
    store: StoreKind,
    id: &str,
) -> Arc<Mutex<()>> {
    let mut map = locks.lock().await;
    map.entry((store, id.to_string()))
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// SHA-256 hex digest over a song's content fields.
///
/// Excludes bookkeeping (timestamps, versions, usage stats) so two copies
/// with the same musical content compare equal.
pub(crate) fn song_checksum(song: &CachedSong) -> String {
    let content = song_content_bytes(song);
    let mut hasher = Sha256::new();
    hasher.update(&content);
    format!("{:x}", hasher.finalize())
}

/// Canonical content bytes used for both the checksum and the size estimate
pub(crate) fn song_content_bytes(song: &CachedSong) -> Vec<u8> {
    let content = serde_json::json!({
        "title": song.title,
        "artist": song.artist,
        "key_signature": song.key_signature,
        "tempo": song.tempo,
        "tags": song.tags,
        "lyrics": song.lyrics,
        "chord_sheet": song.chord_sheet,
    });
    content.to_string().into_bytes()
}

/// The central cache manager
///
/// Constructed once at application start and shared behind `Arc`; explicit
/// `initialize()`/`close()` lifecycle so tests can run isolated instances.
pub struct OfflineStorage {
    pub(crate) pool: SqlitePool,
    pub(crate) songs: Arc<dyn SongRepository>,
    pub(crate) setlists: Arc<dyn SetlistRepository>,
    pub(crate) preferences: Arc<dyn PreferencesRepository>,
    pub(crate) meta: Arc<dyn MetaRepository>,
    pub(crate) song_cache: Arc<Mutex<LruCache<String, CachedSong>>>,
    pub(crate) setlist_cache: Arc<Mutex<LruCache<String, CachedSetlist>>>,
    pub(crate) write_locks: Arc<WriteLocks>,
    pub(crate) quota_probe: Arc<dyn QuotaProbe>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) event_bus: EventBus,
    pub(crate) config: CoreConfig,
    pub(crate) quota_level: Mutex<QuotaLevel>,
}

impl OfflineStorage {
    /// Create the service over an opened pool
    pub fn new(
        pool: SqlitePool,
        quota_probe: Arc<dyn QuotaProbe>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
        config: CoreConfig,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| StorageError::Validation {
                field: "config".to_string(),
                message: e.to_string(),
            })?;

        let song_capacity = NonZeroUsize::new(config.song_cache_capacity)
            .expect("validated capacity");
        let setlist_capacity = NonZeroUsize::new(config.setlist_cache_capacity)
            .expect("validated capacity");

        Ok(Self {
            songs: Arc::new(SqliteSongRepository::new(pool.clone())),
            setlists: Arc::new(SqliteSetlistRepository::new(pool.clone())),
            preferences: Arc::new(SqlitePreferencesRepository::new(pool.clone())),
            meta: Arc::new(SqliteMetaRepository::new(pool.clone())),
            pool,
            song_cache: Arc::new(Mutex::new(LruCache::new(song_capacity))),
            setlist_cache: Arc::new(Mutex::new(LruCache::new(setlist_capacity))),
            write_locks: Arc::new(Mutex::new(HashMap::new())),
            quota_probe,
            clock,
            event_bus,
            config,
            quota_level: Mutex::new(QuotaLevel::Normal),
        })
    }

    /// Stamp schema bookkeeping. Call once after construction.
    pub async fn initialize(&self) -> Result<()> {
        let now = self.clock.unix_timestamp();
        match self.meta.schema_version().await? {
            None => {
                self.meta.stamp_schema_version(now).await?;
                info!(version = db::SCHEMA_VERSION, "Stamped store schema version");
            }
            Some(version) if version != db::SCHEMA_VERSION => {
                // Migration mechanics live elsewhere; the stamp records intent
                warn!(
                    found = version,
                    expected = db::SCHEMA_VERSION,
                    "Store schema version mismatch"
                );
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Close the underlying pool. The instance is unusable afterwards.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Offline storage closed");
    }

    /// Subscribe to service events
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// The service's event bus (shared with the sync layer)
    pub fn event_bus(&self) -> EventBus {
        self.event_bus.clone()
    }

    fn emit(&self, event: CoreEvent) {
        self.event_bus.emit(event).ok();
    }

    pub(crate) fn emit_store_error(&self, operation: &str, message: impl Into<String>) {
        self.emit(CoreEvent::Storage(StorageEvent::StorageError {
            operation: operation.to_string(),
            message: message.into(),
        }));
    }

    /// Estimated-post-write quota gate. `delta` is the growth in bytes this
    /// write would cause; shrinking writes always pass.
    async fn check_quota_for_write(&self, delta: i64) -> Result<()> {
        if delta <= 0 {
            return Ok(());
        }

        match self.quota_probe.estimate().await {
            Ok(estimate) => {
                let projected = estimate.usage_bytes + delta as u64;
                if estimate.quota_bytes > 0 && projected > estimate.quota_bytes {
                    return Err(StorageError::QuotaExceeded {
                        needed_bytes: delta as u64,
                        available_bytes: estimate.available_bytes(),
                    });
                }
                Ok(())
            }
            Err(e) => {
                // A broken probe should not block writes
                debug!(error = %e, "Quota probe unavailable; skipping pre-write check");
                Ok(())
            }
        }
    }

    // =========================================================================
    // Songs
    // =========================================================================

    /// Save a song: validates, stamps `updated_at`, bumps `version`, marks
    /// `sync_state = Pending` unless the caller explicitly marked it synced,
    /// recomputes size/checksum, and emits a `SongSaved` event.
    #[instrument(skip(self, song), fields(song_id = %song.id))]
    pub async fn save_song(&self, mut song: CachedSong) -> Result<CachedSong> {
        song.validate().map_err(|e| StorageError::Validation {
            field: "song".to_string(),
            message: e,
        })?;

        let lock = entity_lock(&self.write_locks, StoreKind::Songs, &song.id).await;
        let _guard = lock.lock().await;

        let existing = self.songs.find_by_id(&song.id).await?;
        let now = self.clock.unix_timestamp();

        if let Some(existing) = &existing {
            // Bookkeeping the caller does not own
            song.created_at = existing.created_at;
            song.access_count = existing.access_count;
            song.last_accessed_at = existing.last_accessed_at;
            song.version = existing.version + 1;
        } else {
            song.version = song.version.max(1);
        }

        let explicitly_synced =
            song.sync_state == SyncState::Synced && song.last_synced_at.is_some();
        if !explicitly_synced {
            song.sync_state = SyncState::Pending;
        }

        song.updated_at = now;
        let content = song_content_bytes(&song);
        song.checksum = song_checksum(&song);
        song.file_size = content.len() as i64;

        let previous_size = existing.as_ref().map(|e| e.file_size).unwrap_or(0);
        self.check_quota_for_write(song.file_size - previous_size)
            .await?;

        if let Err(e) = self.songs.upsert(&song).await {
            self.emit_store_error("save_song", e.to_string());
            return Err(e.into());
        }

        self.song_cache
            .lock()
            .await
            .put(song.id.clone(), song.clone());

        self.emit(CoreEvent::Storage(StorageEvent::SongSaved {
            song_id: song.id.clone(),
            title: song.title.clone(),
            created: existing.is_none(),
        }));

        Ok(song)
    }

    /// Read a song through the memory cache.
    ///
    /// A hit bumps `access_count`/`last_accessed_at` as a fire-and-forget
    /// side effect; the returned copy reflects the pre-bump stats.
    #[instrument(skip(self))]
    pub async fn get_song(&self, id: &str) -> Result<Option<CachedSong>> {
        if let Some(hit) = self.song_cache.lock().await.get(id).cloned() {
            self.spawn_song_access_bump(id.to_string());
            return Ok(Some(hit));
        }

        match self.songs.find_by_id(id).await? {
            Some(song) => {
                self.song_cache
                    .lock()
                    .await
                    .put(song.id.clone(), song.clone());
                self.spawn_song_access_bump(id.to_string());
                Ok(Some(song))
            }
            None => Ok(None),
        }
    }

    fn spawn_song_access_bump(&self, id: String) {
        let repo = Arc::clone(&self.songs);
        let locks = Arc::clone(&self.write_locks);
        let cache = Arc::clone(&self.song_cache);
        let now = self.clock.unix_timestamp();

        tokio::spawn(async move {
            let lock = entity_lock(&locks, StoreKind::Songs, &id).await;
            let _guard = lock.lock().await;

            if let Err(e) = repo.record_access(&id, now).await {
                debug!(song_id = %id, error = %e, "Access bump failed");
                return;
            }

            if let Some(entry) = cache.lock().await.peek_mut(&id) {
                entry.access_count += 1;
                entry.last_accessed_at = Some(now);
            }
        });
    }

    /// Delete a song. Idempotent; returns whether a record was removed.
    #[instrument(skip(self))]
    pub async fn delete_song(&self, id: &str) -> Result<bool> {
        let lock = entity_lock(&self.write_locks, StoreKind::Songs, id).await;
        let _guard = lock.lock().await;

        let removed = self.songs.delete(id).await?;
        self.song_cache.lock().await.pop(id);

        if removed {
            self.emit(CoreEvent::Storage(StorageEvent::SongDeleted {
                song_id: id.to_string(),
            }));
        }

        Ok(removed)
    }

    /// List songs with filtering, sorting, pagination and search
    pub async fn list_songs(&self, query: &SongQuery) -> Result<Vec<CachedSong>> {
        Ok(self.songs.query(query).await?)
    }

    // =========================================================================
    // Setlists
    // =========================================================================

    /// Save a setlist. The item sequence is renormalized to a dense 0..n-1
    /// ordering before validation.
    #[instrument(skip(self, setlist), fields(setlist_id = %setlist.id))]
    pub async fn save_setlist(&self, mut setlist: CachedSetlist) -> Result<CachedSetlist> {
        setlist.normalize_orders();

        let lock = entity_lock(&self.write_locks, StoreKind::Setlists, &setlist.id).await;
        let _guard = lock.lock().await;

        let existing = self.setlists.find_by_id(&setlist.id).await?;
        self.persist_setlist_locked(setlist, existing).await
    }

    /// Stamp and upsert a setlist. The caller holds the record's write lock
    /// and supplies the current persisted state.
    async fn persist_setlist_locked(
        &self,
        mut setlist: CachedSetlist,
        existing: Option<CachedSetlist>,
    ) -> Result<CachedSetlist> {
        setlist.validate().map_err(|e| StorageError::Validation {
            field: "setlist".to_string(),
            message: e,
        })?;

        let now = self.clock.unix_timestamp();

        if let Some(existing) = &existing {
            setlist.created_at = existing.created_at;
            setlist.usage_count = existing.usage_count;
            setlist.last_used_at = existing.last_used_at;
            setlist.version = existing.version + 1;
        } else {
            setlist.version = setlist.version.max(1);
        }

        let explicitly_synced =
            setlist.sync_state == SyncState::Synced && setlist.last_synced_at.is_some();
        if !explicitly_synced {
            setlist.sync_state = SyncState::Pending;
        }

        setlist.updated_at = now;

        if let Err(e) = self.setlists.upsert(&setlist).await {
            self.emit_store_error("save_setlist", e.to_string());
            return Err(e.into());
        }

        self.setlist_cache
            .lock()
            .await
            .put(setlist.id.clone(), setlist.clone());

        self.emit(CoreEvent::Storage(StorageEvent::SetlistSaved {
            setlist_id: setlist.id.clone(),
            name: setlist.name.clone(),
            created: existing.is_none(),
        }));

        Ok(setlist)
    }

    /// Read a setlist through the memory cache, bumping usage stats
    /// fire-and-forget.
    #[instrument(skip(self))]
    pub async fn get_setlist(&self, id: &str) -> Result<Option<CachedSetlist>> {
        if let Some(hit) = self.setlist_cache.lock().await.get(id).cloned() {
            self.spawn_setlist_use_bump(id.to_string());
            return Ok(Some(hit));
        }

        match self.setlists.find_by_id(id).await? {
            Some(setlist) => {
                self.setlist_cache
                    .lock()
                    .await
                    .put(setlist.id.clone(), setlist.clone());
                self.spawn_setlist_use_bump(id.to_string());
                Ok(Some(setlist))
            }
            None => Ok(None),
        }
    }

    fn spawn_setlist_use_bump(&self, id: String) {
        let repo = Arc::clone(&self.setlists);
        let locks = Arc::clone(&self.write_locks);
        let cache = Arc::clone(&self.setlist_cache);
        let now = self.clock.unix_timestamp();

        tokio::spawn(async move {
            let lock = entity_lock(&locks, StoreKind::Setlists, &id).await;
            let _guard = lock.lock().await;

            if let Err(e) = repo.record_use(&id, now).await {
                debug!(setlist_id = %id, error = %e, "Use bump failed");
                return;
            }

            if let Some(entry) = cache.lock().await.peek_mut(&id) {
                entry.usage_count += 1;
                entry.last_used_at = Some(now);
            }
        });
    }

    /// Delete a setlist. Idempotent.
    #[instrument(skip(self))]
    pub async fn delete_setlist(&self, id: &str) -> Result<bool> {
        let lock = entity_lock(&self.write_locks, StoreKind::Setlists, id).await;
        let _guard = lock.lock().await;

        let removed = self.setlists.delete(id).await?;
        self.setlist_cache.lock().await.pop(id);

        if removed {
            self.emit(CoreEvent::Storage(StorageEvent::SetlistDeleted {
                setlist_id: id.to_string(),
            }));
        }

        Ok(removed)
    }

    /// List setlists with filtering, sorting and pagination
    pub async fn list_setlists(&self, query: &SetlistQuery) -> Result<Vec<CachedSetlist>> {
        Ok(self.setlists.query(query).await?)
    }

    /// Append a song to a setlist; the order sequence is renormalized.
    /// Returns `None` when the setlist does not exist.
    #[instrument(skip(self, item))]
    pub async fn add_song_to_setlist(
        &self,
        setlist_id: &str,
        item: SetlistItem,
    ) -> Result<Option<CachedSetlist>> {
        let lock = entity_lock(&self.write_locks, StoreKind::Setlists, setlist_id).await;
        let _guard = lock.lock().await;

        let Some(mut setlist) = self.setlists.find_by_id(setlist_id).await? else {
            return Ok(None);
        };

        let existing = setlist.clone();
        setlist.add_song(item);

        Ok(Some(
            self.persist_setlist_locked(setlist, Some(existing)).await?,
        ))
    }

    /// Remove the first entry referencing `song_id` from a setlist.
    /// Returns `None` when the setlist does not exist.
    #[instrument(skip(self))]
    pub async fn remove_song_from_setlist(
        &self,
        setlist_id: &str,
        song_id: &str,
    ) -> Result<Option<CachedSetlist>> {
        let lock = entity_lock(&self.write_locks, StoreKind::Setlists, setlist_id).await;
        let _guard = lock.lock().await;

        let Some(mut setlist) = self.setlists.find_by_id(setlist_id).await? else {
            return Ok(None);
        };

        let existing = setlist.clone();
        setlist.remove_song(song_id);

        Ok(Some(
            self.persist_setlist_locked(setlist, Some(existing)).await?,
        ))
    }

    /// Move an entry within a setlist and renormalize the order sequence.
    #[instrument(skip(self))]
    pub async fn move_song_in_setlist(
        &self,
        setlist_id: &str,
        from: usize,
        to: usize,
    ) -> Result<Option<CachedSetlist>> {
        let lock = entity_lock(&self.write_locks, StoreKind::Setlists, setlist_id).await;
        let _guard = lock.lock().await;

        let Some(mut setlist) = self.setlists.find_by_id(setlist_id).await? else {
            return Ok(None);
        };

        let existing = setlist.clone();
        setlist.move_song(from, to);

        Ok(Some(
            self.persist_setlist_locked(setlist, Some(existing)).await?,
        ))
    }

    // =========================================================================
    // Preferences
    // =========================================================================

    /// Save a user's preferences (one record per user)
    #[instrument(skip(self, prefs), fields(user_id = %prefs.user_id))]
    pub async fn save_preferences(&self, mut prefs: UserPreferences) -> Result<UserPreferences> {
        prefs.validate().map_err(|e| StorageError::Validation {
            field: "preferences".to_string(),
            message: e,
        })?;

        let lock = entity_lock(&self.write_locks, StoreKind::Preferences, &prefs.user_id).await;
        let _guard = lock.lock().await;

        let existing = self.preferences.find_by_user(&prefs.user_id).await?;
        let now = self.clock.unix_timestamp();

        if let Some(existing) = &existing {
            prefs.created_at = existing.created_at;
            prefs.version = existing.version + 1;
        } else {
            prefs.version = prefs.version.max(1);
        }

        let explicitly_synced =
            prefs.sync_state == SyncState::Synced && prefs.last_synced_at.is_some();
        if !explicitly_synced {
            prefs.sync_state = SyncState::Pending;
        }

        prefs.updated_at = now;

        if let Err(e) = self.preferences.upsert(&prefs).await {
            self.emit_store_error("save_preferences", e.to_string());
            return Err(e.into());
        }

        self.emit(CoreEvent::Storage(StorageEvent::PreferencesSaved {
            user_id: prefs.user_id.clone(),
        }));

        Ok(prefs)
    }

    /// Read a user's preferences
    pub async fn get_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>> {
        Ok(self.preferences.find_by_user(user_id).await?)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::quota::StorageEstimate;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

    /// Quota probe with adjustable readings
    pub struct StaticQuota {
        pub usage: AtomicU64,
        pub quota: AtomicU64,
    }

    impl StaticQuota {
        pub fn new(usage: u64, quota: u64) -> Self {
            Self {
                usage: AtomicU64::new(usage),
                quota: AtomicU64::new(quota),
            }
        }
    }

    #[async_trait]
    impl QuotaProbe for StaticQuota {
        async fn estimate(&self) -> bridge_traits::error::Result<StorageEstimate> {
            Ok(StorageEstimate {
                usage_bytes: self.usage.load(Ordering::SeqCst),
                quota_bytes: self.quota.load(Ordering::SeqCst),
            })
        }
    }

    /// Deterministic clock for tests
    pub struct FixedClock {
        pub now: AtomicI64,
    }

    impl FixedClock {
        pub fn at(now: i64) -> Self {
            Self {
                now: AtomicI64::new(now),
            }
        }

        pub fn advance(&self, secs: i64) {
            self.now.fetch_add(secs, Ordering::SeqCst);
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            Utc.timestamp_opt(self.now.load(Ordering::SeqCst), 0)
                .single()
                .expect("valid test timestamp")
        }
    }

    /// A fully wired service on an in-memory store
    pub async fn storage() -> (Arc<OfflineStorage>, Arc<StaticQuota>, Arc<FixedClock>) {
        storage_with_config(CoreConfig::default()).await
    }

    pub async fn storage_with_config(
        config: CoreConfig,
    ) -> (Arc<OfflineStorage>, Arc<StaticQuota>, Arc<FixedClock>) {
        let pool = core_store::create_test_pool().await.unwrap();
        let quota = Arc::new(StaticQuota::new(0, u64::MAX));
        let clock = Arc::new(FixedClock::at(1_000));

        let service = OfflineStorage::new(
            pool,
            quota.clone(),
            clock.clone(),
            EventBus::new(64),
            config,
        )
        .unwrap();
        service.initialize().await.unwrap();

        (Arc::new(service), quota, clock)
    }
}
