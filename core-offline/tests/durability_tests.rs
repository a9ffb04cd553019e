//! Durability across a simulated process restart
//!
//! Saves entities through one service instance backed by a file database,
//! closes it, opens a fresh instance over the same file, and verifies the
//! read-back equals what was saved (versions and timestamps included).

use async_trait::async_trait;
use bridge_traits::quota::{QuotaProbe, StorageEstimate};
use bridge_traits::time::SystemClock;
use core_offline::OfflineStorage;
use core_runtime::events::EventBus;
use core_runtime::CoreConfig;
use core_store::{
    create_pool, CachedSetlist, CachedSong, DatabaseConfig, SetlistItem, SyncState,
};
use std::sync::Arc;

struct UnlimitedQuota;

#[async_trait]
impl QuotaProbe for UnlimitedQuota {
    async fn estimate(&self) -> bridge_traits::error::Result<StorageEstimate> {
        Ok(StorageEstimate {
            usage_bytes: 0,
            quota_bytes: u64::MAX,
        })
    }
}

async fn open_storage(path: &std::path::Path) -> OfflineStorage {
    let pool = create_pool(DatabaseConfig::new(path)).await.unwrap();
    let storage = OfflineStorage::new(
        pool,
        Arc::new(UnlimitedQuota),
        Arc::new(SystemClock),
        EventBus::new(16),
        CoreConfig::default(),
    )
    .unwrap();
    storage.initialize().await.unwrap();
    storage
}

fn temp_db_path(tag: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join("chordbook-durability-tests");
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(format!("{}-{}.db", tag, uuid::Uuid::new_v4()))
}

#[tokio::test]
async fn test_saved_entities_survive_restart() {
    let path = temp_db_path("restart");

    let mut song = CachedSong::new("Be Thou My Vision", 0);
    song.artist = Some("Traditional".to_string());
    song.key_signature = Some("D".to_string());
    song.tags = vec!["hymn".to_string()];
    song.lyrics = Some("Be thou my vision, O Lord of my heart".to_string());

    let mut setlist = CachedSetlist::new("Evening Service", 0);
    setlist.add_song(SetlistItem::new("song-1").with_transpose(-2));
    setlist.created_by = Some("user-1".to_string());

    let (saved_song, saved_setlist) = {
        let storage = open_storage(&path).await;
        let saved_song = storage.save_song(song).await.unwrap();
        let saved_setlist = storage.save_setlist(setlist).await.unwrap();
        storage.close().await;
        (saved_song, saved_setlist)
    };

    // Fresh instance over the same file
    let storage = open_storage(&path).await;

    let song_back = storage.get_song(&saved_song.id).await.unwrap().unwrap();
    assert_eq!(song_back, saved_song);
    assert_eq!(song_back.version, saved_song.version);
    assert_eq!(song_back.updated_at, saved_song.updated_at);
    assert_eq!(song_back.sync_state, SyncState::Pending);

    let setlist_back = storage
        .get_setlist(&saved_setlist.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(setlist_back, saved_setlist);
    assert_eq!(setlist_back.songs[0].transpose, -2);

    storage.close().await;
    std::fs::remove_file(&path).ok();
}

#[tokio::test]
async fn test_schema_version_survives_restart() {
    let path = temp_db_path("schema");

    {
        let storage = open_storage(&path).await;
        storage.close().await;
    }

    // Re-opening re-runs initialization idempotently
    let storage = open_storage(&path).await;
    let stats = storage.storage_stats().await.unwrap();
    assert_eq!(stats.total_items(), 0);

    storage.close().await;
    std::fs::remove_file(&path).ok();
}
