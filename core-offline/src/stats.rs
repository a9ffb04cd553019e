//! Storage statistics and quota monitoring
//!
//! The quota monitor is edge-triggered: threshold events fire once per
//! crossing, not on every check while above the threshold. The last observed
//! level is kept in memory only, so a restart may re-announce the current
//! level on its first check.

use core_runtime::events::{CoreEvent, QuotaEvent};
use core_store::SyncState;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::Result;
use crate::service::OfflineStorage;

/// Counts and bytes for one entity type
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EntityStats {
    pub count: u64,
    pub bytes: u64,
}

/// Aggregate storage statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStats {
    pub songs: EntityStats,
    pub setlists: EntityStats,
    pub preferences: EntityStats,
    /// Entities still waiting for remote confirmation
    pub pending_sync: u64,
    /// Unix timestamp of this snapshot
    pub calculated_at: i64,
}

impl StorageStats {
    pub fn total_items(&self) -> u64 {
        self.songs.count + self.setlists.count + self.preferences.count
    }

    pub fn total_bytes(&self) -> u64 {
        self.songs.bytes + self.setlists.bytes + self.preferences.bytes
    }
}

/// Classified quota usage level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaLevel {
    Normal,
    /// Usage at or above the warning threshold (default 80%)
    Warning,
    /// Usage at or above the critical threshold (default 95%)
    Critical,
}

/// Result of a quota check
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub level: QuotaLevel,
    pub usage_bytes: u64,
    pub quota_bytes: u64,
    pub percent_used: u8,
}

impl OfflineStorage {
    /// Aggregate item counts and byte sizes per entity type
    #[instrument(skip(self))]
    pub async fn storage_stats(&self) -> Result<StorageStats> {
        let songs = EntityStats {
            count: self.songs.count().await?,
            bytes: self.songs.total_bytes().await?,
        };
        let setlists = EntityStats {
            count: self.setlists.count().await?,
            bytes: self.setlists.total_bytes().await?,
        };
        let preferences = EntityStats {
            count: self.preferences.count().await?,
            bytes: 0,
        };

        let pending_sync = self
            .songs
            .count_by_sync_state(SyncState::Pending)
            .await?
            + self
                .setlists
                .count_by_sync_state(SyncState::Pending)
                .await?;

        Ok(StorageStats {
            songs,
            setlists,
            preferences,
            pending_sync,
            calculated_at: self.clock.unix_timestamp(),
        })
    }

    /// Query the platform quota estimate and classify usage.
    ///
    /// Crossing a threshold upward emits one `QuotaWarning`/`QuotaCritical`
    /// event; dropping back below the warning threshold emits one
    /// `QuotaNormal`. Repeated checks at the same level emit nothing.
    #[instrument(skip(self))]
    pub async fn check_storage_quota(&self) -> Result<QuotaStatus> {
        let estimate = self.quota_probe.estimate().await?;

        let ratio = estimate.usage_ratio();
        let level = if ratio >= self.config.quota_critical_ratio {
            QuotaLevel::Critical
        } else if ratio >= self.config.quota_warning_ratio {
            QuotaLevel::Warning
        } else {
            QuotaLevel::Normal
        };

        let percent_used = (ratio * 100.0).round().min(100.0) as u8;
        let status = QuotaStatus {
            level,
            usage_bytes: estimate.usage_bytes,
            quota_bytes: estimate.quota_bytes,
            percent_used,
        };

        let mut last = self.quota_level.lock().await;
        if *last != level {
            debug!(from = ?*last, to = ?level, percent_used, "Quota level crossed");

            let event = match level {
                QuotaLevel::Critical => QuotaEvent::Critical {
                    usage_bytes: estimate.usage_bytes,
                    quota_bytes: estimate.quota_bytes,
                    percent_used,
                },
                QuotaLevel::Warning => QuotaEvent::Warning {
                    usage_bytes: estimate.usage_bytes,
                    quota_bytes: estimate.quota_bytes,
                    percent_used,
                },
                QuotaLevel::Normal => QuotaEvent::Normal {
                    usage_bytes: estimate.usage_bytes,
                    quota_bytes: estimate.quota_bytes,
                    percent_used,
                },
            };

            self.event_bus.emit(CoreEvent::Quota(event)).ok();
            *last = level;
        }

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::storage;
    use bridge_traits::time::Clock;
    use core_store::{CachedSetlist, CachedSong};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_storage_stats_aggregates_counts_and_bytes() {
        let (storage, _, clock) = storage().await;

        let mut song = CachedSong::new("One", clock.unix_timestamp());
        song.lyrics = Some("line one\nline two".to_string());
        storage.save_song(song).await.unwrap();
        storage
            .save_song(CachedSong::new("Two", clock.unix_timestamp()))
            .await
            .unwrap();
        storage
            .save_setlist(CachedSetlist::new("List", clock.unix_timestamp()))
            .await
            .unwrap();

        let stats = storage.storage_stats().await.unwrap();
        assert_eq!(stats.songs.count, 2);
        assert_eq!(stats.setlists.count, 1);
        assert!(stats.songs.bytes > 0);
        assert_eq!(stats.total_items(), 3);
        assert_eq!(stats.pending_sync, 3);
    }

    #[tokio::test]
    async fn test_quota_warning_fires_exactly_once_per_crossing() {
        let (storage, quota, _) = storage().await;
        let mut stream = storage.subscribe();

        quota.quota.store(100, Ordering::SeqCst);
        quota.usage.store(50, Ordering::SeqCst);
        let status = storage.check_storage_quota().await.unwrap();
        assert_eq!(status.level, QuotaLevel::Normal);

        // Cross the 80% threshold
        quota.usage.store(80, Ordering::SeqCst);
        let status = storage.check_storage_quota().await.unwrap();
        assert_eq!(status.level, QuotaLevel::Warning);

        // Still above: no re-fire
        quota.usage.store(85, Ordering::SeqCst);
        storage.check_storage_quota().await.unwrap();

        let mut warnings = 0;
        while let Some(Ok(event)) = stream.try_recv() {
            if matches!(event, CoreEvent::Quota(QuotaEvent::Warning { .. })) {
                warnings += 1;
            }
        }
        assert_eq!(warnings, 1);
    }

    #[tokio::test]
    async fn test_quota_critical_and_recovery() {
        let (storage, quota, _) = storage().await;
        let mut stream = storage.subscribe();

        quota.quota.store(100, Ordering::SeqCst);
        quota.usage.store(96, Ordering::SeqCst);
        let status = storage.check_storage_quota().await.unwrap();
        assert_eq!(status.level, QuotaLevel::Critical);

        quota.usage.store(10, Ordering::SeqCst);
        let status = storage.check_storage_quota().await.unwrap();
        assert_eq!(status.level, QuotaLevel::Normal);

        let mut saw_critical = false;
        let mut saw_normal = false;
        while let Some(Ok(event)) = stream.try_recv() {
            match event {
                CoreEvent::Quota(QuotaEvent::Critical { .. }) => saw_critical = true,
                CoreEvent::Quota(QuotaEvent::Normal { .. }) => saw_normal = true,
                _ => {}
            }
        }
        assert!(saw_critical);
        assert!(saw_normal);
    }
}
