//! Import with conflict resolution
//!
//! Structural validation happens before any store mutation. A conflict is an
//! existing local record sharing an incoming record's id with a different
//! `version` or `updated_at`; records that tie on both but differ in content
//! also count (the local copy wins under the default strategy). Per-record
//! persistence failures are itemized, not fatal.

use core_runtime::events::{CoreEvent, MaintenanceEvent};
use core_store::{CachedSetlist, CachedSong, UserPreferences};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::export::{ExportData, ExportOptions, ExportPayload};
use crate::service::{song_checksum, OfflineStorage};

/// How to resolve an id collision between a local and an incoming record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Local wins; the incoming record is recorded as a skipped conflict
    #[default]
    KeepExisting,
    /// Incoming wins; the local record is fully replaced
    Overwrite,
    /// Persist the incoming record under a fresh id, keeping both copies
    CreateNew,
    /// Clear each targeted store before inserting all incoming records.
    /// Full-restore semantics, not a merge.
    Replace,
}

impl ConflictStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::KeepExisting => "keep_existing",
            ConflictStrategy::Overwrite => "overwrite",
            ConflictStrategy::CreateNew => "create_new",
            ConflictStrategy::Replace => "replace",
        }
    }
}

/// Import configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportOptions {
    pub strategy: ConflictStrategy,
    /// Take an export snapshot before mutating and keep it in `store_meta`
    pub create_backup: bool,
}

/// One resolved conflict in the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConflict {
    pub id: String,
    pub entity_type: String,
    pub resolution: String,
}

/// One failed record in the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportError {
    pub id: String,
    pub entity_type: String,
    pub message: String,
}

/// Transient import report; never persisted as an entity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportResult {
    pub success: bool,
    pub songs_imported: u64,
    pub setlists_imported: u64,
    pub preferences_imported: u64,
    pub conflicts: Vec<ImportConflict>,
    pub errors: Vec<ImportError>,
    /// Meta key of the pre-import backup, when one was taken
    pub backup_id: Option<String>,
}

/// Did the incoming copy collide with the local one?
fn song_conflicts(local: &CachedSong, incoming: &CachedSong) -> bool {
    if local.version != incoming.version || local.updated_at != incoming.updated_at {
        return true;
    }
    // Same version and timestamp: content decides the tie
    song_checksum(local) != song_checksum(incoming)
}

fn setlist_conflicts(local: &CachedSetlist, incoming: &CachedSetlist) -> bool {
    if local.version != incoming.version || local.updated_at != incoming.updated_at {
        return true;
    }
    local.name != incoming.name || local.songs != incoming.songs
}

fn preferences_conflict(local: &UserPreferences, incoming: &UserPreferences) -> bool {
    local.version != incoming.version || local.updated_at != incoming.updated_at
}

impl OfflineStorage {
    /// Import a bundle.
    ///
    /// Fails fast with `InvalidFormat` before touching the store when the
    /// bundle is structurally broken. Otherwise processes every record,
    /// itemizing conflicts and per-record failures; the overall result is
    /// successful as long as the structurally valid records were processed.
    #[instrument(skip(self, data))]
    pub async fn import_data(
        &self,
        data: &ExportData,
        options: ImportOptions,
    ) -> Result<ImportResult> {
        // Structural check first; no store writes before this passes
        let payload = data.validate()?;

        let mut result = ImportResult {
            success: true,
            ..Default::default()
        };

        if options.create_backup {
            result.backup_id = Some(self.create_import_backup().await?);
        }

        if options.strategy == ConflictStrategy::Replace {
            self.replace_stores(&payload, &mut result).await?;
        } else {
            self.merge_payload(&payload, options.strategy, &mut result)
                .await?;
        }

        // Imported records supersede whatever the caches held
        self.song_cache.lock().await.clear();
        self.setlist_cache.lock().await.clear();

        info!(
            songs = result.songs_imported,
            setlists = result.setlists_imported,
            preferences = result.preferences_imported,
            conflicts = result.conflicts.len(),
            errors = result.errors.len(),
            "Import finished"
        );

        self.event_bus
            .emit(CoreEvent::Maintenance(MaintenanceEvent::ImportFinished {
                songs_imported: result.songs_imported,
                setlists_imported: result.setlists_imported,
                conflicts: result.conflicts.len() as u64,
                errors: result.errors.len() as u64,
            }))
            .ok();

        Ok(result)
    }

    async fn create_import_backup(&self) -> Result<String> {
        let snapshot = self
            .export_data(ExportOptions {
                compress: true,
                exported_by: Some("pre-import backup".to_string()),
                ..Default::default()
            })
            .await?;

        let backup_id = format!("backup:{}", Uuid::new_v4());
        let serialized = serde_json::to_string(&snapshot)?;
        self.meta
            .set(&backup_id, &serialized, self.clock.unix_timestamp())
            .await?;

        info!(backup_id = %backup_id, "Pre-import backup stored");
        Ok(backup_id)
    }

    /// Load a backup bundle previously taken by `import_data`
    pub async fn load_backup(&self, backup_id: &str) -> Result<Option<ExportData>> {
        match self.meta.get(backup_id).await? {
            Some(serialized) => Ok(Some(serde_json::from_str(&serialized)?)),
            None => Ok(None),
        }
    }

    async fn replace_stores(
        &self,
        payload: &ExportPayload,
        result: &mut ImportResult,
    ) -> Result<()> {
        warn!("Replace import: clearing targeted stores");

        if !payload.songs.is_empty() {
            self.songs.clear().await?;
            for song in &payload.songs {
                match self.songs.upsert(song).await {
                    Ok(()) => result.songs_imported += 1,
                    Err(e) => result.errors.push(ImportError {
                        id: song.id.clone(),
                        entity_type: "song".to_string(),
                        message: e.to_string(),
                    }),
                }
            }
        }

        if !payload.setlists.is_empty() {
            self.setlists.clear().await?;
            for setlist in &payload.setlists {
                match self.setlists.upsert(setlist).await {
                    Ok(()) => result.setlists_imported += 1,
                    Err(e) => result.errors.push(ImportError {
                        id: setlist.id.clone(),
                        entity_type: "setlist".to_string(),
                        message: e.to_string(),
                    }),
                }
            }
        }

        if !payload.preferences.is_empty() {
            self.preferences.clear().await?;
            for prefs in &payload.preferences {
                match self.preferences.upsert(prefs).await {
                    Ok(()) => result.preferences_imported += 1,
                    Err(e) => result.errors.push(ImportError {
                        id: prefs.user_id.clone(),
                        entity_type: "preferences".to_string(),
                        message: e.to_string(),
                    }),
                }
            }
        }

        Ok(())
    }

    async fn merge_payload(
        &self,
        payload: &ExportPayload,
        strategy: ConflictStrategy,
        result: &mut ImportResult,
    ) -> Result<()> {
        for song in &payload.songs {
            match self.merge_song(song, strategy).await {
                Ok(MergeOutcome::Applied) => result.songs_imported += 1,
                Ok(MergeOutcome::Identical) => {}
                Ok(MergeOutcome::Conflict { applied }) => {
                    if applied {
                        result.songs_imported += 1;
                    }
                    result.conflicts.push(ImportConflict {
                        id: song.id.clone(),
                        entity_type: "song".to_string(),
                        resolution: strategy.as_str().to_string(),
                    });
                }
                Err(e) => result.errors.push(ImportError {
                    id: song.id.clone(),
                    entity_type: "song".to_string(),
                    message: e.to_string(),
                }),
            }
        }

        for setlist in &payload.setlists {
            match self.merge_setlist(setlist, strategy).await {
                Ok(MergeOutcome::Applied) => result.setlists_imported += 1,
                Ok(MergeOutcome::Identical) => {}
                Ok(MergeOutcome::Conflict { applied }) => {
                    if applied {
                        result.setlists_imported += 1;
                    }
                    result.conflicts.push(ImportConflict {
                        id: setlist.id.clone(),
                        entity_type: "setlist".to_string(),
                        resolution: strategy.as_str().to_string(),
                    });
                }
                Err(e) => result.errors.push(ImportError {
                    id: setlist.id.clone(),
                    entity_type: "setlist".to_string(),
                    message: e.to_string(),
                }),
            }
        }

        for prefs in &payload.preferences {
            match self.merge_preferences(prefs, strategy).await {
                Ok(MergeOutcome::Applied) => result.preferences_imported += 1,
                Ok(MergeOutcome::Identical) => {}
                Ok(MergeOutcome::Conflict { applied }) => {
                    if applied {
                        result.preferences_imported += 1;
                    }
                    result.conflicts.push(ImportConflict {
                        id: prefs.user_id.clone(),
                        entity_type: "preferences".to_string(),
                        resolution: strategy.as_str().to_string(),
                    });
                }
                Err(e) => result.errors.push(ImportError {
                    id: prefs.user_id.clone(),
                    entity_type: "preferences".to_string(),
                    message: e.to_string(),
                }),
            }
        }

        Ok(())
    }

    async fn merge_song(
        &self,
        incoming: &CachedSong,
        strategy: ConflictStrategy,
    ) -> Result<MergeOutcome> {
        match self.songs.find_by_id(&incoming.id).await? {
            None => {
                self.songs.upsert(incoming).await?;
                Ok(MergeOutcome::Applied)
            }
            Some(local) if !song_conflicts(&local, incoming) => Ok(MergeOutcome::Identical),
            Some(_) => match strategy {
                ConflictStrategy::KeepExisting => Ok(MergeOutcome::Conflict { applied: false }),
                ConflictStrategy::Overwrite => {
                    self.songs.upsert(incoming).await?;
                    Ok(MergeOutcome::Conflict { applied: true })
                }
                ConflictStrategy::CreateNew => {
                    let mut copy = incoming.clone();
                    copy.id = Uuid::new_v4().to_string();
                    // The fresh copy has no remote identity of its own
                    copy.server_id = None;
                    copy.server_version = None;
                    self.songs.upsert(&copy).await?;
                    Ok(MergeOutcome::Conflict { applied: true })
                }
                ConflictStrategy::Replace => unreachable!("bulk path handles replace"),
            },
        }
    }

    async fn merge_setlist(
        &self,
        incoming: &CachedSetlist,
        strategy: ConflictStrategy,
    ) -> Result<MergeOutcome> {
        match self.setlists.find_by_id(&incoming.id).await? {
            None => {
                self.setlists.upsert(incoming).await?;
                Ok(MergeOutcome::Applied)
            }
            Some(local) if !setlist_conflicts(&local, incoming) => Ok(MergeOutcome::Identical),
            Some(_) => match strategy {
                ConflictStrategy::KeepExisting => Ok(MergeOutcome::Conflict { applied: false }),
                ConflictStrategy::Overwrite => {
                    self.setlists.upsert(incoming).await?;
                    Ok(MergeOutcome::Conflict { applied: true })
                }
                ConflictStrategy::CreateNew => {
                    let mut copy = incoming.clone();
                    copy.id = Uuid::new_v4().to_string();
                    copy.server_id = None;
                    copy.server_version = None;
                    copy.share_token = None;
                    self.setlists.upsert(&copy).await?;
                    Ok(MergeOutcome::Conflict { applied: true })
                }
                ConflictStrategy::Replace => unreachable!("bulk path handles replace"),
            },
        }
    }

    async fn merge_preferences(
        &self,
        incoming: &UserPreferences,
        strategy: ConflictStrategy,
    ) -> Result<MergeOutcome> {
        match self.preferences.find_by_user(&incoming.user_id).await? {
            None => {
                self.preferences.upsert(incoming).await?;
                Ok(MergeOutcome::Applied)
            }
            Some(local) if !preferences_conflict(&local, incoming) => {
                Ok(MergeOutcome::Identical)
            }
            Some(_) => match strategy {
                ConflictStrategy::KeepExisting => Ok(MergeOutcome::Conflict { applied: false }),
                // Preferences are keyed by user; create-new would orphan the
                // copy, so both write strategies overwrite
                ConflictStrategy::Overwrite | ConflictStrategy::CreateNew => {
                    self.preferences.upsert(incoming).await?;
                    Ok(MergeOutcome::Conflict { applied: true })
                }
                ConflictStrategy::Replace => unreachable!("bulk path handles replace"),
            },
        }
    }
}

enum MergeOutcome {
    /// The incoming record was persisted without a collision
    Applied,
    /// Local and incoming are the same record; nothing to do
    Identical,
    /// An id collision was resolved per the strategy
    Conflict { applied: bool },
}
