//! Domain models for the offline cache
//!
//! This module contains the cached entity types with validation and the
//! invariants the storage service relies on: monotonic versions, dense
//! setlist ordering, and sync-state bookkeeping.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::StoreError;

// =============================================================================
// Sync State
// =============================================================================

/// Per-entity marker of whether the local copy matches the last known remote
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Local copy matches the last confirmed remote state
    Synced,
    /// Local mutation not yet confirmed remotely
    #[default]
    Pending,
    /// Local and remote copies diverged
    Conflict,
    /// The last sync attempt for this entity failed
    Error,
}

impl SyncState {
    /// String representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Synced => "synced",
            SyncState::Pending => "pending",
            SyncState::Conflict => "conflict",
            SyncState::Error => "error",
        }
    }
}

impl FromStr for SyncState {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, StoreError> {
        match s {
            "synced" => Ok(SyncState::Synced),
            "pending" => Ok(SyncState::Pending),
            "conflict" => Ok(SyncState::Conflict),
            "error" => Ok(SyncState::Error),
            _ => Err(StoreError::InvalidInput {
                field: "sync_state".to_string(),
                message: format!("Unknown sync state: {}", s),
            }),
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Cached Song
// =============================================================================

/// A song cached locally, with usage and storage bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSong {
    /// Unique identifier
    pub id: String,
    /// Song title
    pub title: String,
    /// Performing/composing artist
    pub artist: Option<String>,
    /// Musical key (e.g., "G", "Em")
    pub key_signature: Option<String>,
    /// Tempo in BPM
    pub tempo: Option<i32>,
    /// Free-form tags
    pub tags: Vec<String>,
    /// Plain lyrics text
    pub lyrics: Option<String>,
    /// ChordPro-style chord sheet
    pub chord_sheet: Option<String>,

    // Usage stats
    /// Number of times the song was read from the cache
    pub access_count: i64,
    /// Unix timestamp of the last cache read
    pub last_accessed_at: Option<i64>,
    /// User favorite flag
    pub is_favorite: bool,

    // Storage stats
    /// Serialized size in bytes, recomputed on save
    pub file_size: i64,
    /// SHA-256 hex digest of the content fields, recomputed on save
    pub checksum: String,

    // Remote back-reference (relation + lookup only, not ownership)
    /// Server-side identifier, when the song exists remotely
    pub server_id: Option<String>,
    /// Server-side version used for conflict detection
    pub server_version: Option<i64>,

    // Base entity fields
    /// When first cached (Unix seconds)
    pub created_at: i64,
    /// Last local mutation time
    pub updated_at: i64,
    /// Sync marker
    pub sync_state: SyncState,
    /// When the entity last matched the remote state
    pub last_synced_at: Option<i64>,
    /// Monotonic local version, incremented on every mutation
    pub version: i64,
}

impl CachedSong {
    /// Create a new cached song with defaults
    pub fn new(title: impl Into<String>, now: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            artist: None,
            key_signature: None,
            tempo: None,
            tags: Vec::new(),
            lyrics: None,
            chord_sheet: None,
            access_count: 0,
            last_accessed_at: None,
            is_favorite: false,
            file_size: 0,
            checksum: String::new(),
            server_id: None,
            server_version: None,
            created_at: now,
            updated_at: now,
            sync_state: SyncState::Pending,
            last_synced_at: None,
            version: 1,
        }
    }

    /// Validate song data
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Song id cannot be empty".to_string());
        }

        if self.title.trim().is_empty() {
            return Err("Song title cannot be empty".to_string());
        }

        if let Some(tempo) = self.tempo {
            if !(20..=400).contains(&tempo) {
                return Err(format!("Song tempo {} is out of valid range", tempo));
            }
        }

        if self.version < 1 {
            return Err("Song version must be positive".to_string());
        }

        Ok(())
    }

    /// Normalize a string for searching (lowercase, trimmed)
    pub fn normalize(s: &str) -> String {
        s.trim().to_lowercase()
    }

    /// Mark the entity as confirmed by the remote at `now`
    pub fn mark_synced(&mut self, now: i64) {
        self.sync_state = SyncState::Synced;
        self.last_synced_at = Some(now);
    }
}

// =============================================================================
// Cached Setlist
// =============================================================================

/// One entry in a setlist, referencing a song by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetlistItem {
    /// Referenced song id (by value; the song is not owned by the setlist)
    pub song_id: String,
    /// Position in the setlist; always equal to the array index
    pub order: i32,
    /// Transposition offset in semitones
    pub transpose: i32,
    /// Per-song performance notes
    pub notes: Option<String>,
}

impl SetlistItem {
    pub fn new(song_id: impl Into<String>) -> Self {
        Self {
            song_id: song_id.into(),
            order: 0,
            transpose: 0,
            notes: None,
        }
    }

    pub fn with_transpose(mut self, semitones: i32) -> Self {
        self.transpose = semitones;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Validate item data
    pub fn validate(&self) -> Result<(), String> {
        if self.song_id.trim().is_empty() {
            return Err("Setlist item song_id cannot be empty".to_string());
        }

        if !(-11..=11).contains(&self.transpose) {
            return Err(format!(
                "Transpose offset {} is out of semitone range",
                self.transpose
            ));
        }

        Ok(())
    }
}

/// A setlist cached locally, holding an ordered sequence of song references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSetlist {
    /// Unique identifier
    pub id: String,
    /// Setlist name
    pub name: String,
    /// Ordered song entries; `songs[i].order == i` after every mutation
    pub songs: Vec<SetlistItem>,

    // Sharing metadata
    pub is_public: bool,
    pub share_token: Option<String>,

    // Usage tracking
    pub usage_count: i64,
    pub last_used_at: Option<i64>,

    /// Owning user id
    pub created_by: Option<String>,

    // Remote back-reference
    pub server_id: Option<String>,
    pub server_version: Option<i64>,

    // Base entity fields
    pub created_at: i64,
    pub updated_at: i64,
    pub sync_state: SyncState,
    pub last_synced_at: Option<i64>,
    pub version: i64,
}

impl CachedSetlist {
    /// Create a new setlist with defaults
    pub fn new(name: impl Into<String>, now: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            songs: Vec::new(),
            is_public: false,
            share_token: None,
            usage_count: 0,
            last_used_at: None,
            created_by: None,
            server_id: None,
            server_version: None,
            created_at: now,
            updated_at: now,
            sync_state: SyncState::Pending,
            last_synced_at: None,
            version: 1,
        }
    }

    /// Validate setlist data, including the dense-order invariant
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Setlist id cannot be empty".to_string());
        }

        if self.name.trim().is_empty() {
            return Err("Setlist name cannot be empty".to_string());
        }

        for (index, item) in self.songs.iter().enumerate() {
            item.validate()?;
            if item.order != index as i32 {
                return Err(format!(
                    "Setlist order is not dense: item {} has order {}",
                    index, item.order
                ));
            }
        }

        if self.version < 1 {
            return Err("Setlist version must be positive".to_string());
        }

        Ok(())
    }

    /// Re-stamp every item's `order` to match its array position.
    ///
    /// Called after every mutating operation so the sequence is always a
    /// dense 0..n-1 ordering.
    pub fn normalize_orders(&mut self) {
        for (index, item) in self.songs.iter_mut().enumerate() {
            item.order = index as i32;
        }
    }

    /// Append a song entry and renormalize
    pub fn add_song(&mut self, item: SetlistItem) {
        self.songs.push(item);
        self.normalize_orders();
    }

    /// Insert a song entry at a position (clamped) and renormalize
    pub fn insert_song(&mut self, position: usize, item: SetlistItem) {
        let position = position.min(self.songs.len());
        self.songs.insert(position, item);
        self.normalize_orders();
    }

    /// Remove the first entry referencing `song_id`; returns whether an
    /// entry was removed. The sequence is renormalized either way.
    pub fn remove_song(&mut self, song_id: &str) -> bool {
        let before = self.songs.len();
        if let Some(index) = self.songs.iter().position(|item| item.song_id == song_id) {
            self.songs.remove(index);
        }
        self.normalize_orders();
        self.songs.len() != before
    }

    /// Move the entry at `from` to `to` (both clamped) and renormalize
    pub fn move_song(&mut self, from: usize, to: usize) {
        if self.songs.is_empty() || from >= self.songs.len() {
            return;
        }
        let item = self.songs.remove(from);
        let to = to.min(self.songs.len());
        self.songs.insert(to, item);
        self.normalize_orders();
    }

    /// Mark the entity as confirmed by the remote at `now`
    pub fn mark_synced(&mut self, now: i64) {
        self.sync_state = SyncState::Synced;
        self.last_synced_at = Some(now);
    }
}

// =============================================================================
// User Preferences
// =============================================================================

/// Per-user display/sync/export configuration; one record per user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Owning user id; also the record key
    pub user_id: String,

    // Display options
    pub theme: String,
    pub font_size: i32,
    pub show_chords: bool,

    // Sync options
    pub auto_sync: bool,
    pub sync_on_cellular: bool,

    // Export options
    pub default_export_format: String,

    // Base entity fields
    pub created_at: i64,
    pub updated_at: i64,
    pub sync_state: SyncState,
    pub last_synced_at: Option<i64>,
    pub version: i64,
}

impl UserPreferences {
    /// Create defaults for a user
    pub fn new(user_id: impl Into<String>, now: i64) -> Self {
        Self {
            user_id: user_id.into(),
            theme: "system".to_string(),
            font_size: 16,
            show_chords: true,
            auto_sync: true,
            sync_on_cellular: false,
            default_export_format: "json".to_string(),
            created_at: now,
            updated_at: now,
            sync_state: SyncState::Pending,
            last_synced_at: None,
            version: 1,
        }
    }

    /// Validate preferences data
    pub fn validate(&self) -> Result<(), String> {
        if self.user_id.trim().is_empty() {
            return Err("Preferences user_id cannot be empty".to_string());
        }

        if !(8..=72).contains(&self.font_size) {
            return Err(format!("Font size {} is out of valid range", self.font_size));
        }

        if self.version < 1 {
            return Err("Preferences version must be positive".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_state_round_trip() {
        for state in [
            SyncState::Synced,
            SyncState::Pending,
            SyncState::Conflict,
            SyncState::Error,
        ] {
            assert_eq!(state.as_str().parse::<SyncState>().unwrap(), state);
        }
        assert!("bogus".parse::<SyncState>().is_err());
    }

    #[test]
    fn test_new_song_defaults() {
        let song = CachedSong::new("Amazing Grace", 1000);
        assert_eq!(song.version, 1);
        assert_eq!(song.sync_state, SyncState::Pending);
        assert_eq!(song.access_count, 0);
        assert!(song.validate().is_ok());
    }

    #[test]
    fn test_song_validation() {
        let mut song = CachedSong::new("", 1000);
        assert!(song.validate().is_err());

        song.title = "Valid".to_string();
        song.tempo = Some(500);
        assert!(song.validate().is_err());

        song.tempo = Some(120);
        assert!(song.validate().is_ok());
    }

    #[test]
    fn test_song_mark_synced() {
        let mut song = CachedSong::new("Test", 1000);
        song.mark_synced(2000);
        assert_eq!(song.sync_state, SyncState::Synced);
        assert_eq!(song.last_synced_at, Some(2000));
    }

    #[test]
    fn test_setlist_add_remove_renormalizes() {
        let mut setlist = CachedSetlist::new("Sunday Morning", 1000);
        setlist.add_song(SetlistItem::new("s1"));
        setlist.add_song(SetlistItem::new("s2").with_transpose(2));
        setlist.add_song(SetlistItem::new("s3"));

        assert_eq!(
            setlist.songs.iter().map(|i| i.order).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        assert!(setlist.remove_song("s1"));
        assert_eq!(setlist.songs.len(), 2);
        assert_eq!(
            setlist.songs.iter().map(|i| i.order).collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert_eq!(setlist.songs[0].song_id, "s2");
        assert!(setlist.validate().is_ok());
    }

    #[test]
    fn test_setlist_remove_missing_song() {
        let mut setlist = CachedSetlist::new("Test", 1000);
        setlist.add_song(SetlistItem::new("s1"));
        assert!(!setlist.remove_song("missing"));
        assert_eq!(setlist.songs.len(), 1);
    }

    #[test]
    fn test_setlist_move_song() {
        let mut setlist = CachedSetlist::new("Test", 1000);
        for id in ["s1", "s2", "s3"] {
            setlist.add_song(SetlistItem::new(id));
        }

        setlist.move_song(0, 2);
        let ids: Vec<_> = setlist.songs.iter().map(|i| i.song_id.as_str()).collect();
        assert_eq!(ids, vec!["s2", "s3", "s1"]);
        assert_eq!(
            setlist.songs.iter().map(|i| i.order).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_setlist_insert_clamps_position() {
        let mut setlist = CachedSetlist::new("Test", 1000);
        setlist.add_song(SetlistItem::new("s1"));
        setlist.insert_song(99, SetlistItem::new("s2"));
        assert_eq!(setlist.songs[1].song_id, "s2");
        assert_eq!(setlist.songs[1].order, 1);
    }

    #[test]
    fn test_setlist_validation_rejects_sparse_orders() {
        let mut setlist = CachedSetlist::new("Test", 1000);
        setlist.add_song(SetlistItem::new("s1"));
        setlist.add_song(SetlistItem::new("s2"));
        setlist.songs[1].order = 5;
        assert!(setlist.validate().is_err());
    }

    #[test]
    fn test_setlist_item_transpose_range() {
        let item = SetlistItem::new("s1").with_transpose(12);
        assert!(item.validate().is_err());

        let item = SetlistItem::new("s1").with_transpose(-4);
        assert!(item.validate().is_ok());
    }

    #[test]
    fn test_preferences_defaults() {
        let prefs = UserPreferences::new("user-1", 1000);
        assert_eq!(prefs.theme, "system");
        assert!(prefs.show_chords);
        assert!(prefs.validate().is_ok());
    }

    #[test]
    fn test_preferences_validation() {
        let mut prefs = UserPreferences::new("user-1", 1000);
        prefs.font_size = 4;
        assert!(prefs.validate().is_err());
    }
}
