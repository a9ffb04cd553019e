//! Export bundles
//!
//! An export is an immutable snapshot of the requested entity types with a
//! SHA-256 checksum over the canonical payload JSON. Compressed bundles
//! replace the plain sections with a base64-encoded deflate payload; both
//! forms carry the same checksum so either can be verified before import.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use core_store::{CachedSetlist, CachedSong, SetlistQuery, SongQuery, UserPreferences};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use tracing::{info, instrument};

use crate::error::{Result, StorageError};
use crate::service::OfflineStorage;

/// Supported bundle format version
pub const EXPORT_FORMAT_VERSION: u32 = 1;

/// What to include in an export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOptions {
    pub include_songs: bool,
    pub include_setlists: bool,
    pub include_preferences: bool,
    /// Only include entities updated at or after this Unix timestamp
    pub updated_after: Option<i64>,
    /// Deflate + base64 the payload
    pub compress: bool,
    /// Recorded in the bundle for provenance
    pub exported_by: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_songs: true,
            include_setlists: true,
            include_preferences: true,
            updated_after: None,
            compress: false,
            exported_by: None,
        }
    }
}

/// The entity sections of a bundle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub songs: Vec<CachedSong>,
    pub setlists: Vec<CachedSetlist>,
    pub preferences: Vec<UserPreferences>,
}

impl ExportPayload {
    /// Canonical JSON bytes used for the checksum
    fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// SHA-256 hex digest of the canonical bytes
    pub fn checksum(&self) -> Result<String> {
        let bytes = self.canonical_bytes()?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty() && self.setlists.is_empty() && self.preferences.is_empty()
    }
}

/// A snapshot bundle. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportData {
    pub format_version: u32,
    pub exported_at: i64,
    pub exported_by: Option<String>,
    /// SHA-256 over the canonical payload JSON
    pub checksum: String,
    /// When true, `payload` replaces the plain sections
    pub compressed: bool,
    /// base64(deflate(payload JSON)); only present when compressed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default)]
    pub songs: Vec<CachedSong>,
    #[serde(default)]
    pub setlists: Vec<CachedSetlist>,
    #[serde(default)]
    pub preferences: Vec<UserPreferences>,
}

impl ExportData {
    /// Build a bundle from a payload
    pub fn from_payload(
        payload: ExportPayload,
        exported_at: i64,
        exported_by: Option<String>,
        compress: bool,
    ) -> Result<Self> {
        let checksum = payload.checksum()?;

        if compress {
            let json = payload.canonical_bytes()?;
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(&json)
                .map_err(|e| StorageError::Encoding(format!("deflate: {}", e)))?;
            let compressed = encoder
                .finish()
                .map_err(|e| StorageError::Encoding(format!("deflate: {}", e)))?;

            Ok(Self {
                format_version: EXPORT_FORMAT_VERSION,
                exported_at,
                exported_by,
                checksum,
                compressed: true,
                payload: Some(BASE64.encode(compressed)),
                songs: Vec::new(),
                setlists: Vec::new(),
                preferences: Vec::new(),
            })
        } else {
            Ok(Self {
                format_version: EXPORT_FORMAT_VERSION,
                exported_at,
                exported_by,
                checksum,
                compressed: false,
                payload: None,
                songs: payload.songs,
                setlists: payload.setlists,
                preferences: payload.preferences,
            })
        }
    }

    /// Decode the entity sections, inflating when compressed.
    pub fn decode_payload(&self) -> Result<ExportPayload> {
        if self.compressed {
            let encoded = self
                .payload
                .as_ref()
                .ok_or_else(|| {
                    StorageError::InvalidFormat(
                        "compressed bundle is missing its payload".to_string(),
                    )
                })?;

            let compressed = BASE64
                .decode(encoded)
                .map_err(|e| StorageError::InvalidFormat(format!("payload base64: {}", e)))?;

            let mut decoder = DeflateDecoder::new(compressed.as_slice());
            let mut json = Vec::new();
            decoder
                .read_to_end(&mut json)
                .map_err(|e| StorageError::InvalidFormat(format!("payload deflate: {}", e)))?;

            serde_json::from_slice(&json)
                .map_err(|e| StorageError::InvalidFormat(format!("payload JSON: {}", e)))
        } else {
            Ok(ExportPayload {
                songs: self.songs.clone(),
                setlists: self.setlists.clone(),
                preferences: self.preferences.clone(),
            })
        }
    }

    /// Structural validation: version, payload shape and checksum.
    ///
    /// Runs before any store mutation during import.
    pub fn validate(&self) -> Result<ExportPayload> {
        if self.format_version == 0 || self.format_version > EXPORT_FORMAT_VERSION {
            return Err(StorageError::InvalidFormat(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }

        let payload = self.decode_payload()?;

        let checksum = payload.checksum()?;
        if checksum != self.checksum {
            return Err(StorageError::InvalidFormat(format!(
                "checksum mismatch: bundle says {}, payload is {}",
                self.checksum, checksum
            )));
        }

        Ok(payload)
    }
}

impl OfflineStorage {
    /// Produce a snapshot bundle of the requested entity types.
    ///
    /// Reads go through the repositories directly; in-memory cache state
    /// never leaks into the bundle.
    #[instrument(skip(self))]
    pub async fn export_data(&self, options: ExportOptions) -> Result<ExportData> {
        let mut payload = ExportPayload::default();

        if options.include_songs {
            payload.songs = self.songs.query(&SongQuery::new()).await?;
            if let Some(after) = options.updated_after {
                payload.songs.retain(|s| s.updated_at >= after);
            }
        }

        if options.include_setlists {
            payload.setlists = self.setlists.query(&SetlistQuery::new()).await?;
            if let Some(after) = options.updated_after {
                payload.setlists.retain(|s| s.updated_at >= after);
            }
        }

        if options.include_preferences {
            payload.preferences = self.preferences.find_all().await?;
            if let Some(after) = options.updated_after {
                payload.preferences.retain(|p| p.updated_at >= after);
            }
        }

        let bundle = ExportData::from_payload(
            payload,
            self.clock.unix_timestamp(),
            options.exported_by.clone(),
            options.compress,
        )?;

        info!(
            songs = bundle.songs.len(),
            setlists = bundle.setlists.len(),
            compressed = bundle.compressed,
            "Export bundle produced"
        );

        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::storage;
    use bridge_traits::time::Clock;
    use core_store::CachedSong;

    fn sample_payload() -> ExportPayload {
        ExportPayload {
            songs: vec![CachedSong::new("Sample", 1000)],
            setlists: Vec::new(),
            preferences: Vec::new(),
        }
    }

    #[test]
    fn test_plain_bundle_round_trip() {
        let payload = sample_payload();
        let bundle =
            ExportData::from_payload(payload.clone(), 2000, Some("tester".into()), false).unwrap();

        assert!(!bundle.compressed);
        assert_eq!(bundle.songs.len(), 1);

        let decoded = bundle.validate().unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_compressed_bundle_round_trip() {
        let payload = sample_payload();
        let bundle = ExportData::from_payload(payload.clone(), 2000, None, true).unwrap();

        assert!(bundle.compressed);
        assert!(bundle.songs.is_empty());
        assert!(bundle.payload.is_some());

        let decoded = bundle.validate().unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_tampered_bundle_fails_checksum() {
        let mut bundle =
            ExportData::from_payload(sample_payload(), 2000, None, false).unwrap();
        bundle.songs[0].title = "Tampered".to_string();

        assert!(matches!(
            bundle.validate(),
            Err(StorageError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut bundle =
            ExportData::from_payload(sample_payload(), 2000, None, false).unwrap();
        bundle.format_version = 99;

        assert!(matches!(
            bundle.validate(),
            Err(StorageError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_bundle_serializes_to_json_document() {
        let bundle = ExportData::from_payload(sample_payload(), 2000, None, true).unwrap();
        let json = serde_json::to_string(&bundle).unwrap();

        let parsed: ExportData = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.checksum, bundle.checksum);
        assert_eq!(parsed.validate().unwrap(), bundle.validate().unwrap());
    }

    #[tokio::test]
    async fn test_export_respects_inclusion_flags() {
        let (storage, _, clock) = storage().await;

        storage
            .save_song(CachedSong::new("Only Song", clock.unix_timestamp()))
            .await
            .unwrap();

        let bundle = storage
            .export_data(ExportOptions {
                include_setlists: false,
                include_preferences: false,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(bundle.songs.len(), 1);
        assert!(bundle.setlists.is_empty());
        assert!(bundle.preferences.is_empty());
        bundle.validate().unwrap();
    }

    #[tokio::test]
    async fn test_export_date_range_filter() {
        let (storage, _, clock) = storage().await;

        storage
            .save_song(CachedSong::new("Old", clock.unix_timestamp()))
            .await
            .unwrap();
        clock.advance(1_000);
        storage
            .save_song(CachedSong::new("New", clock.unix_timestamp()))
            .await
            .unwrap();

        let bundle = storage
            .export_data(ExportOptions {
                updated_after: Some(clock.unix_timestamp() - 10),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(bundle.songs.len(), 1);
        assert_eq!(bundle.songs[0].title, "New");
    }
}
