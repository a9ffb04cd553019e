//! Storage Quota Probe Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    quota::{QuotaProbe, StorageEstimate},
};
use std::path::PathBuf;

/// Disk-backed quota probe
///
/// Desktop hosts have no platform quota API, so usage is measured as the
/// size of the database file (plus its WAL sidecar when present) against a
/// configured ceiling.
pub struct DiskQuotaProbe {
    database_path: PathBuf,
    quota_bytes: u64,
}

impl DiskQuotaProbe {
    pub fn new(database_path: impl Into<PathBuf>, quota_bytes: u64) -> Self {
        Self {
            database_path: database_path.into(),
            quota_bytes,
        }
    }

    async fn file_size(path: &PathBuf) -> u64 {
        match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        }
    }
}

#[async_trait]
impl QuotaProbe for DiskQuotaProbe {
    async fn estimate(&self) -> Result<StorageEstimate> {
        let mut usage = Self::file_size(&self.database_path).await;

        let mut wal = self.database_path.clone().into_os_string();
        wal.push("-wal");
        usage += Self::file_size(&PathBuf::from(wal)).await;

        Ok(StorageEstimate {
            usage_bytes: usage,
            quota_bytes: self.quota_bytes,
        })
    }
}
