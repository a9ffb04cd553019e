//! Storage Quota Abstraction
//!
//! Exposes the platform's storage usage/quota estimate (the browser
//! `navigator.storage.estimate()` equivalent) to the quota monitor.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Platform-reported storage usage and ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEstimate {
    /// Bytes currently used by the application's persistent storage
    pub usage_bytes: u64,
    /// Bytes the platform will allow before writes start failing
    pub quota_bytes: u64,
}

impl StorageEstimate {
    /// Fraction of quota in use (0.0 when the quota is unknown/zero)
    pub fn usage_ratio(&self) -> f64 {
        if self.quota_bytes == 0 {
            0.0
        } else {
            self.usage_bytes as f64 / self.quota_bytes as f64
        }
    }

    /// Bytes still available under the quota
    pub fn available_bytes(&self) -> u64 {
        self.quota_bytes.saturating_sub(self.usage_bytes)
    }
}

/// Storage quota probe
#[async_trait::async_trait]
pub trait QuotaProbe: Send + Sync {
    /// Query the platform for the current usage/quota estimate
    async fn estimate(&self) -> Result<StorageEstimate>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_ratio() {
        let estimate = StorageEstimate {
            usage_bytes: 80,
            quota_bytes: 100,
        };
        assert!((estimate.usage_ratio() - 0.8).abs() < f64::EPSILON);
        assert_eq!(estimate.available_bytes(), 20);
    }

    #[test]
    fn test_zero_quota() {
        let estimate = StorageEstimate {
            usage_bytes: 10,
            quota_bytes: 0,
        };
        assert_eq!(estimate.usage_ratio(), 0.0);
        assert_eq!(estimate.available_bytes(), 0);
    }
}
