//! # Core Configuration
//!
//! Configuration knobs shared by the offline storage service and the sync
//! layer. Values are validated up front so misconfiguration fails at
//! initialization rather than at the first affected operation.

use std::time::Duration;

use crate::error::{Error, Result};

/// Configuration for the offline core.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Quota usage ratio that triggers a warning event (default: 0.80)
    pub quota_warning_ratio: f64,

    /// Quota usage ratio that triggers a critical event (default: 0.95)
    pub quota_critical_ratio: f64,

    /// Capacity of the in-process song read-through cache (default: 256)
    pub song_cache_capacity: usize,

    /// Capacity of the in-process setlist read-through cache (default: 64)
    pub setlist_cache_capacity: usize,

    /// Maximum remote attempts per queued operation before it is marked
    /// failed (default: 3)
    pub max_retries: u32,

    /// Base delay before retrying a failed operation (default: 500ms);
    /// a per-operation jitter is added on top
    pub retry_base_delay: Duration,

    /// Delay between an online transition and the drain it triggers, to
    /// avoid thrashing on flaky connectivity (default: 2s)
    pub settle_delay: Duration,

    /// Interval of the active reachability probe while the host reports a
    /// connected network (default: 30s)
    pub probe_interval: Duration,

    /// Event bus buffer size (default: 100)
    pub event_buffer_size: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            quota_warning_ratio: 0.80,
            quota_critical_ratio: 0.95,
            song_cache_capacity: 256,
            setlist_cache_capacity: 64,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            settle_delay: Duration::from_secs(2),
            probe_interval: Duration::from_secs(30),
            event_buffer_size: 100,
        }
    }
}

impl CoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the quota warning/critical thresholds.
    pub fn with_quota_thresholds(mut self, warning: f64, critical: f64) -> Self {
        self.quota_warning_ratio = warning;
        self.quota_critical_ratio = critical;
        self
    }

    /// Set the read-through cache capacities.
    pub fn with_cache_capacities(mut self, songs: usize, setlists: usize) -> Self {
        self.song_cache_capacity = songs;
        self.setlist_cache_capacity = setlists;
        self
    }

    /// Set the retry bound for queued operations.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base retry delay.
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Set the online-transition settle delay.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the reachability probe interval.
    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.quota_warning_ratio) {
            return Err(Error::Config(format!(
                "quota_warning_ratio must be within 0..=1, got {}",
                self.quota_warning_ratio
            )));
        }

        if !(0.0..=1.0).contains(&self.quota_critical_ratio) {
            return Err(Error::Config(format!(
                "quota_critical_ratio must be within 0..=1, got {}",
                self.quota_critical_ratio
            )));
        }

        if self.quota_warning_ratio >= self.quota_critical_ratio {
            return Err(Error::Config(
                "quota_warning_ratio must be below quota_critical_ratio".to_string(),
            ));
        }

        if self.song_cache_capacity == 0 || self.setlist_cache_capacity == 0 {
            return Err(Error::Config(
                "cache capacities must be at least 1".to_string(),
            ));
        }

        if self.max_retries == 0 {
            return Err(Error::Config("max_retries must be at least 1".to_string()));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "event_buffer_size must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
