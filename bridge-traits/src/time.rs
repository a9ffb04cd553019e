//! Time Abstraction
//!
//! Provides an injectable time source so timestamp-sensitive logic
//! (version stamping, eviction windows, quota edge-triggering) can be
//! tested deterministically.

use chrono::{DateTime, Utc};

/// Time source trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::time::Clock;
///
/// fn stamp(clock: &dyn Clock) -> i64 {
///     clock.unix_timestamp()
/// }
/// ```
pub trait Clock: Send + Sync {
    /// Get current UTC time
    fn now(&self) -> DateTime<Utc>;

    /// Get current Unix timestamp in seconds
    fn unix_timestamp(&self) -> i64 {
        self.now().timestamp()
    }

    /// Get current Unix timestamp in milliseconds
    fn unix_timestamp_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// System clock implementation using actual system time
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.unix_timestamp();
        let b = clock.unix_timestamp();
        assert!(b >= a);
    }

    #[test]
    fn test_millis_consistent_with_seconds() {
        let clock = SystemClock;
        let secs = clock.unix_timestamp();
        let millis = clock.unix_timestamp_millis();
        assert!((millis / 1000 - secs).abs() <= 1);
    }
}
