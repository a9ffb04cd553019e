//! # Event Bus System
//!
//! Provides an event-driven architecture for the offline core using
//! `tokio::sync::broadcast`. This module enables decoupled communication
//! between core modules through typed events.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for different domains
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//! - **Subscription Management**: Multiple subscribers can listen independently
//!
//! Delivery is in-process and best-effort: events are not persisted or
//! replayed, and a subscriber created after an event fired never sees it.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, StorageEvent};
//!
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Storage(StorageEvent::SongSaved {
//!         song_id: "song-1".to_string(),
//!         title: "Amazing Grace".to_string(),
//!         created: true,
//!     }))
//!     .ok();
//! ```
//!
//! ## Error Handling
//!
//! The bus uses `tokio::sync::broadcast`, which produces two error kinds:
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell behind and missed `n`
//!   events. Non-fatal; the subscriber keeps receiving new events.
//! - **`RecvError::Closed`**: all senders dropped. Treat as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that fall behind by more than this receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
///
/// This is the main event type published and received through the event bus.
/// It wraps domain-specific event types for different modules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Cached-entity mutations (songs, setlists, preferences)
    Storage(StorageEvent),
    /// Sync queue lifecycle events
    Sync(SyncEvent),
    /// Storage quota threshold events
    Quota(QuotaEvent),
    /// Cleanup and import/export housekeeping events
    Maintenance(MaintenanceEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Storage(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Quota(e) => e.description(),
            CoreEvent::Maintenance(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Storage(StorageEvent::StorageError { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::OperationFailed { .. }) => EventSeverity::Error,
            CoreEvent::Quota(QuotaEvent::Critical { .. }) => EventSeverity::Error,
            CoreEvent::Quota(QuotaEvent::Warning { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::DrainFinished { .. }) => EventSeverity::Info,
            CoreEvent::Maintenance(_) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Storage Events
// ============================================================================

/// Events emitted by the offline storage service on cache mutations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum StorageEvent {
    /// A song was saved to the local cache.
    SongSaved {
        song_id: String,
        title: String,
        /// True when the save created the record, false when it updated one.
        created: bool,
    },
    /// A song was removed from the local cache.
    SongDeleted { song_id: String },
    /// A setlist was saved to the local cache.
    SetlistSaved {
        setlist_id: String,
        name: String,
        created: bool,
    },
    /// A setlist was removed from the local cache.
    SetlistDeleted { setlist_id: String },
    /// User preferences were saved.
    PreferencesSaved { user_id: String },
    /// The underlying store reported an I/O failure.
    StorageError { operation: String, message: String },
}

impl StorageEvent {
    fn description(&self) -> &str {
        match self {
            StorageEvent::SongSaved { .. } => "Song saved to cache",
            StorageEvent::SongDeleted { .. } => "Song removed from cache",
            StorageEvent::SetlistSaved { .. } => "Setlist saved to cache",
            StorageEvent::SetlistDeleted { .. } => "Setlist removed from cache",
            StorageEvent::PreferencesSaved { .. } => "Preferences saved",
            StorageEvent::StorageError { .. } => "Storage error",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted by the sync queue while draining against the remote API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A queued operation was applied to the remote API.
    OperationCompleted {
        operation_id: String,
        resource: String,
        resource_id: String,
    },
    /// A queued operation exhausted its retries.
    OperationFailed {
        operation_id: String,
        resource: String,
        resource_id: String,
        message: String,
    },
    /// A drain pass finished.
    DrainFinished {
        completed: u64,
        failed: u64,
        remaining: u64,
    },
    /// Effective connectivity changed.
    ConnectivityChanged { status: String },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::OperationCompleted { .. } => "Sync operation completed",
            SyncEvent::OperationFailed { .. } => "Sync operation failed",
            SyncEvent::DrainFinished { .. } => "Sync drain finished",
            SyncEvent::ConnectivityChanged { .. } => "Connectivity changed",
        }
    }
}

// ============================================================================
// Quota Events
// ============================================================================

/// Storage quota threshold crossings. Edge-triggered: the monitor emits one
/// event per crossing, not one per check while above the threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum QuotaEvent {
    /// Usage crossed the warning threshold (>= 80%).
    Warning {
        usage_bytes: u64,
        quota_bytes: u64,
        percent_used: u8,
    },
    /// Usage crossed the critical threshold (>= 95%).
    Critical {
        usage_bytes: u64,
        quota_bytes: u64,
        percent_used: u8,
    },
    /// Usage dropped back below the warning threshold.
    Normal {
        usage_bytes: u64,
        quota_bytes: u64,
        percent_used: u8,
    },
}

impl QuotaEvent {
    fn description(&self) -> &str {
        match self {
            QuotaEvent::Warning { .. } => "Storage quota warning",
            QuotaEvent::Critical { .. } => "Storage quota critical",
            QuotaEvent::Normal { .. } => "Storage quota back to normal",
        }
    }
}

// ============================================================================
// Maintenance Events
// ============================================================================

/// Cleanup and data-portability housekeeping events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum MaintenanceEvent {
    /// A cleanup pass finished (or reported, when dry-run).
    CleanupFinished {
        songs_deleted: u64,
        setlists_deleted: u64,
        bytes_freed: u64,
        dry_run: bool,
    },
    /// An import finished.
    ImportFinished {
        songs_imported: u64,
        setlists_imported: u64,
        conflicts: u64,
        errors: u64,
    },
}

impl MaintenanceEvent {
    fn description(&self) -> &str {
        match self {
            MaintenanceEvent::CleanupFinished { .. } => "Cleanup finished",
            MaintenanceEvent::ImportFinished { .. } => "Import finished",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all future
    /// events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with additional filtering
/// capabilities.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream, CoreEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut quota_stream = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Quota(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n`
    /// events. Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn song_saved(id: &str) -> CoreEvent {
        CoreEvent::Storage(StorageEvent::SongSaved {
            song_id: id.to_string(),
            title: "Test Song".to_string(),
            created: true,
        })
    }

    #[tokio::test]
    async fn test_event_bus_creation() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(song_saved("s1")).is_err());
    }

    #[tokio::test]
    async fn test_event_emission_with_subscribers() {
        let bus = EventBus::new(10);
        let mut sub = bus.subscribe();

        let event = song_saved("s1");
        let result = bus.emit(event.clone());
        assert_eq!(result.unwrap(), 1);

        let received = sub.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Sync(SyncEvent::DrainFinished {
            completed: 3,
            failed: 0,
            remaining: 0,
        });
        bus.emit(event.clone()).ok();

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream =
            EventStream::new(bus.subscribe()).filter(|event| matches!(event, CoreEvent::Quota(_)));

        bus.emit(song_saved("s1")).ok();

        let quota_event = CoreEvent::Quota(QuotaEvent::Warning {
            usage_bytes: 80,
            quota_bytes: 100,
            percent_used: 80,
        });
        bus.emit(quota_event.clone()).ok();

        let received = stream.recv().await.unwrap();
        assert_eq!(received, quota_event);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(song_saved(&format!("s{}", i))).ok();
        }

        let result = sub.recv().await;
        assert!(matches!(result, Err(RecvError::Lagged(_))));
    }

    #[tokio::test]
    async fn test_event_severity() {
        let critical = CoreEvent::Quota(QuotaEvent::Critical {
            usage_bytes: 95,
            quota_bytes: 100,
            percent_used: 95,
        });
        assert_eq!(critical.severity(), EventSeverity::Error);

        let warning = CoreEvent::Quota(QuotaEvent::Warning {
            usage_bytes: 80,
            quota_bytes: 100,
            percent_used: 80,
        });
        assert_eq!(warning.severity(), EventSeverity::Warning);

        assert_eq!(song_saved("s1").severity(), EventSeverity::Debug);
    }

    #[tokio::test]
    async fn test_event_serialization() {
        let event = CoreEvent::Sync(SyncEvent::OperationFailed {
            operation_id: "op-1".to_string(),
            resource: "song".to_string(),
            resource_id: "s1".to_string(),
            message: "410 Gone".to_string(),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("op-1"));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_subscriber_registered_late_misses_event() {
        let bus = EventBus::new(10);
        {
            let _early = bus.subscribe();
            bus.emit(song_saved("s1")).ok();
        }

        let mut late = bus.subscribe();
        assert!(late.try_recv().is_err()); // Empty, not the earlier event
    }
}
