//! Catalog event system
//!
//! Provides the catalog event definitions and an EventBus so UI-facing
//! layers can refresh when background work finishes.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Catalog event types
///
/// Events are broadcast via [`EventBus`] and serialize with a `type` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CatalogEvent {
    /// A batch of tracks was written to the catalog
    TracksPersisted {
        /// Number of tracks upserted
        count: usize,
    },

    /// A page of tracks was produced by a device scan
    ScanCompleted {
        page: usize,
        returned: usize,
        has_more: bool,
    },

    /// Too many stored tracks were filtered out; a full rescan is pending
    RescanScheduled {
        filtered_out: usize,
    },

    /// A full rescan finished
    RescanCompleted {
        /// Tracks on the first page after the rescan
        count: usize,
    },

    /// Playlist metadata or membership changed
    PlaylistChanged {
        playlist_id: String,
    },

    /// The ephemeral read cache was rewritten
    CacheWritten {
        chunks: usize,
    },
}

/// Broadcast bus for [`CatalogEvent`]s
///
/// Cloning the bus shares the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CatalogEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per subscriber before
    /// the oldest are dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcat_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CatalogEvent,
    ) -> Result<usize, broadcast::error::SendError<CatalogEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CatalogEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
