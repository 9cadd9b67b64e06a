//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans every [`TrackerEvent`] out to application-wide
//! observers (status bars, notification toasts, logs) and is shared as
//! `Arc<EventBus>`. Per-operation consumers that must not miss
//! events use [`ListenerSet`](crate::ListenerSet) instead; broadcast
//! receivers that fall behind observe `RecvError::Lagged`.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::event::{OperationEvent, SnapshotEvent};

// ---------------------------------------------------------------------------
// TrackerEvent
// ---------------------------------------------------------------------------

/// Everything published on the application-wide bus.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum TrackerEvent {
    /// A tracked operation changed status or progress.
    Operation(OperationEvent),
    /// The workflow reconciler installed a different snapshot.
    Workflows(SnapshotEvent),
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// # Usage
///
/// ```rust
/// use brousla_events::bus::EventBus;
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
/// assert_eq!(bus.receiver_count(), 1);
/// # drop(rx.try_recv());
/// ```
pub struct EventBus {
    sender: broadcast::Sender<TrackerEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: TrackerEvent) {
        // Ignore the SendError: it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
