//! # Event Bus System
//!
//! Provides the asynchronous event backbone of the client using
//! `tokio::sync::broadcast`. Components publish typed events and any number
//! of subscribers consume them independently.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐  Connected / Lost /    ┌───────────┐
//! │ ConnectionWatcher├──ResourceChanged──────>│           │     subscribe    ┌────────────┐
//! └──────────────────┘                        │ EventBus  ├─────────────────>│ DataClient │
//! ┌──────────────────┐  Resource::Updated     │ (broadcast│                  └────────────┘
//! │ DataClient       ├───────────────────────>│  channel) │     subscribe    ┌────────────┐
//! └──────────────────┘                        │           ├─────────────────>│ Host UI    │
//! ┌──────────────────┐  Library / Notice      │           │                  └────────────┘
//! │ MusicClient      ├───────────────────────>│           │
//! └──────────────────┘                        └───────────┘
//! ```
//!
//! Synchronous, in-order callbacks (old/new snapshot pairs, library cursor
//! changes) go through [`Listeners`](crate::pubsub::Listeners) instead; the
//! bus only carries cheap, cloneable notifications.
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events. Consumers of
//!   connection events treat this like a lost notification and refetch.
//! - **`RecvError::Closed`**: all senders dropped; shutdown.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{ConnectionEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Connection(ConnectionEvent::Connected)).ok();
//! assert_eq!(
//!     rx.recv().await.unwrap(),
//!     CoreEvent::Connection(ConnectionEvent::Connected)
//! );
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

use crate::config::DEFAULT_EVENT_BUFFER_SIZE;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Push channel state and change notifications
    Connection(ConnectionEvent),
    /// Resource snapshot updates
    Resource(ResourceEvent),
    /// Library cursor and collection changes
    Library(LibraryEvent),
    /// User-facing notice
    Notice(Notice),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Connection(e) => e.description(),
            CoreEvent::Resource(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
            CoreEvent::Notice(_) => "User notice",
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Notice(_) => EventSeverity::Warning,
            CoreEvent::Connection(ConnectionEvent::Lost) => EventSeverity::Warning,
            CoreEvent::Connection(ConnectionEvent::Connected) => EventSeverity::Info,
            CoreEvent::Library(LibraryEvent::UpdateFinished) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Connection Events
// ============================================================================

/// Events raised by the push channel watcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ConnectionEvent {
    /// A handshake is in progress.
    Connecting {
        /// Number of reconnects since the last successful open.
        retry: u32,
    },
    /// The channel opened; every resource should be refetched.
    Connected,
    /// The daemon reported a change of the resource at `path`.
    ResourceChanged { path: String },
    /// Notifications may have been missed; consumers force-refresh.
    Lost,
}

impl ConnectionEvent {
    fn description(&self) -> &str {
        match self {
            ConnectionEvent::Connecting { .. } => "Connecting to push channel",
            ConnectionEvent::Connected => "Push channel connected",
            ConnectionEvent::ResourceChanged { .. } => "Resource changed on server",
            ConnectionEvent::Lost => "Notifications may have been lost",
        }
    }
}

// ============================================================================
// Resource Events
// ============================================================================

/// Events raised by the data client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ResourceEvent {
    /// A resource snapshot was replaced.
    Updated {
        path: String,
        /// Skew-corrected modification time, Unix epoch milliseconds.
        modified_at_ms: i64,
    },
    /// A snapshot was restored from local storage.
    Restored { path: String },
}

impl ResourceEvent {
    fn description(&self) -> &str {
        match self {
            ResourceEvent::Updated { .. } => "Resource snapshot updated",
            ResourceEvent::Restored { .. } => "Resource snapshot restored from storage",
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Events related to library browsing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// The browsing cursor moved or its listing was recomputed.
    Changed {
        /// Active grouping, or `"root"` while choosing one.
        root: String,
        /// Length of the browsing path.
        depth: usize,
    },
    /// The track collection was replaced.
    TracksReplaced { count: usize },
    /// The daemon finished a library rescan.
    UpdateFinished,
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::Changed { .. } => "Library cursor changed",
            LibraryEvent::TracksReplaced { .. } => "Library tracks replaced",
            LibraryEvent::UpdateFinished => "Library update finished",
        }
    }
}

// ============================================================================
// Notices
// ============================================================================

/// A user-visible message. Notices from the same `source` replace each other.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    /// Stable key of the component or endpoint that raised the notice.
    pub source: String,
    pub message: String,
    /// How many times this exact message was raised in a row.
    pub repeat: u32,
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to core events.
///
/// Cloning the bus is cheap; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
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

    /// Subscribes to all events on this bus.
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

/// A wrapper around `broadcast::Receiver` with additional filtering capabilities.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream, CoreEvent};
///
/// let bus = EventBus::new(100);
/// let notices = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Notice(_)));
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
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
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

    fn changed(path: &str) -> CoreEvent {
        CoreEvent::Connection(ConnectionEvent::ResourceChanged {
            path: path.to_string(),
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
        assert!(bus.emit(CoreEvent::Connection(ConnectionEvent::Lost)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = changed("/api/music/playlist");
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Notice(_)));

        bus.emit(changed("/api/music")).ok();
        let notice = CoreEvent::Notice(Notice {
            source: "/api/music".to_string(),
            message: "timeout".to_string(),
            repeat: 1,
        });
        bus.emit(notice.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), notice);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(changed(&format!("/api/music/{}", i))).ok();
        }

        let result = sub.recv().await;
        assert!(matches!(result, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        assert_eq!(
            CoreEvent::Connection(ConnectionEvent::Lost).severity(),
            EventSeverity::Warning
        );
        assert_eq!(
            CoreEvent::Connection(ConnectionEvent::Connected).severity(),
            EventSeverity::Info
        );
        assert_eq!(changed("/api/music").severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Library(LibraryEvent::Changed {
            root: "AlbumArtist".to_string(),
            depth: 2,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Library\""));
        let back: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());
    }
}
