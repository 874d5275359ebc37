//! # Event System
//!
//! Broadcast events connecting the sync core to presentation collaborators.
//!
//! ## Overview
//!
//! The core never calls into UI code directly. Instead it publishes
//! [`CoreEvent`]s on a shared [`EventBus`]; hosts subscribe and react
//! (reload views after a sync pass, animate upload progress, prompt for
//! sign-in on auth errors).
//!
//! - **EventBus**: central broadcast channel for publishing events
//! - **CoreEvent**: auth, sync and upload event families
//!
//! ## Example
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, SyncEvent};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::Completed { errors: vec![] }))
//!     .ok();
//!
//! let event = subscriber.try_recv().unwrap();
//! assert_eq!(event.description(), "Sync pass completed");
//! # }
//! ```

use bridge_traits::store::LocalRecord;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that fall behind by more than this many events receive
/// `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Authentication-related events
    Auth(AuthEvent),
    /// Sync-related events
    Sync(SyncEvent),
    /// Upload-related events
    Upload(UploadEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Upload(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Error,
            CoreEvent::Upload(UploadEvent::Finished { error: Some(_), .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::Completed { errors }) if !errors.is_empty() => {
                EventSeverity::Warning
            }
            CoreEvent::Auth(AuthEvent::SignedIn { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
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
// Authentication Events
// ============================================================================

/// Events related to the credential lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// A token set was installed after a successful code exchange.
    SignedIn,
    /// The stored token set was discarded.
    SignedOut,
    /// Access token is being refreshed.
    TokenRefreshing,
    /// Token refresh completed successfully.
    TokenRefreshed {
        /// Unix timestamp when the new access token expires.
        expires_at: i64,
    },
    /// Authentication error occurred.
    AuthError {
        /// Human-readable error message.
        message: String,
        /// Whether the error may clear on retry (vs. requiring sign-in).
        recoverable: bool,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::SignedIn => "Signed in",
            AuthEvent::SignedOut => "Signed out",
            AuthEvent::TokenRefreshing => "Refreshing access token",
            AuthEvent::TokenRefreshed { .. } => "Access token refreshed",
            AuthEvent::AuthError { .. } => "Authentication error",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted over the lifetime of a reconciliation pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A reconciliation pass started.
    Started,
    /// Transfer nodes completed out of the total spawned this pass.
    Progress { done: usize, total: usize },
    /// The pass finished; `errors` is empty on full success.
    ///
    /// Errors carry no ordering semantics, they are a flat report of
    /// every branch that failed.
    Completed { errors: Vec<String> },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started => "Sync pass started",
            SyncEvent::Progress { .. } => "Sync progress",
            SyncEvent::Completed { .. } => "Sync pass completed",
        }
    }
}

// ============================================================================
// Upload Events
// ============================================================================

/// Events emitted by the upload orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum UploadEvent {
    /// Overall upload progress for one content item.
    Progress {
        video_id: String,
        /// Fraction complete in `0.0..=1.0`.
        value: f32,
        /// Hint that the UI should animate toward this value.
        animated: bool,
    },
    /// The upload flow finished.
    Finished {
        video_id: String,
        /// The canonical record returned by the server, on success.
        record: Option<LocalRecord>,
        /// Failure description, on error.
        error: Option<String>,
    },
}

impl UploadEvent {
    fn description(&self) -> &str {
        match self {
            UploadEvent::Progress { .. } => "Upload progress",
            UploadEvent::Finished { .. } => "Upload finished",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally:
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
    /// Returns the number of subscribers that received the event, or an
    /// error when there are no active subscribers. Emitting into an
    /// empty bus is not a failure for the core; callers ignore the
    /// result unless they need delivery confirmation.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        tracing::debug!(event = event.description(), "emitting event");
        self.sender.send(event)
    }

    /// Creates a new subscription to the event stream.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

// ============================================================================
// Tests
// ============================================================================
