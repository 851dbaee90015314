//! Calendar change notifications
//!
//! Services publish what they changed on an in-process bus so that views
//! (the CLI, an embedding UI) can refresh without polling the store.
//!
//! The bus is a `tokio::sync::broadcast` channel. Emitting never blocks and
//! never fails: with no subscribers the event is simply dropped, and a lagging
//! subscriber loses its oldest events rather than slowing the emitter.
//!
//! # Example
//!
//! ```no_run
//! use libschedcast::service::events::{Event, EventBus};
//!
//! # async fn example() {
//! let bus = EventBus::new(100);
//! let mut receiver = bus.subscribe();
//!
//! bus.emit(Event::PostDeleted {
//!     post_id: "abc123".to_string(),
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("{:?}", event);
//! }
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{Platform, PostStatus};

pub type EventReceiver = broadcast::Receiver<Event>;

/// Broadcast bus for calendar events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Something that changed on the calendar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A post was persisted in `scheduled` state
    PostScheduled {
        post_id: String,
        connection_id: String,
        platform: Platform,
        scheduled_at: DateTime<Utc>,
    },

    /// The publish service accepted the post
    DispatchSucceeded {
        post_id: String,
        /// Id assigned by the platform, when the service reported one
        external_post_id: Option<String>,
    },

    /// The post is stored but the publish service did not accept it
    DispatchFailed { post_id: String, error: String },

    /// The post moved to another day
    PostRescheduled {
        post_id: String,
        previous: DateTime<Utc>,
        scheduled_at: DateTime<Utc>,
    },

    PostStatusChanged { post_id: String, status: PostStatus },

    PostDeleted { post_id: String },
}

impl Event {
    /// Id of the post the event is about
    pub fn post_id(&self) -> &str {
        match self {
            Event::PostScheduled { post_id, .. }
            | Event::DispatchSucceeded { post_id, .. }
            | Event::DispatchFailed { post_id, .. }
            | Event::PostRescheduled { post_id, .. }
            | Event::PostStatusChanged { post_id, .. }
            | Event::PostDeleted { post_id } => post_id,
        }
    }
}
