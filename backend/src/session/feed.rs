//! Session change feed
//!
//! In-process pub/sub keyed by session id. Every write that changes a
//! session's messages, avatar or pairing state publishes a [`ChangeEvent`]
//! to the subscribers of that session only.

use crate::session::models::{Avatar, Message, Session};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

/// Default per-session channel capacity
pub const DEFAULT_FEED_CAPACITY: usize = 64;

/// A change to a session, pushed to its subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// A message was appended
    MessageInserted {
        /// The inserted row
        message: Message,
    },
    /// The avatar was created or updated
    AvatarUpdated {
        /// The stored avatar after the write
        avatar: Avatar,
    },
    /// Session metadata changed (e.g. an agent paired)
    SessionUpdated {
        /// The stored session after the write
        session: Session,
    },
}

impl ChangeEvent {
    /// Id of the session this event belongs to
    pub fn session_id(&self) -> &str {
        match self {
            ChangeEvent::MessageInserted { message } => &message.session_id,
            ChangeEvent::AvatarUpdated { avatar } => &avatar.session_id,
            ChangeEvent::SessionUpdated { session } => &session.id,
        }
    }
}

/// Broadcast hub with one channel per session
pub struct ChangeFeed {
    channels: Mutex<HashMap<String, broadcast::Sender<ChangeEvent>>>,
    capacity: usize,
}

impl ChangeFeed {
    /// Create a feed with the given per-session capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to changes of one session
    pub fn subscribe(&self, session_id: &str) -> broadcast::Receiver<ChangeEvent> {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        let pruned = before - channels.len();
        if pruned > 0 {
            debug!(pruned, "Dropped idle change feed channels");
        }
        channels
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish an event; returns how many subscribers received it
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let session_id = event.session_id().to_string();

        let Some(sender) = channels.get(&session_id) else {
            return 0;
        };

        match sender.send(event) {
            Ok(delivered) => delivered,
            Err(_) => {
                // Last subscriber went away; drop the channel
                channels.remove(&session_id);
                debug!(session_id = %session_id, "Dropped idle change feed channel");
                0
            }
        }
    }

    /// Number of session channels currently held
    pub fn channel_count(&self) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of live subscribers for a session
    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}
