//! Client-side session store
//!
//! Holds the active session, its avatar and its message log. All mutation
//! goes through the action methods below; change-feed events arrive on an
//! internal queue and are applied with [`SessionStore::apply_event`].

use crate::client::backend::SessionBackend;
use crate::client::error::ClientError;
use crate::client::subscription::Subscription;
use crate::session::pairing;
use crate::session::{
    Avatar, AvatarParts, AvatarPatch, ChangeEvent, Message, PartKind, Sender, Session, Shape,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Point-in-time copy of the store's state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    /// Active session, if any
    pub session: Option<Session>,
    /// Avatar of the active session, once created
    pub avatar: Option<Avatar>,
    /// Message log, ordered by creation time
    pub messages: Vec<Message>,
    /// True while a create or join is in progress
    pub is_loading: bool,
    /// Last user-visible error
    pub error: Option<String>,
}

impl StoreSnapshot {
    /// Parts to render: the stored avatar or the default one
    pub fn avatar_parts(&self) -> AvatarParts {
        self.avatar.as_ref().map(Avatar::parts).unwrap_or_default()
    }
}

/// Single-field edit from the customizer
#[derive(Debug, Clone, PartialEq)]
pub enum PartEdit {
    /// Change the part's shape
    Shape(Shape),
    /// Change the part's color
    Color(String),
}

/// Store of the active session's state
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    state: StoreSnapshot,
    subscription: Option<Subscription>,
    events_tx: mpsc::UnboundedSender<ChangeEvent>,
    events_rx: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl SessionStore {
    /// Create an empty store over a backend
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            state: StoreSnapshot::default(),
            subscription: None,
            events_tx,
            events_rx,
        }
    }

    /// Current state
    pub fn state(&self) -> &StoreSnapshot {
        &self.state
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> StoreSnapshot {
        self.state.clone()
    }

    /// True while a change-feed listener is running
    pub fn is_subscribed(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_active)
    }

    /// Mark the start of a create or join
    pub fn begin_loading(&mut self) {
        self.state.is_loading = true;
        self.state.error = None;
    }

    /// Clear the user-visible error
    pub fn clear_error(&mut self) {
        self.state.error = None;
    }

    /// Create a new session and follow it
    ///
    /// Returns the pairing code to show the user.
    pub async fn create_session(&mut self) -> Result<String, ClientError> {
        self.begin_loading();
        let result = self.backend.create_session().await;
        self.state.is_loading = false;

        let session = self.record(result)?;
        let code = session.pairing_code.clone();
        let session_id = session.id.clone();

        self.unsubscribe();
        self.state.session = Some(session);
        self.state.avatar = None;
        self.state.messages.clear();
        info!(session_id = %session_id, code = %code, "Created session");

        let subscribed = self.subscribe_to_session(&session_id).await;
        self.record(subscribed)?;
        let caught_up = self.catch_up(&code).await;
        self.record(caught_up)?;
        Ok(code)
    }

    /// Join an existing session by pairing code
    ///
    /// The code is trimmed and upper-cased. On an unknown code the store's
    /// error becomes "Invalid pairing code" and no session is set.
    pub async fn connect_with_code(&mut self, code: &str) -> Result<(), ClientError> {
        self.begin_loading();

        let code = pairing::normalize_code(code);
        let result = if pairing::is_well_formed(&code) {
            self.backend.join_session(&code).await
        } else {
            Err(ClientError::NotFound("Invalid pairing code".to_string()))
        };
        self.state.is_loading = false;

        let result = result.map_err(|e| match e {
            ClientError::NotFound(_) => ClientError::NotFound("Invalid pairing code".to_string()),
            other => other,
        });
        let joined = self.record(result)?;
        let session_id = joined.session.id.clone();

        self.unsubscribe();
        self.state.session = Some(joined.session);
        self.state.avatar = joined.avatar;
        self.state.messages.clear();
        for message in joined.messages {
            self.append_message(message);
        }
        info!(session_id = %session_id, "Joined session");

        let subscribed = self.subscribe_to_session(&session_id).await;
        self.record(subscribed)?;
        let caught_up = self.catch_up(&code).await;
        self.record(caught_up)
    }

    // Re-read after subscribing so writes made before the feed was live are kept
    async fn catch_up(&mut self, code: &str) -> Result<(), ClientError> {
        let joined = self.backend.join_session(code).await?;
        let before = self.state.messages.len();

        self.state.session = Some(joined.session);
        if joined.avatar.is_some() {
            self.state.avatar = joined.avatar;
        }
        for message in joined.messages {
            self.append_message(message);
        }

        let recovered = self.state.messages.len() - before;
        if recovered > 0 {
            debug!(recovered, "Recovered messages written while subscribing");
        }
        Ok(())
    }

    /// Send a message to the active session
    ///
    /// Empty text is rejected before any backend call. The returned row is
    /// appended immediately; its change-feed echo is deduplicated by id.
    pub async fn send_message(&mut self, text: &str, sender: Sender) -> Result<Message, ClientError> {
        if text.trim().is_empty() {
            return self.record(Err(ClientError::Validation(
                "Message cannot be empty".to_string(),
            )));
        }
        let session_id = self.require_session()?;

        let result = self.backend.send_message(&session_id, sender, text).await;
        let message = self.record(result)?;
        self.append_message(message.clone());
        Ok(message)
    }

    /// Merge a patch into the avatar and write the full merged avatar
    ///
    /// The store keeps whatever the backend returns.
    pub async fn update_avatar(&mut self, patch: AvatarPatch) -> Result<Avatar, ClientError> {
        let session_id = self.require_session()?;

        let merged = self.state.avatar_parts().merged(&patch);
        let full = AvatarPatch {
            head: Some(merged.head),
            body: Some(merged.body),
            hands: Some(merged.hands),
        };

        let result = self.backend.upsert_avatar(&session_id, &full).await;
        let avatar = self.record(result)?;
        self.state.avatar = Some(avatar.clone());
        Ok(avatar)
    }

    /// Change one field of one part
    pub async fn update_part(&mut self, kind: PartKind, edit: PartEdit) -> Result<Avatar, ClientError> {
        let mut part = self.state.avatar_parts().get(kind).clone();
        match edit {
            PartEdit::Shape(shape) => part.shape = shape,
            PartEdit::Color(color) => part.color = color,
        }
        self.update_avatar(AvatarPatch::part(kind, part)).await
    }

    /// Apply a change-feed event
    ///
    /// Events for other sessions are ignored.
    pub fn apply_event(&mut self, event: ChangeEvent) {
        let Some(session) = &self.state.session else {
            return;
        };
        if event.session_id() != session.id {
            debug!(event_session = %event.session_id(), "Ignoring event for another session");
            return;
        }

        match event {
            ChangeEvent::MessageInserted { message } => {
                self.append_message(message);
            }
            ChangeEvent::AvatarUpdated { avatar } => self.state.avatar = Some(avatar),
            ChangeEvent::SessionUpdated { session } => self.state.session = Some(session),
        }
    }

    /// Insert a message in creation order unless its id is already present
    ///
    /// Returns false for duplicates.
    pub fn append_message(&mut self, message: Message) -> bool {
        if self.state.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        let position = self
            .state
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        self.state.messages.insert(position, message);
        true
    }

    /// Start following a session's change feed, replacing any previous one
    pub async fn subscribe_to_session(&mut self, session_id: &str) -> Result<(), ClientError> {
        self.unsubscribe();

        let events = self.backend.subscribe(session_id).await?;
        let tx = self.events_tx.clone();
        self.subscription = Some(Subscription::spawn(session_id, events, move |event| {
            let _ = tx.send(event);
        }));
        debug!(session_id = %session_id, "Following session changes");
        Ok(())
    }

    /// Stop following the change feed
    pub fn unsubscribe(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
        }
        // Drop anything the old listener queued
        while self.events_rx.try_recv().is_ok() {}
    }

    /// Leave the active session and reset the store
    pub fn leave_session(&mut self) {
        self.unsubscribe();
        self.state = StoreSnapshot::default();
    }

    /// Wait for the next queued change-feed event
    pub async fn next_event(&mut self) -> Option<ChangeEvent> {
        self.events_rx.recv().await
    }

    /// Apply every queued event without waiting; returns how many were applied
    pub fn drain_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply_event(event);
            applied += 1;
        }
        applied
    }

    fn require_session(&mut self) -> Result<String, ClientError> {
        match &self.state.session {
            Some(session) => Ok(session.id.clone()),
            None => self.record(Err(ClientError::NoSession)),
        }
    }

    // Mirror failures into the user-visible error
    fn record<T>(&mut self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(e) = &result {
            warn!(error = %e, "Store action failed");
            self.state.error = Some(e.to_string());
        }
        result
    }
}
