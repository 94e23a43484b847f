//! Session operations shared by the HTTP handlers and the in-process client
//!
//! Wraps [`SessionDb`] and publishes a [`ChangeEvent`] for every write that
//! changes a session.

use crate::error::AppError;
use crate::session::db::SessionDb;
use crate::session::feed::{ChangeEvent, ChangeFeed};
use crate::session::models::{Avatar, AvatarPatch, JoinedSession, Message, Sender, Session};
use crate::session::pairing;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Session service: database plus change feed
#[derive(Clone)]
pub struct SessionService {
    db: SessionDb,
    feed: Arc<ChangeFeed>,
    ttl: Duration,
}

impl SessionService {
    /// Create a service over an open database
    pub fn new(db: SessionDb, feed: Arc<ChangeFeed>, ttl: Duration) -> Self {
        Self { db, feed, ttl }
    }

    /// The change feed this service publishes to
    pub fn feed(&self) -> &Arc<ChangeFeed> {
        &self.feed
    }

    /// Create a new session with a fresh pairing code
    pub async fn create_session(&self) -> Result<Session, AppError> {
        let session = self.db.create_session(self.ttl).await?;
        info!(session_id = %session.id, code = %session.pairing_code, "Session created");
        Ok(session)
    }

    /// Get a session by id
    pub async fn get_session(&self, id: &str) -> Result<Session, AppError> {
        self.db
            .get_session(id)
            .await?
            .ok_or_else(|| AppError::SessionNotFound(id.to_string()))
    }

    /// Join a session by pairing code
    ///
    /// The code is trimmed and upper-cased first. An unknown code never
    /// creates a session.
    pub async fn join(&self, code: &str) -> Result<JoinedSession, AppError> {
        let code = pairing::normalize_code(code);
        if code.is_empty() {
            return Err(AppError::InvalidPairingCode);
        }

        let session = self
            .db
            .find_session_by_code(&code)
            .await?
            .ok_or(AppError::InvalidPairingCode)?;

        let avatar = self.db.get_avatar(&session.id).await?;
        let messages = self.db.get_messages(&session.id).await?;

        debug!(session_id = %session.id, messages = messages.len(), "Session joined");
        Ok(JoinedSession {
            session,
            avatar,
            messages,
        })
    }

    /// Pair an agent with the session that owns `code`
    pub async fn pair(&self, code: &str, agent_name: &str) -> Result<Session, AppError> {
        let code = pairing::normalize_code(code);
        if code.is_empty() {
            return Err(AppError::Validation("pairing_code is required".to_string()));
        }

        let session = self
            .db
            .find_session_by_code(&code)
            .await?
            .ok_or(AppError::InvalidPairingCode)?;

        let agent_name = match agent_name.trim() {
            "" => "Agent",
            name => name,
        };

        let session = self
            .db
            .mark_agent_connected(&session.id, agent_name)
            .await?
            .ok_or_else(|| AppError::SessionNotFound(session.id.clone()))?;

        info!(session_id = %session.id, agent = %agent_name, "Agent paired");
        self.feed.publish(ChangeEvent::SessionUpdated {
            session: session.clone(),
        });
        Ok(session)
    }

    /// Merge a patch into a session's avatar
    ///
    /// Publishes `AvatarUpdated` only when the stored avatar changed.
    pub async fn upsert_avatar(
        &self,
        session_id: &str,
        patch: &AvatarPatch,
    ) -> Result<Avatar, AppError> {
        let session = self.get_session(session_id).await?;
        let write = self
            .db
            .upsert_avatar(session_id, session.agent_name.as_deref(), patch)
            .await?;

        if write.changed {
            self.feed.publish(ChangeEvent::AvatarUpdated {
                avatar: write.avatar.clone(),
            });
        }
        Ok(write.avatar)
    }

    /// Append a message to a session's log
    pub async fn send_message(
        &self,
        session_id: &str,
        sender: Sender,
        text: &str,
    ) -> Result<Message, AppError> {
        if text.trim().is_empty() {
            return Err(AppError::Validation("text must not be empty".to_string()));
        }

        let session = self.get_session(session_id).await?;

        // Keep message times strictly after anything already in the session
        let created_at = Utc::now().max(session.last_activity + Duration::microseconds(1));

        let message = self
            .db
            .insert_message(session_id, sender, text, created_at)
            .await?;

        self.feed.publish(ChangeEvent::MessageInserted {
            message: message.clone(),
        });
        Ok(message)
    }

    /// All messages of a session, oldest first
    pub async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>, AppError> {
        self.db.get_messages(session_id).await
    }

    /// Subscribe to a session's change feed
    pub fn subscribe(&self, session_id: &str) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::models::{AvatarPart, PartKind, Shape};

    async fn service() -> SessionService {
        let db = SessionDb::new("sqlite::memory:").await.unwrap();
        SessionService::new(db, Arc::new(ChangeFeed::default()), Duration::hours(24))
    }

    #[tokio::test]
    async fn test_create_then_join_by_code() {
        let service = service().await;
        let session = service.create_session().await.unwrap();

        let joined = service
            .join(&format!("  {} ", session.pairing_code.to_lowercase()))
            .await
            .unwrap();
        assert_eq!(joined.session.id, session.id);
        assert!(joined.avatar.is_none());
        assert!(joined.messages.is_empty());
    }

    #[tokio::test]
    async fn test_join_unknown_code() {
        let service = service().await;
        match service.join("NOPE-NOPE-0000").await {
            Err(AppError::InvalidPairingCode) => {}
            other => panic!("expected InvalidPairingCode, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pair_publishes_session_update() {
        let service = service().await;
        let session = service.create_session().await.unwrap();
        let mut rx = service.subscribe(&session.id);

        let paired = service.pair(&session.pairing_code, "Claude").await.unwrap();
        assert_eq!(paired.id, session.id);
        assert!(paired.agent_connected);

        match rx.recv().await.unwrap() {
            ChangeEvent::SessionUpdated { session } => {
                assert_eq!(session.agent_name.as_deref(), Some("Claude"))
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pair_requires_code() {
        let service = service().await;
        match service.pair("   ", "Claude").await {
            Err(AppError::Validation(_)) => {}
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_message_validates_before_lookup() {
        let service = service().await;
        match service.send_message("missing", Sender::User, "  ").await {
            Err(AppError::Validation(_)) => {}
            other => panic!("expected Validation, got {:?}", other),
        }
        match service.send_message("missing", Sender::User, "hi").await {
            Err(AppError::SessionNotFound(_)) => {}
            other => panic!("expected SessionNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_message_is_after_session_creation() {
        let service = service().await;
        let session = service.create_session().await.unwrap();

        let message = service
            .send_message(&session.id, Sender::User, "hello")
            .await
            .unwrap();
        assert!(message.created_at > session.created_at);

        let messages = service.list_messages(&session.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "hello");
        assert_eq!(messages[0].sender, Sender::User);
    }

    #[tokio::test]
    async fn test_identical_avatar_write_publishes_once() {
        let service = service().await;
        let session = service.create_session().await.unwrap();
        let mut rx = service.subscribe(&session.id);
        let patch = AvatarPatch::part(PartKind::Head, AvatarPart::new(Shape::Cube, "#FF6B6B"));

        let first = service.upsert_avatar(&session.id, &patch).await.unwrap();
        let second = service.upsert_avatar(&session.id, &patch).await.unwrap();
        assert_eq!(first, second);

        assert!(matches!(
            rx.try_recv(),
            Ok(ChangeEvent::AvatarUpdated { .. })
        ));
        assert!(rx.try_recv().is_err());
    }
}
