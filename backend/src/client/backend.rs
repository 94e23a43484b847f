//! Session backend abstraction used by the client store

use crate::client::error::ClientError;
use crate::session::{Avatar, AvatarPatch, ChangeEvent, JoinedSession, Message, Sender, Session};
use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// Stream of change events for one session
pub type EventStream = BoxStream<'static, ChangeEvent>;

/// Operations the store needs from a session backend
///
/// Implemented over HTTP ([`crate::client::HttpBackend`]) and in-process
/// ([`crate::client::LocalBackend`]).
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Create a session and return it with its pairing code
    async fn create_session(&self) -> Result<Session, ClientError>;

    /// Load a session with its avatar and messages by pairing code
    async fn join_session(&self, code: &str) -> Result<JoinedSession, ClientError>;

    /// Pair an agent with the session owning `code`; returns the session id
    async fn pair(&self, code: &str, agent_name: &str) -> Result<String, ClientError>;

    /// Merge a patch into a session's avatar
    async fn upsert_avatar(
        &self,
        session_id: &str,
        patch: &AvatarPatch,
    ) -> Result<Avatar, ClientError>;

    /// Append a message to a session
    async fn send_message(
        &self,
        session_id: &str,
        sender: Sender,
        text: &str,
    ) -> Result<Message, ClientError>;

    /// All messages of a session, oldest first
    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>, ClientError>;

    /// Start receiving a session's change events
    ///
    /// Returns once the subscription is live; events written afterwards are
    /// delivered on the stream.
    async fn subscribe(&self, session_id: &str) -> Result<EventStream, ClientError>;
}
