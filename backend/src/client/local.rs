//! In-process session backend
//!
//! Calls [`SessionService`] directly; used by tests and by tools that embed
//! the server.

use crate::client::backend::{EventStream, SessionBackend};
use crate::client::error::ClientError;
use crate::session::{
    Avatar, AvatarPatch, JoinedSession, Message, Sender, Session, SessionService,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::warn;

/// Session backend that shares the server's service in-process
#[derive(Clone)]
pub struct LocalBackend {
    service: SessionService,
}

impl LocalBackend {
    /// Wrap a session service
    pub fn new(service: SessionService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl SessionBackend for LocalBackend {
    async fn create_session(&self) -> Result<Session, ClientError> {
        Ok(self.service.create_session().await?)
    }

    async fn join_session(&self, code: &str) -> Result<JoinedSession, ClientError> {
        Ok(self.service.join(code).await?)
    }

    async fn pair(&self, code: &str, agent_name: &str) -> Result<String, ClientError> {
        Ok(self.service.pair(code, agent_name).await?.id)
    }

    async fn upsert_avatar(
        &self,
        session_id: &str,
        patch: &AvatarPatch,
    ) -> Result<Avatar, ClientError> {
        Ok(self.service.upsert_avatar(session_id, patch).await?)
    }

    async fn send_message(
        &self,
        session_id: &str,
        sender: Sender,
        text: &str,
    ) -> Result<Message, ClientError> {
        Ok(self.service.send_message(session_id, sender, text).await?)
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>, ClientError> {
        Ok(self.service.list_messages(session_id).await?)
    }

    async fn subscribe(&self, session_id: &str) -> Result<EventStream, ClientError> {
        self.service.get_session(session_id).await?;

        let stream = BroadcastStream::new(self.service.subscribe(session_id)).filter_map(
            |item| async move {
                match item {
                    Ok(event) => Some(event),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped, "Local subscriber lagged");
                        None
                    }
                }
            },
        );
        Ok(stream.boxed())
    }
}
