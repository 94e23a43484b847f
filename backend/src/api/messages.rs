//! Message API endpoints
//!
//! Append to and read a session's message log.

use crate::api::utils::{json_body, parse_sender, validate_text};
use crate::error::AppError;
use crate::session::Message;
use crate::state::RouterState;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};

/// Request to append a message
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    /// Target session
    pub session_id: Option<String>,
    /// `user` or `agent`
    pub sender: Option<String>,
    /// Message body
    pub text: Option<String>,
}

/// Response carrying the stored message
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Always true
    pub success: bool,
    /// Stored row
    pub message: Message,
}

/// Query for listing messages
#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    /// Session to list
    pub session_id: Option<String>,
}

/// POST /api/message - Append a message to a session
pub async fn send_message(
    State(state): State<RouterState>,
    payload: Result<Json<MessageRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let request = json_body(payload)?;
    let (Some(session_id), Some(sender), Some(text)) =
        (request.session_id, request.sender, request.text)
    else {
        return Err(AppError::Validation("Missing fields".to_string()));
    };

    let sender = parse_sender(&sender)?;
    validate_text(&text)?;

    let message = state
        .sessions
        .send_message(&session_id, sender, &text)
        .await?;

    Ok(Json(MessageResponse {
        success: true,
        message,
    }))
}

/// GET /api/messages?session_id= - List a session's messages, oldest first
pub async fn list_messages(
    State(state): State<RouterState>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<Message>>, AppError> {
    let session_id = query
        .session_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::Validation("session_id is required".to_string()))?;

    Ok(Json(state.sessions.list_messages(&session_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::create_test_router_state;
    use crate::session::Sender;

    fn request(session_id: Option<&str>, sender: Option<&str>, text: Option<&str>) -> MessageRequest {
        MessageRequest {
            session_id: session_id.map(str::to_string),
            sender: sender.map(str::to_string),
            text: text.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_send_message_missing_fields() {
        let (state, _temp_dir) = create_test_router_state().await;
        match send_message(State(state), Ok(Json(request(Some("s"), None, Some("hi"))))).await {
            Err(AppError::Validation(msg)) => assert_eq!(msg, "Missing fields"),
            other => panic!("Expected Validation error, got {:?}", other.map(|j| j.0)),
        }
    }

    #[tokio::test]
    async fn test_send_message_bad_sender() {
        let (state, _temp_dir) = create_test_router_state().await;
        let session = state.sessions.create_session().await.unwrap();
        let result = send_message(
            State(state),
            Ok(Json(request(Some(&session.id), Some("robot"), Some("hi")))),
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_send_then_list() {
        let (state, _temp_dir) = create_test_router_state().await;
        let session = state.sessions.create_session().await.unwrap();

        let Json(sent) = send_message(
            State(state.clone()),
            Ok(Json(request(Some(&session.id), Some("user"), Some("hello")))),
        )
        .await
        .unwrap();
        assert!(sent.success);
        assert_eq!(sent.message.sender, Sender::User);

        let Json(messages) = list_messages(
            State(state),
            Query(MessagesQuery {
                session_id: Some(session.id.clone()),
            }),
        )
        .await
        .unwrap();

        let hellos: Vec<_> = messages
            .iter()
            .filter(|m| m.sender == Sender::User && m.text == "hello")
            .collect();
        assert_eq!(hellos.len(), 1);
        assert!(hellos[0].created_at > session.created_at);
    }

    #[tokio::test]
    async fn test_list_requires_session_id() {
        let (state, _temp_dir) = create_test_router_state().await;
        let result = list_messages(State(state), Query(MessagesQuery { session_id: None })).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
