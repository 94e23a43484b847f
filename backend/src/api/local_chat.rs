//! Local chat log endpoints
//!
//! Single-user chat history backed by a JSON file, polled by clients.

use crate::api::utils::{json_body, parse_sender};
use crate::error::AppError;
use crate::state::{ChatEntry, RouterState};
use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
};
use serde::{Deserialize, Serialize};

/// Request to append to the local chat log
#[derive(Debug, Deserialize)]
pub struct ChatEntryRequest {
    /// `user` or `agent`
    pub sender: Option<String>,
    /// Entry text
    pub text: Option<String>,
}

/// Response to a history reset
#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    /// Human-readable status
    pub status: String,
}

/// GET /api/chat - Full local chat history, oldest first
pub async fn get_history(
    State(state): State<RouterState>,
) -> Result<Json<Vec<ChatEntry>>, AppError> {
    Ok(Json(state.history.load().await?))
}

/// POST /api/chat - Append an entry stamped with server time
pub async fn post_entry(
    State(state): State<RouterState>,
    payload: Result<Json<ChatEntryRequest>, JsonRejection>,
) -> Result<Json<ChatEntry>, AppError> {
    let request = json_body(payload)?;
    let (Some(sender), Some(text)) = (
        request.sender.filter(|s| !s.is_empty()),
        request.text.filter(|t| !t.is_empty()),
    ) else {
        return Err(AppError::Validation("Missing fields".to_string()));
    };

    let sender = parse_sender(&sender)?;
    Ok(Json(state.history.append(sender, &text).await?))
}

/// POST /api/reset - Wipe the local chat history
pub async fn reset(State(state): State<RouterState>) -> Result<Json<ResetResponse>, AppError> {
    state.history.reset().await?;
    Ok(Json(ResetResponse {
        status: "Memory wiped".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::create_test_router_state;
    use crate::session::Sender;
    use crate::state::persistence::SEED_MESSAGE;

    fn entry(sender: Option<&str>, text: Option<&str>) -> ChatEntryRequest {
        ChatEntryRequest {
            sender: sender.map(str::to_string),
            text: text.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_history_starts_seeded() {
        let (state, _temp_dir) = create_test_router_state().await;
        let Json(history) = get_history(State(state)).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, SEED_MESSAGE);
    }

    #[tokio::test]
    async fn test_post_entry_missing_fields() {
        let (state, _temp_dir) = create_test_router_state().await;
        for request in [entry(None, Some("hi")), entry(Some("user"), Some(""))] {
            match post_entry(State(state.clone()), Ok(Json(request))).await {
                Err(AppError::Validation(msg)) => assert_eq!(msg, "Missing fields"),
                other => panic!("Expected Validation error, got {:?}", other.map(|j| j.0)),
            }
        }
    }

    #[tokio::test]
    async fn test_post_entry_stamps_time() {
        let (state, _temp_dir) = create_test_router_state().await;
        let before = chrono::Utc::now().timestamp_millis();

        let Json(stored) = post_entry(State(state.clone()), Ok(Json(entry(Some("agent"), Some("hi")))))
            .await
            .unwrap();
        assert_eq!(stored.sender, Sender::Agent);
        assert!(stored.timestamp >= before);

        let Json(history) = get_history(State(state)).await.unwrap();
        assert_eq!(history.last(), Some(&stored));
    }

    #[tokio::test]
    async fn test_reset_empties_history() {
        let (state, _temp_dir) = create_test_router_state().await;
        let Json(response) = reset(State(state.clone())).await.unwrap();
        assert_eq!(response.status, "Memory wiped");

        let Json(history) = get_history(State(state)).await.unwrap();
        assert!(history.is_empty());
    }
}
