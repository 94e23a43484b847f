//! Avatar API endpoint

use crate::api::utils::{json_body, require_field};
use crate::error::AppError;
use crate::session::{Avatar, AvatarPatch};
use crate::state::RouterState;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
};
use serde::{Deserialize, Serialize};

/// Request to create or update a session's avatar
#[derive(Debug, Deserialize)]
pub struct AvatarRequest {
    /// Session whose avatar is changed
    pub session_id: Option<String>,
    /// Parts to change; omitted parts keep their current value
    #[serde(flatten)]
    pub patch: AvatarPatch,
}

/// Response carrying the stored avatar
#[derive(Debug, Serialize, Deserialize)]
pub struct AvatarResponse {
    /// Always true
    pub success: bool,
    /// Avatar after the write
    pub avatar: Avatar,
}

/// POST /api/avatar - Upsert a session's avatar
pub async fn upsert_avatar(
    State(state): State<RouterState>,
    payload: Result<Json<AvatarRequest>, JsonRejection>,
) -> Result<Json<AvatarResponse>, AppError> {
    let request = json_body(payload)?;
    let session_id = require_field(request.session_id, "session_id")?;

    let avatar = state
        .sessions
        .upsert_avatar(&session_id, &request.patch)
        .await?;

    Ok(Json(AvatarResponse {
        success: true,
        avatar,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::create_test_router_state;
    use crate::session::{AvatarPart, AvatarParts, Shape};

    #[tokio::test]
    async fn test_upsert_requires_session_id() {
        let (state, _temp_dir) = create_test_router_state().await;
        let request = AvatarRequest {
            session_id: None,
            patch: AvatarPatch::default(),
        };
        match upsert_avatar(State(state), Ok(Json(request))).await {
            Err(AppError::Validation(msg)) => assert_eq!(msg, "session_id is required"),
            other => panic!("Expected Validation error, got {:?}", other.map(|j| j.0)),
        }
    }

    #[tokio::test]
    async fn test_upsert_creates_then_patches() {
        let (state, _temp_dir) = create_test_router_state().await;
        let session = state.sessions.create_session().await.unwrap();

        let request: AvatarRequest = serde_json::from_value(serde_json::json!({
            "session_id": session.id,
            "body": {"shape": "cube", "color": "#4ECDC4"},
        }))
        .unwrap();
        let Json(first) = upsert_avatar(State(state.clone()), Ok(Json(request)))
            .await
            .unwrap();
        assert!(first.success);
        assert_eq!(first.avatar.body, AvatarPart::new(Shape::Cube, "#4ECDC4"));
        assert_eq!(first.avatar.head, AvatarParts::default().head);

        let request: AvatarRequest = serde_json::from_value(serde_json::json!({
            "session_id": session.id,
            "head": {"shape": "pyramid", "color": "#FFD93D"},
        }))
        .unwrap();
        let Json(second) = upsert_avatar(State(state), Ok(Json(request)))
            .await
            .unwrap();
        assert_eq!(second.avatar.head, AvatarPart::new(Shape::Sphere, "#FFD93D"));
        assert_eq!(second.avatar.body, first.avatar.body);
        assert_eq!(second.avatar.id, first.avatar.id);
    }
}
