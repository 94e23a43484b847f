//! Session API endpoints
//!
//! Session creation, lookup, join-by-code and agent pairing.

use crate::api::utils::{json_body, require_field};
use crate::error::AppError;
use crate::session::{JoinedSession, Session};
use crate::state::RouterState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};

/// Request to pair an agent with a session
#[derive(Debug, Deserialize)]
pub struct PairRequest {
    /// Code shown to the user
    pub pairing_code: Option<String>,
    /// Display name of the agent
    pub agent_name: Option<String>,
}

/// Response to a successful pairing
#[derive(Debug, Serialize, Deserialize)]
pub struct PairResponse {
    /// Always true
    pub success: bool,
    /// Id of the paired session
    pub session_id: String,
}

/// POST /api/sessions - Create a new session
pub async fn create_session(
    State(state): State<RouterState>,
) -> Result<(StatusCode, Json<Session>), AppError> {
    let session = state.sessions.create_session().await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/sessions/:id - Get a session by id
pub async fn get_session(
    State(state): State<RouterState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, AppError> {
    Ok(Json(state.sessions.get_session(&id).await?))
}

/// GET /api/sessions/code/:code - Join a session by pairing code
pub async fn join_session(
    State(state): State<RouterState>,
    Path(code): Path<String>,
) -> Result<Json<JoinedSession>, AppError> {
    Ok(Json(state.sessions.join(&code).await?))
}

/// POST /api/pair - Pair an agent with the session owning a code
pub async fn pair(
    State(state): State<RouterState>,
    payload: Result<Json<PairRequest>, JsonRejection>,
) -> Result<Json<PairResponse>, AppError> {
    let request = json_body(payload)?;
    let code = require_field(request.pairing_code, "pairing_code")?;
    let agent_name = request.agent_name.unwrap_or_default();

    let session = state.sessions.pair(&code, &agent_name).await?;
    Ok(Json(PairResponse {
        success: true,
        session_id: session.id,
    }))
}
