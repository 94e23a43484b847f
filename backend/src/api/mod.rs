//! API module
//!
//! Contains HTTP request handlers for sessions, avatars, messages and the
//! local chat log, plus the router that wires them together.

pub mod avatar;
pub mod events;
pub mod local_chat;
pub mod messages;
pub mod sessions;
pub mod utils;

use crate::state::RouterState;
use crate::websocket;
use axum::{
    extract::Request,
    middleware::Next,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "healthy"
    pub status: String,
    /// Crate version
    pub version: String,
    /// Human-readable message
    pub message: String,
}

/// Request ID middleware - adds unique ID to each request for tracing
async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    let response = next.run(request).instrument(span).await;

    info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        duration_ms = start.elapsed().as_millis(),
        "Request completed"
    );

    response
}

/// GET /api/health - Liveness check
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        message: "Avatar space backend is healthy".to_string(),
    })
}

/// Build the application router with every route and middleware layer
pub fn build_router(state: RouterState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        // Sessions
        .route("/api/sessions", post(sessions::create_session))
        .route("/api/sessions/code/:code", get(sessions::join_session))
        .route("/api/sessions/:id", get(sessions::get_session))
        .route("/api/sessions/:id/events", get(events::session_events))
        .route("/api/pair", post(sessions::pair))
        // Avatar and messages
        .route("/api/avatar", post(avatar::upsert_avatar))
        .route("/api/message", post(messages::send_message))
        .route("/api/messages", get(messages::list_messages))
        // Local chat log
        .route(
            "/api/chat",
            get(local_chat::get_history).post(local_chat::post_entry),
        )
        .route("/api/reset", post(local_chat::reset))
        // WebSocket for real-time updates
        .route("/ws/sessions/:id", get(websocket::websocket_handler))
        // Middleware (order matters - request_id should be first)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::{Config, PersistenceConfig, ServerConfig, SessionConfig};
    use crate::state::{AppState, RouterState};
    use std::sync::Arc;
    use tempfile::TempDir;

    pub(crate) fn test_config(temp_dir: &TempDir) -> Config {
        Config {
            server: ServerConfig {
                port: 0,
                host: "127.0.0.1".to_string(),
            },
            persistence: PersistenceConfig {
                database_path: temp_dir.path().join("test.db").to_string_lossy().into_owned(),
                chat_history_path: temp_dir.path().join("history.json"),
                chat_history_limit: 50,
            },
            sessions: SessionConfig { ttl_hours: 24 },
        }
    }

    pub(crate) async fn create_test_router_state() -> (RouterState, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let state = AppState::from_config(test_config(&temp_dir))
            .await
            .expect("Failed to create test state");
        (Arc::new(state), temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::create_test_router_state;
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_route() {
        let (state, _temp_dir) = create_test_router_state().await;
        let response = build_router(state)
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_malformed_json_gets_json_error() {
        let (state, _temp_dir) = create_test_router_state().await;
        let response = build_router(state)
            .oneshot(
                Request::post("/api/pair")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["status"], 400);
    }

    #[tokio::test]
    async fn test_unknown_code_is_404() {
        let (state, _temp_dir) = create_test_router_state().await;
        let response = build_router(state)
            .oneshot(
                Request::get("/api/sessions/code/NOPE-NOPE-0000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "Invalid pairing code");
    }
}
