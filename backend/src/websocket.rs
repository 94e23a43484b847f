//! WebSocket handlers for real-time session updates
//!
//! This module streams a session's change feed to connected clients.
//! Supports ping/pong for connection keepalive.

use crate::error::AppError;
use crate::session::{ChangeEvent, JoinedSession};
use crate::state::RouterState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

/// WebSocket message types for real-time communication
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum WebSocketMessage {
    /// Snapshot sent once after connecting
    #[serde(rename = "initial_state")]
    InitialState {
        /// Session, avatar and message history
        #[serde(flatten)]
        state: Box<JoinedSession>,
    },
    /// A change to the session
    #[serde(rename = "change")]
    Change {
        /// The change itself
        event: ChangeEvent,
    },
    /// Ping message for connection keepalive
    #[serde(rename = "ping")]
    Ping,
    /// Pong message responding to ping
    #[serde(rename = "pong")]
    Pong,
}

/// WebSocket upgrade handler
///
/// Sends the session's current state, then forwards every change until the
/// client disconnects.
///
/// # Arguments
/// * `ws` - WebSocket upgrade request
/// * `state` - Shared server state
/// * `session_id` - Session to follow
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<RouterState>,
    Path(session_id): Path<String>,
) -> Result<Response, AppError> {
    let session = state.sessions.get_session(&session_id).await?;

    // Subscribe before loading the snapshot so no change falls in between
    let rx = state.sessions.subscribe(&session_id);
    let joined = state.sessions.join(&session.pairing_code).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, joined, rx)))
}

async fn handle_socket(
    socket: WebSocket,
    joined: JoinedSession,
    mut changes: broadcast::Receiver<ChangeEvent>,
) {
    let session_id = joined.session.id.clone();
    let (mut sender, mut receiver) = socket.split();

    info!(session_id = %session_id, "WebSocket client connected");

    let initial_state = WebSocketMessage::InitialState {
        state: Box::new(joined),
    };
    match serde_json::to_string(&initial_state) {
        Ok(text) => {
            if let Err(e) = sender.send(Message::Text(text)).await {
                error!("Failed to send initial state: {}", e);
                return;
            }
        }
        Err(e) => {
            error!("Failed to encode initial state: {}", e);
            return;
        }
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Message>();

    // Forward queued messages to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = sender.send(msg).await {
                error!("Failed to send message: {}", e);
                break;
            }
        }
    });

    // Forward change-feed events and periodic pings
    let feed_tx = tx.clone();
    let feed_session = session_id.clone();
    let mut feed_task = tokio::spawn(async move {
        let mut ping = tokio::time::interval(tokio::time::Duration::from_secs(30));
        ping.tick().await;
        loop {
            let outgoing = tokio::select! {
                received = changes.recv() => match received {
                    Ok(event) => serde_json::to_string(&WebSocketMessage::Change { event })
                        .map(Message::Text)
                        .map_err(|e| error!("Failed to encode change: {}", e))
                        .ok(),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(session_id = %feed_session, skipped, "WebSocket subscriber lagged");
                        None
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = ping.tick() => Some(Message::Ping(vec![])),
            };

            if let Some(msg) = outgoing {
                if feed_tx.send(msg).is_err() {
                    break;
                }
            }
        }
    });

    // Receive messages
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<WebSocketMessage>(&text) {
                        Ok(WebSocketMessage::Ping) => {
                            if let Ok(pong_msg) = serde_json::to_string(&WebSocketMessage::Pong) {
                                if tx.send(Message::Text(pong_msg)).is_err() {
                                    break;
                                }
                            }
                        }
                        Ok(other) => warn!("Received unhandled WebSocket message: {:?}", other),
                        Err(_) => debug!("Ignoring non-protocol WebSocket text"),
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("WebSocket client disconnected");
                    break;
                }
                Ok(Message::Pong(_)) => {}
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            feed_task.abort();
            recv_task.abort();
        }
        _ = &mut feed_task => {
            send_task.abort();
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
            feed_task.abort();
        }
    }

    info!(session_id = %session_id, "WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_pong_wire_format() {
        assert_eq!(
            serde_json::to_string(&WebSocketMessage::Ping).unwrap(),
            r#"{"type":"ping"}"#
        );
        let parsed: WebSocketMessage = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
        assert!(matches!(parsed, WebSocketMessage::Pong));
    }
}
