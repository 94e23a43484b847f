//! Server-Sent Events for the session change feed
//!
//! Each event is one `data:` line carrying a tagged `ChangeEvent` JSON
//! object. A comment line is sent on connect and every keep-alive period.

use crate::error::AppError;
use crate::session::ChangeEvent;
use crate::state::RouterState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
};
use futures_util::stream::Stream;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

/// Interval between keep-alive comments
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// GET /api/sessions/:id/events - Stream a session's changes
///
/// The subscription is taken before the response is returned, so nothing
/// written after this handler completes is missed.
pub async fn session_events(
    State(state): State<RouterState>,
    Path(session_id): Path<String>,
) -> Result<Response, AppError> {
    state.sessions.get_session(&session_id).await?;

    let rx = state.sessions.subscribe(&session_id);
    debug!(session_id = %session_id, "SSE subscriber connected");

    let stream = event_stream(session_id, rx);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build SSE response: {}", e)))
}

/// Format one change event as an SSE frame
pub fn format_event(event: &ChangeEvent) -> Result<String, serde_json::Error> {
    Ok(format!("data: {}\n\n", serde_json::to_string(event)?))
}

fn event_stream(
    session_id: String,
    mut rx: broadcast::Receiver<ChangeEvent>,
) -> impl Stream<Item = Result<String, std::io::Error>> {
    use async_stream::stream;

    stream! {
        yield Ok(": connected\n\n".to_string());

        let mut keep_alive = tokio::time::interval(KEEP_ALIVE_INTERVAL);
        keep_alive.tick().await;

        loop {
            let frame = tokio::select! {
                received = rx.recv() => match received {
                    Ok(event) => match format_event(&event) {
                        Ok(frame) => Some(frame),
                        Err(e) => {
                            warn!(error = %e, "Failed to encode change event");
                            None
                        }
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(session_id = %session_id, skipped, "SSE subscriber lagged");
                        None
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = keep_alive.tick() => Some(": keep-alive\n\n".to_string()),
            };

            if let Some(frame) = frame {
                yield Ok(frame);
            }
        }

        debug!(session_id = %session_id, "SSE stream closed");
    }
}
