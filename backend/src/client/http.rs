//! HTTP session backend
//!
//! Talks to the server's REST endpoints with a shared `reqwest::Client` and
//! follows the change feed over Server-Sent Events.

use crate::client::backend::{EventStream, SessionBackend};
use crate::client::error::ClientError;
use crate::session::{Avatar, AvatarPatch, ChangeEvent, JoinedSession, Message, Sender, Session};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Session backend reached over HTTP
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpBackend {
    /// Create a backend for the server at `base_url`
    ///
    /// `timeout` bounds each request; it does not apply to the event stream.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout: timeout,
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path)).timeout(self.request_timeout)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(self.url(path)).timeout(self.request_timeout)
    }
}

#[derive(Deserialize)]
struct PairResponse {
    session_id: String,
}

#[derive(Deserialize)]
struct AvatarResponse {
    avatar: Avatar,
}

#[derive(Deserialize)]
struct MessageResponse {
    message: Message,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Turn a non-success response into a [`ClientError`], or decode the body
pub(crate) async fn decode_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let response = check_status(response).await?;
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::from)
}

/// Map non-success statuses to [`ClientError`]
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error body".to_string());
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or(body);

    warn!(status = status.as_u16(), error = %message, "Server returned error status");

    Err(match status.as_u16() {
        404 => ClientError::NotFound(message),
        400 | 422 => ClientError::Validation(message),
        code => ClientError::Api {
            status: code,
            message,
        },
    })
}

#[async_trait]
impl SessionBackend for HttpBackend {
    async fn create_session(&self) -> Result<Session, ClientError> {
        let response = self.post("/api/sessions").send().await?;
        decode_response(response).await
    }

    async fn join_session(&self, code: &str) -> Result<JoinedSession, ClientError> {
        let response = self
            .get(&format!("/api/sessions/code/{}", code))
            .send()
            .await?;
        decode_response(response).await
    }

    async fn pair(&self, code: &str, agent_name: &str) -> Result<String, ClientError> {
        let response = self
            .post("/api/pair")
            .json(&json!({ "pairing_code": code, "agent_name": agent_name }))
            .send()
            .await?;
        let body: PairResponse = decode_response(response).await?;
        Ok(body.session_id)
    }

    async fn upsert_avatar(
        &self,
        session_id: &str,
        patch: &AvatarPatch,
    ) -> Result<Avatar, ClientError> {
        let mut body = serde_json::to_value(patch)?;
        body["session_id"] = json!(session_id);

        let response = self.post("/api/avatar").json(&body).send().await?;
        let body: AvatarResponse = decode_response(response).await?;
        Ok(body.avatar)
    }

    async fn send_message(
        &self,
        session_id: &str,
        sender: Sender,
        text: &str,
    ) -> Result<Message, ClientError> {
        let response = self
            .post("/api/message")
            .json(&json!({ "session_id": session_id, "sender": sender, "text": text }))
            .send()
            .await?;
        let body: MessageResponse = decode_response(response).await?;
        Ok(body.message)
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>, ClientError> {
        let response = self
            .get("/api/messages")
            .query(&[("session_id", session_id)])
            .send()
            .await?;
        decode_response(response).await
    }

    async fn subscribe(&self, session_id: &str) -> Result<EventStream, ClientError> {
        // No request timeout here; the stream stays open
        let response = self
            .client
            .get(self.url(&format!("/api/sessions/{}/events", session_id)))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = check_status(response).await?;

        debug!(session_id = %session_id, "Subscribed to session events");

        let mut bytes = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut parser = SseParser::default();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(error = %e, "Event stream interrupted");
                        break;
                    }
                };
                for data in parser.push(&chunk) {
                    match serde_json::from_str::<ChangeEvent>(&data) {
                        Ok(event) => yield event,
                        Err(e) => warn!(error = %e, "Skipping undecodable event"),
                    }
                }
            }
        };

        Ok(stream.boxed())
    }
}

/// Incremental Server-Sent Events parser
///
/// Buffers bytes until a blank line ends a frame, then returns the frame's
/// joined `data:` lines. Comment lines and other fields are ignored.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    /// Feed a chunk, returning the data payload of every completed frame
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer
            .extend(chunk.iter().copied().filter(|&b| b != b'\r'));

        let mut frames = Vec::new();
        while let Some(end) = find_frame_end(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let text = String::from_utf8_lossy(&frame[..end]);

            let data: Vec<&str> = text
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|value| value.strip_prefix(' ').unwrap_or(value))
                .collect();

            if !data.is_empty() {
                frames.push(data.join("\n"));
            }
        }
        frames
    }
}

fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}
