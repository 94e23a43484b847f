//! HTTP client for the local chat log

use crate::client::error::ClientError;
use crate::client::http::decode_response;
use crate::session::Sender;
use crate::state::ChatEntry;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Deserialize)]
struct ResetResponse {
    status: String,
}

/// Client for `/api/chat` and `/api/reset`
#[derive(Clone)]
pub struct ChatLogClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ChatLogClient {
    /// Create a client for the server at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch the whole history, oldest first
    pub async fn history(&self) -> Result<Vec<ChatEntry>, ClientError> {
        let response = self
            .client
            .get(format!("{}/api/chat", self.base_url))
            .send()
            .await?;
        decode_response(response).await
    }

    /// Append an entry; the server assigns the timestamp
    pub async fn post(&self, sender: Sender, text: &str) -> Result<ChatEntry, ClientError> {
        if text.trim().is_empty() {
            return Err(ClientError::Validation("Message cannot be empty".to_string()));
        }
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&json!({ "sender": sender, "text": text }))
            .send()
            .await?;
        decode_response(response).await
    }

    /// Wipe the history; returns the server's status text
    pub async fn reset(&self) -> Result<String, ClientError> {
        let response = self
            .client
            .post(format!("{}/api/reset", self.base_url))
            .send()
            .await?;
        let body: ResetResponse = decode_response(response).await?;
        Ok(body.status)
    }
}
