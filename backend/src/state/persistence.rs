// Local chat history persistence
// Stores the single-user chat log as a JSON array in one file

use crate::session::models::Sender;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Text of the entry written when the history file is first created
pub const SEED_MESSAGE: &str = "Neural Link established. Waiting for input.";

/// Error types for chat history operations
#[derive(Error, Debug)]
pub enum HistoryError {
    /// File I/O error
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization/deserialization error
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One entry of the local chat log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    /// Who wrote the entry
    pub sender: Sender,
    /// Entry text
    pub text: String,
    /// Server time in Unix milliseconds
    pub timestamp: i64,
}

impl ChatEntry {
    /// Create an entry stamped with the current time
    pub fn now(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// File-backed chat log capped to the most recent `limit` entries
///
/// All reads and writes go through one async mutex, so appends from
/// concurrent requests are serialized.
pub struct ChatHistory {
    path: PathBuf,
    limit: usize,
    lock: Mutex<()>,
}

impl ChatHistory {
    /// Open the history file, seeding it with a greeting if it does not exist
    ///
    /// # Arguments
    /// * `path` - Path to the JSON file
    /// * `limit` - Maximum number of entries kept
    pub async fn open<P: AsRef<Path>>(path: P, limit: usize) -> Result<Self, HistoryError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let history = Self {
            path,
            limit: limit.max(1),
            lock: Mutex::new(()),
        };

        if !tokio::fs::try_exists(&history.path).await? {
            history
                .write(&[ChatEntry::now(Sender::Agent, SEED_MESSAGE)])
                .await?;
            info!("Seeded chat history at {}", history.path.display());
        }

        Ok(history)
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry, oldest first
    pub async fn load(&self) -> Result<Vec<ChatEntry>, HistoryError> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    /// Append an entry stamped with the current time, trimming to the limit
    pub async fn append(&self, sender: Sender, text: &str) -> Result<ChatEntry, HistoryError> {
        let _guard = self.lock.lock().await;

        let mut entries = self.read().await?;
        let entry = ChatEntry::now(sender, text);
        entries.push(entry.clone());

        if entries.len() > self.limit {
            let excess = entries.len() - self.limit;
            entries.drain(..excess);
        }

        self.write(&entries).await?;
        debug!(entries = entries.len(), "Appended chat entry");
        Ok(entry)
    }

    /// Truncate the history to an empty list
    pub async fn reset(&self) -> Result<(), HistoryError> {
        let _guard = self.lock.lock().await;
        self.write(&[]).await?;
        info!("Chat history wiped");
        Ok(())
    }

    async fn read(&self) -> Result<Vec<ChatEntry>, HistoryError> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(Vec::new());
        }
        let json = tokio::fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&json)?)
    }

    // Write to a sibling temp file, then rename over the original
    async fn write(&self, entries: &[ChatEntry]) -> Result<(), HistoryError> {
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
