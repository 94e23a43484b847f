// Application state shared by every request handler

use crate::config::Config;
use crate::error::AppError;
use crate::session::{ChangeFeed, SessionDb, SessionService};
use crate::state::persistence::ChatHistory;
use std::sync::Arc;

/// Shared server state
pub struct AppState {
    /// Sessions, avatars, messages and their change feed
    pub sessions: SessionService,
    /// File-backed local chat log
    pub history: ChatHistory,
    /// Configuration the server was started with
    pub config: Config,
}

/// State handed to axum handlers
pub type RouterState = Arc<AppState>;

impl AppState {
    /// Open the database and the chat history described by `config`
    pub async fn from_config(config: Config) -> Result<Self, AppError> {
        let db = SessionDb::new(&config.persistence.database_path).await?;
        let sessions = SessionService::new(db, Arc::new(ChangeFeed::default()), config.session_ttl());
        let history = ChatHistory::open(
            &config.persistence.chat_history_path,
            config.persistence.chat_history_limit,
        )
        .await?;

        Ok(Self {
            sessions,
            history,
            config,
        })
    }
}
