// State management module
// Handles shared server state and the local chat history file

pub mod app_state;
pub mod persistence;

pub use app_state::{AppState, RouterState};
pub use persistence::{ChatEntry, ChatHistory, HistoryError};
