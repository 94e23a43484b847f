//! Avatar Space Backend Library
//!
//! Session server for a shared avatar space plus the client-side store
//! used by the desktop app. The server binary is in `src/main.rs`.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod scene;
pub mod session;
/// Application state management
///
/// Holds the session service and the local chat history.
pub mod state;
pub mod websocket;
