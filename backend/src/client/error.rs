//! Client error types

use crate::error::AppError;
use thiserror::Error;

/// Errors surfaced by the client-side store and its backends
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport failure (connection refused, timeout, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("{message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error text from the response body
        message: String,
    },

    /// The requested session or pairing code does not exist
    #[error("{0}")]
    NotFound(String),

    /// Input rejected before or by the server
    #[error("{0}")]
    Validation(String),

    /// Response body could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// An action needs a session but none is active
    #[error("No active session")]
    NoSession,
}

impl From<AppError> for ClientError {
    fn from(error: AppError) -> Self {
        match error {
            AppError::SessionNotFound(_) | AppError::InvalidPairingCode => {
                ClientError::NotFound(error.to_string())
            }
            AppError::Validation(message) => ClientError::Validation(message),
            other => ClientError::Api {
                status: other.status().as_u16(),
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(error: serde_json::Error) -> Self {
        ClientError::Decode(error.to_string())
    }
}
