//! API utility functions
//!
//! Request-body and field validation shared by the handlers.

use crate::error::AppError;
use crate::session::Sender;
use axum::extract::rejection::JsonRejection;
use axum::Json;

/// Maximum message length in characters
pub const MAX_TEXT_LENGTH: usize = 10_000;

/// Unwrap a JSON body, turning extractor rejections into a 400 with a JSON body
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

/// Require a non-empty string field
///
/// # Arguments
/// * `value` - Field value from the request, if present
/// * `name` - Field name used in the error message
pub fn require_field(value: Option<String>, name: &str) -> Result<String, AppError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::Validation(format!("{} is required", name))),
    }
}

/// Validate message text
///
/// # Returns
/// * `Ok(())` - Text is valid
/// * `Err(AppError)` - Text is empty or too long
pub fn validate_text(text: &str) -> Result<(), AppError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("text must not be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_TEXT_LENGTH {
        return Err(AppError::Validation(format!(
            "text exceeds maximum length of {} characters",
            MAX_TEXT_LENGTH
        )));
    }
    Ok(())
}

/// Parse a `user`/`agent` sender field
pub fn parse_sender(value: &str) -> Result<Sender, AppError> {
    Sender::parse(value.trim()).ok_or_else(|| {
        AppError::Validation(format!(
            "sender must be 'user' or 'agent', got '{}'",
            value
        ))
    })
}
