//! Client configuration

use std::env;
use std::time::Duration;

/// Settings for the desktop client
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the avatar space server
    pub server_url: String,
    /// Local chat poll period
    pub poll_interval: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3001".to_string(),
            poll_interval: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_url: env::var("AVATAR_SPACE_URL").unwrap_or(defaults.server_url),
            poll_interval: env::var("POLL_INTERVAL_MS")
                .ok()
                .and_then(|ms| ms.parse().ok())
                .filter(|ms: &u64| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            request_timeout: env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|s: &u64| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        }
    }
}
