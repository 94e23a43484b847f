//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use std::env;
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Persistence configuration
    pub persistence: PersistenceConfig,
    /// Session configuration
    pub sessions: SessionConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

/// Persistence configuration
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// SQLite database holding sessions, avatars and messages
    pub database_path: String,
    /// JSON file backing the local chat log
    pub chat_history_path: PathBuf,
    /// Maximum number of local chat entries kept
    pub chat_history_limit: usize,
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Hours until a new session's advisory expiry
    pub ttl_hours: i64,
}

/// Default number of local chat entries kept
pub const DEFAULT_CHAT_HISTORY_LIMIT: usize = 50;

/// Default session lifetime in hours
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let data_dir = data_dir();
        Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(3001),
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            },
            persistence: PersistenceConfig {
                database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| {
                    data_dir.join("sessions.db").to_string_lossy().into_owned()
                }),
                chat_history_path: env::var_os("CHAT_HISTORY_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| data_dir.join("history.json")),
                chat_history_limit: env::var("CHAT_HISTORY_LIMIT")
                    .ok()
                    .and_then(|n| n.parse().ok())
                    .filter(|n: &usize| *n > 0)
                    .unwrap_or(DEFAULT_CHAT_HISTORY_LIMIT),
            },
            sessions: SessionConfig {
                ttl_hours: env::var("SESSION_TTL_HOURS")
                    .ok()
                    .and_then(|h| h.parse().ok())
                    .filter(|h: &i64| *h > 0)
                    .unwrap_or(DEFAULT_SESSION_TTL_HOURS),
            },
        }
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Session lifetime as a duration
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.sessions.ttl_hours)
    }
}

// ~/.avatar-space, or a relative directory when HOME is unset
fn data_dir() -> PathBuf {
    match env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".avatar-space"),
        None => PathBuf::from(".avatar-space"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "PORT",
        "HOST",
        "DATABASE_PATH",
        "CHAT_HISTORY_PATH",
        "CHAT_HISTORY_LIMIT",
        "SESSION_TTL_HOURS",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = Config::from_env();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.persistence.chat_history_limit, 50);
        assert_eq!(config.sessions.ttl_hours, 24);
        assert!(config.persistence.database_path.ends_with("sessions.db"));
        assert!(config.persistence.chat_history_path.ends_with("history.json"));
        assert_eq!(config.server_addr(), "0.0.0.0:3001");
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear_env();
        env::set_var("PORT", "4000");
        env::set_var("CHAT_HISTORY_PATH", "/tmp/chat.json");
        env::set_var("CHAT_HISTORY_LIMIT", "10");
        env::set_var("SESSION_TTL_HOURS", "2");

        let config = Config::from_env();
        assert_eq!(config.server.port, 4000);
        assert_eq!(
            config.persistence.chat_history_path,
            PathBuf::from("/tmp/chat.json")
        );
        assert_eq!(config.persistence.chat_history_limit, 10);
        assert_eq!(config.session_ttl(), chrono::Duration::hours(2));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_values_fall_back() {
        clear_env();
        env::set_var("PORT", "not-a-port");
        env::set_var("CHAT_HISTORY_LIMIT", "0");

        let config = Config::from_env();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.persistence.chat_history_limit, 50);
        clear_env();
    }
}
