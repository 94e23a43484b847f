//! Session database operations
//!
//! Handles all database interactions for sessions, avatars and messages.

use crate::error::AppError;
use crate::session::models::{Avatar, AvatarParts, AvatarPatch, Message, Sender, Session};
use crate::session::pairing;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// How many pairing codes to try before giving up on a collision streak
pub const MAX_CODE_ATTEMPTS: usize = 5;

const SESSION_COLUMNS: &str = "id, pairing_code, agent_name, agent_connected, user_connected, \
     created_at, last_activity, expires_at";
const AVATAR_COLUMNS: &str = "id, session_id, agent_name, head, body, hands, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, session_id, sender, text, created_at";

/// Result of an avatar upsert
#[derive(Debug, Clone)]
pub struct AvatarWrite {
    /// The stored avatar after the write
    pub avatar: Avatar,
    /// False when the patch matched the stored parts and nothing was written
    pub changed: bool,
}

/// Database connection pool for session operations
#[derive(Clone)]
pub struct SessionDb {
    pool: SqlitePool,
}

impl SessionDb {
    /// Initialize database connection pool
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file, or `sqlite::memory:`
    ///
    /// # Returns
    /// * `Ok(SessionDb)` if successful
    /// * `Err(AppError)` if connection or migration failed
    pub async fn new(db_path: &str) -> Result<Self, AppError> {
        let in_memory = db_path.contains(":memory:");

        if !in_memory {
            if let Some(parent) = PathBuf::from(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        AppError::Internal(anyhow::anyhow!("Failed to create db directory: {}", e))
                    })?;
                }
            }
        }

        let connection_string = if db_path.starts_with("sqlite:") {
            db_path.to_string()
        } else {
            format!("sqlite:{}", db_path)
        };

        let options = SqliteConnectOptions::from_str(&connection_string)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid database path: {}", e)))?
            .create_if_missing(true);

        let pool_options = if in_memory {
            // Every in-memory connection is its own database, so keep exactly one alive
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to connect to database: {}", e))
            })?;

        info!("Connected to SQLite database at: {}", db_path);

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations...");

        let migration_sql = include_str!("../../migrations/001_create_sessions.sql");

        let mut cleaned_sql = String::new();
        for line in migration_sql.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("--") {
                continue;
            }
            let without_comments = match trimmed.find("--") {
                Some(comment_pos) => &trimmed[..comment_pos],
                None => trimmed,
            };
            cleaned_sql.push_str(without_comments.trim());
            cleaned_sql.push(' ');
        }

        for statement in cleaned_sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    AppError::Internal(anyhow::anyhow!(
                        "Migration failed: {} - Statement: {}",
                        e,
                        statement.chars().take(100).collect::<String>()
                    ))
                })?;
        }

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Create a session with a fresh pairing code
    ///
    /// Retries code generation on a unique-constraint collision, up to
    /// [`MAX_CODE_ATTEMPTS`] times.
    pub async fn create_session(&self, ttl: Duration) -> Result<Session, AppError> {
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let now = Utc::now();
            let session = Session {
                id: uuid::Uuid::new_v4().to_string(),
                pairing_code: pairing::generate_code(),
                agent_name: None,
                agent_connected: false,
                user_connected: true,
                created_at: now,
                last_activity: now,
                expires_at: now + ttl,
            };

            let result = sqlx::query(
                "INSERT INTO sessions (id, pairing_code, agent_name, agent_connected, user_connected, created_at, last_activity, expires_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&session.id)
            .bind(&session.pairing_code)
            .bind(&session.agent_name)
            .bind(session.agent_connected)
            .bind(session.user_connected)
            .bind(session.created_at)
            .bind(session.last_activity)
            .bind(session.expires_at)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => {
                    debug!(session_id = %session.id, code = %session.pairing_code, "Created session");
                    return Ok(session);
                }
                Err(e) if is_unique_violation(&e) => {
                    warn!(attempt, code = %session.pairing_code, "Pairing code collision, retrying");
                }
                Err(e) => {
                    return Err(AppError::Internal(anyhow::anyhow!(
                        "Failed to create session: {}",
                        e
                    )));
                }
            }
        }

        Err(AppError::Internal(anyhow::anyhow!(
            "Failed to allocate a unique pairing code after {} attempts",
            MAX_CODE_ATTEMPTS
        )))
    }

    /// Get a session by ID
    pub async fn get_session(&self, id: &str) -> Result<Option<Session>, AppError> {
        let query = format!("SELECT {} FROM sessions WHERE id = ?", SESSION_COLUMNS);
        sqlx::query_as::<_, Session>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to fetch session: {}", e)))
    }

    /// Find a session by exact pairing code
    pub async fn find_session_by_code(&self, code: &str) -> Result<Option<Session>, AppError> {
        let query = format!("SELECT {} FROM sessions WHERE pairing_code = ?", SESSION_COLUMNS);
        sqlx::query_as::<_, Session>(&query)
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to fetch session: {}", e)))
    }

    /// Record that an agent paired with a session
    pub async fn mark_agent_connected(
        &self,
        id: &str,
        agent_name: &str,
    ) -> Result<Option<Session>, AppError> {
        sqlx::query(
            "UPDATE sessions SET agent_name = ?, agent_connected = 1, last_activity = ? WHERE id = ?",
        )
        .bind(agent_name)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to pair session: {}", e)))?;

        debug!(session_id = %id, agent = %agent_name, "Agent paired");
        self.get_session(id).await
    }

    /// Update a session's last_activity timestamp
    pub async fn touch_session(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE sessions SET last_activity = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to touch session: {}", e)))?;

        Ok(())
    }

    /// Get the avatar of a session, if one was created
    pub async fn get_avatar(&self, session_id: &str) -> Result<Option<Avatar>, AppError> {
        let query = format!("SELECT {} FROM avatars WHERE session_id = ?", AVATAR_COLUMNS);
        sqlx::query_as::<_, Avatar>(&query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to fetch avatar: {}", e)))
    }

    /// Merge a patch into a session's avatar, creating it on first write
    ///
    /// Missing parts of a new avatar take the default avatar's parts. A patch
    /// that leaves the stored parts unchanged does not touch the row.
    pub async fn upsert_avatar(
        &self,
        session_id: &str,
        agent_name: Option<&str>,
        patch: &AvatarPatch,
    ) -> Result<AvatarWrite, AppError> {
        let existing = self.get_avatar(session_id).await?;

        if let Some(current) = &existing {
            let merged = current.parts().merged(patch);
            let same_agent =
                agent_name.map_or(true, |name| current.agent_name.as_deref() == Some(name));
            if merged == current.parts() && same_agent {
                debug!(session_id = %session_id, "Avatar unchanged, skipping write");
                return Ok(AvatarWrite {
                    avatar: current.clone(),
                    changed: false,
                });
            }
        }

        let base = existing
            .as_ref()
            .map(Avatar::parts)
            .unwrap_or_default();
        let parts = base.merged(patch);
        let now = Utc::now();
        let id = existing
            .as_ref()
            .map(|a| a.id.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let agent_name = agent_name
            .map(str::to_string)
            .or_else(|| existing.as_ref().and_then(|a| a.agent_name.clone()));

        sqlx::query(
            "INSERT INTO avatars (id, session_id, agent_name, head, body, hands, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(session_id) DO UPDATE SET \
             agent_name = excluded.agent_name, head = excluded.head, body = excluded.body, \
             hands = excluded.hands, updated_at = excluded.updated_at",
        )
        .bind(&id)
        .bind(session_id)
        .bind(&agent_name)
        .bind(Json(&parts.head))
        .bind(Json(&parts.body))
        .bind(Json(&parts.hands))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to save avatar: {}", e)))?;

        debug!(session_id = %session_id, created = existing.is_none(), "Saved avatar");

        let avatar = self.get_avatar(session_id).await?.ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("Avatar missing after write: {}", session_id))
        })?;

        Ok(AvatarWrite {
            avatar,
            changed: true,
        })
    }

    /// Append a message to a session
    ///
    /// `created_at` is supplied by the caller so it can be kept strictly
    /// after the session's last activity.
    pub async fn insert_message(
        &self,
        session_id: &str,
        sender: Sender,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Message, AppError> {
        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            sender,
            text: text.to_string(),
            created_at,
        };

        sqlx::query(
            "INSERT INTO messages (id, session_id, sender, text, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.session_id)
        .bind(message.sender)
        .bind(&message.text)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to add message: {}", e)))?;

        self.touch_session(session_id, created_at).await?;

        debug!(
            "Added message {} to session {}",
            message.id, message.session_id
        );
        Ok(message)
    }

    /// Get all messages for a session, oldest first
    pub async fn get_messages(&self, session_id: &str) -> Result<Vec<Message>, AppError> {
        let query = format!(
            "SELECT {} FROM messages WHERE session_id = ? ORDER BY created_at ASC, rowid ASC",
            MESSAGE_COLUMNS
        );
        sqlx::query_as::<_, Message>(&query)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to fetch messages: {}", e)))
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_error) => db_error.is_unique_violation(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::models::{AvatarPart, PartKind, Shape};
    use tempfile::TempDir;

    async fn create_test_db() -> (SessionDb, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = SessionDb::new(db_path.to_str().unwrap()).await.unwrap();
        (db, temp_dir)
    }

    #[tokio::test]
    async fn test_create_and_find_session() {
        let (db, _temp) = create_test_db().await;

        let session = db.create_session(Duration::hours(24)).await.unwrap();
        assert!(pairing::is_well_formed(&session.pairing_code));
        assert!(session.user_connected);
        assert!(!session.agent_connected);
        assert_eq!(session.expires_at - session.created_at, Duration::hours(24));

        let found = db
            .find_session_by_code(&session.pairing_code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, session.id);

        let by_id = db.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(by_id.pairing_code, session.pairing_code);
    }

    #[tokio::test]
    async fn test_unknown_code_returns_none() {
        let (db, _temp) = create_test_db().await;
        assert!(db
            .find_session_by_code("NOPE-NOPE-0000")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_mark_agent_connected() {
        let (db, _temp) = create_test_db().await;
        let session = db.create_session(Duration::hours(1)).await.unwrap();

        let paired = db
            .mark_agent_connected(&session.id, "Claude")
            .await
            .unwrap()
            .unwrap();
        assert!(paired.agent_connected);
        assert_eq!(paired.agent_name.as_deref(), Some("Claude"));
        assert!(paired.last_activity >= session.last_activity);
    }

    #[tokio::test]
    async fn test_first_avatar_write_fills_defaults() {
        let (db, _temp) = create_test_db().await;
        let session = db.create_session(Duration::hours(1)).await.unwrap();

        let patch = AvatarPatch::part(PartKind::Head, AvatarPart::new(Shape::Cube, "#FFD93D"));
        let write = db.upsert_avatar(&session.id, None, &patch).await.unwrap();

        assert!(write.changed);
        assert_eq!(write.avatar.head, AvatarPart::new(Shape::Cube, "#FFD93D"));
        assert_eq!(write.avatar.body, AvatarParts::default().body);
        assert_eq!(write.avatar.hands, AvatarParts::default().hands);
    }

    #[tokio::test]
    async fn test_avatar_upsert_is_idempotent() {
        let (db, _temp) = create_test_db().await;
        let session = db.create_session(Duration::hours(1)).await.unwrap();
        let patch = AvatarPatch::part(PartKind::Body, AvatarPart::new(Shape::Cube, "#4ECDC4"));

        let first = db.upsert_avatar(&session.id, None, &patch).await.unwrap();
        let second = db.upsert_avatar(&session.id, None, &patch).await.unwrap();

        assert!(first.changed);
        assert!(!second.changed);
        assert_eq!(first.avatar, second.avatar);
    }

    #[tokio::test]
    async fn test_avatar_updates_in_place() {
        let (db, _temp) = create_test_db().await;
        let session = db.create_session(Duration::hours(1)).await.unwrap();

        let first = db
            .upsert_avatar(
                &session.id,
                None,
                &AvatarPatch::part(PartKind::Head, AvatarPart::new(Shape::Cube, "#111111")),
            )
            .await
            .unwrap();
        let second = db
            .upsert_avatar(
                &session.id,
                None,
                &AvatarPatch::part(PartKind::Hands, AvatarPart::new(Shape::Cylinder, "#222222")),
            )
            .await
            .unwrap();

        assert_eq!(first.avatar.id, second.avatar.id);
        assert_eq!(second.avatar.head, AvatarPart::new(Shape::Cube, "#111111"));
        assert_eq!(second.avatar.hands, AvatarPart::new(Shape::Cylinder, "#222222"));
        assert!(second.avatar.updated_at >= first.avatar.updated_at);
    }

    #[tokio::test]
    async fn test_messages_are_ordered() {
        let (db, _temp) = create_test_db().await;
        let session = db.create_session(Duration::hours(1)).await.unwrap();
        let t0 = Utc::now();

        db.insert_message(&session.id, Sender::User, "first", t0)
            .await
            .unwrap();
        db.insert_message(&session.id, Sender::Agent, "tie", t0)
            .await
            .unwrap();
        db.insert_message(&session.id, Sender::User, "last", t0 + Duration::seconds(1))
            .await
            .unwrap();

        let messages = db.get_messages(&session.id).await.unwrap();
        let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "tie", "last"]);
        assert!(messages
            .windows(2)
            .all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn test_messages_scoped_to_session() {
        let (db, _temp) = create_test_db().await;
        let a = db.create_session(Duration::hours(1)).await.unwrap();
        let b = db.create_session(Duration::hours(1)).await.unwrap();

        db.insert_message(&a.id, Sender::User, "for a", Utc::now())
            .await
            .unwrap();

        assert_eq!(db.get_messages(&a.id).await.unwrap().len(), 1);
        assert!(db.get_messages(&b.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = SessionDb::new("sqlite::memory:").await.unwrap();
        let session = db.create_session(Duration::hours(1)).await.unwrap();
        assert!(db.get_session(&session.id).await.unwrap().is_some());
    }
}
