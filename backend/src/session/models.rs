//! Session data models
//!
//! Defines sessions, avatars and messages as stored in SQLite and exchanged
//! over the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Who sent a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Sender {
    /// Message from the human user
    User,
    /// Message from the paired agent
    Agent,
}

impl Sender {
    /// Convert the sender to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Agent => "agent",
        }
    }

    /// Parse a sender, rejecting anything other than `user` or `agent`
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Sender::User),
            "agent" => Some(Sender::Agent),
            _ => None,
        }
    }
}

/// Shape of an avatar part
///
/// Unknown shape names deserialize to [`Shape::Sphere`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Shape {
    /// Round part (default)
    #[default]
    Sphere,
    /// Box-shaped part
    Cube,
    /// Upright cylinder
    Cylinder,
}

impl Shape {
    /// Every selectable shape, in editor order
    pub const ALL: [Shape; 3] = [Shape::Sphere, Shape::Cube, Shape::Cylinder];

    /// Convert the shape to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Shape::Sphere => "sphere",
            Shape::Cube => "cube",
            Shape::Cylinder => "cylinder",
        }
    }
}

impl From<&str> for Shape {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "cube" => Shape::Cube,
            "cylinder" => Shape::Cylinder,
            _ => Shape::Sphere,
        }
    }
}

impl From<String> for Shape {
    fn from(s: String) -> Self {
        Shape::from(s.as_str())
    }
}

/// One of the three customizable avatar parts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartKind {
    /// The head
    Head,
    /// The torso
    Body,
    /// Both hands (always share a shape and color)
    Hands,
}

impl PartKind {
    /// Every part, in editor order
    pub const ALL: [PartKind; 3] = [PartKind::Head, PartKind::Body, PartKind::Hands];

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            PartKind::Head => "Head",
            PartKind::Body => "Body",
            PartKind::Hands => "Hands",
        }
    }
}

/// Shape and color of a single avatar part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarPart {
    /// Primitive shape used to draw the part
    pub shape: Shape,
    /// Color as a `#RRGGBB` string
    pub color: String,
}

impl AvatarPart {
    /// Create a part from a shape and a color string
    pub fn new(shape: Shape, color: impl Into<String>) -> Self {
        Self {
            shape,
            color: color.into(),
        }
    }
}

/// A pairing session between one user and at most one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Session {
    /// Unique identifier for the session
    pub id: String,
    /// Human-readable code used to join the session
    pub pairing_code: String,
    /// Name reported by the agent when it paired
    pub agent_name: Option<String>,
    /// Whether an agent has paired with this session
    pub agent_connected: bool,
    /// Whether the user side is connected
    pub user_connected: bool,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// Last time anything happened in the session
    pub last_activity: DateTime<Utc>,
    /// Advisory expiry; stored but not enforced
    pub expires_at: DateTime<Utc>,
}

/// Partial avatar update; `None` parts are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarPatch {
    /// New head, if changing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<AvatarPart>,
    /// New body, if changing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<AvatarPart>,
    /// New hands, if changing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hands: Option<AvatarPart>,
}

impl AvatarPatch {
    /// Patch that changes a single part
    pub fn part(kind: PartKind, part: AvatarPart) -> Self {
        let mut patch = Self::default();
        match kind {
            PartKind::Head => patch.head = Some(part),
            PartKind::Body => patch.body = Some(part),
            PartKind::Hands => patch.hands = Some(part),
        }
        patch
    }

    /// True when the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self.head.is_none() && self.body.is_none() && self.hands.is_none()
    }
}

/// The three parts of an avatar, without row metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarParts {
    /// Head part
    pub head: AvatarPart,
    /// Body part
    pub body: AvatarPart,
    /// Hands part
    pub hands: AvatarPart,
}

impl Default for AvatarParts {
    fn default() -> Self {
        Self {
            head: AvatarPart::new(Shape::Sphere, "#FF69B4"),
            body: AvatarPart::new(Shape::Cylinder, "#FFA500"),
            hands: AvatarPart::new(Shape::Sphere, "#FF69B4"),
        }
    }
}

impl AvatarParts {
    /// Merge a patch into these parts, returning the result
    pub fn merged(&self, patch: &AvatarPatch) -> Self {
        Self {
            head: patch.head.clone().unwrap_or_else(|| self.head.clone()),
            body: patch.body.clone().unwrap_or_else(|| self.body.clone()),
            hands: patch.hands.clone().unwrap_or_else(|| self.hands.clone()),
        }
    }

    /// Get a part by kind
    pub fn get(&self, kind: PartKind) -> &AvatarPart {
        match kind {
            PartKind::Head => &self.head,
            PartKind::Body => &self.body,
            PartKind::Hands => &self.hands,
        }
    }
}

/// A session's avatar (one per session, updated in place)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Avatar {
    /// Unique identifier for the avatar row
    pub id: String,
    /// Session this avatar belongs to
    pub session_id: String,
    /// Agent name copied from the session when known
    pub agent_name: Option<String>,
    /// Head part
    #[sqlx(json)]
    pub head: AvatarPart,
    /// Body part
    #[sqlx(json)]
    pub body: AvatarPart,
    /// Hands part
    #[sqlx(json)]
    pub hands: AvatarPart,
    /// When the avatar was first created
    pub created_at: DateTime<Utc>,
    /// When the avatar was last changed
    pub updated_at: DateTime<Utc>,
}

impl Avatar {
    /// The avatar's parts without row metadata
    pub fn parts(&self) -> AvatarParts {
        AvatarParts {
            head: self.head.clone(),
            body: self.body.clone(),
            hands: self.hands.clone(),
        }
    }
}

/// A single chat message in a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Message {
    /// Unique identifier for the message
    pub id: String,
    /// Session this message belongs to
    pub session_id: String,
    /// Who sent the message
    pub sender: Sender,
    /// Message body
    pub text: String,
    /// Server-assigned creation time
    pub created_at: DateTime<Utc>,
}

/// Everything a client needs after joining a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedSession {
    /// The session itself
    pub session: Session,
    /// The session's avatar, if one has been created
    pub avatar: Option<Avatar>,
    /// Full message history, oldest first
    pub messages: Vec<Message>,
}
