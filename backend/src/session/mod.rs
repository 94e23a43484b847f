//! Session backend
//!
//! Sessions, avatars and messages stored in SQLite, with a per-session
//! change feed.

pub mod db;
pub mod feed;
pub mod models;
pub mod pairing;
pub mod service;

pub use db::SessionDb;
pub use feed::{ChangeEvent, ChangeFeed};
pub use models::{
    Avatar, AvatarPart, AvatarParts, AvatarPatch, JoinedSession, Message, PartKind, Sender,
    Session, Shape,
};
pub use service::SessionService;
