//! Client-side session store and transports
//!
//! Everything the desktop client needs to talk to the server: the session
//! store and its actor, HTTP and in-process backends, the change-feed
//! subscription, the local chat poller and the speech gate.

pub mod backend;
pub mod chat_log;
pub mod config;
pub mod error;
pub mod handle;
pub mod http;
pub mod local;
pub mod local_link;
pub mod poller;
pub mod speech;
pub mod store;
pub mod subscription;

pub use backend::{EventStream, SessionBackend};
pub use chat_log::ChatLogClient;
pub use config::ClientConfig;
pub use error::ClientError;
pub use handle::{StoreCommand, StoreHandle};
pub use http::HttpBackend;
pub use local::LocalBackend;
pub use local_link::{LinkSnapshot, LocalLink};
pub use poller::{Poller, PollerStats};
pub use speech::{LogSpeaker, SpeechGate, Speaker, SpokenItem};
pub use store::{PartEdit, SessionStore, StoreSnapshot};
pub use subscription::Subscription;
