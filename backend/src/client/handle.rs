//! Store actor
//!
//! Runs a [`SessionStore`] on its own tokio task. Callers send
//! [`StoreCommand`]s and read [`StoreSnapshot`]s from a watch channel, so
//! the store has exactly one owner and needs no locks.

use crate::client::backend::SessionBackend;
use crate::client::store::{PartEdit, SessionStore, StoreSnapshot};
use crate::session::{AvatarPatch, PartKind, Sender};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// Actions the UI can request
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCommand {
    /// Create a new session
    CreateSession,
    /// Join by pairing code
    Join(String),
    /// Send a message as `sender`
    SendMessage {
        /// Message author
        sender: Sender,
        /// Message body
        text: String,
    },
    /// Merge a patch into the avatar
    UpdateAvatar(AvatarPatch),
    /// Change one field of one part
    UpdatePart {
        /// Part to change
        kind: PartKind,
        /// New shape or color
        edit: PartEdit,
    },
    /// Leave the active session
    Leave,
    /// Dismiss the current error
    ClearError,
}

impl StoreCommand {
    fn shows_loading(&self) -> bool {
        matches!(self, StoreCommand::CreateSession | StoreCommand::Join(_))
    }
}

/// Handle to a running store actor
pub struct StoreHandle {
    commands: mpsc::UnboundedSender<StoreCommand>,
    snapshots: watch::Receiver<StoreSnapshot>,
    task: JoinHandle<()>,
}

impl StoreHandle {
    /// Spawn the actor on the current tokio runtime
    pub fn spawn(backend: Arc<dyn SessionBackend>) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(StoreSnapshot::default());
        let task = tokio::spawn(run(SessionStore::new(backend), command_rx, snapshot_tx));
        Self {
            commands,
            snapshots,
            task,
        }
    }

    /// Queue a command; returns false if the actor has stopped
    pub fn send(&self, command: StoreCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Latest published state
    pub fn snapshot(&self) -> StoreSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver that is notified on every published state
    pub fn watch(&self) -> watch::Receiver<StoreSnapshot> {
        self.snapshots.clone()
    }

    /// Stop the actor, cancelling its subscription
    pub fn shutdown(self) {
        self.task.abort();
    }
}

async fn run(
    mut store: SessionStore,
    mut commands: mpsc::UnboundedReceiver<StoreCommand>,
    snapshots: watch::Sender<StoreSnapshot>,
) {
    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                if command.shows_loading() {
                    store.begin_loading();
                    snapshots.send_replace(store.snapshot());
                }
                execute(&mut store, command).await;
            }
            Some(event) = store.next_event() => {
                store.apply_event(event);
            }
        }
        snapshots.send_replace(store.snapshot());
    }

    store.leave_session();
    debug!("Store actor stopped");
}

// Failures are already recorded in the store's error field
async fn execute(store: &mut SessionStore, command: StoreCommand) {
    match command {
        StoreCommand::CreateSession => {
            let _ = store.create_session().await;
        }
        StoreCommand::Join(code) => {
            let _ = store.connect_with_code(&code).await;
        }
        StoreCommand::SendMessage { sender, text } => {
            let _ = store.send_message(&text, sender).await;
        }
        StoreCommand::UpdateAvatar(patch) => {
            let _ = store.update_avatar(patch).await;
        }
        StoreCommand::UpdatePart { kind, edit } => {
            let _ = store.update_part(kind, edit).await;
        }
        StoreCommand::Leave => store.leave_session(),
        StoreCommand::ClearError => store.clear_error(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::local::LocalBackend;
    use crate::session::{ChangeFeed, SessionDb, SessionService, Shape};
    use std::time::Duration;

    async fn service() -> SessionService {
        let db = SessionDb::new("sqlite::memory:").await.unwrap();
        SessionService::new(db, Arc::new(ChangeFeed::default()), chrono::Duration::hours(24))
    }

    async fn wait_for<F>(rx: &mut watch::Receiver<StoreSnapshot>, predicate: F) -> StoreSnapshot
    where
        F: Fn(&StoreSnapshot) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let snapshot = rx.borrow_and_update().clone();
                if predicate(&snapshot) {
                    return snapshot;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("timed out waiting for snapshot")
    }

    #[tokio::test]
    async fn test_create_and_receive_agent_message() {
        let service = service().await;
        let handle = StoreHandle::spawn(Arc::new(LocalBackend::new(service.clone())));
        let mut rx = handle.watch();

        assert!(handle.send(StoreCommand::CreateSession));
        let snapshot = wait_for(&mut rx, |s| s.session.is_some()).await;
        let session = snapshot.session.unwrap();

        service
            .send_message(&session.id, Sender::Agent, "hello there")
            .await
            .unwrap();

        let snapshot = wait_for(&mut rx, |s| !s.messages.is_empty()).await;
        assert_eq!(snapshot.messages[0].text, "hello there");
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_failed_join_surfaces_error() {
        let service = service().await;
        let handle = StoreHandle::spawn(Arc::new(LocalBackend::new(service)));
        let mut rx = handle.watch();

        handle.send(StoreCommand::Join("NOPE-NOPE-0000".to_string()));
        let snapshot = wait_for(&mut rx, |s| s.error.is_some()).await;
        assert_eq!(snapshot.error.as_deref(), Some("Invalid pairing code"));
        assert!(snapshot.session.is_none());
        assert!(!snapshot.is_loading);

        handle.send(StoreCommand::ClearError);
        wait_for(&mut rx, |s| s.error.is_none()).await;
    }

    #[tokio::test]
    async fn test_update_part_command() {
        let service = service().await;
        let handle = StoreHandle::spawn(Arc::new(LocalBackend::new(service)));
        let mut rx = handle.watch();

        handle.send(StoreCommand::CreateSession);
        handle.send(StoreCommand::UpdatePart {
            kind: PartKind::Body,
            edit: PartEdit::Shape(Shape::Cube),
        });

        let snapshot = wait_for(&mut rx, |s| s.avatar.is_some()).await;
        assert_eq!(snapshot.avatar.unwrap().body.shape, Shape::Cube);
    }
}
