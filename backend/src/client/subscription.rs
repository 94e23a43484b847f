//! Cancellable change-feed subscription

use crate::client::backend::EventStream;
use crate::session::ChangeEvent;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle to a running change-feed listener
///
/// The listener forwards every event of one session to a callback until
/// the stream ends or the subscription is cancelled. Cancelling is
/// idempotent and also happens on drop.
#[derive(Debug)]
pub struct Subscription {
    session_id: String,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Spawn a listener on the current tokio runtime
    ///
    /// Events for other sessions are dropped before reaching `on_event`.
    pub fn spawn<F>(session_id: impl Into<String>, mut events: EventStream, mut on_event: F) -> Self
    where
        F: FnMut(ChangeEvent) + Send + 'static,
    {
        let session_id = session_id.into();
        let filter_id = session_id.clone();

        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.session_id() == filter_id {
                    on_event(event);
                }
            }
            debug!(session_id = %filter_id, "Change feed ended");
        });

        Self {
            session_id,
            task: Some(task),
        }
    }

    /// Session this subscription follows
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// True until cancelled or the stream ends
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the listener; returns false if it was already cancelled
    pub fn cancel(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                debug!(session_id = %self.session_id, "Subscription cancelled");
                true
            }
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
