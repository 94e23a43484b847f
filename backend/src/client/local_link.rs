//! Single-user "terminal link" over the local chat log
//!
//! Polls the history once per period, publishes it on a watch channel and
//! speaks new agent entries through a [`Speaker`].

use crate::client::chat_log::ChatLogClient;
use crate::client::error::ClientError;
use crate::client::poller::{Poller, PollerStats};
use crate::client::speech::{SpeechGate, SpokenItem, Speaker};
use crate::session::Sender;
use crate::state::ChatEntry;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

/// What the link currently shows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkSnapshot {
    /// History as of the last successful poll
    pub entries: Vec<ChatEntry>,
    /// Texts handed to the speaker by the most recent poll
    pub spoken: Vec<String>,
    /// Error from the last failed poll or send
    pub error: Option<String>,
}

/// Running local-chat link
pub struct LocalLink {
    client: ChatLogClient,
    snapshots: watch::Receiver<LinkSnapshot>,
    publisher: Arc<watch::Sender<LinkSnapshot>>,
    poller: Poller,
}

impl LocalLink {
    /// Start polling with `period`, speaking through `speaker`
    pub fn start(client: ChatLogClient, period: Duration, speaker: Box<dyn Speaker>) -> Self {
        let (publisher, snapshots) = watch::channel(LinkSnapshot::default());
        let publisher = Arc::new(publisher);
        let gate = Arc::new(Mutex::new((SpeechGate::new(), speaker)));

        let poll_client = client.clone();
        let poll_publisher = Arc::clone(&publisher);
        let poller = Poller::spawn(period, move || {
            let client = poll_client.clone();
            let publisher = Arc::clone(&poll_publisher);
            let gate = Arc::clone(&gate);
            async move {
                match client.history().await {
                    Ok(entries) => {
                        let items: Vec<SpokenItem> = entries.iter().map(SpokenItem::from).collect();
                        let now = chrono::Utc::now().timestamp_millis();
                        let spoken = {
                            let mut guard = gate.lock().unwrap_or_else(PoisonError::into_inner);
                            let (gate, speaker) = &mut *guard;
                            let texts = gate.observe(&items, now);
                            for text in &texts {
                                speaker.speak(text);
                            }
                            texts
                        };
                        publisher.send_modify(|snapshot| {
                            snapshot.entries = entries;
                            snapshot.spoken = spoken;
                            snapshot.error = None;
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "Chat poll failed");
                        publisher.send_modify(|snapshot| snapshot.error = Some(e.to_string()));
                    }
                }
            }
        });

        Self {
            client,
            snapshots,
            publisher,
            poller,
        }
    }

    /// Latest published state
    pub fn snapshot(&self) -> LinkSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every poll
    pub fn watch(&self) -> watch::Receiver<LinkSnapshot> {
        self.snapshots.clone()
    }

    /// Poll counters
    pub fn stats(&self) -> PollerStats {
        self.poller.stats()
    }

    /// Post a user entry; the next poll picks it up
    pub async fn send(&self, text: &str) -> Result<ChatEntry, ClientError> {
        let result = self.client.post(Sender::User, text).await;
        if let Err(e) = &result {
            warn!(error = %e, "Chat send failed");
            self.publisher
                .send_modify(|snapshot| snapshot.error = Some(e.to_string()));
        }
        result
    }

    /// Wipe the history on the server
    pub async fn reset(&self) -> Result<String, ClientError> {
        self.client.reset().await
    }

    /// Stop polling
    pub fn stop(&mut self) {
        self.poller.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[derive(Clone, Default)]
    struct SharedSpeaker(Arc<Mutex<Vec<String>>>);

    impl Speaker for SharedSpeaker {
        fn speak(&mut self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }

    async fn wait_for<F>(rx: &mut watch::Receiver<LinkSnapshot>, mut predicate: F) -> LinkSnapshot
    where
        F: FnMut(&LinkSnapshot) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let snapshot = rx.borrow_and_update().clone();
                if predicate(&snapshot) {
                    return snapshot;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("link never reached the expected state")
    }

    #[tokio::test]
    async fn test_polls_history_and_speaks_once() {
        let now = chrono::Utc::now().timestamp_millis();
        let body = format!(
            r#"[{{"sender":"user","text":"hi","timestamp":{}}},{{"sender":"agent","text":"hello there","timestamp":{}}}]"#,
            now - 20,
            now - 10
        );
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/chat")
            .with_status(200)
            .with_body(body)
            .expect_at_least(2)
            .create_async()
            .await;

        let speaker = SharedSpeaker::default();
        let client = ChatLogClient::new(server.url(), Duration::from_secs(2)).unwrap();
        let mut link = LocalLink::start(client, Duration::from_millis(20), Box::new(speaker.clone()));
        let mut rx = link.watch();

        let first = wait_for(&mut rx, |s| s.entries.len() == 2).await;
        assert_eq!(first.spoken, vec!["hello there"]);
        assert!(first.error.is_none());

        // Later polls see the same history and stay quiet
        wait_for(&mut rx, |s| s.entries.len() == 2 && s.spoken.is_empty()).await;
        assert!(link.stats().started >= 2);
        assert_eq!(*speaker.0.lock().unwrap(), vec!["hello there"]);

        link.stop();
    }

    #[tokio::test]
    async fn test_poll_failure_sets_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/chat")
            .with_status(500)
            .with_body(r#"{"error":"Persistence error: IO Error: denied","status":500}"#)
            .create_async()
            .await;

        let client = ChatLogClient::new(server.url(), Duration::from_secs(2)).unwrap();
        let link = LocalLink::start(client, Duration::from_millis(20), Box::new(crate::client::LogSpeaker));
        let mut rx = link.watch();

        let snapshot = wait_for(&mut rx, |s| s.error.is_some()).await;
        assert!(snapshot.entries.is_empty());
    }
}
