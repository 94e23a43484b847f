//! Cancellable repeating task with an in-flight guard
//!
//! A tick that fires while the previous one is still running is skipped,
//! not queued.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Counters describing a poller's activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    /// Ticks that started a poll
    pub started: u64,
    /// Ticks skipped because a poll was still in flight
    pub skipped: u64,
}

#[derive(Default)]
struct Counters {
    started: AtomicU64,
    skipped: AtomicU64,
}

// Clears the in-flight flag when the poll ends, including by panic or abort
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handle to a running poller; stops on [`Poller::stop`] or drop
pub struct Poller {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl Poller {
    /// Run `tick` every `period`, starting immediately
    pub fn spawn<F, Fut>(period: Duration, tick: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let counters = Arc::new(Counters::default());
        let task_counters = Arc::clone(&counters);

        let task = tokio::spawn(async move {
            let in_flight = Arc::new(AtomicBool::new(false));
            let mut polls = JoinSet::new();
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    Some(finished) = polls.join_next(), if !polls.is_empty() => {
                        if let Err(e) = finished {
                            if e.is_panic() {
                                warn!("Poll panicked; continuing on next tick");
                            }
                        }
                    }
                    _ = interval.tick() => {
                        if in_flight.swap(true, Ordering::AcqRel) {
                            task_counters.skipped.fetch_add(1, Ordering::Relaxed);
                            continue;
                        }
                        task_counters.started.fetch_add(1, Ordering::Relaxed);

                        let poll = tick();
                        let guard = InFlight(Arc::clone(&in_flight));
                        polls.spawn(async move {
                            let _guard = guard;
                            poll.await;
                        });
                    }
                }
            }

            polls.abort_all();
            debug!("Poller stopped");
        });

        Self {
            stop_tx: Some(stop_tx),
            task: Some(task),
            counters,
        }
    }

    /// Snapshot of the activity counters
    pub fn stats(&self) -> PollerStats {
        PollerStats {
            started: self.counters.started.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
        }
    }

    /// True until stopped
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop ticking and cancel any poll in flight
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}
