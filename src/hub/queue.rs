//! Per-adaptor relay queues.
//!
//! The hub never calls an adaptor inline. Each registered adaptor gets a
//! bounded queue drained by a single worker task, so a slow transport only
//! backs up its own queue and lines reach an adaptor in the order they were
//! enqueued.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::common::{Platform, ServerChangeEvent};
use crate::hub::adaptor::{ChatLine, SharedAdaptor};

/// Work item for an adaptor's delivery worker.
#[derive(Debug, Clone)]
pub enum RelayJob {
    Chat(ChatLine),
    Join(Arc<ServerChangeEvent>),
    Leave(Arc<ServerChangeEvent>),
    Switch(Arc<ServerChangeEvent>),
}

/// Sending half of an adaptor's queue.
#[derive(Debug)]
pub struct AdaptorQueue {
    platform: Platform,
    tx: mpsc::Sender<RelayJob>,
    running: AtomicBool,
    dropped: AtomicU64,
}

impl AdaptorQueue {
    /// Create the queue and spawn its worker.
    ///
    /// The worker exits once `shutdown_rx` flips, after delivering what was
    /// already queued.
    pub fn spawn(
        adaptor: SharedAdaptor,
        capacity: usize,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Self, JoinHandle<()>) {
        let platform = adaptor.platform();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(adaptor, rx, shutdown_rx));

        let queue = Self {
            platform,
            tx,
            running: AtomicBool::new(true),
            dropped: AtomicU64::new(0),
        };
        (queue, worker)
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Whether relays are still accepted for this adaptor.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop accepting relays, e.g. after the adaptor failed to start.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Number of jobs dropped because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Enqueue a job without waiting. Returns `false` if it was dropped.
    pub fn enqueue(&self, job: RelayJob) -> bool {
        if !self.is_running() {
            debug!(platform = %self.platform, "Adaptor stopped, dropping relay");
            return false;
        }

        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    platform = %self.platform,
                    "Relay queue full, dropping {:?}",
                    job
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(platform = %self.platform, "Relay queue closed, dropping relay");
                false
            }
        }
    }
}

async fn run_worker(
    adaptor: SharedAdaptor,
    mut rx: mpsc::Receiver<RelayJob>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let platform = adaptor.platform();

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => {
                // Deliver whatever is already queued, then stop.
                rx.close();
                while let Some(job) = rx.recv().await {
                    deliver(&adaptor, job).await;
                }
                break;
            }

            job = rx.recv() => match job {
                Some(job) => deliver(&adaptor, job).await,
                None => break,
            },
        }
    }

    debug!(%platform, "Relay worker ended");
}

async fn deliver(adaptor: &SharedAdaptor, job: RelayJob) {
    match job {
        RelayJob::Chat(line) => adaptor.on_user_chat(&line).await,
        RelayJob::Join(event) => adaptor.on_join_server(&event).await,
        RelayJob::Leave(event) => adaptor.on_leave_server(&event).await,
        RelayJob::Switch(event) => adaptor.on_switch_server(&event).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::testing::{Recorder, Relay};
    use crate::hub::ServerScope;

    fn line(text: &str) -> ChatLine {
        ChatLine {
            platform: Platform::Minecraft,
            server: "lobby".to_string(),
            user: "Steve".to_string(),
            text: text.to_string(),
            scope: ServerScope::All,
        }
    }

    fn job(text: &str) -> RelayJob {
        RelayJob::Chat(line(text))
    }

    #[tokio::test]
    async fn test_jobs_delivered_in_order() {
        let recorder = Recorder::new(Platform::Discord);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (queue, worker) = AdaptorQueue::spawn(recorder.clone(), 8, shutdown_rx);

        for text in ["one", "two", "three"] {
            assert!(queue.enqueue(job(text)));
        }
        shutdown_tx.send(true).unwrap();
        worker.await.unwrap();

        assert_eq!(
            recorder.relays(),
            vec![
                Relay::Chat(line("one")),
                Relay::Chat(line("two")),
                Relay::Chat(line("three")),
            ]
        );
    }

    #[tokio::test]
    async fn test_stopped_queue_drops() {
        let recorder = Recorder::new(Platform::Discord);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (queue, worker) = AdaptorQueue::spawn(recorder.clone(), 8, shutdown_rx);

        queue.stop();
        assert!(!queue.enqueue(job("lost")));

        shutdown_tx.send(true).unwrap();
        worker.await.unwrap();
        assert!(recorder.relays().is_empty());
    }

    #[tokio::test]
    async fn test_closed_queue_counts_drops() {
        let recorder = Recorder::new(Platform::Discord);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (queue, worker) = AdaptorQueue::spawn(recorder.clone(), 8, shutdown_rx);

        shutdown_tx.send(true).unwrap();
        worker.await.unwrap();

        assert!(!queue.enqueue(job("late")));
        assert_eq!(queue.dropped(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_full_queue_drops_without_blocking() {
        let recorder = Recorder::new(Platform::Discord);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (queue, worker) = AdaptorQueue::spawn(recorder.clone(), 1, shutdown_rx);

        // The worker cannot run until this task yields, so the second job overflows.
        assert!(queue.enqueue(job("first")));
        assert!(!queue.enqueue(job("second")));
        assert_eq!(queue.dropped(), 1);

        shutdown_tx.send(true).unwrap();
        worker.await.unwrap();
        assert_eq!(recorder.relays(), vec![Relay::Chat(line("first"))]);
    }
}
