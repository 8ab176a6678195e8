//! The event hub: receives events from one adaptor and fans them out to the rest.
//!
//! Inbound methods run synchronously on the caller's task and only enqueue
//! work, so they are safe to call concurrently from every adaptor. The
//! registration set is fixed once the hub is built.
//!
//! Chat routing has exactly one platform-specific rule. When chat comes from
//! the proxy platform, the proxy adaptor is itself a target: with takeover
//! mode off it relays to every sub-server except the origin one (which
//! already shows the message natively), with takeover mode on it relays to
//! every sub-server (native delivery was denied). Any other origin adaptor is
//! never a target of its own events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::common::{MessageEvent, Platform, ServerChangeEvent, ServerChangeKind};
use crate::config::types::DEFAULT_QUEUE_CAPACITY;
use crate::config::{Policy, PolicySnapshot};
use crate::hub::adaptor::{ChatLine, ServerScope, SharedAdaptor};
use crate::hub::queue::{AdaptorQueue, RelayJob};

/// A registered adaptor and its relay queue.
struct Registration {
    adaptor: SharedAdaptor,
    queue: AdaptorQueue,
}

/// Builder for [`EventHub`].
pub struct EventHubBuilder {
    policy: Arc<Policy>,
    queue_capacity: usize,
    adaptors: Vec<SharedAdaptor>,
}

impl EventHubBuilder {
    /// Capacity of each adaptor's relay queue.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Register an adaptor. A second adaptor for the same platform is ignored.
    pub fn register(mut self, adaptor: SharedAdaptor) -> Self {
        let platform = adaptor.platform();
        if self.adaptors.iter().any(|a| a.platform() == platform) {
            warn!(%platform, "Adaptor already registered, ignoring duplicate");
            return self;
        }
        self.adaptors.push(adaptor);
        self
    }

    pub fn register_all(self, adaptors: impl IntoIterator<Item = SharedAdaptor>) -> Self {
        adaptors.into_iter().fold(self, Self::register)
    }

    /// Build the hub and spawn one delivery worker per adaptor.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Arc<EventHub> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut workers = Vec::with_capacity(self.adaptors.len());

        let registrations = self
            .adaptors
            .into_iter()
            .map(|adaptor| {
                let (queue, worker) =
                    AdaptorQueue::spawn(Arc::clone(&adaptor), self.queue_capacity, shutdown_rx.clone());
                workers.push(worker);
                Registration { adaptor, queue }
            })
            .collect();

        Arc::new(EventHub {
            policy: self.policy,
            registrations,
            started: AtomicBool::new(false),
            shutdown_tx,
            workers: Mutex::new(workers),
        })
    }
}

/// The dispatcher between platform adaptors.
pub struct EventHub {
    policy: Arc<Policy>,
    registrations: Vec<Registration>,
    started: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl EventHub {
    pub fn builder(policy: Arc<Policy>) -> EventHubBuilder {
        EventHubBuilder {
            policy,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            adaptors: Vec::new(),
        }
    }

    /// Platforms whose adaptor is registered and accepting relays.
    pub fn running_platforms(&self) -> Vec<Platform> {
        self.registrations
            .iter()
            .filter(|r| r.queue.is_running())
            .map(|r| r.queue.platform())
            .collect()
    }

    /// Start every registered adaptor.
    ///
    /// An adaptor that fails to start is stopped and its platform disabled
    /// in the policy; the others keep running.
    pub async fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("Event hub already started");
            return;
        }

        for registration in &self.registrations {
            let platform = registration.queue.platform();
            match registration.adaptor.start(Arc::clone(self)).await {
                Ok(()) => info!(%platform, "Adaptor started"),
                Err(e) => {
                    error!(%platform, "Adaptor failed to start, disabling platform: {}", e);
                    registration.queue.stop();
                    self.policy.set_platform_enabled(platform, false);
                }
            }
        }
    }

    /// Stop every adaptor after delivering what is already queued.
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send(true).is_err() {
            debug!("All relay workers already gone");
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                warn!("Relay worker panicked: {}", e);
            }
        }

        for registration in &self.registrations {
            let dropped = registration.queue.dropped();
            if dropped > 0 {
                warn!(platform = %registration.queue.platform(), dropped, "Relays dropped while running");
            }
            registration.adaptor.shutdown().await;
        }
        info!("Event hub stopped");
    }

    /// Relay a chat message, line by line.
    pub fn on_user_chat(&self, event: MessageEvent) {
        self.on_user_chat_with(event, &self.policy.snapshot());
    }

    /// Relay a chat message under a policy snapshot the caller already holds.
    ///
    /// Adaptors that make their own decision about the same message (such
    /// as the native chat verdict) pass the snapshot they decided with.
    pub fn on_user_chat_with(&self, event: MessageEvent, policy: &PolicySnapshot) {
        let origin = event.platform;

        for line in event.lines() {
            if policy.is_ignored(line) {
                debug!(platform = %origin, "Ignored chat line: {}", line);
                continue;
            }

            for registration in &self.registrations {
                let target = registration.queue.platform();
                let scope = if target != origin {
                    ServerScope::All
                } else if origin.is_proxy() {
                    if policy.is_complete_takeover() {
                        ServerScope::All
                    } else {
                        ServerScope::AllExcept(event.server.clone())
                    }
                } else {
                    continue;
                };

                registration.queue.enqueue(RelayJob::Chat(ChatLine {
                    platform: origin,
                    server: event.server.clone(),
                    user: event.user.clone(),
                    text: line.to_string(),
                    scope,
                }));
            }
        }
    }

    pub fn on_join_server(&self, event: ServerChangeEvent) {
        self.relay_server_change(event);
    }

    pub fn on_leave_server(&self, event: ServerChangeEvent) {
        self.relay_server_change(event);
    }

    pub fn on_switch_server(&self, event: ServerChangeEvent) {
        self.relay_server_change(event);
    }

    /// Relay a presence change to every adaptor except its origin.
    ///
    /// Presence bypasses the ignore filter and takeover mode.
    fn relay_server_change(&self, event: ServerChangeEvent) {
        let origin = event.platform;
        let kind = event.kind;
        let event = Arc::new(event);

        for registration in &self.registrations {
            if registration.queue.platform() == origin {
                continue;
            }
            let job = match kind {
                ServerChangeKind::Join => RelayJob::Join(Arc::clone(&event)),
                ServerChangeKind::Leave => RelayJob::Leave(Arc::clone(&event)),
                ServerChangeKind::Switch => RelayJob::Switch(Arc::clone(&event)),
            };
            registration.queue.enqueue(job);
        }
    }
}
