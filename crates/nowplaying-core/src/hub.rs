//! Fan-out of published snapshots to push subscribers.
//!
//! The hub listens on the aggregator's broadcast channel from a single relay
//! task and copies every snapshot into each subscriber's mailbox. Mailboxes
//! are small and drop their oldest entry when full, so a subscriber that
//! stops reading only ever loses stale snapshots and never holds anyone up.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::aggregator::Aggregator;
use crate::config::HubConfig;
use crate::models::CurrentMediaSnapshot;

type Snapshot = Arc<CurrentMediaSnapshot>;

/// Bounded, latest-wins delivery queue owned by one subscriber.
#[derive(Debug)]
struct Mailbox {
    queue: Mutex<MailboxQueue>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
}

#[derive(Debug, Default)]
struct MailboxQueue {
    pending: VecDeque<Snapshot>,
    /// Highest version accepted so far.
    last_version: u64,
}

impl Mailbox {
    fn new(capacity: usize, initial_version: u64) -> Self {
        Self {
            queue: Mutex::new(MailboxQueue {
                pending: VecDeque::with_capacity(capacity),
                last_version: initial_version,
            }),
            capacity,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MailboxQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a snapshot. Returns `false` once the receiving side is gone.
    fn push(&self, snapshot: &Snapshot) -> bool {
        if self.is_closed() {
            return false;
        }
        {
            let mut queue = self.lock();
            if snapshot.version <= queue.last_version {
                return true;
            }
            if queue.pending.len() >= self.capacity {
                queue.pending.pop_front();
            }
            queue.last_version = snapshot.version;
            queue.pending.push_back(Arc::clone(snapshot));
        }
        self.notify.notify_one();
        true
    }

    fn pop(&self) -> Option<Snapshot> {
        self.lock().pending.pop_front()
    }

    fn last_version(&self) -> u64 {
        self.lock().last_version
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// One push-connected client.
///
/// Dropping the handle counts as a disconnect; the hub forgets it on its
/// next delivery.
#[derive(Debug)]
pub struct SubscriberHandle {
    id: u64,
    mailbox: Arc<Mailbox>,
}

impl SubscriberHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Version of the newest snapshot handed to this subscriber.
    pub fn last_version(&self) -> u64 {
        self.mailbox.last_version()
    }

    /// Wait for the next snapshot. `None` once the hub has shut down.
    pub async fn recv(&mut self) -> Option<Snapshot> {
        loop {
            if let Some(snapshot) = self.mailbox.pop() {
                return Some(snapshot);
            }
            if self.mailbox.is_closed() {
                return None;
            }
            self.mailbox.notify.notified().await;
        }
    }

    /// Take a queued snapshot without waiting.
    pub fn try_recv(&mut self) -> Option<Snapshot> {
        self.mailbox.pop()
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        self.mailbox.close();
    }
}

pub struct SubscriptionHub {
    config: HubConfig,
    subscribers: Mutex<HashMap<u64, Arc<Mailbox>>>,
    next_id: AtomicU64,
    aggregator: Arc<Aggregator>,
    closed: AtomicBool,
}

impl SubscriptionHub {
    pub fn new(config: HubConfig, aggregator: Arc<Aggregator>) -> Self {
        Self {
            config,
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            aggregator,
            closed: AtomicBool::new(false),
        }
    }

    /// Spawn the relay task that forwards aggregator publishes to subscribers.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        let mut changes = self.aggregator.subscribe_changes();

        tokio::spawn(async move {
            debug!("Subscription relay started");
            loop {
                let snapshot = tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = changes.recv() => match received {
                        Ok(snapshot) => snapshot,
                        Err(RecvError::Lagged(skipped)) => {
                            // Intermediate versions are allowed to be skipped;
                            // jump straight to the latest.
                            debug!(skipped, "Relay lagged behind aggregator");
                            hub.aggregator.current_snapshot()
                        }
                        Err(RecvError::Closed) => break,
                    },
                };
                hub.deliver(&snapshot);
            }
            hub.close();
            debug!("Subscription relay stopped");
        })
    }

    /// Register a new subscriber and hand back the current snapshot so the
    /// client does not have to wait for the next change.
    pub fn subscribe(&self) -> (SubscriberHandle, Snapshot) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self.lock();

        // Read under the subscriber lock so the relay cannot deliver a
        // publish between the read and the registration.
        let current = self.aggregator.current_snapshot();
        let mailbox = Arc::new(Mailbox::new(self.config.queue_capacity.max(1), current.version));
        if self.closed.load(Ordering::Acquire) {
            mailbox.close();
        } else {
            subscribers.insert(id, Arc::clone(&mailbox));
        }
        drop(subscribers);

        debug!(id, version = current.version, "Subscriber connected");
        (SubscriberHandle { id, mailbox }, current)
    }

    pub fn unsubscribe(&self, handle: SubscriberHandle) {
        if self.lock().remove(&handle.id).is_some() {
            debug!(id = handle.id, "Subscriber disconnected");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Disconnect everyone. Pending `recv` calls return `None`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let subscribers: Vec<Arc<Mailbox>> = self.lock().drain().map(|(_, m)| m).collect();
        for mailbox in &subscribers {
            mailbox.close();
        }
        info!(dropped = subscribers.len(), "Subscription hub closed");
    }

    fn deliver(&self, snapshot: &Snapshot) {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|_, mailbox| mailbox.push(snapshot));
        let removed = before - subscribers.len();
        if removed > 0 {
            debug!(removed, "Pruned closed subscribers");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Arc<Mailbox>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
