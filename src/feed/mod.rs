// src/feed/mod.rs

//! Change feeds: subscriptions to "the observed subtree changed" events.
//!
//! A document owns one [`FeedRegistry`]. Every mutation is published to the
//! registry, which forwards a [`MutationRecord`] to each subscriber whose root
//! contains the mutated node. Delivery is asynchronous: records are queued on
//! an unbounded channel and picked up by the watcher's task on its next poll,
//! where everything already queued is coalesced into one batch.
//!
//! Unsubscribing removes the sender from the registry, is idempotent, and can
//! be done from anywhere (including while a batch is being handled). Records
//! queued before the unsubscribe may still be drained by the receiver; callers
//! decide whether to look at them.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::debug;

use crate::dom::{MutationRecord, NodeId};

/// Identifier of a single subscription within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedId(u64);

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "feed-{}", self.0)
    }
}

#[derive(Debug)]
struct Subscriber {
    root: NodeId,
    tx: mpsc::UnboundedSender<MutationRecord>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: u64,
    subscribers: HashMap<FeedId, Subscriber>,
}

/// All live subscriptions of one document.
#[derive(Debug, Default)]
pub struct FeedRegistry {
    inner: Mutex<RegistryInner>,
}

impl FeedRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start observing the subtree rooted at `root`.
    pub fn subscribe(self: &Arc<Self>, root: NodeId) -> ChangeFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.lock();
            inner.next_id += 1;
            let id = FeedId(inner.next_id);
            inner.subscribers.insert(id, Subscriber { root, tx });
            id
        };
        debug!(%id, ?root, "change feed subscribed");

        ChangeFeed {
            registration: FeedRegistration {
                id,
                registry: Arc::downgrade(self),
                active: AtomicBool::new(true),
            },
            receiver: FeedReceiver { rx },
        }
    }

    /// Forward `record` to every subscriber whose root contains the mutated
    /// node. `contains(root, node)` answers the ancestry question against the
    /// document tree.
    pub fn publish(&self, record: &MutationRecord, contains: impl Fn(NodeId, NodeId) -> bool) {
        let inner = self.lock();
        for sub in inner.subscribers.values() {
            if record.is_global() || contains(sub.root, record.target) {
                // A closed receiver just means the watcher task already exited;
                // its registration is dropped right after.
                let _ = sub.tx.send(record.clone());
            }
        }
    }

    /// Number of subscriptions that have not been released.
    pub fn live_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn unsubscribe(&self, id: FeedId) -> bool {
        self.lock().subscribers.remove(&id).is_some()
    }
}

/// A freshly created subscription: the registration (which controls the
/// subscription's lifetime) plus the receiving end of its notifications.
#[derive(Debug)]
pub struct ChangeFeed {
    registration: FeedRegistration,
    receiver: FeedReceiver,
}

impl ChangeFeed {
    pub fn id(&self) -> FeedId {
        self.registration.id
    }

    /// Split so the registration can be released synchronously by one owner
    /// while another awaits notifications.
    pub fn into_parts(self) -> (FeedRegistration, FeedReceiver) {
        (self.registration, self.receiver)
    }
}

/// Keeps a subscription alive; releasing it (explicitly or by drop) closes the
/// notification channel once queued records are drained.
pub struct FeedRegistration {
    id: FeedId,
    registry: Weak<FeedRegistry>,
    active: AtomicBool,
}

impl FeedRegistration {
    pub fn id(&self) -> FeedId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Release the subscription. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            if registry.unsubscribe(self.id) {
                debug!(id = %self.id, "change feed unsubscribed");
            }
        }
    }
}

impl fmt::Debug for FeedRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedRegistration")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for FeedRegistration {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Receiving end of a change feed.
#[derive(Debug)]
pub struct FeedReceiver {
    rx: mpsc::UnboundedReceiver<MutationRecord>,
}

impl FeedReceiver {
    /// Wait for the next notification and coalesce everything queued behind
    /// it into one batch. Returns `None` once the subscription is released
    /// and the queue is empty.
    pub async fn next_batch(&mut self) -> Option<Vec<MutationRecord>> {
        let first = self.rx.recv().await?;
        let mut batch = vec![first];
        while let Ok(record) = self.rx.try_recv() {
            batch.push(record);
        }
        Some(batch)
    }
}
