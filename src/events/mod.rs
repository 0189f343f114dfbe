//! Topic-scoped event fan-out.
//!
//! Subscribers attach a sink, then subscribe it to topics. Publishing delivers synchronously to
//! every live sink whose topic set matches (or contains [`Topic::Global`]), in publish order per
//! sink. Sinks are held weakly: dropping the last strong reference is enough to stop delivery,
//! and the dead entry is pruned on the next publish that reaches it.

mod sink;
mod topic;

pub use sink::{ChannelSink, EventSink};
pub use topic::{Topic, UnknownTopic};

use crate::models::MonitorEvent;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("subscriber buffer is full")]
    Full,
    #[error("subscriber is closed")]
    Closed,
    #[error("subscriber rejected event: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriberId(u64);

struct Subscription {
    sink: Weak<dyn EventSink>,
    topics: HashSet<Topic>,
}

impl Subscription {
    fn matches(&self, topics: &[Topic]) -> bool {
        self.topics.contains(&Topic::Global) || topics.iter().any(|t| self.topics.contains(t))
    }
}

#[derive(Default)]
pub struct EventHub {
    subscriptions: RwLock<HashMap<SubscriberId, Subscription>>,
    next_id: AtomicU64,
    delivery_failures: AtomicU64,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sink with no topics. The hub keeps only a weak reference.
    pub fn attach(&self, sink: &Arc<dyn EventSink>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.write().insert(
            id,
            Subscription {
                sink: Arc::downgrade(sink),
                topics: HashSet::new(),
            },
        );
        id
    }

    /// Returns false for an unknown (detached) subscriber.
    pub fn subscribe(&self, id: SubscriberId, topics: impl IntoIterator<Item = Topic>) -> bool {
        match self.write().get_mut(&id) {
            Some(sub) => {
                sub.topics.extend(topics);
                true
            }
            None => false,
        }
    }

    pub fn unsubscribe(&self, id: SubscriberId, topics: impl IntoIterator<Item = Topic>) -> bool {
        match self.write().get_mut(&id) {
            Some(sub) => {
                for topic in topics {
                    sub.topics.remove(&topic);
                }
                true
            }
            None => false,
        }
    }

    pub fn detach(&self, id: SubscriberId) -> bool {
        self.write().remove(&id).is_some()
    }

    pub fn topics_of(&self, id: SubscriberId) -> Option<HashSet<Topic>> {
        self.read().get(&id).map(|s| s.topics.clone())
    }

    /// Delivers `event` to subscribers of `topic`; returns how many sinks accepted it.
    pub fn publish(&self, topic: &Topic, event: &MonitorEvent) -> usize {
        self.publish_to(std::slice::from_ref(topic), event)
    }

    /// Delivers once per subscriber even when several of its topics match.
    pub fn publish_to(&self, topics: &[Topic], event: &MonitorEvent) -> usize {
        let mut targets = Vec::new();
        let mut dead = Vec::new();
        {
            let subs = self.read();
            for (id, sub) in subs.iter().filter(|(_, s)| s.matches(topics)) {
                match sub.sink.upgrade() {
                    Some(sink) => targets.push((*id, sink)),
                    None => dead.push(*id),
                }
            }
        }
        if !dead.is_empty() {
            let mut subs = self.write();
            for id in dead {
                if subs.get(&id).is_some_and(|s| s.sink.strong_count() == 0) {
                    subs.remove(&id);
                }
            }
        }

        let mut delivered = 0;
        for (id, sink) in targets {
            match catch_unwind(AssertUnwindSafe(|| sink.deliver(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    self.delivery_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        subscriber = id.0,
                        event = ?event.kind(),
                        error = %e,
                        "event delivery failed"
                    );
                }
                Err(_) => {
                    self.delivery_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        subscriber = id.0,
                        event = ?event.kind(),
                        "subscriber panicked during delivery"
                    );
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.read()
            .values()
            .filter(|s| s.sink.strong_count() > 0)
            .count()
    }

    pub fn delivery_failures(&self) -> u64 {
        self.delivery_failures.load(Ordering::Relaxed)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<SubscriberId, Subscription>> {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<SubscriberId, Subscription>> {
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
