// Live event stream handed to callers of the facade

use super::Inner;
use super::poll::PollKey;
use crate::events::{EventHub, EventSink, SubscriberId, Topic};
use crate::models::MonitorEvent;
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Keeps a per-container poll task alive while the stream is open.
pub(super) struct StreamLease {
    pub(super) inner: Weak<Inner>,
    pub(super) key: PollKey,
    pub(super) epoch: u64,
}

impl StreamLease {
    async fn release(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.release_watcher(&self.key, self.epoch).await;
        }
    }
}

/// Events for one subscription. Ends after the backing task reports its container gone.
/// `close` (or dropping the stream) unsubscribes and, for the last stream on a container,
/// stops the backing poll task.
pub struct EventStream {
    rx: mpsc::Receiver<MonitorEvent>,
    // The hub holds sinks weakly; this is the strong reference.
    _sink: Arc<dyn EventSink>,
    subscriber: SubscriberId,
    hub: Arc<EventHub>,
    lease: Option<StreamLease>,
    done: bool,
}

impl EventStream {
    pub(super) fn new(
        rx: mpsc::Receiver<MonitorEvent>,
        sink: Arc<dyn EventSink>,
        subscriber: SubscriberId,
        hub: Arc<EventHub>,
        lease: Option<StreamLease>,
    ) -> Self {
        Self {
            rx,
            _sink: sink,
            subscriber,
            hub,
            lease,
            done: false,
        }
    }

    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber
    }

    /// The poll task this stream keeps alive, if any.
    pub fn task(&self) -> Option<&PollKey> {
        self.lease.as_ref().map(|l| &l.key)
    }

    pub fn subscribe(&self, topics: impl IntoIterator<Item = Topic>) -> bool {
        self.hub.subscribe(self.subscriber, topics)
    }

    pub fn unsubscribe(&self, topics: impl IntoIterator<Item = Topic>) -> bool {
        self.hub.unsubscribe(self.subscriber, topics)
    }

    pub async fn recv(&mut self) -> Option<MonitorEvent> {
        self.next().await
    }

    /// Unsubscribes and waits until the backing task (if this was its last stream) has stopped.
    pub async fn close(mut self) {
        self.hub.detach(self.subscriber);
        if let Some(lease) = self.lease.take() {
            lease.release().await;
        }
    }
}

impl Stream for EventStream {
    type Item = MonitorEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        let polled = this.rx.poll_recv(cx);
        if let Poll::Ready(Some(event)) = &polled
            && let Some(lease) = &this.lease
            && let Some(id) = lease.key.resource_id.as_deref()
            && event.is_terminal_for(lease.key.kind, id)
        {
            this.done = true;
        }
        polled
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.hub.detach(self.subscriber);
        if let Some(lease) = self.lease.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(lease.release());
                }
                Err(_) => {
                    tracing::debug!(task = %lease.key, "stream dropped outside a runtime; task left running");
                }
            }
        }
    }
}
