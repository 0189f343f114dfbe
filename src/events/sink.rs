// Event sinks: the receiving end of a subscription

use super::DeliveryError;
use crate::models::MonitorEvent;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Receives events synchronously from the hub. Must not block.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: &MonitorEvent) -> Result<(), DeliveryError>;
}

/// Forwards events into a bounded channel. A full buffer drops the event for this sink only.
pub struct ChannelSink {
    tx: mpsc::Sender<MonitorEvent>,
}

impl ChannelSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<MonitorEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn deliver(&self, event: &MonitorEvent) -> Result<(), DeliveryError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

impl<F> EventSink for F
where
    F: Fn(&MonitorEvent) -> Result<(), DeliveryError> + Send + Sync,
{
    fn deliver(&self, event: &MonitorEvent) -> Result<(), DeliveryError> {
        self(event)
    }
}
