//! Listener channels for long-poll clients connected to this node.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::Permit;

use crate::event::NotificationEvent;

/// Sending half registered for a topic ARN.
pub type ListenerChan = mpsc::Sender<Vec<NotificationEvent>>;

/// Receiving half held by the connection that opened the listener.
pub type ListenerReceiver = mpsc::Receiver<Vec<NotificationEvent>>;

/// Creates a bounded listener channel.
pub fn listener_channel(capacity: usize) -> (ListenerChan, ListenerReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Outcome of a bounded send to a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerSend {
    Delivered,
    /// Receiver is gone; the connection has closed.
    Closed,
    /// Buffer stayed full for the whole timeout; the events were dropped.
    TimedOut,
    /// The channel was removed from the registry before the send.
    Unregistered,
}

/// Waits up to `timeout` for buffer space in `chan`.
pub async fn reserve_bounded(
    chan: &ListenerChan,
    timeout: Duration,
) -> Result<Permit<'_, Vec<NotificationEvent>>, ListenerSend> {
    match tokio::time::timeout(timeout, chan.reserve()).await {
        Ok(Ok(permit)) => Ok(permit),
        Ok(Err(_)) => Err(ListenerSend::Closed),
        Err(_) => Err(ListenerSend::TimedOut),
    }
}

/// Live listener channels keyed by topic ARN. At most one channel per ARN.
#[derive(Debug, Clone, Default)]
pub struct ListenerRegistry {
    channels: HashMap<String, ListenerChan>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `chan` for `arn`, returning the channel it replaced.
    pub fn insert(&mut self, arn: impl Into<String>, chan: ListenerChan) -> Option<ListenerChan> {
        self.channels.insert(arn.into(), chan)
    }

    pub fn remove(&mut self, arn: &str) -> Option<ListenerChan> {
        self.channels.remove(arn)
    }

    pub fn get(&self, arn: &str) -> Option<ListenerChan> {
        self.channels.get(arn).cloned()
    }

    /// True if `chan` is the channel currently registered for `arn`.
    pub fn is_registered(&self, arn: &str, chan: &ListenerChan) -> bool {
        self.channels
            .get(arn)
            .is_some_and(|current| current.same_channel(chan))
    }

    /// Drops channels whose receiver has gone away.
    pub fn prune_closed(&mut self) -> usize {
        let before = self.channels.len();
        self.channels.retain(|_, chan| !chan.is_closed());
        before - self.channels.len()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
