//! Cross-node propagation of bucket configuration and routed events.
//!
//! The notifier only needs two things from the cluster: push a config change
//! to every other node, and hand events to the node owning a listener. Both
//! go through [`PeerTransport`]; [`LocalPeer`] is the single-node transport.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use crate::error::PeerError;
use crate::event::NotificationEvent;
use crate::subscription::{ListenerConfig, NotificationConfig};

/// Message exchanged between notifiers on different nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMessage {
    /// Replace the bucket's notification config; `None` clears it.
    SetBucketNotification {
        bucket: String,
        config: Option<NotificationConfig>,
    },
    /// Replace the bucket's listener configs.
    SetBucketListener {
        bucket: String,
        configs: Vec<ListenerConfig>,
    },
    /// Forget every config of a deleted bucket.
    RemoveBucket { bucket: String },
    /// Push events to the local listener for `topic_arn`.
    Event {
        topic_arn: String,
        events: Vec<NotificationEvent>,
    },
}

impl PeerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetBucketNotification { .. } => "set_bucket_notification",
            Self::SetBucketListener { .. } => "set_bucket_listener",
            Self::RemoveBucket { .. } => "remove_bucket",
            Self::Event { .. } => "event",
        }
    }
}

/// Cluster call primitive.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Address other nodes use to reach this one.
    fn local_addr(&self) -> &str;

    fn is_distributed(&self) -> bool;

    /// Every other node in the cluster.
    fn peers(&self) -> Vec<String>;

    async fn call(&self, node: &str, message: &PeerMessage) -> Result<(), PeerError>;
}

/// Transport for a node running on its own.
#[derive(Debug, Clone)]
pub struct LocalPeer {
    addr: String,
}

impl LocalPeer {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl PeerTransport for LocalPeer {
    fn local_addr(&self) -> &str {
        &self.addr
    }

    fn is_distributed(&self) -> bool {
        false
    }

    fn peers(&self) -> Vec<String> {
        Vec::new()
    }

    async fn call(&self, node: &str, message: &PeerMessage) -> Result<(), PeerError> {
        tracing::trace!(node, kind = message.kind(), "Single-node peer call ignored");
        Ok(())
    }
}

/// Peer operations used by the notifier.
#[derive(Clone)]
pub struct PeerBroadcaster {
    transport: Arc<dyn PeerTransport>,
}

impl PeerBroadcaster {
    pub fn new(transport: Arc<dyn PeerTransport>) -> Self {
        Self { transport }
    }

    pub fn local_addr(&self) -> &str {
        self.transport.local_addr()
    }

    pub fn is_distributed(&self) -> bool {
        self.transport.is_distributed()
    }

    /// Sends `message` to every peer. Returns the nodes that failed.
    /// Failures are logged and never abort the caller.
    pub async fn broadcast_config_change(&self, message: PeerMessage) -> Vec<String> {
        if !self.is_distributed() {
            return Vec::new();
        }

        let peers = self.transport.peers();
        let calls = peers.iter().map(|node| {
            let message = &message;
            async move { (node, self.transport.call(node, message).await) }
        });

        let mut failed = Vec::new();
        for (node, result) in join_all(calls).await {
            if let Err(e) = result {
                tracing::warn!(
                    node = %node,
                    kind = message.kind(),
                    error = %e,
                    "Failed to propagate bucket config change"
                );
                failed.push(node.clone());
            }
        }
        failed
    }

    /// Hands `events` to the node owning `topic_arn`.
    pub async fn forward_event(
        &self,
        node: &str,
        topic_arn: &str,
        events: Vec<NotificationEvent>,
    ) -> Result<(), PeerError> {
        if !self.is_distributed() {
            return Ok(());
        }
        let message = PeerMessage::Event {
            topic_arn: topic_arn.to_string(),
            events,
        };
        self.transport.call(node, &message).await
    }
}

impl std::fmt::Debug for PeerBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerBroadcaster")
            .field("local_addr", &self.local_addr())
            .field("distributed", &self.is_distributed())
            .finish()
    }
}
