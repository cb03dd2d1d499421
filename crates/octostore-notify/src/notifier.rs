//! The per-process notifier.
//!
//! A [`Notifier`] only exists once its initial load has succeeded: bucket
//! configs are read from storage, enabled targets are connected, and the
//! dispatch workers are running. All four maps live behind one lock that is
//! never held across an `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use octostore_storage::DynObjectLayer;
use parking_lot::RwLock;

use crate::arn::Arn;
use crate::config::NotifyConfig;
use crate::error::{NotifyError, NotifyResult};
use crate::event::{EventData, NotificationEvent};
use crate::listener::{self, ListenerChan, ListenerReceiver, ListenerRegistry, ListenerSend};
use crate::peer::{LocalPeer, PeerBroadcaster, PeerMessage, PeerTransport};
use crate::router::{self, DeliveryReport, Dispatcher};
use crate::store;
use crate::subscription::{ListenerConfig, NotificationConfig};
use crate::targets::{BackendConnector, DynTarget, TargetConnector, TargetRegistry};

/// Account ID embedded in listener ARNs.
pub const LISTENER_ACCOUNT_ID: &str = "1";

/// Address used when no peer transport is configured.
pub const DEFAULT_LOCAL_ADDR: &str = "127.0.0.1:9000";

#[derive(Debug, Default)]
pub(crate) struct NotifierState {
    pub(crate) notification_configs: HashMap<String, NotificationConfig>,
    pub(crate) listener_configs: HashMap<String, Vec<ListenerConfig>>,
    pub(crate) external_targets: TargetRegistry,
    pub(crate) internal_targets: ListenerRegistry,
}

/// State shared between the notifier handle and its dispatch workers.
pub(crate) struct Shared {
    pub(crate) state: RwLock<NotifierState>,
    pub(crate) config: NotifyConfig,
    pub(crate) peers: PeerBroadcaster,
    object_layer: DynObjectLayer,
    connector: Arc<dyn TargetConnector>,
    /// Serializes read-modify-persist cycles on bucket documents.
    admin_lock: tokio::sync::Mutex<()>,
}

/// Everything produced by a full load, before it is committed.
struct Loaded {
    notification: HashMap<String, NotificationConfig>,
    listener: HashMap<String, Vec<ListenerConfig>>,
    targets: TargetRegistry,
}

impl Shared {
    async fn load(&self) -> NotifyResult<Loaded> {
        let mut configs = store::load_all(self.object_layer.as_ref()).await?;

        let targets = TargetRegistry::connect_enabled(
            self.connector.as_ref(),
            &self.config.targets,
            &self.config.region,
        )
        .await?;

        for (bucket, config) in &configs.notification {
            for queue in &config.queue_configs {
                if !targets.contains(&queue.queue_arn) {
                    tracing::info!(
                        bucket = %bucket,
                        arn = %queue.queue_arn,
                        "No enabled target for queue ARN, its events will be dropped"
                    );
                }
            }
        }

        if !self.peers.is_distributed() {
            let local = self.peers.local_addr();
            for (bucket, listeners) in configs.listener.iter_mut() {
                let before = listeners.len();
                listeners.retain(|l| l.target_server == local);
                if listeners.len() != before {
                    tracing::debug!(
                        bucket = %bucket,
                        ignored = before - listeners.len(),
                        "Ignoring listener configs owned by other nodes"
                    );
                }
            }
            configs.listener.retain(|_, listeners| !listeners.is_empty());
        }

        Ok(Loaded {
            notification: configs.notification,
            listener: configs.listener,
            targets,
        })
    }

    fn local_addr(&self) -> &str {
        self.peers.local_addr()
    }

    /// Sends `events` to the listener registered as `chan` under `arn`.
    ///
    /// The send only happens while `chan` is still the registered channel, so
    /// a listener removed while this waits for buffer space never sees the
    /// events.
    pub(crate) async fn send_to_listener(
        &self,
        arn: &str,
        chan: &ListenerChan,
        events: Vec<NotificationEvent>,
    ) -> ListenerSend {
        let permit = match listener::reserve_bounded(chan, self.config.delivery_timeout()).await {
            Ok(permit) => permit,
            Err(outcome) => return outcome,
        };
        let state = self.state.read();
        if !state.internal_targets.is_registered(arn, chan) {
            return ListenerSend::Unregistered;
        }
        permit.send(events);
        ListenerSend::Delivered
    }
}

/// Builds a [`Notifier`], performing the initial load.
#[derive(Default)]
pub struct NotifierBuilder {
    object_layer: Option<DynObjectLayer>,
    config: NotifyConfig,
    connector: Option<Arc<dyn TargetConnector>>,
    transport: Option<Arc<dyn PeerTransport>>,
}

impl NotifierBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_layer(mut self, layer: DynObjectLayer) -> Self {
        self.object_layer = Some(layer);
        self
    }

    pub fn config(mut self, config: NotifyConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides how external targets are created.
    pub fn connector(mut self, connector: Arc<dyn TargetConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn peer_transport(mut self, transport: Arc<dyn PeerTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Runs as a single node reachable at `addr`.
    pub fn single_node(self, addr: impl Into<String>) -> Self {
        self.peer_transport(Arc::new(LocalPeer::new(addr)))
    }

    /// Loads every bucket's configuration and connects enabled targets.
    ///
    /// Nothing is started unless the whole load succeeds.
    pub async fn build(self) -> NotifyResult<Notifier> {
        let object_layer = self
            .object_layer
            .ok_or_else(|| NotifyError::invalid_argument("object layer is required"))?;
        self.config.validate()?;

        let connector: Arc<dyn TargetConnector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(BackendConnector::new(self.config.delivery_timeout())),
        };
        let transport: Arc<dyn PeerTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(LocalPeer::new(DEFAULT_LOCAL_ADDR)),
        };

        let shared = Shared {
            state: RwLock::new(NotifierState::default()),
            config: self.config,
            peers: PeerBroadcaster::new(transport),
            object_layer,
            connector,
            admin_lock: tokio::sync::Mutex::new(()),
        };

        let loaded = shared.load().await?;
        {
            let mut state = shared.state.write();
            state.notification_configs = loaded.notification;
            state.listener_configs = loaded.listener;
            state.external_targets = loaded.targets;
        }

        let shared = Arc::new(shared);
        let dispatcher = Dispatcher::start(
            shared.clone(),
            shared.config.dispatch_workers,
            shared.config.queue_capacity,
        );

        let notifier = Notifier { shared, dispatcher };
        tracing::info!(
            backend = notifier.shared.object_layer.backend_name(),
            node = %notifier.local_addr(),
            distributed = notifier.shared.peers.is_distributed(),
            buckets = notifier.bucket_count(),
            targets = notifier.external_target_count(),
            "Event notifier initialized"
        );
        Ok(notifier)
    }
}

/// Bucket event notifier for one node.
pub struct Notifier {
    shared: Arc<Shared>,
    dispatcher: Dispatcher,
}

impl Notifier {
    pub fn builder() -> NotifierBuilder {
        NotifierBuilder::new()
    }

    pub fn config(&self) -> &NotifyConfig {
        &self.shared.config
    }

    pub fn local_addr(&self) -> &str {
        self.shared.local_addr()
    }

    pub fn region(&self) -> &str {
        &self.shared.config.region
    }

    /// Topic ARN for a listener held on this node.
    pub fn listener_arn(&self) -> Arn {
        Arn::listener(self.region(), LISTENER_ACCOUNT_ID, self.local_addr())
    }

    // Notification (queue) configs

    pub fn get_bucket_notification_config(&self, bucket: &str) -> Option<NotificationConfig> {
        self.shared.state.read().notification_configs.get(bucket).cloned()
    }

    /// Replaces the cached config for `bucket`. Does not persist.
    pub fn set_bucket_notification_config(&self, bucket: &str, config: NotificationConfig) {
        self.shared
            .state
            .write()
            .notification_configs
            .insert(bucket.to_string(), config);
    }

    /// Validates, persists, caches and propagates a bucket's notification config.
    pub async fn put_bucket_notification_config(
        &self,
        bucket: &str,
        config: NotificationConfig,
    ) -> NotifyResult<()> {
        config.validate()?;

        let _guard = self.shared.admin_lock.lock().await;
        store::save_notification_config(self.shared.object_layer.as_ref(), bucket, &config)
            .await?;
        self.set_bucket_notification_config(bucket, config.clone());
        drop(_guard);

        self.shared
            .peers
            .broadcast_config_change(PeerMessage::SetBucketNotification {
                bucket: bucket.to_string(),
                config: Some(config),
            })
            .await;
        Ok(())
    }

    // Listener (topic) configs

    pub fn get_bucket_listener_config(&self, bucket: &str) -> Vec<ListenerConfig> {
        self.shared
            .state
            .read()
            .listener_configs
            .get(bucket)
            .cloned()
            .unwrap_or_default()
    }

    /// Replaces the cached listener configs for `bucket`. Does not persist.
    pub fn set_bucket_listener_config(&self, bucket: &str, configs: Vec<ListenerConfig>) {
        self.shared
            .state
            .write()
            .listener_configs
            .insert(bucket.to_string(), configs);
    }

    /// Appends `config` to the bucket's listener list and persists the list.
    ///
    /// The live channel is registered separately with [`Self::add_listener_chan`].
    pub async fn add_bucket_listener_config(
        &self,
        bucket: &str,
        config: ListenerConfig,
    ) -> NotifyResult<()> {
        config.validate()?;

        let _guard = self.shared.admin_lock.lock().await;
        let mut configs = self.get_bucket_listener_config(bucket);
        configs.push(config);

        store::save_listener_config(self.shared.object_layer.as_ref(), bucket, &configs).await?;
        self.set_bucket_listener_config(bucket, configs.clone());
        drop(_guard);

        self.shared
            .peers
            .broadcast_config_change(PeerMessage::SetBucketListener {
                bucket: bucket.to_string(),
                configs,
            })
            .await;
        Ok(())
    }

    /// Removes the entry with the same topic ARN and target server.
    /// A missing entry is not an error and nothing is written.
    pub async fn remove_bucket_listener_config(
        &self,
        bucket: &str,
        config: &ListenerConfig,
    ) -> NotifyResult<()> {
        let _guard = self.shared.admin_lock.lock().await;
        let mut configs = self.get_bucket_listener_config(bucket);
        let Some(pos) = configs.iter().position(|c| c.same_subscription(config)) else {
            return Ok(());
        };
        configs.remove(pos);

        store::save_listener_config(self.shared.object_layer.as_ref(), bucket, &configs).await?;
        self.set_bucket_listener_config(bucket, configs.clone());
        drop(_guard);

        self.shared
            .peers
            .broadcast_config_change(PeerMessage::SetBucketListener {
                bucket: bucket.to_string(),
                configs,
            })
            .await;
        Ok(())
    }

    /// Forgets every config of a deleted bucket, here and on peers.
    pub async fn remove_bucket(&self, bucket: &str) {
        self.forget_bucket(bucket);
        self.shared
            .peers
            .broadcast_config_change(PeerMessage::RemoveBucket {
                bucket: bucket.to_string(),
            })
            .await;
    }

    fn forget_bucket(&self, bucket: &str) {
        {
            let mut state = self.shared.state.write();
            state.notification_configs.remove(bucket);
            state.listener_configs.remove(bucket);
        }
        tracing::debug!(bucket, "Removed bucket notification configs");
    }

    // Listener channels

    /// Creates a channel sized by `listener_buffer`.
    pub fn listener_channel(&self) -> (ListenerChan, ListenerReceiver) {
        listener::listener_channel(self.shared.config.listener_buffer)
    }

    /// Registers the channel receiving events for `topic_arn` on this node.
    pub fn add_listener_chan(&self, topic_arn: &str, chan: ListenerChan) -> NotifyResult<()> {
        if chan.is_closed() {
            return Err(NotifyError::invalid_argument(format!(
                "listener channel for {topic_arn} is closed"
            )));
        }
        let replaced = self
            .shared
            .state
            .write()
            .internal_targets
            .insert(topic_arn, chan);
        if replaced.is_some() {
            tracing::debug!(arn = topic_arn, "Replaced listener channel");
        }
        Ok(())
    }

    pub fn remove_listener_chan(&self, topic_arn: &str) {
        self.shared.state.write().internal_targets.remove(topic_arn);
    }

    // Lookups

    pub fn get_external_target(&self, queue_arn: &str) -> Option<DynTarget> {
        self.shared.state.read().external_targets.get(queue_arn)
    }

    pub fn get_internal_target(&self, topic_arn: &str) -> Option<ListenerChan> {
        self.shared.state.read().internal_targets.get(topic_arn)
    }

    /// Number of buckets with any notification or listener config.
    pub fn bucket_count(&self) -> usize {
        let state = self.shared.state.read();
        state
            .notification_configs
            .keys()
            .chain(state.listener_configs.keys())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn external_target_count(&self) -> usize {
        self.shared.state.read().external_targets.len()
    }

    pub fn listener_count(&self) -> usize {
        self.shared.state.read().internal_targets.len()
    }

    // Routing

    /// Queues an event for delivery and returns immediately.
    ///
    /// Returns false if the event was dropped because its worker queue is full.
    pub fn route_event(&self, data: EventData) -> bool {
        self.dispatcher.enqueue(data)
    }

    /// Delivers an event to every matching target and waits for the outcome.
    pub async fn deliver(&self, data: &EventData) -> DeliveryReport {
        router::deliver(&self.shared, data).await
    }

    // Cluster

    /// Applies a message sent by another node.
    pub async fn handle_peer_message(&self, message: PeerMessage) -> NotifyResult<()> {
        tracing::debug!(kind = message.kind(), "Handling peer message");
        match message {
            PeerMessage::SetBucketNotification { bucket, config } => match config {
                Some(config) => self.set_bucket_notification_config(&bucket, config),
                None => {
                    self.shared.state.write().notification_configs.remove(&bucket);
                }
            },
            PeerMessage::SetBucketListener { bucket, configs } => {
                for config in &configs {
                    config.validate()?;
                }
                self.set_bucket_listener_config(&bucket, configs);
            }
            PeerMessage::RemoveBucket { bucket } => self.forget_bucket(&bucket),
            PeerMessage::Event { topic_arn, events } => {
                let Some(chan) = self.get_internal_target(&topic_arn) else {
                    tracing::debug!(arn = %topic_arn, "No listener for forwarded events");
                    return Ok(());
                };
                let outcome = self.shared.send_to_listener(&topic_arn, &chan, events).await;
                if outcome != ListenerSend::Delivered {
                    tracing::debug!(arn = %topic_arn, ?outcome, "Forwarded events not delivered");
                }
            }
        }
        Ok(())
    }

    /// Re-reads all bucket configs and reconnects targets.
    ///
    /// On failure the current state is left untouched. Registered listener
    /// channels are kept.
    pub async fn reload(&self) -> NotifyResult<()> {
        let _guard = self.shared.admin_lock.lock().await;
        let loaded = self.shared.load().await?;

        let mut state = self.shared.state.write();
        state.notification_configs = loaded.notification;
        state.listener_configs = loaded.listener;
        state.external_targets = loaded.targets;
        let pruned = state.internal_targets.prune_closed();

        tracing::info!(
            targets = state.external_targets.len(),
            listeners = state.internal_targets.len(),
            pruned,
            "Event notifier reloaded"
        );
        Ok(())
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("node", &self.local_addr())
            .field("buckets", &self.bucket_count())
            .field("targets", &self.external_target_count())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::{ServiceConfig, TopicConfig};
    use octostore_storage::InMemoryObjectLayer;

    async fn notifier() -> Notifier {
        let layer = InMemoryObjectLayer::new();
        layer.make_bucket("photos").await;
        Notifier::builder()
            .object_layer(Arc::new(layer))
            .single_node("127.0.0.1:9000")
            .build()
            .await
            .unwrap()
    }

    fn listener_config(notifier: &Notifier) -> ListenerConfig {
        ListenerConfig::new(
            TopicConfig::new(
                ServiceConfig::new(["s3:ObjectCreated:*"]),
                notifier.listener_arn().to_string(),
            ),
            notifier.local_addr(),
        )
    }

    #[tokio::test]
    async fn test_build_without_object_layer() {
        let err = Notifier::builder().build().await.unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn test_listener_arn() {
        let notifier = notifier().await;
        assert_eq!(
            notifier.listener_arn().to_string(),
            "arn:minio:sns:us-east-1:1:listen-127.0.0.1:9000"
        );
    }

    #[tokio::test]
    async fn test_set_empty_config_is_kept() {
        let notifier = notifier().await;
        notifier.set_bucket_notification_config("photos", NotificationConfig::default());
        assert_eq!(
            notifier.get_bucket_notification_config("photos"),
            Some(NotificationConfig::default())
        );

        let lc = listener_config(&notifier);
        notifier.set_bucket_listener_config("photos", vec![lc]);
        notifier.set_bucket_listener_config("photos", Vec::new());
        assert!(notifier.get_bucket_listener_config("photos").is_empty());
        assert_eq!(notifier.bucket_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_channel_is_rejected() {
        let notifier = notifier().await;
        let (tx, rx) = notifier.listener_channel();
        drop(rx);
        let err = notifier
            .add_listener_chan("arn:minio:sns:us-east-1:1:listen-x", tx)
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(notifier.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_bucket_drops_configs() {
        let notifier = notifier().await;
        let lc = listener_config(&notifier);
        notifier.add_bucket_listener_config("photos", lc).await.unwrap();
        assert_eq!(notifier.get_bucket_listener_config("photos").len(), 1);

        notifier.remove_bucket("photos").await;
        assert!(notifier.get_bucket_listener_config("photos").is_empty());
        assert!(notifier.get_bucket_notification_config("photos").is_none());
        assert_eq!(notifier.bucket_count(), 0);
    }

    #[tokio::test]
    async fn test_peer_messages_clear_bucket() {
        let notifier = notifier().await;
        notifier.set_bucket_notification_config("photos", NotificationConfig::default());
        notifier
            .handle_peer_message(PeerMessage::SetBucketNotification {
                bucket: "photos".into(),
                config: None,
            })
            .await
            .unwrap();
        assert!(notifier.get_bucket_notification_config("photos").is_none());

        notifier.set_bucket_listener_config("photos", vec![listener_config(&notifier)]);
        notifier
            .handle_peer_message(PeerMessage::RemoveBucket {
                bucket: "photos".into(),
            })
            .await
            .unwrap();
        assert_eq!(notifier.bucket_count(), 0);
    }

    #[tokio::test]
    async fn test_removed_listener_never_gets_pending_send() {
        let notifier = notifier().await;
        let arn = notifier.listener_arn().to_string();
        let (tx, mut rx) = listener::listener_channel(1);
        notifier.add_listener_chan(&arn, tx.clone()).unwrap();
        tx.send(Vec::new()).await.unwrap();

        let shared = notifier.shared.clone();
        let pending = {
            let (arn, tx) = (arn.clone(), tx.clone());
            tokio::spawn(async move { shared.send_to_listener(&arn, &tx, Vec::new()).await })
        };
        tokio::task::yield_now().await;
        notifier.remove_listener_chan(&arn);

        assert!(rx.recv().await.is_some());
        assert_eq!(pending.await.unwrap(), ListenerSend::Unregistered);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_peer_message_updates_cache() {
        let notifier = notifier().await;
        let lc = listener_config(&notifier);
        notifier
            .handle_peer_message(PeerMessage::SetBucketListener {
                bucket: "photos".into(),
                configs: vec![lc.clone()],
            })
            .await
            .unwrap();
        assert_eq!(notifier.get_bucket_listener_config("photos"), vec![lc]);

        notifier
            .handle_peer_message(PeerMessage::SetBucketListener {
                bucket: "photos".into(),
                configs: Vec::new(),
            })
            .await
            .unwrap();
        assert!(notifier.get_bucket_listener_config("photos").is_empty());
    }
}
