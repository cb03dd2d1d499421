//! External delivery targets and the registry holding their live handles.
//!
//! Every backend kind implements [`ExternalTarget`]; the router only ever sees
//! the trait object. Backends are created through a [`TargetConnector`] so the
//! notifier can be wired with in-process targets in tests.

pub mod amqp;
pub mod elasticsearch;
pub mod redis;
pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::arn::Arn;
use crate::config::{TargetArgs, TargetKind, TargetsConfig};
use crate::error::{NotifyError, NotifyResult, TargetError};
use crate::event::NotificationEvent;

pub use amqp::AmqpTarget;
pub use elasticsearch::ElasticsearchTarget;
pub use redis::RedisTarget;
pub use webhook::WebhookTarget;

/// A connected external backend.
#[async_trait]
pub trait ExternalTarget: Send + Sync {
    fn arn(&self) -> &Arn;

    fn kind(&self) -> TargetKind;

    /// Deliver one event record.
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), TargetError>;
}

/// Body sent by message-style targets: the event name, `bucket/key` and the
/// S3 record list.
pub(crate) fn event_payload(event: &NotificationEvent) -> serde_json::Value {
    json!({
        "EventName": event.event_name,
        "Key": format!("{}/{}", event.bucket(), event.object_key()),
        "Records": [event],
    })
}

/// Shared handle to a connected target.
pub type DynTarget = Arc<dyn ExternalTarget>;

/// Creates and validates a backend from its server configuration.
#[async_trait]
pub trait TargetConnector: Send + Sync {
    async fn connect(&self, arn: Arn, args: &TargetArgs) -> Result<DynTarget, TargetError>;
}

/// Connector for the real network backends.
#[derive(Debug, Clone)]
pub struct BackendConnector {
    timeout: Duration,
}

impl BackendConnector {
    /// `timeout` bounds connection checks and each delivery request.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn http_client(&self) -> Result<reqwest::Client, TargetError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| TargetError::InvalidConfig(e.to_string()))
    }
}

#[async_trait]
impl TargetConnector for BackendConnector {
    async fn connect(&self, arn: Arn, args: &TargetArgs) -> Result<DynTarget, TargetError> {
        let target: DynTarget = match args {
            TargetArgs::Amqp(args) => Arc::new(AmqpTarget::connect(arn, args, self.timeout).await?),
            TargetArgs::Redis(args) => Arc::new(RedisTarget::connect(arn, args, self.timeout).await?),
            TargetArgs::Elasticsearch(args) => {
                Arc::new(ElasticsearchTarget::connect(arn, args, self.http_client()?).await?)
            }
            TargetArgs::Webhook(args) => {
                Arc::new(WebhookTarget::connect(arn, args, self.http_client()?).await?)
            }
        };
        Ok(target)
    }
}

/// Live external targets keyed by queue ARN.
#[derive(Clone, Default)]
pub struct TargetRegistry {
    targets: HashMap<String, DynTarget>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects every enabled backend exactly once.
    ///
    /// Fails on the first backend that cannot be validated, naming its kind
    /// and account ID.
    pub async fn connect_enabled(
        connector: &dyn TargetConnector,
        config: &TargetsConfig,
        region: &str,
    ) -> NotifyResult<Self> {
        let mut registry = Self::new();

        for (account_id, args) in config.all_enabled() {
            let kind = args.kind();
            let arn = Arn::queue(region, account_id.as_str(), kind.as_str());
            let key = arn.to_string();
            if registry.targets.contains_key(&key) {
                continue;
            }

            let target = connector.connect(arn, &args).await.map_err(|source| {
                NotifyError::TargetValidation {
                    kind: kind.to_string(),
                    account_id: account_id.clone(),
                    source,
                }
            })?;
            tracing::info!(arn = %key, target = %kind, "Connected notification target");
            registry.targets.insert(key, target);
        }

        Ok(registry)
    }

    pub fn get(&self, arn: &str) -> Option<DynTarget> {
        self.targets.get(arn).cloned()
    }

    pub fn contains(&self, arn: &str) -> bool {
        self.targets.contains_key(arn)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl std::fmt::Debug for TargetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetRegistry")
            .field("targets", &self.targets.keys().collect::<Vec<_>>())
            .finish()
    }
}
