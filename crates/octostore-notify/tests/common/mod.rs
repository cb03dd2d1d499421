//! Shared fixtures for notifier integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use octostore_notify::{
    Arn, DynTarget, EventData, EventName, ExternalTarget, NotificationEvent, NotifyConfig,
    ObjectInfo, TargetArgs, TargetConnector, TargetError, TargetKind,
};
use octostore_notify::config::WebhookArgs;
use parking_lot::Mutex;

pub const LOCAL_NODE: &str = "127.0.0.1:9000";
pub const REMOTE_NODE: &str = "10.0.0.2:9000";

/// Target keeping every delivered event in memory.
pub struct RecordingTarget {
    arn: Arn,
    kind: TargetKind,
    events: Mutex<Vec<NotificationEvent>>,
    fail: bool,
    delay: Option<Duration>,
}

impl RecordingTarget {
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().clone()
    }

    /// Waits until at least `count` events were delivered.
    pub async fn wait_for(&self, count: usize) -> Vec<NotificationEvent> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let events = self.events();
            if events.len() >= count || tokio::time::Instant::now() >= deadline {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl ExternalTarget for RecordingTarget {
    fn arn(&self) -> &Arn {
        &self.arn
    }

    fn kind(&self) -> TargetKind {
        self.kind
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), TargetError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(TargetError::Delivery("recording target refuses events".into()));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Connector producing [`RecordingTarget`]s and remembering them by ARN.
#[derive(Default)]
pub struct RecordingConnector {
    targets: Mutex<HashMap<String, Arc<RecordingTarget>>>,
    /// Accounts whose connection attempt fails.
    unreachable: Vec<String>,
    /// Accounts whose targets reject every delivery.
    failing: Vec<String>,
    /// Time every delivery takes.
    delay: Option<Duration>,
}

impl RecordingConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_unreachable(account_id: &str) -> Arc<Self> {
        Arc::new(Self {
            unreachable: vec![account_id.to_string()],
            ..Default::default()
        })
    }

    pub fn with_failing(account_id: &str) -> Arc<Self> {
        Arc::new(Self {
            failing: vec![account_id.to_string()],
            ..Default::default()
        })
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn target(&self, arn: &str) -> Option<Arc<RecordingTarget>> {
        self.targets.lock().get(arn).cloned()
    }

    pub fn connect_count(&self) -> usize {
        self.targets.lock().len()
    }
}

#[async_trait]
impl TargetConnector for RecordingConnector {
    async fn connect(&self, arn: Arn, args: &TargetArgs) -> Result<DynTarget, TargetError> {
        let account = arn.account_id().to_string();
        if self.unreachable.contains(&account) {
            return Err(TargetError::Connect("connection refused".into()));
        }
        let target = Arc::new(RecordingTarget {
            kind: args.kind(),
            fail: self.failing.contains(&account),
            delay: self.delay,
            events: Mutex::new(Vec::new()),
            arn: arn.clone(),
        });
        self.targets.lock().insert(arn.to_string(), target.clone());
        Ok(target)
    }
}

/// Config with webhook backends enabled for the given account IDs.
pub fn config_with_webhooks(accounts: &[&str]) -> NotifyConfig {
    let mut config = NotifyConfig::default();
    for account in accounts {
        config.targets.webhook.insert(
            account.to_string(),
            WebhookArgs {
                enable: true,
                endpoint: format!("http://127.0.0.1:1/{account}"),
                ..Default::default()
            },
        );
    }
    config
}

pub fn webhook_arn(account: &str) -> String {
    format!("arn:minio:sqs:us-east-1:{account}:webhook")
}

pub fn put_event(bucket: &str, key: &str) -> EventData {
    let mut object = ObjectInfo::new(bucket, key);
    object.size = 11;
    object.etag = "etag".to_string();
    EventData::new(EventName::ObjectCreatedPut, object)
        .with_request_param("sourceIPAddress", "192.168.1.10")
}
