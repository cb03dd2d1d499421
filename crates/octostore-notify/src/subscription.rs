//! Per-bucket subscription documents.
//!
//! Field names follow the S3 notification document layout (`QueueConfiguration`,
//! `Event`, `Filter.S3Key.FilterRule`) so that persisted documents read the same
//! as the bucket notification XML most clients already know.

use serde::{Deserialize, Serialize};

use crate::arn::{Arn, ArnService};
use crate::error::{NotifyError, NotifyResult};
use crate::event::EventName;

/// A single key filter rule (`prefix` or `suffix`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: String,
}

impl FilterRule {
    pub fn prefix(value: impl Into<String>) -> Self {
        Self {
            name: "prefix".to_string(),
            value: value.into(),
        }
    }

    pub fn suffix(value: impl Into<String>) -> Self {
        Self {
            name: "suffix".to_string(),
            value: value.into(),
        }
    }

    pub fn is_prefix(&self) -> bool {
        self.name.eq_ignore_ascii_case("prefix")
    }

    pub fn is_suffix(&self) -> bool {
        self.name.eq_ignore_ascii_case("suffix")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFilter {
    #[serde(rename = "FilterRule", default)]
    pub filter_rules: Vec<FilterRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationFilter {
    #[serde(rename = "S3Key", default)]
    pub key: KeyFilter,
}

impl NotificationFilter {
    pub fn is_empty(&self) -> bool {
        self.key.filter_rules.is_empty()
    }
}

/// Matching criteria shared by queue and topic subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(rename = "Event")]
    pub events: Vec<String>,
    #[serde(rename = "Filter", default)]
    pub filter: NotificationFilter,
    #[serde(rename = "Id", default)]
    pub id: String,
}

impl ServiceConfig {
    pub fn new<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            events: events.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_rule(mut self, rule: FilterRule) -> Self {
        self.filter.key.filter_rules.push(rule);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn validate(&self) -> NotifyResult<()> {
        if self.events.is_empty() {
            return Err(NotifyError::invalid_argument(
                "subscription must name at least one event",
            ));
        }
        if let Some(unknown) = self.events.iter().find(|e| !EventName::is_valid_pattern(e)) {
            return Err(NotifyError::invalid_argument(format!(
                "unknown event name: {unknown}"
            )));
        }

        let mut seen_prefix = false;
        let mut seen_suffix = false;
        for rule in &self.filter.key.filter_rules {
            let seen = if rule.is_prefix() {
                &mut seen_prefix
            } else if rule.is_suffix() {
                &mut seen_suffix
            } else {
                return Err(NotifyError::invalid_argument(format!(
                    "unsupported filter rule name: {}",
                    rule.name
                )));
            };
            if *seen {
                return Err(NotifyError::invalid_argument(format!(
                    "duplicate {} filter rule",
                    rule.name.to_ascii_lowercase()
                )));
            }
            if rule.value.is_empty() {
                return Err(NotifyError::invalid_argument(format!(
                    "empty value for {} filter rule",
                    rule.name.to_ascii_lowercase()
                )));
            }
            *seen = true;
        }
        Ok(())
    }
}

/// Subscription delivering to an external target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(flatten)]
    pub service: ServiceConfig,
    #[serde(rename = "Queue")]
    pub queue_arn: String,
}

impl QueueConfig {
    pub fn new(service: ServiceConfig, queue_arn: impl Into<String>) -> Self {
        Self {
            service,
            queue_arn: queue_arn.into(),
        }
    }

    pub fn validate(&self) -> NotifyResult<()> {
        self.service.validate()?;
        let arn: Arn = self.queue_arn.parse()?;
        if arn.service() != ArnService::Sqs {
            return Err(NotifyError::invalid_argument(format!(
                "queue ARN must use the sqs service: {}",
                self.queue_arn
            )));
        }
        Ok(())
    }
}

/// Subscription delivering to an internal listener channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
    #[serde(flatten)]
    pub service: ServiceConfig,
    #[serde(rename = "Topic")]
    pub topic_arn: String,
}

impl TopicConfig {
    pub fn new(service: ServiceConfig, topic_arn: impl Into<String>) -> Self {
        Self {
            service,
            topic_arn: topic_arn.into(),
        }
    }
}

/// The persisted per-bucket notification document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(rename = "QueueConfiguration", default)]
    pub queue_configs: Vec<QueueConfig>,
}

impl NotificationConfig {
    pub fn new(queue_configs: Vec<QueueConfig>) -> Self {
        Self { queue_configs }
    }

    pub fn is_empty(&self) -> bool {
        self.queue_configs.is_empty()
    }

    pub fn validate(&self) -> NotifyResult<()> {
        self.queue_configs.iter().try_for_each(QueueConfig::validate)
    }
}

/// One listener subscription and the node holding its live channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    #[serde(rename = "TopicConfig")]
    pub topic_config: TopicConfig,
    #[serde(rename = "TargetServer")]
    pub target_server: String,
}

impl ListenerConfig {
    pub fn new(topic_config: TopicConfig, target_server: impl Into<String>) -> Self {
        Self {
            topic_config,
            target_server: target_server.into(),
        }
    }

    pub fn topic_arn(&self) -> &str {
        &self.topic_config.topic_arn
    }

    pub fn validate(&self) -> NotifyResult<()> {
        if self.target_server.is_empty() {
            return Err(NotifyError::invalid_argument(
                "listener config has no target server",
            ));
        }
        let arn: Arn = self.topic_config.topic_arn.parse()?;
        if arn.service() != ArnService::Sns {
            return Err(NotifyError::invalid_argument(format!(
                "topic ARN must use the sns service: {}",
                self.topic_config.topic_arn
            )));
        }
        self.topic_config.service.validate()
    }

    /// Identity used when removing a listener subscription.
    pub fn same_subscription(&self, other: &ListenerConfig) -> bool {
        self.topic_config.topic_arn == other.topic_config.topic_arn
            && self.target_server == other.target_server
    }
}
