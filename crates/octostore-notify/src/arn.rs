//! Amazon-Resource-Name style identifiers for notification targets.
//!
//! Format: `arn:minio:<service>:<region>:<accountID>:<resource>`.
//! The `sqs` service names queue (external) targets, `sns` names topic
//! (listener) targets. The resource part may itself contain `:` (listener
//! resources embed a `host:port` node address), so parsing splits on the
//! first five separators only.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

/// Partition used in every ARN produced or accepted by this server.
pub const ARN_PARTITION: &str = "minio";

/// Marker prefixed to the node address in listener ARN resources.
pub const LISTEN_RESOURCE_MARKER: &str = "listen";

/// ARN service discriminating queue targets from topic targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArnService {
    /// External delivery target (message queue, search index, webhook).
    Sqs,
    /// Internal listener topic.
    Sns,
}

impl ArnService {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqs => "sqs",
            Self::Sns => "sns",
        }
    }
}

impl fmt::Display for ArnService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArnService {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sqs" => Ok(Self::Sqs),
            "sns" => Ok(Self::Sns),
            other => Err(NotifyError::InvalidArgument(format!(
                "unknown ARN service: {other}"
            ))),
        }
    }
}

/// A parsed notification ARN. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Arn {
    service: ArnService,
    region: String,
    account_id: String,
    resource: String,
}

impl Arn {
    /// Builds a queue ARN for an external target of the given kind.
    pub fn queue(
        region: impl Into<String>,
        account_id: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            service: ArnService::Sqs,
            region: region.into(),
            account_id: account_id.into(),
            resource: kind.into(),
        }
    }

    /// Builds a listener (topic) ARN owned by the node at `node_addr`.
    pub fn listener(
        region: impl Into<String>,
        account_id: impl Into<String>,
        node_addr: &str,
    ) -> Self {
        Self {
            service: ArnService::Sns,
            region: region.into(),
            account_id: account_id.into(),
            resource: format!("{LISTEN_RESOURCE_MARKER}-{node_addr}"),
        }
    }

    pub fn service(&self) -> ArnService {
        self.service
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Node address embedded in a listener resource, if this is one.
    pub fn listener_node(&self) -> Option<&str> {
        if self.service != ArnService::Sns {
            return None;
        }
        self.resource
            .strip_prefix(LISTEN_RESOURCE_MARKER)
            .and_then(|rest| rest.strip_prefix('-'))
            .filter(|addr| !addr.is_empty())
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:{ARN_PARTITION}:{}:{}:{}:{}",
            self.service, self.region, self.account_id, self.resource
        )
    }
}

impl FromStr for Arn {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || NotifyError::InvalidArgument(format!("invalid ARN: {s}"));

        let parts: Vec<&str> = s.splitn(6, ':').collect();
        let [prefix, partition, service, region, account_id, resource] = parts[..] else {
            return Err(invalid());
        };

        if prefix != "arn" || partition != ARN_PARTITION {
            return Err(invalid());
        }
        if account_id.is_empty() || resource.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            service: service.parse()?,
            region: region.to_string(),
            account_id: account_id.to_string(),
            resource: resource.to_string(),
        })
    }
}

impl Serialize for Arn {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Arn {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
