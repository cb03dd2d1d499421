//! Event model: the object operations we notify about and the S3-style
//! record envelope delivered to targets and listeners.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::arn::ARN_PARTITION;
use crate::error::NotifyError;

/// Object lifecycle event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    ObjectCreatedPut,
    ObjectCreatedPost,
    ObjectCreatedCopy,
    ObjectCreatedCompleteMultipartUpload,
    ObjectRemovedDelete,
    ObjectAccessedGet,
    ObjectAccessedHead,
}

/// Wildcard event families accepted in subscriptions.
pub const EVENT_FAMILIES: &[&str] = &[
    "s3:ObjectCreated:*",
    "s3:ObjectRemoved:*",
    "s3:ObjectAccessed:*",
];

impl EventName {
    pub const ALL: [EventName; 7] = [
        Self::ObjectCreatedPut,
        Self::ObjectCreatedPost,
        Self::ObjectCreatedCopy,
        Self::ObjectCreatedCompleteMultipartUpload,
        Self::ObjectRemovedDelete,
        Self::ObjectAccessedGet,
        Self::ObjectAccessedHead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ObjectCreatedPut => "s3:ObjectCreated:Put",
            Self::ObjectCreatedPost => "s3:ObjectCreated:Post",
            Self::ObjectCreatedCopy => "s3:ObjectCreated:Copy",
            Self::ObjectCreatedCompleteMultipartUpload => {
                "s3:ObjectCreated:CompleteMultipartUpload"
            }
            Self::ObjectRemovedDelete => "s3:ObjectRemoved:Delete",
            Self::ObjectAccessedGet => "s3:ObjectAccessed:Get",
            Self::ObjectAccessedHead => "s3:ObjectAccessed:Head",
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, Self::ObjectRemovedDelete)
    }

    /// Returns true if `pattern` is a known event name or wildcard family.
    pub fn is_valid_pattern(pattern: &str) -> bool {
        EVENT_FAMILIES.contains(&pattern) || pattern.parse::<EventName>().is_ok()
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|name| name.as_str() == s)
            .copied()
            .ok_or_else(|| NotifyError::InvalidArgument(format!("unknown event name: {s}")))
    }
}

impl Serialize for EventName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventName {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Metadata of the object an event refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub bucket: String,
    pub name: String,
    pub size: u64,
    pub etag: String,
    pub content_type: String,
    #[serde(default)]
    pub user_defined: HashMap<String, String>,
}

impl ObjectInfo {
    pub fn new(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

/// What an object operation reports to the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventData {
    pub event_name: EventName,
    pub bucket: String,
    pub object: ObjectInfo,
    /// Request parameters such as `sourceIPAddress`.
    pub request_params: HashMap<String, String>,
}

impl EventData {
    pub fn new(event_name: EventName, object: ObjectInfo) -> Self {
        Self {
            event_name,
            bucket: object.bucket.clone(),
            object,
            request_params: HashMap::new(),
        }
    }

    pub fn with_request_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_params.insert(key.into(), value.into());
        self
    }

    /// Key used to keep per-object delivery ordering.
    pub fn ordering_key(&self) -> String {
        format!("{}/{}", self.bucket, self.object.name)
    }
}

/// Identity associated with an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub principal_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketMeta {
    pub name: String,
    pub owner_identity: Identity,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// URL-encoded object key.
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(rename = "eTag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_metadata: Option<HashMap<String, String>>,
    pub version_id: String,
    pub sequencer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Meta {
    pub s3_schema_version: String,
    pub configuration_id: String,
    pub bucket: BucketMeta,
    pub object: ObjectMeta,
}

/// One S3-style event record, the payload delivered to every consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub event_version: String,
    pub event_source: String,
    pub aws_region: String,
    #[serde(with = "time::serde::rfc3339")]
    pub event_time: OffsetDateTime,
    pub event_name: EventName,
    pub user_identity: Identity,
    pub request_parameters: HashMap<String, String>,
    pub response_elements: HashMap<String, String>,
    pub s3: S3Meta,
}

pub const EVENT_VERSION: &str = "2.0";
pub const EVENT_SOURCE: &str = "minio:s3";
pub const S3_SCHEMA_VERSION: &str = "1.0";

impl NotificationEvent {
    /// Builds the record for `data` as seen by the subscription `configuration_id`.
    pub fn new(data: &EventData, configuration_id: &str, region: &str) -> Self {
        let now = OffsetDateTime::now_utc();
        let sequencer = format!("{:X}", now.unix_timestamp_nanos());

        let object = if data.event_name.is_removal() {
            ObjectMeta {
                key: urlencoding::encode(&data.object.name).into_owned(),
                size: None,
                etag: None,
                content_type: None,
                user_metadata: None,
                version_id: "1".to_string(),
                sequencer,
            }
        } else {
            ObjectMeta {
                key: urlencoding::encode(&data.object.name).into_owned(),
                size: Some(data.object.size),
                etag: Some(data.object.etag.clone()),
                content_type: Some(data.object.content_type.clone()),
                user_metadata: Some(data.object.user_defined.clone()),
                version_id: "1".to_string(),
                sequencer,
            }
        };

        let mut response_elements = HashMap::new();
        response_elements.insert(
            "x-amz-request-id".to_string(),
            uuid::Uuid::new_v4().simple().to_string(),
        );

        Self {
            event_version: EVENT_VERSION.to_string(),
            event_source: EVENT_SOURCE.to_string(),
            aws_region: region.to_string(),
            event_time: now,
            event_name: data.event_name,
            user_identity: Identity::default(),
            request_parameters: data.request_params.clone(),
            response_elements,
            s3: S3Meta {
                s3_schema_version: S3_SCHEMA_VERSION.to_string(),
                configuration_id: configuration_id.to_string(),
                bucket: BucketMeta {
                    name: data.bucket.clone(),
                    owner_identity: Identity::default(),
                    arn: format!("arn:{ARN_PARTITION}:s3:::{}", data.bucket),
                },
                object,
            },
        }
    }

    /// The object key, URL-decoded.
    pub fn object_key(&self) -> String {
        urlencoding::decode(&self.s3.object.key)
            .map(|key| key.into_owned())
            .unwrap_or_else(|_| self.s3.object.key.clone())
    }

    pub fn bucket(&self) -> &str {
        &self.s3.bucket.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_event() -> EventData {
        let mut object = ObjectInfo::new("photos", "2024/cat photo.jpg");
        object.size = 42;
        object.etag = "abc".to_string();
        object.content_type = "image/jpeg".to_string();
        EventData::new(EventName::ObjectCreatedPut, object)
            .with_request_param("sourceIPAddress", "10.0.0.1")
    }

    #[test]
    fn test_event_name_parse() {
        for name in EventName::ALL {
            assert_eq!(name.as_str().parse::<EventName>().unwrap(), name);
        }
        assert!("s3:ObjectCreated:*".parse::<EventName>().is_err());
        assert!(EventName::is_valid_pattern("s3:ObjectCreated:*"));
        assert!(EventName::is_valid_pattern("s3:ObjectRemoved:Delete"));
        assert!(!EventName::is_valid_pattern("s3:Bogus:*"));
    }

    #[test]
    fn test_envelope_for_put() {
        let event = NotificationEvent::new(&put_event(), "cfg-1", "us-east-1");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["eventVersion"], "2.0");
        assert_eq!(json["eventSource"], "minio:s3");
        assert_eq!(json["awsRegion"], "us-east-1");
        assert_eq!(json["eventName"], "s3:ObjectCreated:Put");
        assert_eq!(json["requestParameters"]["sourceIPAddress"], "10.0.0.1");
        assert_eq!(json["s3"]["configurationId"], "cfg-1");
        assert_eq!(json["s3"]["bucket"]["arn"], "arn:minio:s3:::photos");
        assert_eq!(json["s3"]["object"]["key"], "2024%2Fcat%20photo.jpg");
        assert_eq!(json["s3"]["object"]["size"], 42);
        assert_eq!(json["s3"]["object"]["eTag"], "abc");

        assert_eq!(event.object_key(), "2024/cat photo.jpg");
        assert_eq!(event.bucket(), "photos");
    }

    #[test]
    fn test_envelope_for_removal_omits_object_details() {
        let data = EventData::new(
            EventName::ObjectRemovedDelete,
            ObjectInfo::new("photos", "old.jpg"),
        );
        let event = NotificationEvent::new(&data, "", "us-east-1");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["s3"]["object"]["key"], "old.jpg");
        assert!(json["s3"]["object"].get("size").is_none());
        assert!(json["s3"]["object"].get("eTag").is_none());
    }

    #[test]
    fn test_envelope_deserializes() {
        let event = NotificationEvent::new(&put_event(), "cfg-1", "us-east-1");
        let json = serde_json::to_string(&vec![event.clone()]).unwrap();
        let back: Vec<NotificationEvent> = serde_json::from_str(&json).unwrap();
        assert_eq!(back[0].event_name, EventName::ObjectCreatedPut);
        assert_eq!(back[0].s3.object, event.s3.object);
    }
}
