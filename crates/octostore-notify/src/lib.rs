//! # octostore-notify
//!
//! Bucket event notifications for OctoStore.
//!
//! Object operations report [`EventData`] to a [`Notifier`]. The notifier
//! matches it against each bucket's subscriptions and delivers an S3-style
//! [`NotificationEvent`] to:
//!
//! - **queue subscriptions** (`arn:minio:sqs:...`): external targets such as
//!   an AMQP exchange, Redis, Elasticsearch or a webhook, connected once at
//!   startup
//! - **topic subscriptions** (`arn:minio:sns:...`): listener channels held by
//!   long-poll clients, on this node or forwarded to the owning peer
//!
//! Subscriptions are persisted per bucket through the storage
//! [`ObjectLayer`](octostore_storage::ObjectLayer) and loaded in full when the
//! notifier is built.
//!
//! ```ignore
//! let notifier = Notifier::builder()
//!     .object_layer(layer)
//!     .config(config.notify.clone())
//!     .single_node("127.0.0.1:9000")
//!     .build()
//!     .await?;
//!
//! notifier.route_event(EventData::new(EventName::ObjectCreatedPut, object));
//! ```

pub mod arn;
pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod listener;
mod notifier;
pub mod peer;
mod router;
pub mod store;
pub mod subscription;
pub mod targets;

pub use arn::{Arn, ArnService};
pub use config::{NotifyConfig, TargetArgs, TargetFormat, TargetKind, TargetsConfig};
pub use error::{NotifyError, NotifyResult, PeerError, TargetError};
pub use event::{EventData, EventName, NotificationEvent, ObjectInfo};
pub use listener::{ListenerChan, ListenerReceiver, listener_channel};
pub use notifier::{DEFAULT_LOCAL_ADDR, LISTENER_ACCOUNT_ID, Notifier, NotifierBuilder};
pub use peer::{LocalPeer, PeerBroadcaster, PeerMessage, PeerTransport};
pub use router::DeliveryReport;
pub use subscription::{
    FilterRule, ListenerConfig, NotificationConfig, QueueConfig, ServiceConfig, TopicConfig,
};
pub use targets::{
    BackendConnector, DynTarget, ExternalTarget, TargetConnector, TargetRegistry,
};
