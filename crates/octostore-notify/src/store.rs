//! Persistence of per-bucket notification and listener documents.
//!
//! Both documents are JSON under fixed paths inside the bucket's system area.
//! A missing document is an empty configuration; every other storage fault
//! is returned unchanged.

use std::collections::HashMap;

use octostore_storage::ObjectLayer;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{NotifyError, NotifyResult};
use crate::subscription::{ListenerConfig, NotificationConfig};

pub const NOTIFICATION_CONFIG_PATH: &str = ".minio.sys/notification.json";
pub const LISTENER_CONFIG_PATH: &str = ".minio.sys/listener.json";

/// Configuration loaded for every bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedConfigs {
    pub notification: HashMap<String, NotificationConfig>,
    pub listener: HashMap<String, Vec<ListenerConfig>>,
}

pub async fn load_notification_config(
    layer: &dyn ObjectLayer,
    bucket: &str,
) -> NotifyResult<Option<NotificationConfig>> {
    read_json(layer, bucket, NOTIFICATION_CONFIG_PATH).await
}

pub async fn load_listener_config(
    layer: &dyn ObjectLayer,
    bucket: &str,
) -> NotifyResult<Option<Vec<ListenerConfig>>> {
    read_json(layer, bucket, LISTENER_CONFIG_PATH).await
}

pub async fn save_notification_config(
    layer: &dyn ObjectLayer,
    bucket: &str,
    config: &NotificationConfig,
) -> NotifyResult<()> {
    write_json(layer, bucket, NOTIFICATION_CONFIG_PATH, config).await
}

pub async fn save_listener_config(
    layer: &dyn ObjectLayer,
    bucket: &str,
    configs: &[ListenerConfig],
) -> NotifyResult<()> {
    write_json(layer, bucket, LISTENER_CONFIG_PATH, &configs).await
}

/// Reads both documents for every bucket.
///
/// Buckets without documents, or with empty ones, get no entry.
pub async fn load_all(layer: &dyn ObjectLayer) -> NotifyResult<LoadedConfigs> {
    let mut loaded = LoadedConfigs::default();

    for bucket in layer.list_buckets().await? {
        if let Some(config) = load_notification_config(layer, &bucket).await?
            && !config.is_empty()
        {
            loaded.notification.insert(bucket.clone(), config);
        }

        if let Some(configs) = load_listener_config(layer, &bucket).await?
            && !configs.is_empty()
        {
            loaded.listener.insert(bucket.clone(), configs);
        }
    }

    tracing::debug!(
        backend = layer.backend_name(),
        notification_buckets = loaded.notification.len(),
        listener_buckets = loaded.listener.len(),
        "Loaded bucket notification documents"
    );
    Ok(loaded)
}

async fn read_json<T: DeserializeOwned>(
    layer: &dyn ObjectLayer,
    bucket: &str,
    path: &str,
) -> NotifyResult<Option<T>> {
    let Some(bytes) = layer.read_document(bucket, path).await? else {
        return Ok(None);
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| NotifyError::MalformedDocument {
            bucket: bucket.to_string(),
            path: path.to_string(),
            source,
        })
}

async fn write_json<T: Serialize + ?Sized>(
    layer: &dyn ObjectLayer,
    bucket: &str,
    path: &str,
    value: &T,
) -> NotifyResult<()> {
    let bytes = serde_json::to_vec(value).map_err(|source| NotifyError::MalformedDocument {
        bucket: bucket.to_string(),
        path: path.to_string(),
        source,
    })?;
    layer.write_document(bucket, path, &bytes).await?;
    Ok(())
}
