//! Object layer trait consumed by subsystems that persist per-bucket documents.

use async_trait::async_trait;

use crate::error::StorageError;

/// The storage contract the notification subsystem depends on.
///
/// Implementations own redundancy and retry policy (erasure coding, quorum
/// reads); an error surfaced here means that policy is already exhausted.
/// Implementations must be thread-safe (`Send + Sync`).
///
/// # Example
///
/// ```ignore
/// use octostore_storage::{ObjectLayer, StorageError};
///
/// async fn load(layer: &dyn ObjectLayer, bucket: &str) -> Result<Vec<u8>, StorageError> {
///     Ok(layer.read_document(bucket, "notification.json").await?.unwrap_or_default())
/// }
/// ```
#[async_trait]
pub trait ObjectLayer: Send + Sync {
    /// Reads a document stored under `path` in `bucket`.
    ///
    /// Returns `None` if the document does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing documents.
    async fn read_document(&self, bucket: &str, path: &str)
    -> Result<Option<Vec<u8>>, StorageError>;

    /// Writes (creates or replaces) a document under `path` in `bucket`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::BucketNotFound` if the bucket does not exist.
    async fn write_document(&self, bucket: &str, path: &str, data: &[u8])
    -> Result<(), StorageError>;

    /// Returns whether the bucket exists.
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError>;

    /// Lists the names of all buckets.
    async fn list_buckets(&self) -> Result<Vec<String>, StorageError>;

    /// Returns the name of this backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
