use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::traits::ObjectLayer;

/// In-memory object layer.
///
/// Buckets are kept in a sorted map so `list_buckets` is deterministic.
/// Used by tests and by single-process deployments that do not need
/// durability for bucket metadata.
#[derive(Debug, Default)]
pub struct InMemoryObjectLayer {
    buckets: RwLock<BTreeMap<String, HashMap<String, Vec<u8>>>>,
}

impl InMemoryObjectLayer {
    /// Creates an empty object layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bucket. Creating an existing bucket is a no-op.
    pub async fn make_bucket(&self, bucket: &str) {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default();
    }

    /// Deletes a bucket and every document in it.
    pub async fn delete_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        self.buckets
            .write()
            .await
            .remove(bucket)
            .map(|_| ())
            .ok_or_else(|| StorageError::bucket_not_found(bucket))
    }

    /// Returns the number of documents stored in a bucket.
    pub async fn document_count(&self, bucket: &str) -> usize {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ObjectLayer for InMemoryObjectLayer {
    async fn read_document(
        &self,
        bucket: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let buckets = self.buckets.read().await;
        let docs = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::bucket_not_found(bucket))?;
        Ok(docs.get(path).cloned())
    }

    async fn write_document(
        &self,
        bucket: &str,
        path: &str,
        data: &[u8],
    ) -> Result<(), StorageError> {
        let mut buckets = self.buckets.write().await;
        let docs = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::bucket_not_found(bucket))?;
        docs.insert(path.to_string(), data.to_vec());
        tracing::trace!(bucket, path, bytes = data.len(), "Document written");
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        Ok(self.buckets.read().await.contains_key(bucket))
    }

    async fn list_buckets(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.buckets.read().await.keys().cloned().collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
