//! Fault injection for object layers.
//!
//! `FaultyObjectLayer` counts every call made through the [`ObjectLayer`]
//! trait and fails the calls whose 1-based index has a configured error.
//! It lets tests exercise exact error propagation without a real
//! multi-disk backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::traits::ObjectLayer;

/// Object layer wrapper that fails selected calls.
pub struct FaultyObjectLayer<L> {
    inner: L,
    faults: HashMap<usize, StorageError>,
    default_fault: Option<StorageError>,
    calls: AtomicUsize,
}

impl<L: ObjectLayer> FaultyObjectLayer<L> {
    /// Wraps `inner` with the given call-index -> error map.
    pub fn new(inner: L, faults: HashMap<usize, StorageError>) -> Self {
        Self {
            inner,
            faults,
            default_fault: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Wraps `inner` so that only the `call`-th call fails with `error`.
    pub fn failing_at(inner: L, call: usize, error: StorageError) -> Self {
        Self::new(inner, HashMap::from([(call, error)]))
    }

    /// Fails every call not covered by the fault map with `error`.
    pub fn with_default_fault(mut self, error: StorageError) -> Self {
        self.default_fault = Some(error);
        self
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the wrapped layer.
    pub fn inner(&self) -> &L {
        &self.inner
    }

    fn check(&self) -> Result<(), StorageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.faults.get(&call).or(self.default_fault.as_ref()) {
            Some(err) => {
                tracing::debug!(call, error = %err, "Injecting storage fault");
                Err(err.clone())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<L: ObjectLayer> ObjectLayer for FaultyObjectLayer<L> {
    async fn read_document(
        &self,
        bucket: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        self.check()?;
        self.inner.read_document(bucket, path).await
    }

    async fn write_document(
        &self,
        bucket: &str,
        path: &str,
        data: &[u8],
    ) -> Result<(), StorageError> {
        self.check()?;
        self.inner.write_document(bucket, path, data).await
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        self.check()?;
        self.inner.bucket_exists(bucket).await
    }

    async fn list_buckets(&self) -> Result<Vec<String>, StorageError> {
        self.check()?;
        self.inner.list_buckets().await
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryObjectLayer;

    #[tokio::test]
    async fn test_fails_only_selected_call() {
        let inner = InMemoryObjectLayer::new();
        inner.make_bucket("bucket").await;
        let layer = FaultyObjectLayer::failing_at(inner, 2, StorageError::faulty_disk(2));

        assert!(layer.list_buckets().await.is_ok());
        assert_eq!(
            layer.read_document("bucket", "x").await,
            Err(StorageError::faulty_disk(2))
        );
        assert_eq!(layer.read_document("bucket", "x").await, Ok(None));
        assert_eq!(layer.call_count(), 3);
    }

    #[tokio::test]
    async fn test_default_fault() {
        let layer = FaultyObjectLayer::new(InMemoryObjectLayer::new(), HashMap::new())
            .with_default_fault(StorageError::read_quorum("offline"));

        assert!(layer.list_buckets().await.is_err());
        assert!(layer.bucket_exists("x").await.is_err());
    }
}
