//! Blob store with failure injection.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use sluice_core::{
    error::CoreError,
    storage::{BlobStore, MemoryBlobStore, ObjectKey},
};

/// Wraps a [`MemoryBlobStore`] and starts failing writes after a budget of
/// successful ones, for exercising persist-failure paths.
pub struct FlakyBlobStore {
    inner: MemoryBlobStore,
    writes_before_failure: AtomicI64,
}

impl FlakyBlobStore {
    /// Store that accepts `successful_writes` puts, then fails every
    /// subsequent one.
    pub fn failing_after(successful_writes: i64) -> Self {
        Self {
            inner: MemoryBlobStore::new(),
            writes_before_failure: AtomicI64::new(successful_writes),
        }
    }

    /// Store whose every write fails.
    pub fn always_failing() -> Self {
        Self::failing_after(0)
    }

    /// The wrapped store, for inspecting what landed before the failures.
    pub fn inner(&self) -> &MemoryBlobStore {
        &self.inner
    }
}

#[async_trait]
impl BlobStore for FlakyBlobStore {
    async fn put(&self, key: &ObjectKey, data: Bytes) -> Result<(), CoreError> {
        let budget = self.writes_before_failure.fetch_sub(1, Ordering::SeqCst);
        if budget <= 0 {
            return Err(CoreError::store(key.as_str(), "injected write failure"));
        }
        self.inner.put(key, data).await
    }
}
