//! Blob-store boundary and object key naming.
//!
//! Persisted objects are named by wall-clock time bucket, configured prefix,
//! message id, and extension: `<year>/<month>/<day>/<hour>/<prefix>-<id>.<ext>`.
//! The bucket itself is carried by the store implementation, not the key.

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::CoreError;

/// Durable blob storage boundary.
///
/// Implementations are shared across tasks; a write either lands fully or
/// returns an error. Overwrites are last-writer-wins, which is harmless here
/// because keys embed the message id.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes `data` at `key`.
    async fn put(&self, key: &ObjectKey, data: Bytes) -> Result<(), CoreError>;
}

/// Naming scheme for persisted objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    /// Prefix every object name starts with (after the time bucket).
    pub prefix: String,
    /// File extension appended to every object name.
    pub extension: String,
}

impl KeySpec {
    /// Creates a naming scheme from prefix and extension.
    pub fn new(prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), extension: extension.into() }
    }
}

/// Fully-formed object key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Builds the key for one message at the given wall-clock instant.
    ///
    /// The time bucket reflects when the persist happens, not when the
    /// message was published.
    pub fn build(spec: &KeySpec, message_id: &str, at: DateTime<Utc>) -> Self {
        Self(format!(
            "{}/{}-{}.{}",
            at.format("%Y/%m/%d/%H"),
            spec.prefix,
            message_id,
            spec.extension
        ))
    }

    /// Key as a path string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// In-memory blob store for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    objects: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the object stored at `key`, if any.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.read().await.get(key).cloned()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// True when nothing has been stored.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// All stored keys, unordered.
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &ObjectKey, data: Bytes) -> Result<(), CoreError> {
        self.objects.write().await.insert(key.as_str().to_owned(), data);
        Ok(())
    }
}
