//! Google Cloud Storage adapter for the blob-store boundary.
//!
//! Compiled as a REST client when the `gcp` feature is enabled. Without the
//! feature a placeholder with the same surface is compiled instead, whose
//! constructor reports that the build lacks GCP support; this keeps the
//! wiring code identical across builds.

#[cfg(feature = "gcp")]
mod gcp_impl {
    use std::sync::Arc;

    use async_trait::async_trait;
    use bytes::Bytes;
    use gcp_auth::TokenProvider;
    use tracing::debug;

    use crate::{
        error::CoreError,
        storage::{BlobStore, ObjectKey},
    };

    const UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1";
    const SCOPES: &[&str] = &["https://www.googleapis.com/auth/devstorage.read_write"];

    /// Blob store writing objects into one GCS bucket via media upload.
    pub struct GcsBlobStore {
        http: reqwest::Client,
        tokens: Arc<dyn TokenProvider>,
        bucket: String,
    }

    impl GcsBlobStore {
        /// Creates a store bound to `bucket`, resolving credentials from the
        /// ambient environment (service account, metadata server, ...).
        pub async fn new(bucket: impl Into<String>) -> Result<Self, CoreError> {
            let tokens = gcp_auth::provider().await.map_err(|e| {
                CoreError::configuration(format!("failed to resolve GCP credentials: {e}"))
            })?;
            let http = reqwest::Client::builder()
                .user_agent(concat!("sluice/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| {
                    CoreError::configuration(format!("failed to build http client: {e}"))
                })?;
            Ok(Self { http, tokens, bucket: bucket.into() })
        }
    }

    #[async_trait]
    impl BlobStore for GcsBlobStore {
        async fn put(&self, key: &ObjectKey, data: Bytes) -> Result<(), CoreError> {
            let token = self.tokens.token(SCOPES).await.map_err(|e| {
                CoreError::store(key.as_str(), format!("token acquisition failed: {e}"))
            })?;

            let url = format!("{UPLOAD_BASE}/b/{}/o", self.bucket);
            let response = self
                .http
                .post(url)
                .query(&[("uploadType", "media"), ("name", key.as_str())])
                .bearer_auth(token.as_str())
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(data)
                .send()
                .await
                .map_err(|e| CoreError::store(key.as_str(), format!("upload failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(CoreError::store(
                    key.as_str(),
                    format!("upload rejected with HTTP {status}: {body}"),
                ));
            }

            debug!(key = %key, bucket = %self.bucket, "object uploaded");
            Ok(())
        }
    }
}

#[cfg(not(feature = "gcp"))]
mod placeholder_impl {
    use async_trait::async_trait;
    use bytes::Bytes;

    use crate::{
        error::CoreError,
        storage::{BlobStore, ObjectKey},
    };

    /// Placeholder compiled when the `gcp` feature is disabled.
    pub struct GcsBlobStore {
        _private: (),
    }

    impl GcsBlobStore {
        /// Always fails: this build has no GCP support.
        pub async fn new(_bucket: impl Into<String>) -> Result<Self, CoreError> {
            Err(CoreError::configuration(
                "GCS support is not compiled in; rebuild with the 'gcp' feature",
            ))
        }
    }

    #[async_trait]
    impl BlobStore for GcsBlobStore {
        async fn put(&self, _key: &ObjectKey, _data: Bytes) -> Result<(), CoreError> {
            Err(CoreError::configuration(
                "GCS support is not compiled in; rebuild with the 'gcp' feature",
            ))
        }
    }
}

#[cfg(feature = "gcp")]
pub use gcp_impl::GcsBlobStore;
#[cfg(not(feature = "gcp"))]
pub use placeholder_impl::GcsBlobStore;
