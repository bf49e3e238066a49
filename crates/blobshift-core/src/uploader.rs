//! Blob uploader
//!
//! Wraps a [`BlobStore`] with key derivation and the payload size ceiling.

use blobshift_store::{BlobKey, BlobStore, BlobStoreError, FieldName, RecordId, Reference};
use std::sync::Arc;

/// Upload failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    /// Payload exceeds the configured ceiling; nothing was sent
    #[error("payload too large: {size} bytes exceeds limit of {limit}")]
    TooLarge { size: usize, limit: usize },

    /// Blob store refused or failed the put
    #[error("{0}")]
    Store(String),
}

impl UploadError {
    /// Short machine-readable reason
    #[inline]
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::TooLarge { .. } => "too_large",
            Self::Store(_) => "store",
        }
    }
}

impl From<BlobStoreError> for UploadError {
    fn from(err: BlobStoreError) -> Self {
        Self::Store(err.to_string())
    }
}

/// Persists decoded payloads under deterministic keys
#[derive(Clone)]
pub struct BlobUploader {
    store: Arc<dyn BlobStore>,
    max_payload_bytes: usize,
    key_prefix: String,
}

impl BlobUploader {
    /// Create uploader
    #[must_use]
    pub fn new(
        store: Arc<dyn BlobStore>,
        max_payload_bytes: usize,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            max_payload_bytes,
            key_prefix: key_prefix.into(),
        }
    }

    /// Key for one field of one record
    #[inline]
    #[must_use]
    pub fn key_for(&self, record_id: &RecordId, field: FieldName, content_type: &str) -> BlobKey {
        BlobKey::for_field(&self.key_prefix, record_id, field, content_type)
    }

    /// Enforce the size ceiling
    ///
    /// # Errors
    /// Returns [`UploadError::TooLarge`] above the ceiling
    #[inline]
    pub fn check_size(&self, size: usize) -> Result<(), UploadError> {
        if size > self.max_payload_bytes {
            return Err(UploadError::TooLarge {
                size,
                limit: self.max_payload_bytes,
            });
        }
        Ok(())
    }

    /// Upload bytes and return the canonical reference
    ///
    /// # Errors
    /// Returns [`UploadError`] if the payload is too large or the put fails
    pub async fn upload(
        &self,
        bytes: &[u8],
        content_type: &str,
        key: &BlobKey,
    ) -> Result<Reference, UploadError> {
        self.check_size(bytes.len())?;
        let reference = self.store.put(key, bytes, content_type).await?;
        tracing::debug!(key = %key, size = bytes.len(), "Uploaded blob");
        Ok(reference)
    }

    /// Dry-run counterpart of [`upload`](Self::upload): same checks, no put
    ///
    /// # Errors
    /// Returns [`UploadError::TooLarge`] above the ceiling
    pub fn plan(&self, size: usize, key: &BlobKey) -> Result<Reference, UploadError> {
        self.check_size(size)?;
        Ok(self.store.reference_for(key))
    }
}

impl std::fmt::Debug for BlobUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobUploader")
            .field("max_payload_bytes", &self.max_payload_bytes)
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::predicate::eq;

    mockall::mock! {
        Blobs {}

        #[async_trait]
        impl BlobStore for Blobs {
            async fn put(
                &self,
                key: &BlobKey,
                bytes: &[u8],
                content_type: &str,
            ) -> Result<Reference, BlobStoreError>;
            fn reference_for(&self, key: &BlobKey) -> Reference;
            async fn check_access(&self) -> Result<(), BlobStoreError>;
        }
    }

    fn key() -> BlobKey {
        BlobKey::for_field("m", &RecordId::from("A1"), FieldName::BeforeRef, "image/jpeg")
    }

    #[tokio::test]
    async fn upload_puts_under_key() {
        let mut blobs = MockBlobs::new();
        blobs
            .expect_put()
            .withf(|key, bytes, content_type| {
                key.as_str() == "m/A1/beforeRef.jpg" && bytes == b"jpeg" && content_type == "image/jpeg"
            })
            .times(1)
            .returning(|key, _, _| Ok(Reference::new(format!("https://cdn/{key}"))));

        let uploader = BlobUploader::new(Arc::new(blobs), 16, "m");
        let reference = uploader.upload(b"jpeg", "image/jpeg", &key()).await.unwrap();

        assert_eq!(reference.as_str(), "https://cdn/m/A1/beforeRef.jpg");
    }

    #[tokio::test]
    async fn upload_too_large_never_calls_store() {
        let mut blobs = MockBlobs::new();
        blobs.expect_put().never();

        let uploader = BlobUploader::new(Arc::new(blobs), 3, "m");
        let err = uploader.upload(b"jpeg", "image/jpeg", &key()).await.unwrap_err();

        assert_eq!(err, UploadError::TooLarge { size: 4, limit: 3 });
        assert_eq!(err.reason(), "too_large");
    }

    #[tokio::test]
    async fn upload_store_failure() {
        let mut blobs = MockBlobs::new();
        blobs
            .expect_put()
            .returning(|_, _, _| Err(BlobStoreError::Transport("connection reset".to_string())));

        let uploader = BlobUploader::new(Arc::new(blobs), 16, "m");
        let err = uploader.upload(b"jpeg", "image/jpeg", &key()).await.unwrap_err();

        assert!(matches!(err, UploadError::Store(ref msg) if msg.contains("connection reset")));
    }

    #[test]
    fn plan_uses_reference_without_put() {
        let mut blobs = MockBlobs::new();
        blobs.expect_put().never();
        blobs
            .expect_reference_for()
            .with(eq(key()))
            .returning(|key| Reference::new(format!("https://cdn/{key}")));

        let uploader = BlobUploader::new(Arc::new(blobs), 16, "m");

        assert_eq!(
            uploader.plan(4, &key()).unwrap().as_str(),
            "https://cdn/m/A1/beforeRef.jpg"
        );
        assert!(uploader.plan(17, &key()).is_err());
    }

    #[test]
    fn size_ceiling_is_inclusive() {
        let uploader = BlobUploader::new(Arc::new(MockBlobs::new()), 4, "m");
        assert!(uploader.check_size(4).is_ok());
        assert!(uploader.check_size(5).is_err());
    }
}
