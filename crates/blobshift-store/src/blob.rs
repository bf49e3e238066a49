//! Blob store interface, object keys and canonical references

use crate::error::BlobStoreError;
use crate::record::{FieldName, RecordId};
use async_trait::async_trait;
use blobshift_codec::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Canonical reference issued by the blob store
///
/// Directly usable as a link; stable once issued.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reference(String);

impl Reference {
    #[inline]
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Object key inside the bucket
///
/// Derived only from record id, field and content type, so every run
/// targets the same object for the same field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobKey(String);

impl BlobKey {
    /// `<prefix>/<record-id>/<field>.<ext>`
    #[must_use]
    pub fn for_field(
        prefix: &str,
        record_id: &RecordId,
        field: FieldName,
        content_type: &str,
    ) -> Self {
        let prefix = prefix.trim_matches('/');
        let id = path_segment(record_id.as_str());
        let ext = extension_for(content_type);

        if prefix.is_empty() {
            Self(format!("{id}/{field}.{ext}"))
        } else {
            Self(format!("{prefix}/{id}/{field}.{ext}"))
        }
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BlobKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ids outside `[A-Za-z0-9._-]` get their offending characters replaced
/// and a digest suffix, keeping distinct ids on distinct keys.
fn path_segment(id: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');

    if !id.is_empty() && id != "." && id != ".." && id.chars().all(safe) {
        return id.to_string();
    }

    let cleaned: String = id
        .chars()
        .map(|c| if safe(c) { c } else { '_' })
        .collect();
    format!("{cleaned}-{}", ContentHash::compute(id.as_bytes()).short())
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "application/pdf" => "pdf",
        "text/plain" => "txt",
        other => mime_guess::get_mime_extensions_str(other)
            .and_then(|exts| exts.first().copied())
            .unwrap_or("bin"),
    }
}

/// Durable object store
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under `key`, overwriting any previous object.
    ///
    /// Returns only once the object is durably persisted.
    async fn put(
        &self,
        key: &BlobKey,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<Reference, BlobStoreError>;

    /// Reference that `put` issues for `key`, without storing anything
    fn reference_for(&self, key: &BlobKey) -> Reference;

    /// Cheap authenticated request used before any record is touched
    async fn check_access(&self) -> Result<(), BlobStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_deterministic() {
        let id = RecordId::from("A1");
        let a = BlobKey::for_field("migrated", &id, FieldName::BeforeRef, "image/jpeg");
        let b = BlobKey::for_field("migrated", &id, FieldName::BeforeRef, "image/jpeg");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "migrated/A1/beforeRef.jpg");
    }

    #[test]
    fn key_distinguishes_fields() {
        let id = RecordId::from("A1");
        let before = BlobKey::for_field("m", &id, FieldName::BeforeRef, "image/png");
        let after = BlobKey::for_field("m", &id, FieldName::AfterRef, "image/png");
        assert_ne!(before, after);
    }

    #[test]
    fn key_prefix_slashes_trimmed() {
        let id = RecordId::from("7");
        let key = BlobKey::for_field("/uploads/", &id, FieldName::AfterRef, "image/png");
        assert_eq!(key.as_str(), "uploads/7/afterRef.png");

        let key = BlobKey::for_field("", &id, FieldName::AfterRef, "image/png");
        assert_eq!(key.as_str(), "7/afterRef.png");
    }

    #[test]
    fn key_sanitizes_unsafe_ids() {
        let a = BlobKey::for_field("m", &RecordId::from("a/b"), FieldName::BeforeRef, "image/png");
        let b = BlobKey::for_field("m", &RecordId::from("a?b"), FieldName::BeforeRef, "image/png");

        assert!(a.as_str().starts_with("m/a_b-"));
        assert!(!a.as_str()["m/".len()..].contains("a/b"));
        assert_ne!(a, b);

        let dots = BlobKey::for_field("m", &RecordId::from(".."), FieldName::BeforeRef, "image/png");
        assert!(!dots.as_str().contains("/../"));
    }

    #[test]
    fn unknown_content_type_falls_back_to_bin() {
        assert_eq!(extension_for("application/x-made-up"), "bin");
        assert_eq!(extension_for("image/jpeg"), "jpg");
    }

    #[test]
    fn reference_serializes_as_string() {
        let reference = Reference::new("https://cdn/x.png");
        assert_eq!(serde_json::to_string(&reference).unwrap(), "\"https://cdn/x.png\"");
    }
}
