//! Field migrator
//!
//! Migrates a single field of a single record. Knows nothing about the
//! sibling field; both fields of a record are classified independently.

use crate::config::MigrationMode;
use crate::types::{ErrorReason, FieldOutcome, SkipReason};
use crate::uploader::BlobUploader;
use blobshift_codec::{decode, detect, Detection};
use blobshift_store::{FieldName, FieldValue, RecordId};

/// Codec + uploader for one field
#[derive(Debug, Clone)]
pub struct FieldMigrator {
    uploader: BlobUploader,
    mode: MigrationMode,
}

impl FieldMigrator {
    /// Create migrator
    #[inline]
    #[must_use]
    pub fn new(uploader: BlobUploader, mode: MigrationMode) -> Self {
        Self { uploader, mode }
    }

    /// Classify and, when possible, migrate one field
    pub async fn migrate(
        &self,
        record_id: &RecordId,
        field: FieldName,
        value: &FieldValue,
    ) -> FieldOutcome {
        let raw = match value {
            FieldValue::Absent | FieldValue::Empty => {
                return FieldOutcome::skipped(field, SkipReason::Empty)
            }
            FieldValue::Canonical(_) => return FieldOutcome::skipped(field, SkipReason::NotLegacy),
            FieldValue::Legacy(raw) => raw,
        };

        let Detection::Legacy(payload) = detect(raw) else {
            return FieldOutcome::skipped(field, SkipReason::NotLegacy);
        };

        let decoded = match decode(&payload) {
            Ok(decoded) => decoded,
            Err(err) => {
                tracing::warn!(
                    record_id = %record_id,
                    field = %field,
                    reason = err.reason(),
                    "Skipping invalid legacy value: {}",
                    err
                );
                return FieldOutcome::skipped(field, SkipReason::InvalidEncoding);
            }
        };

        let key = self
            .uploader
            .key_for(record_id, field, decoded.content_type());

        let result = if self.mode.is_apply() {
            self.uploader
                .upload(decoded.bytes(), decoded.content_type(), &key)
                .await
        } else {
            self.uploader.plan(decoded.len(), &key)
        };

        match result {
            Ok(reference) => {
                tracing::debug!(
                    record_id = %record_id,
                    field = %field,
                    digest = %decoded.digest().short(),
                    size = decoded.len(),
                    "Field migrated"
                );
                FieldOutcome::migrated(field, reference)
            }
            Err(err) => {
                tracing::error!(
                    record_id = %record_id,
                    field = %field,
                    reason = err.reason(),
                    "Upload failed: {}",
                    err
                );
                FieldOutcome::error(field, ErrorReason::Upload(err))
            }
        }
    }
}
