//! Record updater
//!
//! Issues at most one write per record, carrying only migrated fields.

use crate::config::MigrationMode;
use crate::types::{ErrorReason, FieldOutcome, FieldStatus, RecordReport, WriteStatus};
use blobshift_store::{Record, RecordPatch, RecordStore};
use std::sync::Arc;

/// Final field outcomes plus what happened to the write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateResult {
    pub outcomes: Vec<FieldOutcome>,
    pub write: WriteStatus,
}

impl UpdateResult {
    /// Attach the record id for the aggregator
    #[inline]
    #[must_use]
    pub fn into_report(self, record: &Record) -> RecordReport {
        RecordReport {
            record_id: record.id.clone(),
            outcomes: self.outcomes,
            write: self.write,
        }
    }
}

/// Commits canonical references back to records
#[derive(Clone)]
pub struct RecordUpdater {
    store: Arc<dyn RecordStore>,
    mode: MigrationMode,
}

impl RecordUpdater {
    /// Create updater
    #[inline]
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, mode: MigrationMode) -> Self {
        Self { store, mode }
    }

    /// Write migrated fields back to `record`.
    ///
    /// A failed write turns every patched field into an error; the blobs
    /// already uploaded for them stay behind as orphans.
    pub async fn apply(&self, record: &Record, outcomes: Vec<FieldOutcome>) -> UpdateResult {
        let mut patch = RecordPatch::new();
        for outcome in &outcomes {
            if let Some(reference) = outcome.new_value() {
                patch.set(outcome.field, reference.clone());
            }
        }

        if patch.is_empty() {
            return UpdateResult {
                outcomes,
                write: WriteStatus::NotNeeded,
            };
        }

        if !self.mode.is_apply() {
            tracing::debug!(record_id = %record.id, fields = patch.len(), "Dry-run: write skipped");
            return UpdateResult {
                outcomes,
                write: WriteStatus::DryRun,
            };
        }

        match self.store.update(&record.id, &patch).await {
            Ok(()) => {
                tracing::debug!(record_id = %record.id, fields = patch.len(), "Record updated");
                UpdateResult {
                    outcomes,
                    write: WriteStatus::Written,
                }
            }
            Err(err) => {
                let message = err.to_string();
                tracing::error!(record_id = %record.id, "Record write failed: {}", message);

                let outcomes = outcomes
                    .into_iter()
                    .map(|outcome| match outcome.status {
                        FieldStatus::Migrated(orphan) => {
                            tracing::warn!(
                                record_id = %record.id,
                                field = %outcome.field,
                                orphan = %orphan,
                                "Uploaded blob left orphaned"
                            );
                            FieldOutcome::error(
                                outcome.field,
                                ErrorReason::WriteFailed {
                                    orphan,
                                    message: message.clone(),
                                },
                            )
                        }
                        _ => outcome,
                    })
                    .collect();

                UpdateResult {
                    outcomes,
                    write: WriteStatus::Failed(message),
                }
            }
        }
    }
}

impl std::fmt::Debug for RecordUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordUpdater")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SkipReason;
    use blobshift_store::memory::InMemoryRecordStore;
    use blobshift_store::{FieldName, FieldValue, RecordId, Reference};
    use pretty_assertions::assert_eq;

    fn record() -> Record {
        Record::from_raw(
            "A1",
            Some("data:image/jpeg;base64,/9j/4AAQ".to_string()),
            Some("data:image/jpeg;base64,@@".to_string()),
        )
    }

    fn outcomes() -> Vec<FieldOutcome> {
        vec![
            FieldOutcome::migrated(FieldName::BeforeRef, Reference::new("https://cdn/A1/b")),
            FieldOutcome::skipped(FieldName::AfterRef, SkipReason::InvalidEncoding),
        ]
    }

    #[tokio::test]
    async fn writes_only_migrated_fields() {
        let store = Arc::new(InMemoryRecordStore::with_records([record()]));
        let updater = RecordUpdater::new(store.clone(), MigrationMode::Apply);

        let result = updater.apply(&record(), outcomes()).await;

        assert_eq!(result.write, WriteStatus::Written);
        assert_eq!(result.outcomes, outcomes());
        let stored = store.get(&RecordId::from("A1")).unwrap();
        assert_eq!(
            stored.before_ref,
            FieldValue::Canonical("https://cdn/A1/b".to_string())
        );
        assert_eq!(stored.after_ref, record().after_ref);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn empty_patch_issues_no_write() {
        let store = Arc::new(InMemoryRecordStore::with_records([record()]));
        let updater = RecordUpdater::new(store.clone(), MigrationMode::Apply);
        let skipped = vec![
            FieldOutcome::skipped(FieldName::BeforeRef, SkipReason::NotLegacy),
            FieldOutcome::skipped(FieldName::AfterRef, SkipReason::Empty),
        ];

        let result = updater.apply(&record(), skipped.clone()).await;

        assert_eq!(result.write, WriteStatus::NotNeeded);
        assert_eq!(result.outcomes, skipped);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn failed_write_reclassifies_migrated_fields() {
        let store = Arc::new(InMemoryRecordStore::with_records([record()]));
        store.fail_writes_for("A1");
        let updater = RecordUpdater::new(store.clone(), MigrationMode::Apply);

        let result = updater.apply(&record(), outcomes()).await;

        assert!(matches!(result.write, WriteStatus::Failed(_)));
        assert!(matches!(
            &result.outcomes[0].status,
            FieldStatus::Error(ErrorReason::WriteFailed { orphan, .. })
                if orphan.as_str() == "https://cdn/A1/b"
        ));
        // Skips stay skips
        assert_eq!(
            result.outcomes[1].status,
            FieldStatus::Skipped(SkipReason::InvalidEncoding)
        );
        assert_eq!(store.get(&RecordId::from("A1")).unwrap(), record());
    }

    #[tokio::test]
    async fn dry_run_never_writes() {
        let store = Arc::new(InMemoryRecordStore::with_records([record()]));
        let updater = RecordUpdater::new(store.clone(), MigrationMode::DryRun);

        let result = updater.apply(&record(), outcomes()).await;

        assert_eq!(result.write, WriteStatus::DryRun);
        assert_eq!(store.write_count(), 0);
        assert_eq!(store.get(&RecordId::from("A1")).unwrap(), record());
    }
}
