//! Outcome and summary types
//!
//! Every field examined yields exactly one [`FieldOutcome`]; every record
//! yields one [`RecordReport`]; the aggregator folds reports into a
//! [`Summary`].

use crate::config::MigrationMode;
use crate::uploader::UploadError;
use blobshift_store::{FieldName, RecordId, Reference};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use ulid::Ulid;

/// Identifier of one pipeline run (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RunId(pub Ulid);

impl RunId {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a field was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Null or blank
    Empty,
    /// Already canonical (or a format this tool does not own)
    NotLegacy,
    /// Carried the scheme marker but did not decode
    InvalidEncoding,
}

/// Why a well-formed legacy field could not be migrated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorReason {
    /// Blob upload failed or was refused
    Upload(UploadError),
    /// Upload succeeded but the record write failed; the blob is orphaned
    WriteFailed { orphan: Reference, message: String },
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload(err) => write!(f, "upload failed: {err}"),
            Self::WriteFailed { message, .. } => write!(f, "record write failed: {message}"),
        }
    }
}

/// Classification of one field after a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldStatus {
    /// Legacy value replaced by (or, in dry-run, plannable as) a reference
    Migrated(Reference),
    /// Left unchanged
    Skipped(SkipReason),
    /// Left unchanged after a failed attempt
    Error(ErrorReason),
}

/// Outcome for one field of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOutcome {
    pub field: FieldName,
    pub status: FieldStatus,
}

impl FieldOutcome {
    #[inline]
    #[must_use]
    pub fn migrated(field: FieldName, reference: Reference) -> Self {
        Self {
            field,
            status: FieldStatus::Migrated(reference),
        }
    }

    #[inline]
    #[must_use]
    pub fn skipped(field: FieldName, reason: SkipReason) -> Self {
        Self {
            field,
            status: FieldStatus::Skipped(reason),
        }
    }

    #[inline]
    #[must_use]
    pub fn error(field: FieldName, reason: ErrorReason) -> Self {
        Self {
            field,
            status: FieldStatus::Error(reason),
        }
    }

    /// Reference to write back, if the field migrated
    #[inline]
    #[must_use]
    pub fn new_value(&self) -> Option<&Reference> {
        match &self.status {
            FieldStatus::Migrated(reference) => Some(reference),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_migrated(&self) -> bool {
        matches!(self.status, FieldStatus::Migrated(_))
    }

    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self.status, FieldStatus::Error(_))
    }
}

/// What happened to the record write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "message")]
pub enum WriteStatus {
    /// Nothing migrated, no write issued
    NotNeeded,
    /// Patch written
    Written,
    /// Dry-run: patch built but not written
    DryRun,
    /// Store rejected the patch
    Failed(String),
}

/// Everything the aggregator learns about one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordReport {
    pub record_id: RecordId,
    pub outcomes: Vec<FieldOutcome>,
    pub write: WriteStatus,
}

/// One errored field, kept for follow-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldFailure {
    pub record_id: RecordId,
    pub field: FieldName,
    pub reason: String,
    /// Uploaded object whose reference never reached the record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orphan: Option<Reference>,
}

/// Final report of a run
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub run_id: RunId,
    pub mode: MigrationMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub records_scanned: u64,
    pub fields_examined: u64,
    pub migrated: u64,
    pub skipped: u64,
    /// Subset of `skipped`
    pub skipped_invalid: u64,
    pub errors: u64,
    pub writes: u64,
    /// Stop requested before the scan was exhausted
    pub interrupted: bool,
    /// Scan ended early on a store error
    pub scan_error: Option<String>,
    /// Record workers that died without reporting
    pub lost_records: u64,
    pub failures: Vec<FieldFailure>,
}

impl Summary {
    /// Empty summary for a run starting now
    #[must_use]
    pub fn new(run_id: RunId, mode: MigrationMode) -> Self {
        Self {
            run_id,
            mode,
            started_at: Utc::now(),
            finished_at: None,
            records_scanned: 0,
            fields_examined: 0,
            migrated: 0,
            skipped: 0,
            skipped_invalid: 0,
            errors: 0,
            writes: 0,
            interrupted: false,
            scan_error: None,
            lost_records: 0,
            failures: Vec::new(),
        }
    }

    /// `migrated + skipped + errors == fields_examined`
    #[inline]
    #[must_use]
    pub fn is_conserved(&self) -> bool {
        self.migrated + self.skipped + self.errors == self.fields_examined
    }

    /// Whether the run should exit non-zero.
    ///
    /// Invalid-encoding skips never count.
    #[inline]
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors > 0 || self.scan_error.is_some() || self.lost_records > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_new_value_only_when_migrated() {
        let migrated = FieldOutcome::migrated(FieldName::BeforeRef, Reference::new("r"));
        assert_eq!(migrated.new_value(), Some(&Reference::new("r")));
        assert!(migrated.is_migrated());

        let skipped = FieldOutcome::skipped(FieldName::AfterRef, SkipReason::Empty);
        assert_eq!(skipped.new_value(), None);

        let error = FieldOutcome::error(
            FieldName::AfterRef,
            ErrorReason::Upload(UploadError::TooLarge { size: 2, limit: 1 }),
        );
        assert!(error.is_error());
        assert_eq!(error.new_value(), None);
    }

    #[test]
    fn summary_conservation_and_errors() {
        let mut summary = Summary::new(RunId::new(), MigrationMode::Apply);
        summary.fields_examined = 4;
        summary.migrated = 1;
        summary.skipped = 3;
        summary.skipped_invalid = 2;
        assert!(summary.is_conserved());
        assert!(!summary.has_errors());

        summary.scan_error = Some("connection reset".to_string());
        assert!(summary.has_errors());
    }

    #[test]
    fn error_reason_display() {
        let reason = ErrorReason::WriteFailed {
            orphan: Reference::new("https://cdn/x"),
            message: "503".to_string(),
        };
        assert_eq!(reason.to_string(), "record write failed: 503");
    }

    #[test]
    fn write_status_serializes_tagged() {
        let json = serde_json::to_value(WriteStatus::Failed("boom".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "failed", "message": "boom" }));
    }
}
