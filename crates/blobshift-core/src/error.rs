//! Error types for the migration pipeline
//!
//! Only setup failures surface as errors. Per-field problems are
//! outcomes (see [`crate::types::FieldStatus`]), never errors.

use crate::types::RunId;
use blobshift_store::{BlobStoreError, StoreError};

/// Fatal pipeline error: the run aborts before any record is processed
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Configuration missing or invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Record store unreachable or credential rejected
    #[error("record store unavailable: {0}")]
    RecordStoreUnavailable(#[source] StoreError),

    /// Blob store unreachable, credential rejected or bucket missing
    #[error("blob store unavailable: {0}")]
    BlobStoreUnavailable(#[source] BlobStoreError),

    /// Backend client could not be constructed
    #[error("client setup failed: {0}")]
    Client(String),

    /// Outcome aggregator stopped unexpectedly; the run's counts are lost
    #[error("outcome aggregator failed for run {run_id}: {message}")]
    Aggregator { run_id: RunId, message: String },
}

impl MigrationError {
    /// Check if error happened before any record was touched
    #[inline]
    #[must_use]
    pub fn is_setup(&self) -> bool {
        !matches!(self, Self::Aggregator { .. })
    }

    /// Run the error belongs to, once a run has started
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> Option<RunId> {
        match self {
            Self::Aggregator { run_id, .. } => Some(*run_id),
            _ => None,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Required variable not set
    #[error("missing required setting {0}")]
    Missing(&'static str),

    /// Variable set but unusable
    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}
