//! blobshift core - the migration pipeline
//!
//! Rewrites legacy inline data-URI attachments into blob store references:
//! - [`RecordScanner`] streams candidate records
//! - [`FieldMigrator`] decodes and uploads one field
//! - [`RecordUpdater`] writes migrated references back, at most once per record
//! - [`OutcomeAggregator`] tallies per-field outcomes into a [`Summary`]
//! - [`MigrationPipeline`] runs all of it over a bounded worker pool
//!
//! # Example
//!
//! ```rust,ignore
//! use blobshift_core::{CancellationToken, MigrationConfig, MigrationPipeline};
//!
//! # async fn example(records: Arc<dyn RecordStore>, blobs: Arc<dyn BlobStore>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = MigrationConfig::from_env()?;
//! let pipeline = MigrationPipeline::new(records, blobs, &config);
//!
//! let summary = pipeline.run(CancellationToken::new()).await?;
//! println!("migrated {} fields", summary.migrated);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod aggregator;
pub mod cancel;
pub mod config;
pub mod error;
pub mod migrator;
pub mod pipeline;
pub mod scanner;
pub mod types;
pub mod updater;
pub mod uploader;

// Re-exports for convenience
pub use aggregator::{AggregatorHandle, AggregatorMessage, AggregatorSender, OutcomeAggregator};
pub use cancel::CancellationToken;
pub use config::{MigrationConfig, MigrationMode};
pub use error::{ConfigError, MigrationError};
pub use migrator::FieldMigrator;
pub use pipeline::MigrationPipeline;
pub use scanner::RecordScanner;
pub use types::{
    ErrorReason, FieldFailure, FieldOutcome, FieldStatus, RecordReport, RunId, SkipReason,
    Summary, WriteStatus,
};
pub use updater::{RecordUpdater, UpdateResult};
pub use uploader::{BlobUploader, UploadError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
