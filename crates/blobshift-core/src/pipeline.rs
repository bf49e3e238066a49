//! Migration pipeline
//!
//! Preflight, then one pass over the scan with a bounded worker pool:
//!
//! 1. Check access to both stores; any failure aborts before the scan.
//! 2. Pull records while permits are available and no stop was requested.
//! 3. Per record: migrate its present fields concurrently, then one write.
//! 4. Drain in-flight records and hand back the aggregated [`Summary`].

use crate::aggregator::{AggregatorHandle, AggregatorMessage, AggregatorSender, OutcomeAggregator};
use crate::cancel::CancellationToken;
use crate::config::{MigrationConfig, MigrationMode};
use crate::error::MigrationError;
use crate::migrator::FieldMigrator;
use crate::scanner::RecordScanner;
use crate::types::{RecordReport, RunId, Summary};
use crate::updater::RecordUpdater;
use crate::uploader::BlobUploader;
use blobshift_store::{BlobStore, FieldName, Record, RecordStore};
use futures::future::join_all;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

/// Migrator and updater for one record, cloned into each worker
#[derive(Debug, Clone)]
struct RecordWorker {
    migrator: FieldMigrator,
    updater: RecordUpdater,
}

impl RecordWorker {
    /// Migrate every present field concurrently, then write once.
    ///
    /// Absent columns produce no outcome; blank ones are examined and
    /// skipped.
    async fn process(&self, record: Record) -> RecordReport {
        let current = &record;
        let migrations = FieldName::ALL
            .into_iter()
            .filter(move |field| current.field(*field).is_present())
            .map(move |field| {
                self.migrator
                    .migrate(&current.id, field, current.field(field))
            });
        let outcomes = join_all(migrations).await;

        self.updater
            .apply(&record, outcomes)
            .await
            .into_report(&record)
    }
}

/// End-to-end migration over a record store and a blob store
pub struct MigrationPipeline {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    scanner: RecordScanner,
    worker: RecordWorker,
    mode: MigrationMode,
    concurrency: usize,
    limit: Option<usize>,
}

impl MigrationPipeline {
    /// Wire the pipeline stages from a configuration
    #[must_use]
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        config: &MigrationConfig,
    ) -> Self {
        let uploader = BlobUploader::new(
            Arc::clone(&blobs),
            config.max_payload_bytes,
            config.key_prefix.clone(),
        );
        let worker = RecordWorker {
            migrator: FieldMigrator::new(uploader, config.mode),
            updater: RecordUpdater::new(Arc::clone(&records), config.mode),
        };

        Self {
            scanner: RecordScanner::new(Arc::clone(&records)),
            records,
            blobs,
            worker,
            mode: config.mode,
            concurrency: config.concurrency.max(1),
            limit: None,
        }
    }

    /// Stop dispatch after `limit` records
    #[inline]
    #[must_use]
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Verify both stores accept our credential
    ///
    /// # Errors
    /// Returns the matching `*Unavailable` variant for the first store that fails
    pub async fn preflight(&self) -> Result<(), MigrationError> {
        self.records
            .check_access()
            .await
            .map_err(MigrationError::RecordStoreUnavailable)?;
        self.blobs
            .check_access()
            .await
            .map_err(MigrationError::BlobStoreUnavailable)?;
        Ok(())
    }

    /// Run one full pass.
    ///
    /// Per-field failures, scan failures and cancellation are all reported
    /// in the returned [`Summary`].
    ///
    /// # Errors
    /// Returns [`MigrationError`] if preflight fails (nothing was touched) or
    /// the aggregator dies
    pub async fn run(&self, cancel: CancellationToken) -> Result<Summary, MigrationError> {
        self.preflight().await?;

        let run_id = RunId::new();
        tracing::info!(
            run_id = %run_id,
            mode = %self.mode,
            concurrency = self.concurrency,
            limit = ?self.limit,
            "Migration started"
        );

        let aggregator = AggregatorHandle::spawn(OutcomeAggregator::new(run_id, self.mode));
        let sender = aggregator.sender();

        self.dispatch(&cancel, &sender).await;
        drop(sender);

        let summary = aggregator.finish().await?;
        tracing::info!(
            run_id = %summary.run_id,
            records = summary.records_scanned,
            fields = summary.fields_examined,
            migrated = summary.migrated,
            skipped = summary.skipped,
            errors = summary.errors,
            interrupted = summary.interrupted,
            "Migration finished"
        );
        Ok(summary)
    }

    /// Feed records to workers until the scan ends, the limit is hit or a
    /// stop is requested, then wait for every worker.
    async fn dispatch(&self, cancel: &CancellationToken, sender: &AggregatorSender) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut workers = JoinSet::new();
        let mut stream = self.scanner.scan();
        let mut dispatched = 0usize;

        loop {
            if self.limit.is_some_and(|limit| dispatched >= limit) {
                tracing::info!(dispatched, "Record limit reached");
                break;
            }

            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    Self::interrupted(sender).await;
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    Self::interrupted(sender).await;
                    break;
                }
                next = stream.next() => next,
            };

            let record = match next {
                None => break,
                Some(Ok(record)) => record,
                Some(Err(err)) => {
                    tracing::error!("Scan failed after {} records: {}", dispatched, err);
                    sender
                        .send(AggregatorMessage::ScanFailed(err.to_string()))
                        .await;
                    break;
                }
            };

            dispatched += 1;
            let worker = self.worker.clone();
            let task_sender = sender.clone();
            workers.spawn(async move {
                let _permit = permit;
                let report = worker.process(record).await;
                task_sender.report(report).await;
            });

            while let Some(joined) = workers.try_join_next() {
                Self::reap(joined, sender).await;
            }
        }

        drop(stream);
        tracing::debug!(in_flight = workers.len(), "Draining record workers");
        while let Some(joined) = workers.join_next().await {
            Self::reap(joined, sender).await;
        }
    }

    async fn interrupted(sender: &AggregatorSender) {
        tracing::warn!("Stop requested; finishing in-flight records");
        sender.send(AggregatorMessage::Interrupted).await;
    }

    async fn reap(joined: Result<(), JoinError>, sender: &AggregatorSender) {
        if let Err(err) = joined {
            sender
                .send(AggregatorMessage::WorkerLost(err.to_string()))
                .await;
        }
    }
}

impl std::fmt::Debug for MigrationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationPipeline")
            .field("mode", &self.mode)
            .field("concurrency", &self.concurrency)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}
