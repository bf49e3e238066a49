//! Outcome aggregator
//!
//! Single owner of the run's counters. Workers never touch the
//! [`Summary`] directly; they send [`AggregatorMessage`]s to one task that
//! folds them in order of arrival.

use crate::config::MigrationMode;
use crate::error::MigrationError;
use crate::types::{
    ErrorReason, FieldFailure, FieldStatus, RecordReport, RunId, SkipReason, Summary, WriteStatus,
};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Buffered reports before workers wait on the aggregator
pub const CHANNEL_CAPACITY: usize = 256;

/// Messages folded into the summary
#[derive(Debug, Clone)]
pub enum AggregatorMessage {
    /// A record finished
    Record(RecordReport),
    /// Dispatch stopped on cancellation
    Interrupted,
    /// The scan ended on a store error
    ScanFailed(String),
    /// A record worker died before reporting
    WorkerLost(String),
}

/// Accumulates per-record reports
#[derive(Debug)]
pub struct OutcomeAggregator {
    summary: Summary,
}

impl OutcomeAggregator {
    /// Create aggregator for a run starting now
    #[must_use]
    pub fn new(run_id: RunId, mode: MigrationMode) -> Self {
        Self {
            summary: Summary::new(run_id, mode),
        }
    }

    /// Fold one record's outcomes
    pub fn record(&mut self, report: RecordReport) {
        let summary = &mut self.summary;
        summary.records_scanned += 1;

        for outcome in report.outcomes {
            summary.fields_examined += 1;
            match outcome.status {
                FieldStatus::Migrated(_) => summary.migrated += 1,
                FieldStatus::Skipped(reason) => {
                    summary.skipped += 1;
                    if reason == SkipReason::InvalidEncoding {
                        summary.skipped_invalid += 1;
                    }
                }
                FieldStatus::Error(reason) => {
                    summary.errors += 1;
                    let orphan = match &reason {
                        ErrorReason::WriteFailed { orphan, .. } => Some(orphan.clone()),
                        ErrorReason::Upload(_) => None,
                    };
                    summary.failures.push(FieldFailure {
                        record_id: report.record_id.clone(),
                        field: outcome.field,
                        reason: reason.to_string(),
                        orphan,
                    });
                }
            }
        }

        if report.write == WriteStatus::Written {
            summary.writes += 1;
        }
    }

    pub fn mark_interrupted(&mut self) {
        self.summary.interrupted = true;
    }

    /// Keep the first scan error; later ones are logged only
    pub fn record_scan_error(&mut self, message: String) {
        if self.summary.scan_error.is_none() {
            self.summary.scan_error = Some(message);
        } else {
            tracing::warn!("Additional scan error ignored: {}", message);
        }
    }

    pub fn record_lost(&mut self, message: &str) {
        tracing::error!("Record worker lost: {}", message);
        self.summary.lost_records += 1;
    }

    /// Apply one message
    pub fn handle(&mut self, message: AggregatorMessage) {
        match message {
            AggregatorMessage::Record(report) => self.record(report),
            AggregatorMessage::Interrupted => self.mark_interrupted(),
            AggregatorMessage::ScanFailed(message) => self.record_scan_error(message),
            AggregatorMessage::WorkerLost(message) => self.record_lost(&message),
        }
    }

    /// Snapshot of the counters so far
    #[inline]
    #[must_use]
    pub fn current(&self) -> &Summary {
        &self.summary
    }

    /// Close the run and return the final summary
    #[must_use]
    pub fn summary(mut self) -> Summary {
        self.summary.finished_at = Some(Utc::now());
        self.summary
    }
}

/// Cloneable sending side handed to workers
#[derive(Debug, Clone)]
pub struct AggregatorSender {
    sender: mpsc::Sender<AggregatorMessage>,
}

impl AggregatorSender {
    /// Send a message, waiting for channel capacity.
    ///
    /// A closed channel means the aggregator is gone; the message is dropped
    /// and the loss surfaces when the handle is finished.
    pub async fn send(&self, message: AggregatorMessage) {
        if self.sender.send(message).await.is_err() {
            tracing::error!("Outcome aggregator closed; report dropped");
        }
    }

    pub async fn report(&self, report: RecordReport) {
        self.send(AggregatorMessage::Record(report)).await;
    }
}

/// Owns the aggregator task
#[derive(Debug)]
pub struct AggregatorHandle {
    run_id: RunId,
    sender: mpsc::Sender<AggregatorMessage>,
    task: JoinHandle<Summary>,
}

impl AggregatorHandle {
    /// Spawn the aggregator on the current runtime
    #[must_use]
    pub fn spawn(aggregator: OutcomeAggregator) -> Self {
        let run_id = aggregator.summary.run_id;
        let (sender, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(aggregator_task(aggregator, rx));
        Self {
            run_id,
            sender,
            task,
        }
    }

    #[inline]
    #[must_use]
    pub fn sender(&self) -> AggregatorSender {
        AggregatorSender {
            sender: self.sender.clone(),
        }
    }

    /// Close the channel and wait for the final summary.
    ///
    /// Returns once every outstanding [`AggregatorSender`] is dropped.
    ///
    /// # Errors
    /// Returns [`MigrationError::Aggregator`] if the task panicked
    pub async fn finish(self) -> Result<Summary, MigrationError> {
        drop(self.sender);
        self.task.await.map_err(|err| MigrationError::Aggregator {
            run_id: self.run_id,
            message: err.to_string(),
        })
    }
}

async fn aggregator_task(
    mut aggregator: OutcomeAggregator,
    mut rx: mpsc::Receiver<AggregatorMessage>,
) -> Summary {
    while let Some(message) = rx.recv().await {
        aggregator.handle(message);
    }
    aggregator.summary()
}
