//! blobshift command line
//!
//! Argument parsing, backend wiring, summary rendering and exit codes for
//! the `blobshift` binary. `main.rs` only glues these together.

#![allow(missing_docs)]

use blobshift_core::{
    ConfigError, MigrationConfig, MigrationError, MigrationMode, MigrationPipeline, Summary,
};
use blobshift_store::http::{build_client, HttpBlobStore, RestRecordStore};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

/// Every field migrated or cleanly skipped
pub const EXIT_CLEAN: i32 = 0;
/// Run completed with errored fields, a scan failure or lost records
pub const EXIT_ERRORS: i32 = 1;
/// Run aborted before any record was processed
pub const EXIT_SETUP: i32 = 2;

/// Failures listed in the text report before truncating
const MAX_LISTED_FAILURES: usize = 20;

pub fn command() -> Command {
    Command::new("blobshift")
        .version(blobshift_core::VERSION)
        .about("Migrate inline data-URI attachments into blob storage references")
        .after_help(
            "Connection settings come from BLOBSHIFT_STORE_URL, BLOBSHIFT_STORE_KEY and \
             BLOBSHIFT_BUCKET. Flags override the matching BLOBSHIFT_* variables.",
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Decode and report without uploading or writing records"),
        )
        .arg(
            Arg::new("limit")
                .long("limit")
                .value_parser(value_parser!(usize))
                .help("Stop after dispatching this many records"),
        )
        .arg(
            Arg::new("concurrency")
                .long("concurrency")
                .short('c')
                .value_parser(value_parser!(usize))
                .help("Records processed concurrently"),
        )
        .arg(
            Arg::new("max-payload-bytes")
                .long("max-payload-bytes")
                .value_parser(value_parser!(usize))
                .help("Largest decoded payload that may be uploaded"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print the summary as JSON"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines on stderr"),
        )
}

/// Parsed command-line flags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOptions {
    pub dry_run: bool,
    pub limit: Option<usize>,
    pub concurrency: Option<usize>,
    pub max_payload_bytes: Option<usize>,
    pub json: bool,
    pub log_json: bool,
}

impl CliOptions {
    #[must_use]
    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            dry_run: matches.get_flag("dry-run"),
            limit: matches.get_one::<usize>("limit").copied(),
            concurrency: matches.get_one::<usize>("concurrency").copied(),
            max_payload_bytes: matches.get_one::<usize>("max-payload-bytes").copied(),
            json: matches.get_flag("json"),
            log_json: matches.get_flag("log-json"),
        }
    }

    /// Layer flags over an environment-loaded config
    ///
    /// # Errors
    /// Returns [`ConfigError`] if an override makes the config invalid
    pub fn apply(&self, mut config: MigrationConfig) -> Result<MigrationConfig, ConfigError> {
        if self.dry_run {
            config = config.with_mode(MigrationMode::DryRun);
        }
        if let Some(concurrency) = self.concurrency {
            config = config.with_concurrency(concurrency);
        }
        if let Some(max) = self.max_payload_bytes {
            config = config.with_max_payload_bytes(max);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Wire the HTTP backends into a pipeline
///
/// # Errors
/// Returns [`MigrationError::Client`] if the HTTP client cannot be built
pub fn build_pipeline(config: &MigrationConfig) -> Result<MigrationPipeline, MigrationError> {
    let client = build_client(Duration::from_secs(config.http_timeout_secs))
        .map_err(|err| MigrationError::Client(err.to_string()))?;

    let records = RestRecordStore::new(
        client.clone(),
        &config.store_url,
        &config.store_key,
        &config.table,
    );
    let blobs = HttpBlobStore::new(client, &config.store_url, &config.store_key, &config.bucket);

    Ok(MigrationPipeline::new(Arc::new(records), Arc::new(blobs), config))
}

/// Exit status for a finished run
#[inline]
#[must_use]
pub fn exit_code(summary: &Summary) -> i32 {
    if summary.has_errors() {
        EXIT_ERRORS
    } else {
        EXIT_CLEAN
    }
}

/// Human-readable report
#[must_use]
pub fn render_text(summary: &Summary) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "blobshift run {} ({})", summary.run_id, summary.mode);
    if summary.interrupted {
        let _ = writeln!(out, "  INTERRUPTED: stop requested, remaining records not processed");
    }
    if let Some(err) = &summary.scan_error {
        let _ = writeln!(out, "  SCAN FAILED: {err}");
    }
    let _ = writeln!(out, "  records scanned: {}", summary.records_scanned);
    let _ = writeln!(out, "  fields examined: {}", summary.fields_examined);
    let _ = writeln!(out, "  migrated:        {}", summary.migrated);
    let _ = writeln!(
        out,
        "  skipped:         {} ({} invalid encoding)",
        summary.skipped, summary.skipped_invalid
    );
    let _ = writeln!(out, "  error:           {}", summary.errors);
    let _ = writeln!(out, "  records written: {}", summary.writes);
    if summary.lost_records > 0 {
        let _ = writeln!(out, "  records lost:    {}", summary.lost_records);
    }
    if let Some(finished) = summary.finished_at {
        let elapsed = finished - summary.started_at;
        let _ = writeln!(out, "  elapsed:         {}ms", elapsed.num_milliseconds());
    }

    if !summary.failures.is_empty() {
        let _ = writeln!(out, "failures:");
        for failure in summary.failures.iter().take(MAX_LISTED_FAILURES) {
            let _ = write!(out, "  {} {}: {}", failure.record_id, failure.field, failure.reason);
            if let Some(orphan) = &failure.orphan {
                let _ = write!(out, " (orphaned {orphan})");
            }
            out.push('\n');
        }
        if summary.failures.len() > MAX_LISTED_FAILURES {
            let _ = writeln!(
                out,
                "  ... {} more (use --json for the full list)",
                summary.failures.len() - MAX_LISTED_FAILURES
            );
        }
    }

    out
}

/// Minimal report for a run that ended without a summary.
///
/// Printed where the summary would have gone so stdout always carries a
/// report.
#[must_use]
pub fn render_failure(err: &MigrationError, mode: MigrationMode, json: bool) -> String {
    let run_id = err
        .run_id()
        .map_or_else(|| "unknown".to_string(), |id| id.to_string());

    if json {
        let report = serde_json::json!({
            "run_id": run_id,
            "mode": mode,
            "error": err.to_string(),
        });
        return format!("{report:#}\n");
    }

    let mut out = String::new();
    let _ = writeln!(out, "blobshift run {run_id} ({mode})");
    let _ = writeln!(out, "  FAILED: {err}");
    let _ = writeln!(out, "  counts unavailable; see logs for per-record outcomes");
    out
}

/// Machine-readable report
///
/// # Errors
/// Returns error if serialization fails
pub fn render_json(summary: &Summary) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(summary)
}
