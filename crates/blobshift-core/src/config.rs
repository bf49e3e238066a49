//! Migration configuration
//!
//! Loaded from `BLOBSHIFT_*` environment variables; CLI flags override
//! individual values through the builder methods.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ENV_STORE_URL: &str = "BLOBSHIFT_STORE_URL";
pub const ENV_STORE_KEY: &str = "BLOBSHIFT_STORE_KEY";
pub const ENV_BUCKET: &str = "BLOBSHIFT_BUCKET";
pub const ENV_MAX_PAYLOAD_BYTES: &str = "BLOBSHIFT_MAX_PAYLOAD_BYTES";
pub const ENV_TABLE: &str = "BLOBSHIFT_TABLE";
pub const ENV_KEY_PREFIX: &str = "BLOBSHIFT_KEY_PREFIX";
pub const ENV_CONCURRENCY: &str = "BLOBSHIFT_CONCURRENCY";
pub const ENV_DRY_RUN: &str = "BLOBSHIFT_DRY_RUN";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "BLOBSHIFT_HTTP_TIMEOUT_SECS";

/// 10 MiB
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Whether the run may write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationMode {
    /// Upload and rewrite records
    #[default]
    Apply,
    /// Decode and plan only; no upload, no record write
    DryRun,
}

impl MigrationMode {
    #[inline]
    #[must_use]
    pub const fn is_apply(self) -> bool {
        matches!(self, MigrationMode::Apply)
    }

    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MigrationMode::Apply => "apply",
            MigrationMode::DryRun => "dry-run",
        }
    }
}

impl fmt::Display for MigrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Migration configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Record/blob store base URL
    pub store_url: String,
    /// Service credential
    #[serde(skip_serializing, default)]
    pub store_key: String,
    /// Destination bucket
    pub bucket: String,
    /// Uploads above this size fail with `too_large`
    pub max_payload_bytes: usize,
    /// Table holding the records
    pub table: String,
    /// Prefix for every object key
    pub key_prefix: String,
    /// Records processed concurrently
    pub concurrency: usize,
    /// Apply or dry-run
    pub mode: MigrationMode,
    /// Per-request HTTP timeout
    pub http_timeout_secs: u64,
}

impl MigrationConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from the process environment
    ///
    /// # Errors
    /// Returns [`ConfigError`] if a required variable is missing or a value
    /// does not parse
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through an arbitrary variable lookup
    ///
    /// # Errors
    /// Returns [`ConfigError`] if a required variable is missing or a value
    /// does not parse
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let defaults = Self::default();
        let config = Self {
            store_url: required(ENV_STORE_URL)?,
            store_key: required(ENV_STORE_KEY)?,
            bucket: required(ENV_BUCKET)?,
            max_payload_bytes: parse_or(
                ENV_MAX_PAYLOAD_BYTES,
                get(ENV_MAX_PAYLOAD_BYTES),
                defaults.max_payload_bytes,
            )?,
            table: get(ENV_TABLE).unwrap_or(defaults.table),
            key_prefix: get(ENV_KEY_PREFIX).unwrap_or(defaults.key_prefix),
            concurrency: parse_or(ENV_CONCURRENCY, get(ENV_CONCURRENCY), defaults.concurrency)?,
            mode: if parse_flag(ENV_DRY_RUN, get(ENV_DRY_RUN))? {
                MigrationMode::DryRun
            } else {
                MigrationMode::Apply
            },
            http_timeout_secs: parse_or(
                ENV_HTTP_TIMEOUT_SECS,
                get(ENV_HTTP_TIMEOUT_SECS),
                defaults.http_timeout_secs,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for zero concurrency, zero payload
    /// limit or a non-http(s) store URL
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: ENV_CONCURRENCY,
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_payload_bytes == 0 {
            return Err(ConfigError::Invalid {
                name: ENV_MAX_PAYLOAD_BYTES,
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.store_url.starts_with("http://") || self.store_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                name: ENV_STORE_URL,
                value: self.store_url.clone(),
                reason: "expected an http(s) URL".to_string(),
            });
        }
        Ok(())
    }

    /// With concurrency
    #[inline]
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// With mode
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: MigrationMode) -> Self {
        self.mode = mode;
        self
    }

    /// With payload ceiling
    #[inline]
    #[must_use]
    pub fn with_max_payload_bytes(mut self, max: usize) -> Self {
        self.max_payload_bytes = max;
        self
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            store_url: String::new(),
            store_key: String::new(),
            bucket: String::new(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            table: "records".to_string(),
            key_prefix: "migrated".to_string(),
            concurrency: 8,
            mode: MigrationMode::Apply,
            http_timeout_secs: 30,
        }
    }
}

impl fmt::Debug for MigrationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationConfig")
            .field("store_url", &self.store_url)
            .field("store_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("max_payload_bytes", &self.max_payload_bytes)
            .field("table", &self.table)
            .field("key_prefix", &self.key_prefix)
            .field("concurrency", &self.concurrency)
            .field("mode", &self.mode)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

fn parse_or<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => match value.trim().parse() {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(ConfigError::Invalid {
                name,
                reason: e.to_string(),
                value,
            }),
        },
    }
}

fn parse_flag(name: &'static str, raw: Option<String>) -> Result<bool, ConfigError> {
    match raw.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(ConfigError::Invalid {
            name,
            value: v,
            reason: "expected a boolean".to_string(),
        }),
    }
}
