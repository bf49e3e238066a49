//! Testing utilities for blobshift workspace
//!
//! Shared payload builders, seeded stores, and pipeline setup.

#![allow(missing_docs)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use blobshift_core::{MigrationConfig, MigrationPipeline};
use blobshift_store::memory::{InMemoryBlobStore, InMemoryRecordStore};
use blobshift_store::Record;
use std::sync::Arc;

/// Base URL of references issued by [`test_blob_store`]
pub const TEST_CDN: &str = "https://cdn.test";

/// JPEG SOI + APP0 marker
pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

/// PNG signature
pub const PNG_BYTES: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

pub fn data_uri(content_type: &str, bytes: &[u8]) -> String {
    format!("data:{content_type};base64,{}", STANDARD.encode(bytes))
}

pub fn jpeg_data_uri() -> String {
    data_uri("image/jpeg", JPEG_BYTES)
}

pub fn png_data_uri() -> String {
    data_uri("image/png", PNG_BYTES)
}

/// Carries the scheme marker but does not decode
pub fn corrupt_data_uri() -> String {
    "data:image/jpeg;base64,@@corrupt@@".to_string()
}

pub fn canonical_reference(path: &str) -> String {
    format!("{TEST_CDN}/existing/{path}")
}

pub fn create_record(id: &str, before_ref: Option<&str>, after_ref: Option<&str>) -> Record {
    Record::from_raw(id, before_ref.map(str::to_string), after_ref.map(str::to_string))
}

/// `count` records with two valid legacy fields each, ids `R000`, `R001`...
pub fn create_legacy_records(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            create_record(
                &format!("R{i:03}"),
                Some(&jpeg_data_uri()),
                Some(&png_data_uri()),
            )
        })
        .collect()
}

pub fn seeded_record_store(records: impl IntoIterator<Item = Record>) -> Arc<InMemoryRecordStore> {
    Arc::new(InMemoryRecordStore::with_records(records))
}

pub fn test_blob_store() -> Arc<InMemoryBlobStore> {
    Arc::new(InMemoryBlobStore::new(TEST_CDN))
}

pub fn test_config() -> MigrationConfig {
    MigrationConfig {
        store_url: "https://store.test".to_string(),
        store_key: "test-key".to_string(),
        bucket: "attachments".to_string(),
        ..MigrationConfig::default()
    }
    .with_concurrency(4)
}

pub fn setup_test_pipeline(
    records: &Arc<InMemoryRecordStore>,
    blobs: &Arc<InMemoryBlobStore>,
    config: &MigrationConfig,
) -> MigrationPipeline {
    MigrationPipeline::new(records.clone(), blobs.clone(), config)
}
