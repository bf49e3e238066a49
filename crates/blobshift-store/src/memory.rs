//! In-process backends
//!
//! Both stores support failure injection so callers can exercise upload
//! failures, rejected writes and rejected credentials without a network.

use crate::blob::{BlobKey, BlobStore, Reference};
use crate::error::{BlobStoreError, StoreError};
use crate::record::{Record, RecordId, RecordPatch, RecordStore};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Record store backed by a concurrent map
#[derive(Debug)]
pub struct InMemoryRecordStore {
    records: DashMap<RecordId, Record>,
    writes: AtomicUsize,
    fail_all_writes: AtomicBool,
    fail_writes_for: DashSet<RecordId>,
    deny_access: AtomicBool,
    /// `usize::MAX` means the scan never fails
    fail_scan_after: AtomicUsize,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self {
            records: DashMap::new(),
            writes: AtomicUsize::new(0),
            fail_all_writes: AtomicBool::new(false),
            fail_writes_for: DashSet::new(),
            deny_access: AtomicBool::new(false),
            fail_scan_after: AtomicUsize::new(usize::MAX),
        }
    }
}

impl InMemoryRecordStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create store seeded with records
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Insert or replace a record
    pub fn insert(&self, record: Record) {
        self.records.insert(record.id.clone(), record);
    }

    /// Current state of a record
    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<Record> {
        self.records.get(id).map(|entry| entry.value().clone())
    }

    /// Number of successful updates applied
    #[inline]
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Acquire)
    }

    /// Make every subsequent update fail
    pub fn fail_all_writes(&self, fail: bool) {
        self.fail_all_writes.store(fail, Ordering::Release);
    }

    /// Make updates to one record fail
    pub fn fail_writes_for(&self, id: impl Into<RecordId>) {
        self.fail_writes_for.insert(id.into());
    }

    /// Reject the access check
    pub fn deny_access(&self, deny: bool) {
        self.deny_access.store(deny, Ordering::Release);
    }

    /// End every scan with a connection error after `count` records
    pub fn fail_scan_after(&self, count: usize) {
        self.fail_scan_after.store(count, Ordering::Release);
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    fn scan(&self) -> BoxStream<'_, Result<Record, StoreError>> {
        let mut snapshot: Vec<Record> = self
            .records
            .iter()
            .filter(|entry| entry.value().has_candidate())
            .map(|entry| entry.value().clone())
            .collect();
        snapshot.sort_by(|a, b| a.id.cmp(&b.id));

        let fail_after = self.fail_scan_after.load(Ordering::Acquire);
        if fail_after >= snapshot.len() {
            return stream::iter(snapshot.into_iter().map(Ok)).boxed();
        }

        snapshot.truncate(fail_after);
        let failure = StoreError::Unavailable("injected scan failure".to_string());
        stream::iter(
            snapshot
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(failure))),
        )
        .boxed()
    }

    async fn update(&self, id: &RecordId, patch: &RecordPatch) -> Result<(), StoreError> {
        if self.fail_all_writes.load(Ordering::Acquire) || self.fail_writes_for.contains(id) {
            return Err(StoreError::Request {
                status: 503,
                message: format!("injected write failure for {id}"),
            });
        }

        let mut entry = self
            .records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        entry.apply(patch);
        self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn check_access(&self) -> Result<(), StoreError> {
        if self.deny_access.load(Ordering::Acquire) {
            return Err(StoreError::Unauthorized("access denied".to_string()));
        }
        Ok(())
    }
}

/// Object stored by [`InMemoryBlobStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Blob store backed by a concurrent map
#[derive(Debug)]
pub struct InMemoryBlobStore {
    base_url: String,
    objects: DashMap<String, StoredObject>,
    puts: AtomicUsize,
    fail_puts: AtomicBool,
    deny_access: AtomicBool,
}

impl InMemoryBlobStore {
    /// Create store issuing references under `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: DashMap::new(),
            puts: AtomicUsize::new(0),
            fail_puts: AtomicBool::new(false),
            deny_access: AtomicBool::new(false),
        }
    }

    /// Stored object by key
    #[must_use]
    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.get(key).map(|entry| entry.value().clone())
    }

    /// Number of distinct keys stored
    #[inline]
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Number of successful puts, overwrites included
    #[inline]
    #[must_use]
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::Acquire)
    }

    /// Make every subsequent put fail
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::Release);
    }

    /// Reject the access check
    pub fn deny_access(&self, deny: bool) {
        self.deny_access.store(deny, Ordering::Release);
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new("memory://blobs")
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(
        &self,
        key: &BlobKey,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<Reference, BlobStoreError> {
        if self.fail_puts.load(Ordering::Acquire) {
            return Err(BlobStoreError::Transport(format!(
                "injected put failure for {key}"
            )));
        }

        self.objects.insert(
            key.as_str().to_string(),
            StoredObject {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        self.puts.fetch_add(1, Ordering::AcqRel);
        Ok(self.reference_for(key))
    }

    fn reference_for(&self, key: &BlobKey) -> Reference {
        Reference::new(format!("{}/{}", self.base_url, key))
    }

    async fn check_access(&self) -> Result<(), BlobStoreError> {
        if self.deny_access.load(Ordering::Acquire) {
            return Err(BlobStoreError::Unauthorized("access denied".to_string()));
        }
        Ok(())
    }
}
