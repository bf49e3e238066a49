//! Record scanner
//!
//! Read-only, single pass. Records whose fields are all empty are dropped
//! here as well, in case a backend's filter is looser than advertised.

use blobshift_store::{Record, RecordStore, StoreError};
use futures::future;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;

/// Lazily streams candidate records from a store
#[derive(Clone)]
pub struct RecordScanner {
    store: Arc<dyn RecordStore>,
}

impl RecordScanner {
    /// Create scanner
    #[inline]
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// One pass over every record with at least one non-empty field
    pub fn scan(&self) -> BoxStream<'_, Result<Record, StoreError>> {
        self.store
            .scan()
            .filter(|item| {
                future::ready(match item {
                    Ok(record) => record.has_candidate(),
                    Err(_) => true,
                })
            })
            .boxed()
    }
}

impl std::fmt::Debug for RecordScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordScanner").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use blobshift_store::memory::InMemoryRecordStore;
    use blobshift_store::{RecordId, RecordPatch};
    use futures::stream;

    /// Backend that ignores the selection predicate
    struct Unfiltered(Vec<Record>);

    #[async_trait]
    impl RecordStore for Unfiltered {
        fn scan(&self) -> BoxStream<'_, Result<Record, StoreError>> {
            stream::iter(self.0.clone().into_iter().map(Ok)).boxed()
        }

        async fn update(&self, _: &RecordId, _: &RecordPatch) -> Result<(), StoreError> {
            Ok(())
        }

        async fn check_access(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn scan_yields_candidates_including_canonical() {
        let store = InMemoryRecordStore::with_records([
            Record::from_raw("a", Some("https://cdn/a.png".to_string()), None),
            Record::from_raw("b", None, Some("data:image/png;base64,AA==".to_string())),
        ]);
        let scanner = RecordScanner::new(Arc::new(store));

        let records: Vec<_> = scanner.scan().collect().await;

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(Result::is_ok));
    }

    #[tokio::test]
    async fn scan_drops_all_empty_records() {
        let store = Unfiltered(vec![
            Record::from_raw("a", None, Some(String::new())),
            Record::from_raw("b", Some("data:x".to_string()), None),
        ]);
        let scanner = RecordScanner::new(Arc::new(store));

        let ids: Vec<String> = scanner
            .scan()
            .map(|r| r.unwrap().id.to_string())
            .collect()
            .await;

        assert_eq!(ids, vec!["b"]);
    }

    #[tokio::test]
    async fn scan_passes_errors_through() {
        struct Broken;

        #[async_trait]
        impl RecordStore for Broken {
            fn scan(&self) -> BoxStream<'_, Result<Record, StoreError>> {
                stream::iter([Err(StoreError::Unavailable("reset".to_string()))]).boxed()
            }

            async fn update(&self, _: &RecordId, _: &RecordPatch) -> Result<(), StoreError> {
                Ok(())
            }

            async fn check_access(&self) -> Result<(), StoreError> {
                Ok(())
            }
        }

        let scanner = RecordScanner::new(Arc::new(Broken));
        let items: Vec<_> = scanner.scan().collect().await;
        assert!(matches!(items.as_slice(), [Err(StoreError::Unavailable(_))]));
    }
}
