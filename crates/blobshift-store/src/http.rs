//! HTTP backends
//!
//! - [`RestRecordStore`]: PostgREST-style table endpoint (`/rest/v1/<table>`)
//! - [`HttpBlobStore`]: object-storage API (`/storage/v1/object/<bucket>/<key>`)
//!
//! Both authenticate with the same service credential, sent as `apikey`
//! and as a bearer token.

use crate::blob::{BlobKey, BlobStore, Reference};
use crate::error::{BlobStoreError, StoreError};
use crate::record::{Record, RecordId, RecordPatch, RecordStore};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Default page size for scans
pub const DEFAULT_PAGE_SIZE: usize = 200;

/// Build the shared HTTP client
///
/// # Errors
/// Returns error if the TLS backend cannot be initialized
pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("blobshift/", env!("CARGO_PKG_VERSION")))
        .build()
}

fn authorize(request: RequestBuilder, api_key: &str) -> RequestBuilder {
    request.header("apikey", api_key).bearer_auth(api_key)
}

async fn error_body(response: Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {e}>"))
}

/// Row shape returned by the table endpoint
#[derive(Debug, Deserialize)]
struct RecordRow {
    id: serde_json::Value,
    #[serde(rename = "beforeRef", default)]
    before_ref: Option<String>,
    #[serde(rename = "afterRef", default)]
    after_ref: Option<String>,
}

impl RecordRow {
    fn into_record(self) -> Result<Record, StoreError> {
        let id = match self.id {
            serde_json::Value::String(id) => id,
            serde_json::Value::Number(id) => id.to_string(),
            other => {
                return Err(StoreError::Decode(format!(
                    "unsupported record id: {other}"
                )))
            }
        };
        Ok(Record::from_raw(id, self.before_ref, self.after_ref))
    }
}

/// Record store speaking the PostgREST dialect
#[derive(Debug, Clone)]
pub struct RestRecordStore {
    client: Client,
    base_url: String,
    api_key: String,
    table: String,
    page_size: usize,
}

impl RestRecordStore {
    /// Create store for `table` under `base_url`
    #[must_use]
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            table: table.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// With scan page size
    #[inline]
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn select_columns() -> String {
        format!(
            "id,{},{}",
            crate::FieldName::BeforeRef,
            crate::FieldName::AfterRef
        )
    }

    /// Non-empty in at least one column; `neq.` also excludes NULL
    fn candidate_filter() -> String {
        format!(
            "({}.neq.,{}.neq.)",
            crate::FieldName::BeforeRef,
            crate::FieldName::AfterRef
        )
    }

    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = error_body(response).await;
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthorized(message),
            _ => StoreError::Request {
                status: status.as_u16(),
                message,
            },
        })
    }

    async fn fetch_page(&self, offset: usize) -> Result<Vec<Record>, StoreError> {
        tracing::debug!(table = %self.table, offset, limit = self.page_size, "Fetching record page");

        let request = self.client.get(self.table_url()).query(&[
            ("select", Self::select_columns()),
            ("or", Self::candidate_filter()),
            ("order", "id.asc".to_string()),
            ("limit", self.page_size.to_string()),
            ("offset", offset.to_string()),
        ]);
        let response = Self::check(authorize(request, &self.api_key).send().await?).await?;
        let rows: Vec<RecordRow> = response.json().await?;

        rows.into_iter().map(RecordRow::into_record).collect()
    }
}

#[async_trait]
impl RecordStore for RestRecordStore {
    fn scan(&self) -> BoxStream<'_, Result<Record, StoreError>> {
        // Offset paging is stable here: migration never empties a field,
        // so the filtered, id-ordered result set does not shift. The server
        // may cap rows below our limit, so only an empty page ends the scan.
        stream::try_unfold(Some(0usize), move |next| async move {
            let Some(offset) = next else {
                return Ok(None);
            };
            let page = self.fetch_page(offset).await?;
            let following = (!page.is_empty()).then_some(offset + page.len());
            let records = stream::iter(page.into_iter().map(Ok::<Record, StoreError>));
            Ok::<_, StoreError>(Some((records, following)))
        })
        .try_flatten()
        .boxed()
    }

    async fn update(&self, id: &RecordId, patch: &RecordPatch) -> Result<(), StoreError> {
        let request = self
            .client
            .patch(self.table_url())
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(patch);
        let response = Self::check(authorize(request, &self.api_key).send().await?).await?;

        let updated: Vec<serde_json::Value> = response.json().await?;
        if updated.is_empty() {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn check_access(&self) -> Result<(), StoreError> {
        let request = self
            .client
            .get(self.table_url())
            .query(&[("select", "id"), ("limit", "1")]);
        Self::check(authorize(request, &self.api_key).send().await?).await?;
        Ok(())
    }
}

/// Blob store speaking the object-storage API
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    client: Client,
    base_url: String,
    api_key: String,
    bucket: String,
}

impl HttpBlobStore {
    /// Create store for `bucket` under `base_url`
    #[must_use]
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            bucket: bucket.into(),
        }
    }

    fn object_url(&self, key: &BlobKey) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, key)
    }

    async fn check(response: Response) -> Result<Response, BlobStoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = error_body(response).await;
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                BlobStoreError::Unauthorized(message)
            }
            _ => BlobStoreError::Rejected {
                status: status.as_u16(),
                message,
            },
        })
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(
        &self,
        key: &BlobKey,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<Reference, BlobStoreError> {
        let request = self
            .client
            .post(self.object_url(key))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes.to_vec());
        Self::check(authorize(request, &self.api_key).send().await?).await?;

        Ok(self.reference_for(key))
    }

    fn reference_for(&self, key: &BlobKey) -> Reference {
        Reference::new(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, key
        ))
    }

    async fn check_access(&self) -> Result<(), BlobStoreError> {
        let url = format!("{}/storage/v1/bucket/{}", self.base_url, self.bucket);
        let response = authorize(self.client.get(url), &self.api_key).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(BlobStoreError::BucketNotFound(self.bucket.clone()));
        }
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FieldName, FieldValue};
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// One-connection-per-request HTTP/1.1 server answering from a closure.
    ///
    /// Every request (head plus body) is kept so tests can inspect what
    /// was sent.
    struct StubServer {
        base_url: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl StubServer {
        async fn start<F>(respond: F) -> Self
        where
            F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
        {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base_url = format!("http://{}", listener.local_addr().unwrap());
            let requests = Arc::new(Mutex::new(Vec::new()));
            let seen = Arc::clone(&requests);

            tokio::spawn(async move {
                while let Ok((mut socket, _)) = listener.accept().await {
                    let Some(request) = read_request(&mut socket).await else {
                        continue;
                    };
                    let (status, body) = respond(&request);
                    seen.lock().unwrap().push(request);

                    let response = format!(
                        "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
            });

            Self { base_url, requests }
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    async fn read_request(socket: &mut TcpStream) -> Option<String> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let head_end = loop {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
        let length = header(&head, "content-length")
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < head_end + length {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        Some(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Header value, matched case-insensitively
    fn header<'a>(request: &'a str, name: &str) -> Option<&'a str> {
        request
            .lines()
            .skip(1)
            .take_while(|line| !line.is_empty())
            .filter_map(|line| line.split_once(':'))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
            .map(|(_, value)| value.trim())
    }

    /// `offset=<n>` from the request line
    fn offset_of(request: &str) -> usize {
        let line = request.lines().next().unwrap_or_default();
        line.split(['?', '&', ' '])
            .find_map(|part| part.strip_prefix("offset="))
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    }

    fn rows(ids: std::ops::Range<usize>) -> String {
        let rows: Vec<serde_json::Value> = ids
            .map(|i| {
                serde_json::json!({
                    "id": format!("R{i}"),
                    "beforeRef": "data:image/png;base64,AA==",
                    "afterRef": null,
                })
            })
            .collect();
        serde_json::Value::Array(rows).to_string()
    }

    fn record_store(server: &StubServer) -> RestRecordStore {
        RestRecordStore::new(client(), &server.base_url, "k", "photos")
    }

    fn blob_store(server: &StubServer) -> HttpBlobStore {
        HttpBlobStore::new(client(), &server.base_url, "k", "attachments")
    }

    fn key() -> BlobKey {
        BlobKey::for_field("m", &RecordId::from("A1"), FieldName::BeforeRef, "image/jpeg")
    }

    fn client() -> Client {
        build_client(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn rows_accept_string_and_numeric_ids() {
        let rows: Vec<RecordRow> = serde_json::from_str(
            r#"[
                {"id": "A1", "beforeRef": "data:image/png;base64,AA==", "afterRef": null},
                {"id": 42, "beforeRef": "https://cdn/x.png"}
            ]"#,
        )
        .unwrap();
        let records: Vec<Record> = rows
            .into_iter()
            .map(RecordRow::into_record)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(records[0].id.as_str(), "A1");
        assert!(records[0].before_ref.is_legacy());
        assert!(records[0].after_ref.is_empty());
        assert_eq!(records[1].id.as_str(), "42");
        assert!(matches!(records[1].before_ref, FieldValue::Canonical(_)));
        assert!(records[1].after_ref.is_empty());
    }

    #[test]
    fn rows_reject_structured_ids() {
        let row: RecordRow = serde_json::from_str(r#"{"id": {"nested": 1}}"#).unwrap();
        assert!(matches!(row.into_record(), Err(StoreError::Decode(_))));
    }

    #[test]
    fn query_fragments() {
        assert_eq!(RestRecordStore::select_columns(), "id,beforeRef,afterRef");
        assert_eq!(
            RestRecordStore::candidate_filter(),
            "(beforeRef.neq.,afterRef.neq.)"
        );
    }

    #[test]
    fn urls_are_normalized() {
        let records = RestRecordStore::new(client(), "https://db.test/", "k", "photos");
        assert_eq!(records.table_url(), "https://db.test/rest/v1/photos");

        let blobs = HttpBlobStore::new(client(), "https://db.test/", "k", "attachments");
        let key = BlobKey::for_field("m", &RecordId::from("A1"), FieldName::BeforeRef, "image/jpeg");
        assert_eq!(
            blobs.object_url(&key),
            "https://db.test/storage/v1/object/attachments/m/A1/beforeRef.jpg"
        );
        assert_eq!(
            blobs.reference_for(&key).as_str(),
            "https://db.test/storage/v1/object/public/attachments/m/A1/beforeRef.jpg"
        );
    }

    #[test]
    fn page_size_never_zero() {
        let records = RestRecordStore::new(client(), "https://db.test", "k", "t").with_page_size(0);
        assert_eq!(records.page_size, 1);
    }

    #[tokio::test]
    async fn scan_pages_past_server_row_cap() {
        // Server caps every page at 2 rows although 10 were requested
        let server = StubServer::start(|request| {
            let offset = offset_of(request);
            (200, rows(offset.min(5)..(offset + 2).min(5)))
        })
        .await;
        let store = record_store(&server).with_page_size(10);

        let records: Vec<Record> = store.scan().try_collect().await.unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["R0", "R1", "R2", "R3", "R4"]);
        let offsets: Vec<usize> = server.requests().iter().map(|r| offset_of(r)).collect();
        assert_eq!(offsets, vec![0, 2, 4, 5]);
    }

    #[tokio::test]
    async fn scan_sends_filter_order_and_credentials() {
        let server = StubServer::start(|_| (200, "[]".to_string())).await;

        let records: Vec<Record> = record_store(&server).scan().try_collect().await.unwrap();

        assert!(records.is_empty());
        let request = &server.requests()[0];
        assert!(request.starts_with("GET /rest/v1/photos?"));
        assert!(request.contains("order=id.asc"));
        assert!(request.contains("limit=200"));
        assert_eq!(header(request, "apikey"), Some("k"));
        assert_eq!(header(request, "authorization"), Some("Bearer k"));
    }

    #[tokio::test]
    async fn scan_error_ends_stream_after_earlier_pages() {
        let server = StubServer::start(|request| match offset_of(request) {
            0 => (200, rows(0..2)),
            _ => (503, "unavailable".to_string()),
        })
        .await;
        let store = record_store(&server).with_page_size(2);

        let items: Vec<Result<Record, StoreError>> = store.scan().collect().await;

        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok() && items[1].is_ok());
        assert!(matches!(items[2], Err(StoreError::Request { status: 503, .. })));
    }

    #[tokio::test]
    async fn rejected_credentials_map_to_unauthorized() {
        let server = StubServer::start(|request| {
            if request.starts_with("GET /rest/") {
                (401, r#"{"message":"invalid key"}"#.to_string())
            } else {
                (403, r#"{"message":"forbidden"}"#.to_string())
            }
        })
        .await;

        let err = record_store(&server).check_access().await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(err.to_string().contains("invalid key"));

        let err = blob_store(&server).check_access().await.unwrap_err();
        assert!(matches!(err, BlobStoreError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn missing_bucket_is_reported() {
        let server = StubServer::start(|_| (404, "{}".to_string())).await;

        let err = blob_store(&server).check_access().await.unwrap_err();

        assert!(matches!(err, BlobStoreError::BucketNotFound(bucket) if bucket == "attachments"));
        assert!(server.requests()[0].starts_with("GET /storage/v1/bucket/attachments "));
    }

    #[tokio::test]
    async fn update_sends_only_patched_columns() {
        let server = StubServer::start(|_| (200, r#"[{"id":"A1"}]"#.to_string())).await;
        let mut patch = RecordPatch::new();
        patch.set(FieldName::BeforeRef, Reference::new("https://cdn/a.jpg"));

        record_store(&server)
            .update(&RecordId::from("A1"), &patch)
            .await
            .unwrap();

        let request = &server.requests()[0];
        assert!(request.starts_with("PATCH /rest/v1/photos?id=eq.A1 "));
        assert_eq!(header(request, "prefer"), Some("return=representation"));
        assert!(request.ends_with(r#"{"beforeRef":"https://cdn/a.jpg"}"#));
    }

    #[tokio::test]
    async fn update_matching_no_row_is_not_found() {
        let server = StubServer::start(|_| (200, "[]".to_string())).await;
        let mut patch = RecordPatch::new();
        patch.set(FieldName::AfterRef, Reference::new("https://cdn/b.png"));

        let err = record_store(&server)
            .update(&RecordId::from("gone"), &patch)
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::NotFound(id) if id.as_str() == "gone"));
    }

    #[tokio::test]
    async fn put_upserts_and_returns_public_reference() {
        let server =
            StubServer::start(|_| (200, r#"{"Key":"attachments/m/A1/beforeRef.jpg"}"#.to_string()))
                .await;
        let store = blob_store(&server);

        let reference = store.put(&key(), b"jpeg", "image/jpeg").await.unwrap();

        assert_eq!(reference, store.reference_for(&key()));
        let request = &server.requests()[0];
        assert!(request.starts_with("POST /storage/v1/object/attachments/m/A1/beforeRef.jpg "));
        assert_eq!(header(request, "x-upsert"), Some("true"));
        assert_eq!(header(request, "content-type"), Some("image/jpeg"));
        assert!(request.ends_with("jpeg"));
    }

    #[tokio::test]
    async fn put_rejection_keeps_status() {
        let server = StubServer::start(|_| (413, "too big".to_string())).await;

        let err = blob_store(&server)
            .put(&key(), b"jpeg", "image/jpeg")
            .await
            .unwrap_err();

        assert!(matches!(err, BlobStoreError::Rejected { status: 413, .. }));
    }
}
