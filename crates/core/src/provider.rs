//! Chain data provider: looks up vesting streams through a chain indexer.
//!
//! ## Wire contract
//!
//! `GET {indexer_url}/streams/{address}` answers with the stream as a JSON
//! object, optionally wrapped as `{"data": {...}}`. A 404 or a JSON `null`
//! body means the address holds no stream. Decoding on-chain accounts is the
//! indexer's job; this module only moves JSON.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;

use crate::stream::RawStream;

// =============================================================================
// Errors
// =============================================================================

/// Errors from the chain data provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("indexer request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("indexer answered with status {0}")]
    Status(u16),
    #[error("failed to parse indexer response: {0}")]
    Parse(String),
    #[error("{0}")]
    Other(String),
}

/// Boxed future returned by [`StreamSource`] lookups.
pub type StreamLookup<'a> =
    Pin<Box<dyn Future<Output = Result<Option<RawStream>, ProviderError>> + Send + 'a>>;

// =============================================================================
// Trait: StreamSource
// =============================================================================

/// Abstraction over the chain indexer for testability.
pub trait StreamSource: Send + Sync + 'static {
    /// Fetch the stream stored at `address`, `None` if there is none.
    fn get_stream<'a>(&'a self, address: &'a str) -> StreamLookup<'a>;
}

// =============================================================================
// Production: IndexerClient
// =============================================================================

/// HTTP client for the chain indexing service.
pub struct IndexerClient {
    client: reqwest::Client,
    base_url: String,
}

impl IndexerClient {
    pub fn new(base_url: &str, http_timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .map_err(ProviderError::Http)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn stream_url(&self, address: &str) -> String {
        format!("{}/streams/{}", self.base_url, address)
    }

    async fn fetch(&self, address: &str) -> Result<Option<RawStream>, ProviderError> {
        let response = self.client.get(self.stream_url(address)).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(address, "Indexer has no stream for address");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        let body: Value = response.json().await?;
        decode_stream(body)
    }
}

impl StreamSource for IndexerClient {
    fn get_stream<'a>(&'a self, address: &'a str) -> StreamLookup<'a> {
        Box::pin(self.fetch(address))
    }
}

/// Unwrap an optional `{"data": ...}` envelope and decode the stream.
fn decode_stream(body: Value) -> Result<Option<RawStream>, ProviderError> {
    let body = match body {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };
    if body.is_null() {
        return Ok(None);
    }
    if !body.is_object() {
        return Err(ProviderError::Parse(format!(
            "expected a stream object, got {body}"
        )));
    }
    serde_json::from_value(body)
        .map(Some)
        .map_err(|e| ProviderError::Parse(e.to_string()))
}

// =============================================================================
// Mock: MockStreamSource (test / testing feature)
// =============================================================================

#[cfg(any(test, feature = "testing"))]
pub struct MockStreamSource {
    streams: parking_lot::Mutex<std::collections::HashMap<String, RawStream>>,
    failing: parking_lot::Mutex<std::collections::HashSet<String>>,
    calls: std::sync::atomic::AtomicUsize,
    /// Whether every lookup should fail.
    pub should_fail: bool,
}

#[cfg(any(test, feature = "testing"))]
impl MockStreamSource {
    pub fn new(streams: std::collections::HashMap<String, RawStream>) -> Self {
        Self {
            streams: parking_lot::Mutex::new(streams),
            failing: parking_lot::Mutex::new(std::collections::HashSet::new()),
            calls: std::sync::atomic::AtomicUsize::new(0),
            should_fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new(std::collections::HashMap::new())
        }
    }

    /// Insert or replace the stream served for `address`.
    pub fn set_stream(&self, address: &str, stream: RawStream) {
        self.streams.lock().insert(address.to_string(), stream);
    }

    /// Stop serving `address`, as if the account was closed on chain.
    pub fn remove_stream(&self, address: &str) {
        self.streams.lock().remove(address);
    }

    /// Make lookups for `address` fail.
    pub fn fail_address(&self, address: &str) {
        self.failing.lock().insert(address.to_string());
    }

    /// Number of lookups served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "testing"))]
impl StreamSource for MockStreamSource {
    fn get_stream<'a>(&'a self, address: &'a str) -> StreamLookup<'a> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.should_fail || self.failing.lock().contains(address) {
            return Box::pin(async { Err(ProviderError::Other("mock failure".to_string())) });
        }
        let stream = self.streams.lock().get(address).cloned();
        Box::pin(async move { Ok(stream) })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use serde_json::json;
    use testresult::TestResult;

    const ADDRESS: &str = "7GrUkQ4HrFvGRMz2sxM4KdHqS7z5cQ3ygPDkj5KjV3Xs";
    const STREAM_PATH: &str = "/streams/7GrUkQ4HrFvGRMz2sxM4KdHqS7z5cQ3ygPDkj5KjV3Xs";

    fn client_for(server: &Server) -> IndexerClient {
        IndexerClient::new(&server.url_str("/"), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_stream_url_trims_trailing_slash() {
        let client =
            IndexerClient::new("https://indexer.example/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.stream_url(ADDRESS),
            format!("https://indexer.example/streams/{ADDRESS}")
        );
    }

    #[tokio::test]
    async fn test_indexer_returns_stream() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", STREAM_PATH))
                .respond_with(json_encoded(json!({
                    "mint": "MintA",
                    "depositedAmount": "1000",
                    "end": 1800000000
                }))),
        );

        let stream = client_for(&server).get_stream(ADDRESS).await?;
        let stream = stream.expect("stream should be present");
        assert!(stream.has_mint("MintA"));
        assert_eq!(stream.deposited_amount, Some(json!("1000")));
        Ok(())
    }

    #[tokio::test]
    async fn test_indexer_unwraps_data_envelope() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", STREAM_PATH))
                .respond_with(json_encoded(json!({ "data": { "mint": "MintB" } }))),
        );

        let stream = client_for(&server).get_stream(ADDRESS).await?;
        assert!(stream.is_some_and(|s| s.has_mint("MintB")));
        Ok(())
    }

    #[tokio::test]
    async fn test_indexer_not_found_is_none() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", STREAM_PATH))
                .respond_with(status_code(404)),
        );

        assert!(client_for(&server).get_stream(ADDRESS).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_indexer_null_body_is_none() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", STREAM_PATH))
                .respond_with(json_encoded(json!(null))),
        );

        assert!(client_for(&server).get_stream(ADDRESS).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_indexer_server_error_is_status_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", STREAM_PATH))
                .respond_with(status_code(503)),
        );

        let result = client_for(&server).get_stream(ADDRESS).await;
        assert!(matches!(result, Err(ProviderError::Status(503))));
    }

    #[tokio::test]
    async fn test_indexer_malformed_body_is_parse_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", STREAM_PATH))
                .respond_with(json_encoded(json!([1, 2, 3]))),
        );

        let result = client_for(&server).get_stream(ADDRESS).await;
        assert!(matches!(result, Err(ProviderError::Parse(_))));
    }

    #[tokio::test]
    async fn test_mock_source_counts_and_fails() {
        let mut streams = std::collections::HashMap::new();
        streams.insert(ADDRESS.to_string(), RawStream::default());
        let source = MockStreamSource::new(streams);

        assert!(source.get_stream(ADDRESS).await.unwrap().is_some());
        assert!(source.get_stream("other").await.unwrap().is_none());
        assert_eq!(source.calls(), 2);

        source.fail_address(ADDRESS);
        assert!(source.get_stream(ADDRESS).await.is_err());

        let source = MockStreamSource::failing();
        assert!(source.get_stream(ADDRESS).await.is_err());
    }
}
