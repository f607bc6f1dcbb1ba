//! HTTP surface.
//!
//! | Route | Purpose |
//! |---|---|
//! | `POST /api/check` | admit `{"address": ...}` |
//! | `GET /api/check` | `{"contracts": [...]}`, newest first |
//! | `GET /api/update` | refresh every stored contract |
//! | `GET /` | HTML page |
//! | `GET /contracts/table` | table rows fragment for the page |
//! | `GET /health` | liveness |
//!
//! Errors are always answered as `{"error": "<message>"}`.

use std::future::Future;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::admission::{AdmissionError, AdmissionService};
use crate::config::ServiceConfig;
use crate::provider::StreamSource;
use crate::refresh::{RefreshError, RefreshReport, RefreshService};
use crate::store::{ContractStore, StoreError};
use crate::view::{self, ContractView};

const THANKS: &str = "thanks";

// =============================================================================
// State
// =============================================================================

#[derive(Clone)]
pub struct AppState {
    admission: Arc<AdmissionService>,
    refresh: Arc<RefreshService>,
    store: Arc<dyn ContractStore>,
    base_url: Arc<str>,
    refresh_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ContractStore>,
        source: Arc<dyn StreamSource>,
        config: &ServiceConfig,
    ) -> Self {
        let admission = AdmissionService::new(
            store.clone(),
            source.clone(),
            config.expected_mint.clone(),
        );
        let refresh = RefreshService::new(store.clone(), source, config.refresh_concurrency);
        Self {
            admission: Arc::new(admission),
            refresh: Arc::new(refresh),
            store,
            base_url: Arc::from(config.base_url.as_str()),
            refresh_key: config.refresh_key.as_deref().map(Arc::from),
        }
    }

    async fn contract_views(&self) -> Result<Vec<ContractView>, StoreError> {
        let records = self.store.list_all().await?;
        Ok(records.into_iter().map(ContractView::from).collect())
    }
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("refresh key missing or wrong")]
    Forbidden,
    #[error(transparent)]
    Admission(#[from] AdmissionError),
    #[error(transparent)]
    Refresh(#[from] RefreshError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Admission(AdmissionError::InvalidAddress(_)) => StatusCode::BAD_REQUEST,
            ApiError::Admission(AdmissionError::NoValidStream) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Admission(AdmissionError::Provider(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Admission(AdmissionError::Store(_))
            | ApiError::Refresh(RefreshError::Store(_))
            | ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "Request failed");
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

// =============================================================================
// Bodies
// =============================================================================

#[derive(Deserialize, Debug)]
pub struct CheckRequest {
    pub address: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ThanksBody {
    pub thanks: String,
}

#[derive(Serialize, Debug)]
pub struct ContractsBody {
    pub contracts: Vec<ContractView>,
}

#[derive(Serialize, Debug)]
pub struct RefreshBody {
    pub thanks: String,
    pub report: RefreshReport,
}

#[derive(Deserialize, Debug, Default)]
pub struct RefreshParams {
    pub key: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

async fn check_contract(
    State(state): State<AppState>,
    body: Result<Json<CheckRequest>, JsonRejection>,
) -> Result<Json<ThanksBody>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    state.admission.admit(&request.address).await?;
    Ok(Json(ThanksBody {
        thanks: THANKS.to_string(),
    }))
}

async fn list_contracts(State(state): State<AppState>) -> Result<Json<ContractsBody>, ApiError> {
    let contracts = state.contract_views().await?;
    Ok(Json(ContractsBody { contracts }))
}

async fn update_contracts(
    State(state): State<AppState>,
    Query(params): Query<RefreshParams>,
) -> Result<Json<RefreshBody>, ApiError> {
    if let Some(expected) = &state.refresh_key {
        if params.key.as_deref() != Some(&**expected) {
            return Err(ApiError::Forbidden);
        }
    }
    let report = state.refresh.refresh_all().await?;
    Ok(Json(RefreshBody {
        thanks: THANKS.to_string(),
        report,
    }))
}

async fn page(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let contracts = state.contract_views().await?;
    let now = chrono::Utc::now().timestamp();
    Ok(Html(view::render_page(&state.base_url, &contracts, now)))
}

async fn table_fragment(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let contracts = state.contract_views().await?;
    let now = chrono::Utc::now().timestamp();
    Ok(Html(view::render_rows(&contracts, now)))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(page))
        .route("/contracts/table", get(table_fragment))
        .route("/api/check", get(list_contracts).post(check_contract))
        .route("/api/update", get(update_contracts))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::DEFAULT_EXPECTED_MINT;
    use crate::provider::MockStreamSource;
    use crate::store::{InsertOutcome, SqliteStore, StoreFuture};
    use crate::stream::{ContractRecord, RawStream};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use testresult::TestResult;

    const ADDR_A: &str = "29d2S7vB453rNYFdR5Ycwt7y9haRT5fwVwL9zTmBhfV2";
    const ADDR_B: &str = "3JF3sEqM796hk5WFqA6EtmEwJQ9quALszsfJyvXNQKy3";
    const ADDR_WRONG_MINT: &str = "4Ss5JMkXAD9Z7cktFEdrqeMuT6jGMF1pVozTyPHZ6zT4";

    fn stream(name: &str, mint: &str, withdrawn: &str) -> RawStream {
        serde_json::from_value(json!({
            "name": name,
            "mint": mint,
            "depositedAmount": "1000",
            "withdrawnAmount": withdrawn,
            "end": 4_000_000_000i64,
            "canceledAt": 0,
        }))
        .unwrap()
    }

    fn mock_source() -> Arc<MockStreamSource> {
        let mut streams = HashMap::new();
        streams.insert(ADDR_A.to_string(), stream("Alpha", DEFAULT_EXPECTED_MINT, "100"));
        streams.insert(ADDR_B.to_string(), stream("Beta", DEFAULT_EXPECTED_MINT, "0"));
        streams.insert(ADDR_WRONG_MINT.to_string(), stream("Other", "OtherMint", "0"));
        Arc::new(MockStreamSource::new(streams))
    }

    async fn serve_on_ephemeral_port(state: AppState) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state, std::future::pending()));
        format!("http://{addr}")
    }

    /// Store whose database is gone: every call fails.
    struct ClosedStore;

    impl ContractStore for ClosedStore {
        fn insert_if_absent<'a>(&'a self, _: &'a ContractRecord) -> StoreFuture<'a, InsertOutcome> {
            Box::pin(async { Err(StoreError::Database(sqlx::Error::PoolClosed)) })
        }

        fn update<'a>(&'a self, _: &'a ContractRecord) -> StoreFuture<'a, ()> {
            Box::pin(async { Err(StoreError::Database(sqlx::Error::PoolClosed)) })
        }

        fn get<'a>(&'a self, _: &'a str) -> StoreFuture<'a, Option<ContractRecord>> {
            Box::pin(async { Err(StoreError::Database(sqlx::Error::PoolClosed)) })
        }

        fn list_all(&self) -> StoreFuture<'_, Vec<ContractRecord>> {
            Box::pin(async { Err(StoreError::Database(sqlx::Error::PoolClosed)) })
        }
    }

    struct TestApp {
        url: String,
        client: reqwest::Client,
        store: Arc<SqliteStore>,
    }

    impl TestApp {
        async fn spawn(source: Arc<MockStreamSource>, refresh_key: Option<&str>) -> Self {
            let store = Arc::new(SqliteStore::in_memory().await.unwrap());
            let config = ServiceConfig {
                refresh_key: refresh_key.map(str::to_string),
                ..ServiceConfig::default()
            };
            let state = AppState::new(store.clone(), source, &config);
            Self {
                url: serve_on_ephemeral_port(state).await,
                client: reqwest::Client::new(),
                store,
            }
        }

        async fn check(&self, address: &str) -> reqwest::Response {
            self.client
                .post(format!("{}/api/check", self.url))
                .json(&json!({ "address": address }))
                .send()
                .await
                .unwrap()
        }

        async fn contracts(&self) -> Vec<Value> {
            let body: Value = self
                .client
                .get(format!("{}/api/check", self.url))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            body["contracts"].as_array().cloned().unwrap()
        }
    }

    #[tokio::test]
    async fn test_admit_then_list() -> TestResult {
        let source = mock_source();
        let app = TestApp::spawn(source.clone(), None).await;

        let response = app.check(ADDR_A).await;
        assert_eq!(response.status(), 200);
        let body: ThanksBody = response.json().await?;
        assert_eq!(body.thanks, "thanks");

        let contracts = app.contracts().await;
        assert_eq!(contracts.len(), 1);
        assert_eq!(contracts[0]["address"], ADDR_A);
        assert_eq!(contracts[0]["name"], "Alpha");
        assert_eq!(contracts[0]["remaining"], "900");
        assert_eq!(contracts[0]["closed"], false);
        Ok(())
    }

    #[tokio::test]
    async fn test_resubmission_is_acknowledged_without_lookup() -> TestResult {
        let source = mock_source();
        let app = TestApp::spawn(source.clone(), None).await;

        assert_eq!(app.check(ADDR_A).await.status(), 200);
        let response = app.check(ADDR_A).await;
        assert_eq!(response.status(), 200);
        let body: ThanksBody = response.json().await?;
        assert_eq!(body.thanks, "thanks");
        assert_eq!(source.calls(), 1);
        assert_eq!(app.store.list_all().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_wrong_mint_is_rejected() -> TestResult {
        let app = TestApp::spawn(mock_source(), None).await;

        let response = app.check(ADDR_WRONG_MINT).await;
        assert_eq!(response.status(), 422);
        let body: ErrorBody = response.json().await?;
        assert_eq!(body.error, "no valid stream found");
        assert!(app.contracts().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_address_is_bad_request() -> TestResult {
        let app = TestApp::spawn(mock_source(), None).await;

        let response = app.check("hello world").await;
        assert_eq!(response.status(), 400);
        let body: ErrorBody = response.json().await?;
        assert!(body.error.starts_with("invalid address"));
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() -> TestResult {
        let app = TestApp::spawn(mock_source(), None).await;

        let response = app
            .client
            .post(format!("{}/api/check", app.url))
            .header("content-type", "application/json")
            .body(r#"{"addr": 1}"#)
            .send()
            .await?;
        assert_eq!(response.status(), 400);
        let body: ErrorBody = response.json().await?;
        assert!(!body.error.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_provider_failure_is_bad_gateway() -> TestResult {
        let app = TestApp::spawn(Arc::new(MockStreamSource::failing()), None).await;

        let response = app.check(ADDR_A).await;
        assert_eq!(response.status(), 502);
        let body: ErrorBody = response.json().await?;
        assert!(body.error.contains("mock failure"));
        Ok(())
    }

    #[tokio::test]
    async fn test_listing_is_newest_first() -> TestResult {
        let app = TestApp::spawn(mock_source(), None).await;
        app.check(ADDR_A).await;
        app.check(ADDR_B).await;
        app.check(ADDR_A).await;

        let addresses: Vec<Value> = app
            .contracts()
            .await
            .into_iter()
            .map(|c| c["address"].clone())
            .collect();
        assert_eq!(addresses, vec![json!(ADDR_B), json!(ADDR_A)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_requires_key_when_configured() -> TestResult {
        let source = mock_source();
        let app = TestApp::spawn(source.clone(), Some("s3cret")).await;
        app.check(ADDR_A).await;
        source.set_stream(ADDR_A, stream("Alpha", DEFAULT_EXPECTED_MINT, "600"));

        for query in ["", "?key=wrong"] {
            let response = app
                .client
                .get(format!("{}/api/update{query}", app.url))
                .send()
                .await?;
            assert_eq!(response.status(), 403);
        }
        assert_eq!(app.contracts().await[0]["withdrawn_amount"], "100");

        let response = app
            .client
            .get(format!("{}/api/update?key=s3cret", app.url))
            .send()
            .await?;
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await?;
        assert_eq!(body["thanks"], "thanks");
        assert_eq!(body["report"]["updated"], 1);
        assert_eq!(body["report"]["failed"], json!([]));

        let contracts = app.contracts().await;
        assert_eq!(contracts[0]["withdrawn_amount"], "600");
        assert_eq!(contracts[0]["remaining"], "400");
        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_open_without_key() -> TestResult {
        let app = TestApp::spawn(mock_source(), None).await;
        let response = app
            .client
            .get(format!("{}/api/update", app.url))
            .send()
            .await?;
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await?;
        assert_eq!(body["report"]["total"], 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_store_failure_is_server_error() -> TestResult {
        let source = mock_source();
        let state = AppState::new(Arc::new(ClosedStore), source.clone(), &ServiceConfig::default());
        let url = serve_on_ephemeral_port(state).await;

        let response = reqwest::get(format!("{url}/api/update")).await?;
        assert_eq!(response.status(), 500);
        let body: Value = response.json().await?;
        let error = body["error"].as_str().unwrap_or_default();
        assert!(!error.is_empty());
        assert_eq!(body.as_object().map(|o| o.len()), Some(1));
        assert_eq!(source.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_page_and_fragment_render_contracts() -> TestResult {
        let app = TestApp::spawn(mock_source(), None).await;
        app.check(ADDR_B).await;

        let page = app.client.get(format!("{}/", app.url)).send().await?;
        assert_eq!(page.status(), 200);
        let html = page.text().await?;
        assert!(html.contains("<h1>Contract Management</h1>"));
        assert!(html.contains("<td>Beta</td>"));
        assert!(html.contains(r#"const BASE_URL = "";"#));

        let fragment = app
            .client
            .get(format!("{}/contracts/table", app.url))
            .send()
            .await?
            .text()
            .await?;
        assert!(fragment.starts_with("<tr"));
        assert!(fragment.contains(ADDR_B));
        assert!(!fragment.contains("<html"));
        Ok(())
    }

    #[tokio::test]
    async fn test_health() -> TestResult {
        let app = TestApp::spawn(mock_source(), None).await;
        let body: Value = app
            .client
            .get(format!("{}/health", app.url))
            .send()
            .await?
            .json()
            .await?;
        assert_eq!(body, json!({ "ok": true }));
        Ok(())
    }
}
