//! In-process server fixture backed by scripted sources.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use trawl_core::config::SourceSettings;
use trawl_core::net::FetchResponse;
use trawl_core::testing::{MockClientFactory, MockFilter};
use trawl_core::{
    Config, MemorySessionStore, SearchCoordinator, SourceCatalog, SourceDefinition,
};
use trawl_server::{api::create_router, state::AppState};

pub use trawl_core::testing::fixtures;

/// Test fixture with a router wired to mock network clients.
pub struct TestFixture {
    pub router: Router,
    /// Scripted network - configure source responses here.
    pub clients: MockClientFactory,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    /// Fixture with one table source `t`.
    pub fn new() -> Self {
        Self::with_sources(vec![fixtures::table_source("t")], BTreeMap::new())
    }

    pub fn with_sources(
        sources: Vec<SourceDefinition>,
        settings: BTreeMap<String, SourceSettings>,
    ) -> Self {
        let mut config = Config::default();
        config.search.request_margin_ms = 0;
        config.sources = settings;

        let catalog =
            SourceCatalog::new(sources, &config.sources).expect("Failed to build catalog");
        let clients = MockClientFactory::new();
        let coordinator = SearchCoordinator::new(
            Arc::new(catalog),
            Arc::new(MockFilter::new()),
            Arc::new(clients.clone()),
            Arc::new(MemorySessionStore::new()),
            &config.search,
        )
        .with_timeout(Duration::from_secs(5))
        .with_poll_interval(Duration::from_millis(10));

        let state = Arc::new(AppState::new(config, Arc::new(coordinator)));

        Self {
            router: create_router(state),
            clients,
        }
    }

    /// Script a results page for a table source.
    pub async fn respond_table(&self, url: &str, rows: &[(&str, &str, &str, &str)]) {
        self.clients
            .respond(url, FetchResponse::new(200, fixtures::table_page(rows)))
            .await;
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, Body::empty()).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Body::from(body.to_string()))
            .await
    }

    /// POST a raw body (for malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        self.request("POST", path, Body::from(body.to_string()))
            .await
    }

    async fn request(&self, method: &str, path: &str, body: Body) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("Content-Type", "application/json")
            .body(body)
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse { status, body, text }
    }
}
