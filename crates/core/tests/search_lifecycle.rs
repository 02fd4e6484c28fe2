//! Search lifecycle integration tests.
//!
//! These tests drive the coordinator end to end against scripted sources:
//! dispatch -> per-source workers -> aggregation -> global pass.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use trawl_core::catalog::Credentials;
use trawl_core::net::FetchResponse;
use trawl_core::searcher::{Deadline, SourceWorker, WorkerSettings};
use trawl_core::testing::{fixtures, MockClientFactory, MockFilter, RecordingProgress};
use trawl_core::{
    ContentKind, MemorySessionStore, NetworkClient, SearchConfig, SearchCoordinator, SearchError,
    SearchRequest, SessionStore, SourceCatalog, SourceDefinition, SqliteSessionStore,
};

/// Test helper wiring a coordinator to mocks.
struct TestHarness {
    clients: MockClientFactory,
    filter: Arc<MockFilter>,
    sessions: Arc<dyn SessionStore>,
    progress: Arc<RecordingProgress>,
    config: SearchConfig,
}

impl TestHarness {
    fn new() -> Self {
        Self {
            clients: MockClientFactory::new(),
            filter: Arc::new(MockFilter::new()),
            sessions: Arc::new(MemorySessionStore::new()),
            progress: Arc::new(RecordingProgress::new()),
            config: SearchConfig {
                timeout_secs: 5,
                poll_interval_ms: 10,
                request_margin_ms: 0,
                ..Default::default()
            },
        }
    }

    fn coordinator(&self, sources: Vec<SourceDefinition>) -> SearchCoordinator {
        let catalog = SourceCatalog::new(sources, &BTreeMap::new()).expect("valid catalog");
        SearchCoordinator::new(
            Arc::new(catalog),
            self.filter.clone(),
            Arc::new(self.clients.clone()),
            Arc::clone(&self.sessions),
            &self.config,
        )
        .with_progress(self.progress.clone())
    }

    async fn respond_table(&self, id: &str, rows: &[(&str, &str, &str, &str)]) {
        self.clients
            .respond(
                &format!("https://{}.example/search?q=Dune", id),
                FetchResponse::new(200, fixtures::table_page(rows)),
            )
            .await;
    }

    async fn respond_api(&self, id: &str, body: serde_json::Value) {
        self.clients
            .respond(
                &format!("https://{}.example/api/search?q=Dune", id),
                FetchResponse::new(200, body.to_string()),
            )
            .await;
    }
}

fn dune() -> SearchRequest {
    SearchRequest::general("Dune")
}

#[tokio::test]
async fn test_search_returns_within_deadline() {
    let mut harness = TestHarness::new();
    harness.config.timeout_secs = 1;
    let coordinator = harness
        .coordinator(vec![
            fixtures::table_source("fast"),
            fixtures::table_source("slow1"),
            fixtures::table_source("slow2"),
        ])
        .with_timeout(Duration::from_millis(300));

    harness
        .respond_table("fast", &[("Dune 2021", "magnet:?xt=urn:btih:f1", "1 GB", "9")])
        .await;
    for id in ["slow1", "slow2"] {
        harness
            .clients
            .delay(
                &format!("https://{}.example/search?q=Dune", id),
                Duration::from_secs(30),
            )
            .await;
    }

    let started = Instant::now();
    let outcome = coordinator.search_detailed(&dune()).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_millis(800), "took {:?}", elapsed);
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].source, "fast");
    assert_eq!(outcome.timed_out, vec!["Table slow1", "Table slow2"]);
    assert_eq!(outcome.sources_queried, 3);

    let finished = harness.progress.finished_snapshot().unwrap();
    assert_eq!(finished.pending, 2);
    assert!(!harness.progress.updates().is_empty());
}

#[tokio::test]
async fn test_all_sources_time_out_is_empty_not_error() {
    let harness = TestHarness::new();
    let coordinator = harness
        .coordinator(vec![fixtures::table_source("a"), fixtures::api_source("b")])
        .with_timeout(Duration::from_millis(150));

    for url in [
        "https://a.example/search?q=Dune",
        "https://b.example/api/search?q=Dune",
    ] {
        harness.clients.delay(url, Duration::from_secs(30)).await;
    }

    let records = coordinator.search(&dune()).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_failing_sources_do_not_affect_valid_ones() {
    let harness = TestHarness::new();
    let coordinator = harness.coordinator(vec![
        fixtures::table_source("good"),
        fixtures::table_source("down"),
        fixtures::table_source("broken"),
        fixtures::api_source("garbage"),
    ]);

    harness
        .respond_table(
            "good",
            &[
                ("Dune 2021 1080p", "magnet:?xt=urn:btih:g1", "2 GB", "30"),
                ("Dune 2021 720p", "magnet:?xt=urn:btih:g2", "1 GB", "12"),
            ],
        )
        .await;
    harness.clients.fail("https://down.example/search?q=Dune").await;
    harness
        .clients
        .respond(
            "https://broken.example/search?q=Dune",
            FetchResponse::new(500, "Internal Server Error"),
        )
        .await;
    harness
        .clients
        .respond(
            "https://garbage.example/api/search?q=Dune",
            FetchResponse::new(200, "<html>not json</html>"),
        )
        .await;

    let outcome = coordinator.search_detailed(&dune()).await.unwrap();

    assert!(outcome.timed_out.is_empty());
    let names: Vec<&str> = outcome.records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Dune 2021 1080p", "Dune 2021 720p"]);
}

#[tokio::test]
async fn test_per_source_truncation_keeps_top_seeded() {
    let mut harness = TestHarness::new();
    harness.config.max_results = 2;
    let coordinator = harness.coordinator(vec![fixtures::api_source("a")]);

    harness
        .respond_api(
            "a",
            serde_json::json!({"data": {"results": [
                {"title": "Dune low", "link": "magnet:?xt=urn:btih:l", "seeds": 5},
                {"title": "Dune high", "link": "magnet:?xt=urn:btih:h", "seeds": 50},
                {"title": "Dune tiny", "link": "magnet:?xt=urn:btih:t", "seeds": 1}
            ]}}),
        )
        .await;

    let records = coordinator.search(&dune()).await.unwrap();
    let seeds: Vec<u32> = records.iter().map(|r| r.seeds).collect();
    assert_eq!(seeds, vec![50, 5]);
}

#[tokio::test]
async fn test_disable_max_keeps_everything() {
    let mut harness = TestHarness::new();
    harness.config.max_results = 2;
    harness.config.disable_max = true;
    let coordinator = harness.coordinator(vec![fixtures::api_source("a")]);

    harness
        .respond_api(
            "a",
            serde_json::json!({"data": {"results": [
                {"title": "Dune low", "link": "magnet:?xt=urn:btih:l", "seeds": 5},
                {"title": "Dune high", "link": "magnet:?xt=urn:btih:h", "seeds": 50},
                {"title": "Dune tiny", "link": "magnet:?xt=urn:btih:t", "seeds": 1}
            ]}}),
        )
        .await;

    let records = coordinator.search(&dune()).await.unwrap();
    assert_eq!(records.len(), 3);
}

#[tokio::test]
async fn test_subpage_rows_share_one_fetch() {
    let harness = TestHarness::new();
    let mut source = fixtures::subpage_source("b");
    source.private = true;
    source.login = fixtures::private_source("b").login;

    harness
        .clients
        .respond(
            "https://b.example/login",
            FetchResponse::new(200, "hello").with_header("Set-Cookie", "uid=7; Path=/"),
        )
        .await;
    harness
        .respond_table(
            "b",
            &[
                ("Dune part one", "/go/123", "1 GB", "4"),
                ("Dune part one (mirror)", "/go/123", "1 GB", "2"),
            ],
        )
        .await;
    harness
        .clients
        .respond(
            "https://b.example/go/123",
            FetchResponse::new(200, r#"<a href="magnet:?xt=urn:btih:0123456789ABCDEF0123456789ABCDEF01234567">get</a>"#),
        )
        .await;

    let mut entry = fixtures::entry(source);
    entry.credentials = Some(Credentials {
        username: "me".to_string(),
        password: "pw".to_string(),
    });
    let worker = SourceWorker::new(
        entry,
        harness.filter.clone(),
        Arc::new(harness.clients.clone()),
        Arc::clone(&harness.sessions),
        Arc::new(WorkerSettings {
            request_margin: Duration::ZERO,
            ..Default::default()
        }),
        Deadline::new(Duration::from_secs(5)),
    );
    let records = worker.run(Arc::new(dune().normalized())).await;

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.uri == "magnet:?xt=urn:btih:0123456789ABCDEF0123456789ABCDEF01234567"));
    assert!(records.iter().all(|r| r.info_hash == "0123456789abcdef0123456789abcdef01234567"));
    assert_eq!(harness.clients.request_count("https://b.example/go/123").await, 1);

    let subpage = harness
        .clients
        .requests()
        .await
        .into_iter()
        .find(|r| r.url == "https://b.example/go/123")
        .unwrap();
    assert!(subpage
        .headers
        .contains(&("Cookie".to_string(), "uid=7".to_string())));
}

#[tokio::test]
async fn test_api_missing_intermediate_key_yields_nothing() {
    let harness = TestHarness::new();
    let coordinator = harness.coordinator(vec![fixtures::api_source("a")]);
    harness
        .respond_api("a", serde_json::json!({"data": {"items": []}}))
        .await;

    let outcome = coordinator.search_detailed(&dune()).await.unwrap();
    assert!(outcome.records.is_empty());
    assert!(outcome.timed_out.is_empty());
}

#[tokio::test]
async fn test_sizes_and_counts_normalized() {
    let harness = TestHarness::new();
    let coordinator = harness.coordinator(vec![fixtures::table_source("t")]);
    harness
        .respond_table(
            "t",
            &[
                ("Dune 2021", "magnet:?xt=urn:btih:s1", "1.46 GB", "N/A"),
                ("Dune 1984", "magnet:?xt=urn:btih:s2", "unknown", "1,204"),
            ],
        )
        .await;

    let records = coordinator.search(&dune()).await.unwrap();
    assert_eq!(records.len(), 2);

    let old = records.iter().find(|r| r.name == "Dune 1984").unwrap();
    assert_eq!(old.seeds, 1204);
    assert_eq!(old.size, 0);

    let new = records.iter().find(|r| r.name == "Dune 2021").unwrap();
    assert_eq!(new.seeds, 0);
    assert_eq!(new.size, (1.46_f64 * 1024.0 * 1024.0 * 1024.0).round() as u64);
}

#[tokio::test]
async fn test_duplicates_across_sources_merged() {
    let harness = TestHarness::new();
    let coordinator = harness.coordinator(vec![
        fixtures::table_source("one"),
        fixtures::table_source("two"),
    ]);
    harness
        .respond_table("one", &[("Dune", "magnet:?xt=urn:btih:SAME", "1 GB", "3")])
        .await;
    harness
        .respond_table("two", &[("Dune", "magnet:?xt=urn:btih:same&dn=Dune", "1 GB", "8")])
        .await;

    let records = coordinator.search(&dune()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].source, "two");
}

#[tokio::test]
async fn test_no_enabled_sources_is_error() {
    let harness = TestHarness::new();
    let mut source = fixtures::table_source("t");
    source.kinds = vec![ContentKind::Movie];
    let coordinator = harness.coordinator(vec![source]);

    let result = coordinator
        .search(&SearchRequest::new("Dune", ContentKind::Episode))
        .await;
    assert!(matches!(result, Err(SearchError::NoSourcesEnabled(_))));
}

#[tokio::test]
async fn test_session_persisted_between_searches() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = Arc::new(
        SqliteSessionStore::new(&temp_dir.path().join("sessions.db"))
            .expect("Failed to create session store"),
    );

    let mut harness = TestHarness::new();
    harness.sessions = store.clone() as Arc<dyn SessionStore>;
    harness
        .clients
        .respond(
            "https://t.example/search?q=Dune",
            FetchResponse::new(200, fixtures::table_page(&[]))
                .with_header("Set-Cookie", "seen=1; Path=/"),
        )
        .await;

    let coordinator = harness.coordinator(vec![fixtures::table_source("t")]);
    coordinator.search(&dune()).await.unwrap();

    let saved = store.load("t").unwrap().expect("session saved");
    assert_eq!(saved.cookies[0].name, "seen");

    coordinator.search(&dune()).await.unwrap();
    let client = harness.clients.last_client().await.unwrap();
    assert_eq!(
        client.cookie_header("https://t.example"),
        Some("seen=1".to_string())
    );
    assert_eq!(harness.clients.created_clients().await, 2);
}
