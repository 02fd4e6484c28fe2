//! Fan-out of one search across every enabled source.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::catalog::SourceCatalog;
use crate::config::SearchConfig;
use crate::filter::Filter;
use crate::metrics;
use crate::net::ClientFactory;
use crate::session::SessionStore;

use super::deadline::Deadline;
use super::progress::{NoopProgress, ProgressReporter, TracingProgress};
use super::state::SearchState;
use super::worker::{SourceWorker, WorkerSettings};
use super::{NormalizedRecord, SearchError, SearchOutcome, SearchRequest};

/// Runs searches against the catalog.
///
/// Every enabled source gets its own task. The coordinator waits until all
/// of them reported or the deadline passed, whichever comes first, then
/// returns what it has. Workers still running at that point are left to
/// finish on their own; their results are discarded.
pub struct SearchCoordinator {
    catalog: Arc<SourceCatalog>,
    filter: Arc<dyn Filter>,
    clients: Arc<dyn ClientFactory>,
    sessions: Arc<dyn SessionStore>,
    settings: Arc<WorkerSettings>,
    timeout: Duration,
    poll_interval: Duration,
    progress: Arc<dyn ProgressReporter>,
}

impl SearchCoordinator {
    pub fn new(
        catalog: Arc<SourceCatalog>,
        filter: Arc<dyn Filter>,
        clients: Arc<dyn ClientFactory>,
        sessions: Arc<dyn SessionStore>,
        config: &SearchConfig,
    ) -> Self {
        Self {
            catalog,
            filter,
            clients,
            sessions,
            settings: Arc::new(WorkerSettings::from(config)),
            timeout: config.effective_timeout(),
            poll_interval: config.poll_interval(),
            progress: Arc::new(TracingProgress),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn catalog(&self) -> &SourceCatalog {
        &self.catalog
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Search and return the globally filtered records.
    pub async fn search(
        &self,
        request: &SearchRequest,
    ) -> Result<Vec<NormalizedRecord>, SearchError> {
        Ok(self.search_detailed(request).await?.records)
    }

    /// Search and also report which sources did not finish in time.
    pub async fn search_detailed(
        &self,
        request: &SearchRequest,
    ) -> Result<SearchOutcome, SearchError> {
        let request = Arc::new(request.clone().normalized());
        let entries = self.catalog.enabled_for(request.kind);
        if entries.is_empty() {
            metrics::SEARCHES_TOTAL
                .with_label_values(&["no_sources"])
                .inc();
            return Err(SearchError::NoSourcesEnabled(request.kind));
        }

        let search_id = Uuid::new_v4();
        let span = info_span!("search", search_id = %search_id, kind = %request.kind);

        async move {
            let deadline = Deadline::new(self.timeout);
            let progress: Arc<dyn ProgressReporter> = if request.silent {
                Arc::new(NoopProgress)
            } else {
                Arc::clone(&self.progress)
            };

            let state = Arc::new(SearchState::new(entries.iter().map(|e| {
                (e.definition.id.clone(), e.definition.name.clone())
            })));

            info!(
                title = %request.title,
                sources = entries.len(),
                timeout_ms = self.timeout.as_millis() as u64,
                "Starting search"
            );

            for entry in entries {
                let source_id = entry.definition.id.clone();
                let worker = SourceWorker::new(
                    entry,
                    Arc::clone(&self.filter),
                    Arc::clone(&self.clients),
                    Arc::clone(&self.sessions),
                    Arc::clone(&self.settings),
                    deadline,
                );
                let state = Arc::clone(&state);
                let request = Arc::clone(&request);
                let span = info_span!("source", source = %source_id);

                tokio::spawn(
                    async move {
                        // A panicking worker is reported as an empty result.
                        let run = tokio::spawn(worker.run(request).in_current_span());
                        let records = match run.await {
                            Ok(records) => records,
                            Err(e) => {
                                warn!(error = %e, "Source worker aborted");
                                metrics::SOURCE_FAILURES
                                    .with_label_values(&[source_id.as_str(), "panic"])
                                    .inc();
                                Vec::new()
                            }
                        };
                        if !state.record(&source_id, records) {
                            debug!("Search already closed, results discarded");
                        }
                    }
                    .instrument(span),
                );
            }

            progress.started(&state.snapshot(&deadline));

            while state.pending() > 0 && !deadline.is_expired() {
                progress.update(&state.snapshot(&deadline));
                tokio::time::sleep(self.poll_interval.min(deadline.remaining())).await;
            }

            let (records, timed_out) = state.close();
            let snapshot = state.snapshot(&deadline);
            for source_id in state.pending_ids() {
                metrics::SOURCES_TIMED_OUT
                    .with_label_values(&[source_id.as_str()])
                    .inc();
            }
            if !timed_out.is_empty() {
                debug!(sources = ?timed_out, "Stopped waiting for sources");
            }
            progress.finished(&snapshot);

            let collected = records.len();
            let records = self
                .filter
                .finalize(&request, records, self.settings.sort_by_resolution);

            let elapsed = deadline.elapsed();
            let outcome = if timed_out.is_empty() {
                "complete"
            } else {
                "partial"
            };
            metrics::SEARCHES_TOTAL.with_label_values(&[outcome]).inc();
            metrics::SEARCH_DURATION
                .with_label_values(&[outcome])
                .observe(elapsed.as_secs_f64());
            metrics::SEARCH_RESULTS.observe(records.len() as f64);

            info!(
                collected,
                results = records.len(),
                timed_out = timed_out.len(),
                duration_ms = elapsed.as_millis() as u64,
                "Search finished"
            );

            Ok(SearchOutcome {
                records,
                timed_out,
                sources_queried: state.total(),
                duration_ms: elapsed.as_millis() as u64,
            })
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::FetchResponse;
    use crate::searcher::ContentKind;
    use crate::session::MemorySessionStore;
    use crate::testing::{fixtures, MockClientFactory, MockFilter, RecordingProgress};
    use std::collections::BTreeMap;

    fn coordinator(
        catalog: SourceCatalog,
        factory: &MockClientFactory,
        progress: Arc<RecordingProgress>,
    ) -> SearchCoordinator {
        SearchCoordinator::new(
            Arc::new(catalog),
            Arc::new(MockFilter::new()),
            Arc::new(factory.clone()),
            Arc::new(MemorySessionStore::new()),
            &SearchConfig::default(),
        )
        .with_timeout(Duration::from_secs(5))
        .with_poll_interval(Duration::from_millis(10))
        .with_progress(progress)
    }

    #[tokio::test]
    async fn test_no_sources_enabled() {
        let mut source = fixtures::table_source("t");
        source.kinds = vec![ContentKind::Movie];
        let catalog = SourceCatalog::new(vec![source], &BTreeMap::new()).unwrap();
        let factory = MockClientFactory::new();

        let result = coordinator(catalog, &factory, Arc::new(RecordingProgress::new()))
            .search(&SearchRequest::new("Dune", ContentKind::Anime))
            .await;

        assert!(matches!(
            result,
            Err(SearchError::NoSourcesEnabled(ContentKind::Anime))
        ));
        assert_eq!(factory.total_requests().await, 0);
    }

    #[tokio::test]
    async fn test_progress_reported_unless_silent() {
        let catalog =
            SourceCatalog::new(vec![fixtures::table_source("t")], &BTreeMap::new()).unwrap();
        let factory = MockClientFactory::new();
        factory
            .respond(
                "https://t.example/search?q=Dune",
                FetchResponse::new(
                    200,
                    fixtures::table_page(&[("Dune", "magnet:?xt=urn:btih:a", "1 GB", "5")]),
                ),
            )
            .await;

        let progress = Arc::new(RecordingProgress::new());
        let search = coordinator(catalog.clone(), &factory, progress.clone());
        let outcome = search
            .search_detailed(&SearchRequest::general("Dune"))
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.sources_queried, 1);
        assert_eq!(progress.started_snapshot().unwrap().total, 1);
        assert_eq!(progress.finished_snapshot().unwrap().pending, 0);

        let silent = Arc::new(RecordingProgress::new());
        let search = coordinator(catalog, &factory, silent.clone());
        search
            .search(&SearchRequest::general("Dune").silent())
            .await
            .unwrap();
        assert!(silent.started_snapshot().is_none());
        assert!(silent.finished_snapshot().is_none());
    }

    #[tokio::test]
    async fn test_panicking_worker_is_empty_result() {
        let catalog = SourceCatalog::new(
            vec![fixtures::table_source("bad"), fixtures::table_source("good")],
            &BTreeMap::new(),
        )
        .unwrap();
        let factory = MockClientFactory::new();
        factory.panic_on("https://bad.example/search?q=Dune").await;
        factory
            .respond(
                "https://good.example/search?q=Dune",
                FetchResponse::new(
                    200,
                    fixtures::table_page(&[("Dune", "magnet:?xt=urn:btih:g", "1 GB", "5")]),
                ),
            )
            .await;

        let outcome = coordinator(catalog, &factory, Arc::new(RecordingProgress::new()))
            .search_detailed(&SearchRequest::general("Dune"))
            .await
            .unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].source, "good");
        assert!(outcome.timed_out.is_empty());
    }
}
