//! Per-source search worker.
//!
//! A worker runs every query variant of one source, extracts and verifies
//! candidates, and hands back a truncated, ranked list. It never fails: any
//! error is logged, counted, and turned into an empty result.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogEntry, SourceDefinition};
use crate::config::SearchConfig;
use crate::extract::{
    self, ExtractedRow, Extractor, SessionHeaders, SubpageCache, SubpageResolver,
};
use crate::filter::{Filter, QueryVariant};
use crate::metrics;
use crate::net::{ClientFactory, FetchRequest, NetworkClient, NetworkError};
use crate::session::SessionStore;

use super::deadline::Deadline;
use super::normalize::{parse_count, parse_size};
use super::{NormalizedRecord, RawCandidate, SearchRequest, SourceError};

/// Quoted title keywords; stripped when the title itself contains quotes or
/// other characters that break quoting.
static QUOTED_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["'](\{title[^}]*\})["']"#).unwrap());

/// Settings shared by every worker of a coordinator.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub max_results: usize,
    pub disable_max: bool,
    pub sort_by_resolution: bool,
    pub request_margin: Duration,
    pub subpage_workers: usize,
    pub debug_parser: bool,
    pub icons_dir: String,
    pub user_agent: String,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for WorkerSettings {
    fn from(config: &SearchConfig) -> Self {
        Self {
            max_results: config.max_results,
            disable_max: config.disable_max,
            sort_by_resolution: config.sort_by_resolution,
            request_margin: config.request_margin(),
            subpage_workers: config.subpage_workers,
            debug_parser: config.debug_parser,
            icons_dir: config.icons_dir.clone(),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Rank records and keep the best `max_results` (all when `disable_max`).
///
/// Ranking is by seeds, or by resolution score then seeds when resolution
/// sorting is on. The sort is stable.
pub fn cutoff(mut records: Vec<NormalizedRecord>, settings: &WorkerSettings) -> Vec<NormalizedRecord> {
    if settings.sort_by_resolution {
        records.sort_by(|a, b| {
            b.resolution
                .unwrap_or(0)
                .cmp(&a.resolution.unwrap_or(0))
                .then(b.seeds.cmp(&a.seeds))
        });
    } else {
        records.sort_by(|a, b| b.seeds.cmp(&a.seeds));
    }
    if !settings.disable_max {
        records.truncate(settings.max_results);
    }
    records
}

/// Encode each word of `text` and join the words with `separator`.
fn encode_terms(text: &str, separator: &str) -> String {
    text.split_whitespace()
        .map(|word| urlencoding::encode(word).into_owned())
        .collect::<Vec<_>>()
        .join(separator)
}

fn substitute(template: &str, query: &str, extra: &str) -> String {
    template.replace("QUERY", query).replace("EXTRA", extra)
}

/// Authentication progress within one run.
#[derive(Debug, Default)]
struct AuthState {
    logged_in: bool,
    token_negotiated: bool,
    reauthenticated: bool,
}

/// Searches a single source.
pub struct SourceWorker {
    entry: CatalogEntry,
    filter: Arc<dyn Filter>,
    clients: Arc<dyn ClientFactory>,
    sessions: Arc<dyn SessionStore>,
    settings: Arc<WorkerSettings>,
    deadline: Deadline,
}

impl SourceWorker {
    pub fn new(
        entry: CatalogEntry,
        filter: Arc<dyn Filter>,
        clients: Arc<dyn ClientFactory>,
        sessions: Arc<dyn SessionStore>,
        settings: Arc<WorkerSettings>,
        deadline: Deadline,
    ) -> Self {
        Self {
            entry,
            filter,
            clients,
            sessions,
            settings,
            deadline,
        }
    }

    fn source(&self) -> &SourceDefinition {
        &self.entry.definition
    }

    /// Run the search. Errors are contained: the result is empty instead.
    pub async fn run(self, request: Arc<SearchRequest>) -> Vec<NormalizedRecord> {
        let source_id = self.source().id.clone();

        let client = match self.clients.create(&source_id) {
            Ok(client) => client,
            Err(e) => {
                self.record_failure(&SourceError::Network(e));
                return Vec::new();
            }
        };
        self.restore_session(client.as_ref());

        let result = self.collect(client.as_ref(), &request).await;
        match &result {
            Err(SourceError::LoginFailed(_)) => self.clear_session(),
            _ => self.persist_session(client.as_ref()),
        }

        match result {
            Ok(records) => {
                let records = cutoff(records, &self.settings);
                metrics::SOURCE_RESULTS
                    .with_label_values(&[source_id.as_str()])
                    .inc_by(records.len() as u64);
                info!(source = %source_id, results = records.len(), "Source finished");
                records
            }
            Err(e) => {
                self.record_failure(&e);
                Vec::new()
            }
        }
    }

    fn record_failure(&self, error: &SourceError) {
        let source = self.source();
        warn!(source = %source.id, error = %error, "Source search failed");
        metrics::SOURCE_FAILURES
            .with_label_values(&[source.id.as_str(), error.kind()])
            .inc();
    }

    fn restore_session(&self, client: &dyn NetworkClient) {
        let source_id = &self.source().id;
        match self.sessions.load(source_id) {
            Ok(Some(session)) => {
                debug!(source = %source_id, cookies = session.cookies.len(), "Restored session");
                client.import_session(&session);
            }
            Ok(None) => {}
            Err(e) => warn!(source = %source_id, error = %e, "Failed to load session"),
        }
    }

    fn persist_session(&self, client: &dyn NetworkClient) {
        let session = client.export_session();
        if session.is_empty() {
            return;
        }
        let source_id = &self.source().id;
        if let Err(e) = self.sessions.save(source_id, &session) {
            warn!(source = %source_id, error = %e, "Failed to save session");
        }
    }

    /// Drop a stored session the source no longer accepts.
    fn clear_session(&self) {
        let source_id = &self.source().id;
        match self.sessions.clear(source_id) {
            Ok(()) => debug!(source = %source_id, "Cleared rejected session"),
            Err(e) => warn!(source = %source_id, error = %e, "Failed to clear session"),
        }
    }

    async fn collect(
        &self,
        client: &dyn NetworkClient,
        request: &SearchRequest,
    ) -> Result<Vec<NormalizedRecord>, SourceError> {
        let source = self.source();
        let variants = self.filter.query_variants(source, request);
        let mut auth = AuthState::default();
        let mut cache = SubpageCache::new();
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for variant in variants {
            if variant.supplementary && !records.is_empty() {
                debug!(source = %source.id, query = %variant.query, "Skipping supplementary query");
                continue;
            }

            let (query, extra) = self.prepare(request, &variant);
            if query.is_empty() {
                debug!(source = %source.id, template = %variant.query, "Empty query, skipping");
                continue;
            }

            let title = if source.filter_title {
                query.clone()
            } else {
                request.title.clone()
            };

            let fetched = self
                .fetch_candidates(client, &mut auth, &query, &extra, &mut cache)
                .await;
            let candidates = match fetched {
                Ok(candidates) => candidates,
                Err(SourceError::OutOfTime) => {
                    debug!(source = %source.id, "No time left for further requests");
                    break;
                }
                Err(e) => return Err(e),
            };
            debug!(
                source = %source.id,
                query = %query,
                candidates = candidates.len(),
                "Query finished"
            );

            for candidate in candidates {
                let Some(record) = self.verify(request, &title, candidate) else {
                    continue;
                };
                if seen.insert((record.name.clone(), record.uri.clone())) {
                    records.push(record);
                }
            }
        }

        Ok(records)
    }

    /// Process template keywords of a variant into the final query/extra.
    fn prepare(&self, request: &SearchRequest, variant: &QueryVariant) -> (String, String) {
        let source = self.source();
        let template = if request.has_special {
            QUOTED_TITLE.replace_all(&variant.query, "$1").into_owned()
        } else {
            variant.query.clone()
        };
        let query = self.filter.process_keywords(source, request, &template);
        let extra = self.filter.process_keywords(source, request, &variant.extra);
        (query, extra)
    }

    /// Fail with `OutOfTime` when the deadline leaves no room for another
    /// request.
    fn ensure_time(&self) -> Result<(), SourceError> {
        if self.deadline.allows_request(self.settings.request_margin) {
            Ok(())
        } else {
            Err(SourceError::OutOfTime)
        }
    }

    async fn authenticate(
        &self,
        client: &dyn NetworkClient,
        auth: &mut AuthState,
    ) -> Result<(), SourceError> {
        let source = self.source();

        if source.private && !auth.logged_in {
            if let Some(login) = &source.login {
                let credentials = self
                    .entry
                    .credentials
                    .as_ref()
                    .ok_or(SourceError::MissingCredentials)?;
                let fields = login
                    .fields
                    .iter()
                    .map(|(name, value)| {
                        let value = value
                            .replace("USERNAME", &credentials.username)
                            .replace("PASSWORD", &credentials.password);
                        (name.clone(), value)
                    })
                    .collect();

                let url = source.absolute(&login.path);
                self.ensure_time()?;
                if !client
                    .login(&url, fields, login.failure_marker.as_deref())
                    .await?
                {
                    return Err(SourceError::LoginFailed(source.name.clone()));
                }
                info!(source = %source.id, "Logged in");
            }
            auth.logged_in = true;
        }

        if !auth.token_negotiated {
            if let Some(endpoint) = &source.token {
                let url = source.absolute(&endpoint.path);
                let query = endpoint
                    .params
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                self.ensure_time()?;
                let response = client.open(FetchRequest::get(&url).with_query(query)).await?;
                if !response.is_success() {
                    return Err(SourceError::Token(format!("HTTP {}", response.status)));
                }
                let document: Value = serde_json::from_str(&response.body)
                    .map_err(|e| SourceError::Token(e.to_string()))?;
                let token = extract::walk(&document, &endpoint.field)
                    .and_then(Value::as_str)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        SourceError::Token(format!("missing field '{}'", endpoint.field))
                    })?;
                client.set_token(Some(token.to_string()));
                debug!(source = %source.id, "Token negotiated");
            }
            auth.token_negotiated = true;
        }

        Ok(())
    }

    fn search_request(&self, query: &str, extra: &str) -> FetchRequest {
        let source = self.source();
        let encoded_query = encode_terms(query, &source.separator);
        let encoded_extra = encode_terms(extra, &source.separator);
        let url = substitute(&source.search_url(), &encoded_query, &encoded_extra)
            .replace(' ', &source.separator);

        if !source.post_data.is_empty() {
            let data = source
                .post_data
                .iter()
                .map(|(k, v)| (k.clone(), substitute(v, query, extra)))
                .collect();
            return FetchRequest::post(url, data);
        }

        let params = source
            .get_data
            .iter()
            .map(|(k, v)| (k.clone(), substitute(v, query, extra)))
            .collect();
        FetchRequest::get(url).with_query(params)
    }

    async fn fetch_candidates(
        &self,
        client: &dyn NetworkClient,
        auth: &mut AuthState,
        query: &str,
        extra: &str,
        cache: &mut SubpageCache,
    ) -> Result<Vec<RawCandidate>, SourceError> {
        let source = self.source();
        self.authenticate(client, auth).await?;

        let request = self.search_request(query, extra);
        let url = request.url.clone();

        self.ensure_time()?;
        let mut response = client.open(request.clone()).await?;

        // A rejected session gets one fresh login per run.
        if matches!(response.status, 401 | 403)
            && (source.private || source.token.is_some())
            && !auth.reauthenticated
        {
            info!(source = %source.id, status = response.status, "Session rejected, re-authenticating");
            auth.reauthenticated = true;
            auth.logged_in = false;
            auth.token_negotiated = false;
            self.authenticate(client, auth).await?;
            self.ensure_time()?;
            response = client.open(request).await?;
        }

        if !response.is_success() {
            return Err(NetworkError::Http {
                status: response.status,
                url,
            }
            .into());
        }

        let session = SessionHeaders {
            cookie: client.cookie_header(&source.root_url),
            token: client.token(),
            user_agent: self.settings.user_agent.clone(),
        };
        let rows = Extractor::for_source(source, self.settings.debug_parser).extract(
            &response.body,
            &url,
            &session,
        )?;

        if rows.iter().any(|row| matches!(row, ExtractedRow::Subpage(_))) {
            let resolver = SubpageResolver::new(
                Arc::clone(&self.entry.definition),
                Arc::clone(&self.clients),
                self.settings.subpage_workers,
                self.deadline,
                self.settings.request_margin,
            );
            return Ok(resolver.resolve(rows, cache).await);
        }

        Ok(rows
            .into_iter()
            .filter_map(|row| match row {
                ExtractedRow::Ready(candidate) => Some(candidate),
                ExtractedRow::Subpage(_) => None,
            })
            .collect())
    }

    /// Verify a candidate and turn it into a typed record.
    fn verify(
        &self,
        request: &SearchRequest,
        title: &str,
        candidate: RawCandidate,
    ) -> Option<NormalizedRecord> {
        let source = self.source();
        let size = parse_size(&candidate.size);

        let verdict = self
            .filter
            .verify(source, request, title, &candidate.name, size);
        if !verdict.is_accepted() {
            debug!(source = %source.id, name = %candidate.name, verdict = ?verdict, "Rejected");
            metrics::CANDIDATES_REJECTED
                .with_label_values(&[source.id.as_str()])
                .inc();
            return None;
        }

        Some(self.normalize(candidate, size))
    }

    fn normalize(&self, candidate: RawCandidate, size: Option<u64>) -> NormalizedRecord {
        let source = self.source();
        let info_hash = if candidate.info_hash.is_empty() {
            extract::magnet_info_hash(&candidate.uri).unwrap_or_default()
        } else {
            candidate.info_hash.to_lowercase()
        };
        let resolution = self
            .settings
            .sort_by_resolution
            .then(|| self.filter.determine_resolution(&candidate.name).score());

        NormalizedRecord {
            seeds: parse_count(&candidate.seeds),
            peers: parse_count(&candidate.peers),
            size: size.unwrap_or(0),
            info_hash,
            language: source.language.clone(),
            source: source.id.clone(),
            provider: source.name.clone(),
            icon: format!(
                "{}/{}.png",
                self.settings.icons_dir.trim_end_matches('/'),
                source.id
            ),
            resolution,
            name: candidate.name,
            uri: candidate.uri,
        }
    }
}
