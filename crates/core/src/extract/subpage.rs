//! Resolution of intermediate pages into final locators.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::catalog::SourceDefinition;
use crate::metrics;
use crate::net::{ClientFactory, FetchRequest, NetworkError};
use crate::searcher::{Deadline, RawCandidate};

use super::locator::{append_headers, split_headers};
use super::ExtractedRow;

static MAGNET: Lazy<Regex> = Lazy::new(|| Regex::new(r#"magnet:\?[^'"\s<>\[\]]+"#).unwrap());

static TORRENT_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(http[^"'\s<>]*?\.torrent)["']"#).unwrap());

static DOWNLOAD_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""(/download/[A-Za-z0-9]+)""#).unwrap());

/// Intermediate page URL (without embedded headers) to resolved locator.
///
/// Lives for one source run.
pub type SubpageCache = HashMap<String, String>;

/// Scan a page body for a playable locator.
///
/// In order of preference: a magnet link, an absolute `.torrent` link, a
/// `/download/<id>` path on the source origin.
pub fn find_locator(body: &str, root_url: &str) -> Option<String> {
    if let Some(m) = MAGNET.find(body) {
        return Some(m.as_str().replace("&amp;", "&"));
    }
    if let Some(link) = TORRENT_LINK.captures(body).and_then(|c| c.get(1)) {
        return Some(link.as_str().replace("&amp;", "&"));
    }
    DOWNLOAD_PATH
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|path| format!("{}{}", root_url.trim_end_matches('/'), path.as_str()))
}

/// Bounded pool resolving subpage rows of one source.
pub struct SubpageResolver {
    source: Arc<SourceDefinition>,
    clients: Arc<dyn ClientFactory>,
    workers: usize,
    deadline: Deadline,
    margin: Duration,
}

impl SubpageResolver {
    pub fn new(
        source: Arc<SourceDefinition>,
        clients: Arc<dyn ClientFactory>,
        workers: usize,
        deadline: Deadline,
        margin: Duration,
    ) -> Self {
        Self {
            source,
            clients,
            workers: workers.max(1),
            deadline,
            margin,
        }
    }

    /// Resolve the subpage rows, fetching each distinct page at most once.
    ///
    /// All fetches run concurrently (bounded by the pool size) and are joined
    /// before returning. Ready rows pass through; rows whose page could not
    /// be resolved are dropped; order is kept. Embedded headers are
    /// forwarded to the fetch and re-attached to resolved non-magnet
    /// locators.
    pub async fn resolve(
        &self,
        rows: Vec<ExtractedRow>,
        cache: &mut SubpageCache,
    ) -> Vec<RawCandidate> {
        let mut scheduled = HashSet::new();
        let mut pending = Vec::new();
        for row in &rows {
            let ExtractedRow::Subpage(candidate) = row else {
                continue;
            };
            let (url, headers) = split_headers(&candidate.uri);
            if !cache.contains_key(url) && scheduled.insert(url.to_string()) {
                pending.push((url.to_string(), headers));
            }
        }

        if !pending.is_empty() {
            debug!(
                source = %self.source.id,
                pages = pending.len(),
                cached = cache.len(),
                "Resolving subpages"
            );
        }

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::with_capacity(pending.len());

        for (url, headers) in pending {
            let semaphore = Arc::clone(&semaphore);
            let clients = Arc::clone(&self.clients);
            let source = Arc::clone(&self.source);
            let deadline = self.deadline;
            let margin = self.margin;

            handles.push(tokio::spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        fetch_locator(&source, clients.as_ref(), &url, headers, deadline, margin)
                            .await
                    }
                    Err(_) => Ok(None),
                };
                (url, result)
            }));
        }

        for joined in join_all(handles).await {
            match joined {
                Ok((url, Ok(Some(locator)))) => {
                    metrics::SUBPAGE_FETCHES.with_label_values(&["resolved"]).inc();
                    cache.insert(url, locator);
                }
                Ok((url, Ok(None))) => {
                    metrics::SUBPAGE_FETCHES.with_label_values(&["unresolved"]).inc();
                    debug!(source = %self.source.id, url = %url, "No locator on subpage");
                }
                Ok((url, Err(e))) => {
                    metrics::SUBPAGE_FETCHES.with_label_values(&["failed"]).inc();
                    warn!(source = %self.source.id, url = %url, error = %e, "Subpage fetch failed");
                }
                Err(e) => {
                    metrics::SUBPAGE_FETCHES.with_label_values(&["failed"]).inc();
                    warn!(source = %self.source.id, error = %e, "Subpage task failed");
                }
            }
        }

        rows.into_iter()
            .filter_map(|row| match row {
                ExtractedRow::Ready(candidate) => Some(candidate),
                ExtractedRow::Subpage(mut candidate) => {
                    let (url, headers) = split_headers(&candidate.uri);
                    let resolved = cache.get(url)?;
                    candidate.uri = append_headers(resolved, &headers);
                    Some(candidate)
                }
            })
            .collect()
    }
}

async fn fetch_locator(
    source: &SourceDefinition,
    clients: &dyn ClientFactory,
    url: &str,
    headers: Vec<(String, String)>,
    deadline: Deadline,
    margin: Duration,
) -> Result<Option<String>, NetworkError> {
    if !deadline.allows_request(margin) {
        debug!(source = %source.id, url, "Skipping subpage, no time left");
        return Ok(None);
    }

    let client = clients.create(&source.id)?;
    let response = client
        .open(FetchRequest::get(url).with_headers(headers))
        .await?;

    if response.content_type().contains("bittorrent") {
        return Ok(Some(url.to_string()));
    }
    if !response.is_success() {
        return Err(NetworkError::Http {
            status: response.status,
            url: url.to_string(),
        });
    }

    Ok(find_locator(&response.body, &source.root_url))
}
