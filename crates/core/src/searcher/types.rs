//! Types for the multi-source search engine.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extract::ExtractError;
use crate::net::NetworkError;

/// Characters that make quoting a title inside a query template unsafe.
const SPECIAL_CHARS: &[char] = &['(', ')', '"', '\'', ':', '.', '[', ']', '<', '>', '/', '\\', '?'];

/// Kind of content a search is looking for.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    #[default]
    General,
    Movie,
    Show,
    Season,
    Episode,
    Anime,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::General => "general",
            ContentKind::Movie => "movie",
            ContentKind::Show => "show",
            ContentKind::Season => "season",
            ContentKind::Episode => "episode",
            ContentKind::Anime => "anime",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A search as dispatched by the caller.
///
/// Immutable once handed to the coordinator; every source worker reads the
/// same instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchRequest {
    /// Primary title to search for.
    pub title: String,
    /// Alternate titles keyed by lowercase language code (plus `source` and
    /// `original`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub titles: BTreeMap<String, String>,
    #[serde(default)]
    pub kind: ContentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
    /// Suppress progress reporting and the timed-out notification.
    #[serde(default)]
    pub silent: bool,
    /// Set when the source title contains characters that break quoted
    /// query keywords. Derived by [`SearchRequest::normalized`].
    #[serde(default)]
    pub has_special: bool,
    /// Opaque identifiers (imdb, tmdb, ...) forwarded to the filter.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub identifiers: BTreeMap<String, String>,
}

impl SearchRequest {
    /// Create a request for the given title and content kind.
    pub fn new(title: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            title: title.into(),
            titles: BTreeMap::new(),
            kind,
            year: None,
            season: None,
            episode: None,
            silent: false,
            has_special: false,
            identifiers: BTreeMap::new(),
        }
    }

    /// A free-text query: the query doubles as source and original title.
    pub fn general(query: impl Into<String>) -> Self {
        let query = query.into();
        let mut request = Self::new(query.clone(), ContentKind::General);
        request.titles.insert("source".to_string(), query.clone());
        request.titles.insert("original".to_string(), query);
        request
    }

    pub fn with_year(mut self, year: u32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_season(mut self, season: u32) -> Self {
        self.season = Some(season);
        self
    }

    pub fn with_episode(mut self, episode: u32) -> Self {
        self.episode = Some(episode);
        self
    }

    /// Add an alternate title for a language code.
    pub fn with_title(mut self, language: &str, title: impl Into<String>) -> Self {
        self.titles.insert(language.to_lowercase(), title.into());
        self
    }

    pub fn with_identifier(mut self, key: &str, value: impl Into<String>) -> Self {
        self.identifiers.insert(key.to_string(), value.into());
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Canonical form used by the coordinator: lowercase title keys, a
    /// `source` title when none was given, and the special-character flag.
    pub fn normalized(mut self) -> Self {
        self.titles = self
            .titles
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        if !self.titles.contains_key("source") && !self.title.is_empty() {
            self.titles.insert("source".to_string(), self.title.clone());
        }
        self.has_special = self
            .titles
            .get("source")
            .map(|t| t.contains(SPECIAL_CHARS))
            .unwrap_or(false);
        self
    }

    /// Alternate title for a language, if one was provided.
    pub fn alternate_title(&self, language: &str) -> Option<&str> {
        self.titles
            .get(&language.to_lowercase())
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }
}

/// An unvalidated result as extracted from one source.
///
/// All fields are text; typing happens during normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCandidate {
    pub name: String,
    pub info_hash: String,
    /// Locator, possibly with embedded request headers (`url|k=v&...`).
    pub uri: String,
    pub size: String,
    pub seeds: String,
    pub peers: String,
}

impl RawCandidate {
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            ..Default::default()
        }
    }
}

/// A validated, typed result ready for the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedRecord {
    pub name: String,
    /// Playable locator, optionally carrying embedded auth headers.
    pub uri: String,
    #[serde(default)]
    pub info_hash: String,
    /// Size in bytes (0 when unknown).
    pub size: u64,
    pub seeds: u32,
    pub peers: u32,
    pub language: String,
    /// Source id that produced this record.
    pub source: String,
    /// Display label of the source.
    pub provider: String,
    pub icon: String,
    /// Resolution score, only set when resolution ranking is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<u32>,
}

/// Full result of one search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Globally filtered results.
    pub records: Vec<NormalizedRecord>,
    /// Display names of sources that did not finish before the deadline.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timed_out: Vec<String>,
    /// Number of sources the search was dispatched to.
    pub sources_queried: usize,
    pub duration_ms: u64,
}

/// Errors surfaced to the caller of a search.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("No sources enabled for {0} searches")]
    NoSourcesEnabled(ContentKind),
}

/// Errors contained inside a single source worker.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("No credentials configured for private source")]
    MissingCredentials,

    #[error("Token negotiation failed: {0}")]
    Token(String),

    #[error("Malformed response: {0}")]
    Malformed(#[from] ExtractError),

    #[error("Search deadline reached")]
    OutOfTime,
}

impl SourceError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Network(NetworkError::Timeout) => "timeout",
            SourceError::Network(_) => "network",
            SourceError::LoginFailed(_) | SourceError::MissingCredentials => "login",
            SourceError::Token(_) => "token",
            SourceError::Malformed(_) => "parse",
            SourceError::OutOfTime => "deadline",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_general_request_sets_titles() {
        let request = SearchRequest::general("big buck bunny");
        assert_eq!(request.title, "big buck bunny");
        assert_eq!(request.kind, ContentKind::General);
        assert_eq!(request.titles.get("source").unwrap(), "big buck bunny");
        assert_eq!(request.titles.get("original").unwrap(), "big buck bunny");
    }

    #[test]
    fn test_normalized_lowercases_keys_and_detects_special() {
        let mut request = SearchRequest::new("Mission: Impossible", ContentKind::Movie);
        request
            .titles
            .insert("RU".to_string(), "Миссия невыполнима".to_string());
        let request = request.normalized();

        assert!(request.titles.contains_key("ru"));
        assert_eq!(request.titles.get("source").unwrap(), "Mission: Impossible");
        assert!(request.has_special);
    }

    #[test]
    fn test_normalized_without_special_chars() {
        let request = SearchRequest::new("Arrival", ContentKind::Movie).normalized();
        assert!(!request.has_special);
    }

    #[test]
    fn test_alternate_title_lookup() {
        let request = SearchRequest::new("Spirited Away", ContentKind::Anime)
            .with_title("JA", "千と千尋の神隠し")
            .with_title("fr", "");
        assert_eq!(request.alternate_title("ja"), Some("千と千尋の神隠し"));
        assert_eq!(request.alternate_title("fr"), None);
        assert_eq!(request.alternate_title("de"), None);
    }

    #[test]
    fn test_content_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&ContentKind::Episode).unwrap(),
            "\"episode\""
        );
        let kind: ContentKind = serde_json::from_str("\"anime\"").unwrap();
        assert_eq!(kind, ContentKind::Anime);
        assert_eq!(ContentKind::Season.to_string(), "season");
    }

    #[test]
    fn test_request_minimal_json() {
        let request: SearchRequest = serde_json::from_str(r#"{"title": "Dune"}"#).unwrap();
        assert_eq!(request.title, "Dune");
        assert_eq!(request.kind, ContentKind::General);
        assert!(request.titles.is_empty());
        assert!(!request.silent);
    }

    #[test]
    fn test_record_serialization_skips_missing_resolution() {
        let record = NormalizedRecord {
            name: "Dune 2021 1080p".to_string(),
            uri: "magnet:?xt=urn:btih:abc".to_string(),
            info_hash: "abc".to_string(),
            size: 1024,
            seeds: 10,
            peers: 2,
            language: "en".to_string(),
            source: "yts".to_string(),
            provider: "YTS".to_string(),
            icon: "icons/yts.png".to_string(),
            resolution: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("resolution"));
    }

    #[test]
    fn test_source_error_kind() {
        assert_eq!(SourceError::Network(NetworkError::Timeout).kind(), "timeout");
        assert_eq!(SourceError::MissingCredentials.kind(), "login");
        assert_eq!(SourceError::Token("bad".into()).kind(), "token");
    }
}
