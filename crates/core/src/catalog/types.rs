//! Types for the source catalog.

use std::collections::BTreeMap;
use std::fmt;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::searcher::ContentKind;

/// Static description of one source. Loaded once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceDefinition {
    /// Unique identifier (also the icon file stem).
    pub id: String,
    /// Display name.
    pub name: String,
    #[serde(default = "default_color")]
    pub color: String,
    /// Language of the source's content.
    #[serde(default = "default_language")]
    pub language: String,
    /// Origin of the site, e.g. `https://tracker.example`.
    pub root_url: String,
    /// Search URL template, relative to `root_url` or absolute. `QUERY` and
    /// `EXTRA` are substituted.
    pub search: String,
    /// Replacement for spaces in the final search URL.
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Requires a logged-in session.
    #[serde(default)]
    pub private: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<LoginForm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenEndpoint>,
    /// Form body for POST searches; values may contain `QUERY`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub post_data: BTreeMap<String, String>,
    /// Query string for GET searches; values may contain `QUERY`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub get_data: BTreeMap<String, String>,
    /// Verify names against the processed query instead of the request title.
    #[serde(default)]
    pub filter_title: bool,
    /// Listed locators point to an intermediate page.
    #[serde(default)]
    pub subpage: bool,
    /// Path prefix joined with the extracted value to build download links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_path: Option<String>,
    #[serde(default = "all_kinds")]
    pub kinds: Vec<ContentKind>,
    #[serde(default)]
    pub queries: QueryTemplates,
    /// Defaults to enabled for public sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_by_default: Option<bool>,
    pub format: SourceFormat,
}

fn default_color() -> String {
    "FFFFFFFF".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_separator() -> String {
    "%20".to_string()
}

fn all_kinds() -> Vec<ContentKind> {
    vec![
        ContentKind::General,
        ContentKind::Movie,
        ContentKind::Show,
        ContentKind::Season,
        ContentKind::Episode,
        ContentKind::Anime,
    ]
}

impl SourceDefinition {
    /// Search URL template with the origin applied.
    pub fn search_url(&self) -> String {
        self.absolute(&self.search)
    }

    /// Join a path with `root_url` unless it is already absolute.
    pub fn absolute(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.root_url.trim_end_matches('/'), path)
        } else {
            format!("{}/{}", self.root_url.trim_end_matches('/'), path)
        }
    }

    pub fn supports(&self, kind: ContentKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn enabled_by_default(&self) -> bool {
        self.enabled_by_default.unwrap_or(!self.private)
    }

    pub fn is_api(&self) -> bool {
        matches!(self.format, SourceFormat::Api(_))
    }

    /// Query templates for a content kind, `{title}` when none are declared.
    pub fn query_templates(&self, kind: ContentKind) -> Vec<QueryTemplate> {
        let templates = self.queries.for_kind(kind);
        if templates.is_empty() {
            vec![QueryTemplate::default()]
        } else {
            templates.to_vec()
        }
    }

    /// Serve the source from a mirror: every URL on the original origin is
    /// moved to the mirror and the display name gains the mirror host.
    pub fn with_alias(mut self, mirror: &str) -> Result<Self, CatalogError> {
        let mirror_url = Url::parse(mirror)
            .map_err(|e| CatalogError::InvalidAlias(self.id.clone(), e.to_string()))?;
        let host = mirror_url
            .host_str()
            .ok_or_else(|| CatalogError::InvalidAlias(self.id.clone(), "missing host".into()))?
            .to_string();
        let mirror_origin = mirror_url.origin().ascii_serialization();
        let old_origin = self.root_url.trim_end_matches('/').to_string();

        self.root_url = replace_origin(&self.root_url, &old_origin, &mirror_origin);
        self.search = replace_origin(&self.search, &old_origin, &mirror_origin);
        if let Some(token) = self.token.as_mut() {
            token.path = replace_origin(&token.path, &old_origin, &mirror_origin);
        }
        if let Some(login) = self.login.as_mut() {
            login.path = replace_origin(&login.path, &old_origin, &mirror_origin);
        }
        self.name = format!("{} ({})", self.name, host);
        Ok(self)
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.name = label.to_string();
        self
    }
}

fn replace_origin(value: &str, old: &str, new: &str) -> String {
    match value.strip_prefix(old) {
        Some(rest) => format!("{}{}", new, rest),
        None => value.to_string(),
    }
}

/// Form login description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginForm {
    /// Login URL, relative to `root_url` or absolute.
    pub path: String,
    /// Form fields; `USERNAME` and `PASSWORD` are substituted.
    pub fields: BTreeMap<String, String>,
    /// Text present in the response body when login failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_marker: Option<String>,
}

/// Token negotiation endpoint for API sources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenEndpoint {
    pub path: String,
    /// JSON field holding the token.
    #[serde(default = "default_token_field")]
    pub field: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

fn default_token_field() -> String {
    "token".to_string()
}

/// One query template (`{title} {year}`) with its extra value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryTemplate {
    pub query: String,
    #[serde(default)]
    pub extra: String,
}

impl Default for QueryTemplate {
    fn default() -> Self {
        Self {
            query: "{title}".to_string(),
            extra: String::new(),
        }
    }
}

/// Query templates per content kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryTemplates {
    #[serde(default)]
    pub general: Vec<QueryTemplate>,
    #[serde(default)]
    pub movie: Vec<QueryTemplate>,
    #[serde(default)]
    pub show: Vec<QueryTemplate>,
    #[serde(default)]
    pub season: Vec<QueryTemplate>,
    #[serde(default)]
    pub episode: Vec<QueryTemplate>,
    #[serde(default)]
    pub anime: Vec<QueryTemplate>,
}

impl QueryTemplates {
    pub fn for_kind(&self, kind: ContentKind) -> &[QueryTemplate] {
        match kind {
            ContentKind::General => &self.general,
            ContentKind::Movie => &self.movie,
            ContentKind::Show => &self.show,
            ContentKind::Season => &self.season,
            ContentKind::Episode => &self.episode,
            ContentKind::Anime => &self.anime,
        }
    }
}

/// How results are extracted from a source's response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceFormat {
    Api(ApiFormat),
    Table(TableFormat),
}

/// Field map of a JSON API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiFormat {
    /// Dotted key path of the results array; empty for the document root.
    #[serde(default)]
    pub results: String,
    pub name: String,
    pub torrent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seeds: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peers: Option<String>,
    /// Appended to the name as `name - quality`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    /// Key of a per-result array whose entries override the parent fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subresults: Option<String>,
}

/// CSS selectors of a scraped results table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableFormat {
    pub row: String,
    pub name: FieldSelector,
    pub torrent: FieldSelector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_hash: Option<FieldSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<FieldSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seeds: Option<FieldSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peers: Option<FieldSelector>,
}

/// Extraction of one field inside a row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FieldSelector {
    /// CSS selector relative to the row; the row itself when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Attribute to read instead of the element text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,
    /// Regex applied to the value; the first capture group is kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// Login credentials configured per install.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Public view of a catalog entry.
#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub id: String,
    pub name: String,
    pub language: String,
    pub private: bool,
    pub enabled: bool,
    pub format: &'static str,
    pub kinds: Vec<ContentKind>,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {0}: {1}")]
    Io(String, String),

    #[error("Failed to parse catalog: {0}")]
    Parse(String),

    #[error("Duplicate source id: {0}")]
    Duplicate(String),

    #[error("Invalid alias for {0}: {1}")]
    InvalidAlias(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn test_search_url_relative_and_absolute() {
        let mut source = fixtures::table_source("t");
        source.search = "/search/QUERY".to_string();
        assert_eq!(source.search_url(), "https://t.example/search/QUERY");

        source.search = "https://api.t.example/q?s=QUERY".to_string();
        assert_eq!(source.search_url(), "https://api.t.example/q?s=QUERY");
    }

    #[test]
    fn test_enabled_by_default_follows_private() {
        let mut source = fixtures::table_source("t");
        assert!(source.enabled_by_default());
        source.private = true;
        assert!(!source.enabled_by_default());
        source.enabled_by_default = Some(true);
        assert!(source.enabled_by_default());
    }

    #[test]
    fn test_query_templates_default_to_title() {
        let source = fixtures::table_source("t");
        let templates = source.query_templates(ContentKind::Movie);
        assert_eq!(templates, vec![QueryTemplate::default()]);
    }

    #[test]
    fn test_with_alias_moves_origin_and_relabels() {
        let mut source = fixtures::table_source("t");
        source.search = "https://t.example/search/QUERY".to_string();
        let aliased = source.with_alias("https://mirror.example:8443/").unwrap();

        assert_eq!(aliased.root_url, "https://mirror.example:8443");
        assert_eq!(aliased.search_url(), "https://mirror.example:8443/search/QUERY");
        assert_eq!(aliased.name, "Table t (mirror.example)");
        assert!(matches!(aliased.format, SourceFormat::Table(_)));
    }

    #[test]
    fn test_with_alias_invalid() {
        let source = fixtures::table_source("t");
        assert!(matches!(
            source.with_alias("not a url"),
            Err(CatalogError::InvalidAlias(_, _))
        ));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials {
            username: "me".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{:?}", creds);
        assert!(debug.contains("me"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_format_deserialization() {
        let toml = r#"
            id = "yts"
            name = "YTS"
            root_url = "https://yts.example"
            search = "/api/v2/list_movies.json?query_term=QUERY"

            [format]
            type = "api"
            results = "data.movies"
            name = "title"
            torrent = "url"
            subresults = "torrents"
        "#;
        let source: SourceDefinition = toml::from_str(toml).unwrap();
        match source.format {
            SourceFormat::Api(api) => {
                assert_eq!(api.results, "data.movies");
                assert_eq!(api.subresults.as_deref(), Some("torrents"));
            }
            SourceFormat::Table(_) => panic!("expected api format"),
        }
        assert_eq!(source.language, "en");
        assert_eq!(source.separator, "%20");
        assert_eq!(source.kinds.len(), 6);
    }
}
