use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::filter::FilterConfig;
use crate::searcher::effective_timeout;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    /// Per-install overrides keyed by source id.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceSettings>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Search engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Search timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Use the host ceiling (minus a safety margin) as the timeout.
    #[serde(default)]
    pub auto_timeout: bool,
    /// Deadline imposed by the embedding host, if any.
    #[serde(default)]
    pub host_timeout_secs: Option<u64>,
    /// Records kept per source.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Keep every accepted record per source.
    #[serde(default)]
    pub disable_max: bool,
    /// Rank by resolution before seeds.
    #[serde(default)]
    pub sort_by_resolution: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Time kept in reserve before starting a new request.
    #[serde(default = "default_request_margin_ms")]
    pub request_margin_ms: u64,
    /// Concurrent subpage fetches per source.
    #[serde(default = "default_subpage_workers")]
    pub subpage_workers: usize,
    /// Timeout of a single HTTP request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Log every matched row and extracted field.
    #[serde(default)]
    pub debug_parser: bool,
    #[serde(default = "default_icons_dir")]
    pub icons_dir: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            auto_timeout: false,
            host_timeout_secs: None,
            max_results: default_max_results(),
            disable_max: false,
            sort_by_resolution: false,
            poll_interval_ms: default_poll_interval_ms(),
            request_margin_ms: default_request_margin_ms(),
            subpage_workers: default_subpage_workers(),
            request_timeout_secs: default_request_timeout_secs(),
            debug_parser: false,
            icons_dir: default_icons_dir(),
            user_agent: default_user_agent(),
        }
    }
}

impl SearchConfig {
    /// Search deadline after applying the host ceiling.
    pub fn effective_timeout(&self) -> Duration {
        effective_timeout(
            Duration::from_secs(self.timeout_secs),
            self.host_timeout_secs.map(Duration::from_secs),
            self.auto_timeout,
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_margin(&self) -> Duration {
        Duration::from_millis(self.request_margin_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    28
}

fn default_max_results() -> usize {
    10
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_request_margin_ms() -> u64 {
    3000
}

fn default_subpage_workers() -> usize {
    8
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_icons_dir() -> String {
    "icons".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0 Safari/537.36"
        .to_string()
}

/// Source catalog location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
        }
    }
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("sources.toml")
}

/// Session persistence. Sessions are kept in memory when no path is set.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SessionsConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Per-install settings of one source.
#[derive(Clone, Default, Deserialize, Serialize)]
pub struct SourceSettings {
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Mirror URL replacing the source's origin.
    #[serde(default)]
    pub alias: Option<String>,
    /// Display name override.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for SourceSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSettings")
            .field("enabled", &self.enabled)
            .field("alias", &self.alias)
            .field("label", &self.label)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub search: SearchConfig,
    pub filter: FilterConfig,
    pub catalog: CatalogConfig,
    pub sessions: SessionsConfig,
    pub sources: BTreeMap<String, SanitizedSourceSettings>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSourceSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub password_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            search: config.search.clone(),
            filter: config.filter.clone(),
            catalog: config.catalog.clone(),
            sessions: config.sessions.clone(),
            sources: config
                .sources
                .iter()
                .map(|(id, s)| {
                    (
                        id.clone(),
                        SanitizedSourceSettings {
                            enabled: s.enabled,
                            alias: s.alias.clone(),
                            label: s.label.clone(),
                            username: s.username.clone(),
                            password_configured: s.password.is_some(),
                        },
                    )
                })
                .collect(),
        }
    }
}
