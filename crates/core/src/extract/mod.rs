//! Extraction of raw candidates from source responses.
//!
//! Two strategies share one contract: turn a response body into zero or more
//! [`ExtractedRow`]s. The strategy is picked from the source's
//! [`SourceFormat`] tag, never from free-form configuration strings.

mod api;
mod locator;
mod subpage;
mod table;

pub use api::ApiExtractor;
pub(crate) use api::walk;
pub use locator::{
    absolute_url, append_headers, is_magnet, magnet_info_hash, parse_headers, split_headers,
};
pub use subpage::{find_locator, SubpageCache, SubpageResolver};
pub use table::TableExtractor;

use thiserror::Error;

use crate::catalog::{SourceDefinition, SourceFormat};
use crate::searcher::RawCandidate;

/// Errors that make a whole response unusable.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Invalid JSON: {0}")]
    Json(String),

    #[error("Invalid selector '{0}': {1}")]
    Selector(String, String),

    #[error("Invalid pattern '{0}': {1}")]
    Pattern(String, String),
}

/// A candidate as produced by an extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedRow {
    /// Locator is final.
    Ready(RawCandidate),
    /// Locator points to an intermediate page that still has to be resolved.
    Subpage(RawCandidate),
}

impl ExtractedRow {
    pub fn candidate(&self) -> &RawCandidate {
        match self {
            ExtractedRow::Ready(c) | ExtractedRow::Subpage(c) => c,
        }
    }
}

/// Session material that may be embedded into locators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionHeaders {
    /// Cookies for the source domain.
    pub cookie: Option<String>,
    /// Negotiated API token.
    pub token: Option<String>,
    pub user_agent: String,
}

impl SessionHeaders {
    /// `Cookie` and `User-Agent`, when a session cookie exists.
    pub fn cookie_headers(&self) -> Vec<(String, String)> {
        match &self.cookie {
            Some(cookie) if !cookie.is_empty() => vec![
                ("Cookie".to_string(), cookie.clone()),
                ("User-Agent".to_string(), self.user_agent.clone()),
            ],
            _ => Vec::new(),
        }
    }

    /// `Authorization` and `User-Agent`, when a token was negotiated.
    pub fn token_headers(&self) -> Vec<(String, String)> {
        match &self.token {
            Some(token) if !token.is_empty() => vec![
                ("Authorization".to_string(), token.clone()),
                ("User-Agent".to_string(), self.user_agent.clone()),
            ],
            _ => Vec::new(),
        }
    }
}

/// Extraction strategy of a source.
#[derive(Debug)]
pub enum Extractor<'a> {
    Api(ApiExtractor<'a>),
    Table(TableExtractor<'a>),
}

impl<'a> Extractor<'a> {
    pub fn for_source(source: &'a SourceDefinition, debug: bool) -> Self {
        match &source.format {
            SourceFormat::Api(format) => Extractor::Api(ApiExtractor::new(source, format, debug)),
            SourceFormat::Table(format) => {
                Extractor::Table(TableExtractor::new(source, format, debug))
            }
        }
    }

    /// Extract every candidate from `body`, fetched from `page_url`.
    pub fn extract(
        &self,
        body: &str,
        page_url: &str,
        session: &SessionHeaders,
    ) -> Result<Vec<ExtractedRow>, ExtractError> {
        match self {
            Extractor::Api(api) => api.extract(body, session),
            Extractor::Table(table) => table.extract(body, page_url, session),
        }
    }
}
