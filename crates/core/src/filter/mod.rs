//! Verification and query-building collaborator of the search engine.
//!
//! A [`Filter`] decides which query variants a source is asked, rewrites
//! template keywords, and accepts or rejects each extracted candidate.

mod config;
mod keyword;

pub use config::FilterConfig;
pub use keyword::KeywordFilter;

use std::fmt;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::catalog::SourceDefinition;
use crate::searcher::{merge_results, NormalizedRecord, SearchRequest};

/// Outcome of verifying one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// Rejected, with a reason for logging.
    Reject(String),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

/// Video resolution detected from a result name.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Resolution {
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "240p")]
    R240p,
    #[serde(rename = "480p")]
    R480p,
    #[serde(rename = "720p")]
    R720p,
    #[serde(rename = "1080p")]
    R1080p,
    #[serde(rename = "2160p")]
    R2160p,
}

impl Resolution {
    /// Ranking score; higher is better.
    pub fn score(&self) -> u32 {
        match self {
            Resolution::Unknown => 0,
            Resolution::R240p => 1,
            Resolution::R480p => 2,
            Resolution::R720p => 3,
            Resolution::R1080p => 4,
            Resolution::R2160p => 5,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Resolution::Unknown => "unknown",
            Resolution::R240p => "240p",
            Resolution::R480p => "480p",
            Resolution::R720p => "720p",
            Resolution::R1080p => "1080p",
            Resolution::R2160p => "2160p",
        };
        f.write_str(s)
    }
}

static RESOLUTION_PATTERNS: Lazy<Vec<(Resolution, Regex)>> = Lazy::new(|| {
    [
        (Resolution::R2160p, r"(?i)\b(2160p|4k|uhd)\b"),
        (Resolution::R1080p, r"(?i)\b(1080[pi]|full ?hd|fhd)\b"),
        (Resolution::R720p, r"(?i)\b(720p|hdrip|hd)\b"),
        (Resolution::R480p, r"(?i)\b(480p|576p|dvdrip|dvd|xvid|sd)\b"),
        (Resolution::R240p, r"(?i)\b(240p|360p|cam|ts|telesync)\b"),
    ]
    .into_iter()
    .map(|(res, pattern)| (res, Regex::new(pattern).unwrap()))
    .collect()
});

/// Detect the resolution advertised in a release name.
pub fn detect_resolution(name: &str) -> Resolution {
    RESOLUTION_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(name))
        .map(|(res, _)| *res)
        .unwrap_or_default()
}

/// One query to issue against a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryVariant {
    /// Query template, keywords not yet processed.
    pub query: String,
    /// Extra template (category and similar).
    pub extra: String,
    /// Only issued when earlier variants produced nothing.
    pub supplementary: bool,
}

impl QueryVariant {
    pub fn new(query: impl Into<String>, extra: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            extra: extra.into(),
            supplementary: false,
        }
    }

    pub fn supplementary(mut self) -> Self {
        self.supplementary = true;
        self
    }
}

/// Ranking and verification service used by every source worker.
pub trait Filter: Send + Sync {
    /// Query variants to try against `source`, in order.
    fn query_variants(
        &self,
        source: &SourceDefinition,
        request: &SearchRequest,
    ) -> Vec<QueryVariant>;

    /// Substitute template keywords (`{title}`, `{year}`, ...) in `text`.
    fn process_keywords(
        &self,
        source: &SourceDefinition,
        request: &SearchRequest,
        text: &str,
    ) -> String;

    /// Decide whether a candidate named `name` matches `title`.
    fn verify(
        &self,
        source: &SourceDefinition,
        request: &SearchRequest,
        title: &str,
        name: &str,
        size: Option<u64>,
    ) -> Verdict;

    fn determine_resolution(&self, name: &str) -> Resolution {
        detect_resolution(name)
    }

    /// Global pass over the merged results of all sources.
    fn finalize(
        &self,
        _request: &SearchRequest,
        records: Vec<NormalizedRecord>,
        sort_by_resolution: bool,
    ) -> Vec<NormalizedRecord> {
        merge_results(records, sort_by_resolution)
    }
}
