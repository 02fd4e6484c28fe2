//! Keyword-based filter: template substitution plus simple heuristics.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex_lite::{Captures, Regex};
use tracing::debug;

use crate::catalog::SourceDefinition;
use crate::searcher::SearchRequest;

use super::{detect_resolution, Filter, FilterConfig, QueryVariant, Verdict};

static KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\s*([A-Za-z_]+)\s*(?::\s*([A-Za-z0-9_-]+))?\s*\}").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

const MB: u64 = 1024 * 1024;

/// Default [`Filter`] implementation.
#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    config: FilterConfig,
}

impl KeywordFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    fn keyword_value(request: &SearchRequest, caps: &Captures<'_>) -> String {
        let keyword = caps.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
        let modifier = caps.get(2).map(|m| m.as_str());

        match keyword.as_str() {
            "title" => match modifier {
                Some(lang) => request
                    .alternate_title(lang)
                    .unwrap_or(&request.title)
                    .to_string(),
                None => request.title.clone(),
            },
            "year" => request.year.map(|y| y.to_string()).unwrap_or_default(),
            "season" => padded(request.season, modifier),
            "episode" => padded(request.episode, modifier),
            _ => String::new(),
        }
    }

    fn tokens(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn title_matches(title: &str, name_tokens: &HashSet<String>) -> bool {
        let title_tokens = Self::tokens(title);
        !title_tokens.is_empty() && title_tokens.iter().all(|t| name_tokens.contains(t))
    }
}

fn padded(value: Option<u32>, width: Option<&str>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    match width.and_then(|w| w.parse::<usize>().ok()) {
        Some(width) => format!("{:0width$}", value, width = width),
        None => value.to_string(),
    }
}

impl Filter for KeywordFilter {
    fn query_variants(
        &self,
        source: &SourceDefinition,
        request: &SearchRequest,
    ) -> Vec<QueryVariant> {
        let templates = source.query_templates(request.kind);
        let mut variants: Vec<QueryVariant> = templates
            .iter()
            .map(|t| QueryVariant::new(t.query.clone(), t.extra.clone()))
            .collect();

        // Sources in another language also get asked for the localized title.
        let lang = source.language.to_lowercase();
        if let Some(alternate) = request.alternate_title(&lang) {
            if alternate != request.title {
                let localized = format!("{{title:{}}}", lang);
                variants.extend(
                    templates
                        .iter()
                        .filter(|t| t.query.contains("{title}"))
                        .map(|t| {
                            QueryVariant::new(t.query.replace("{title}", &localized), t.extra.clone())
                                .supplementary()
                        }),
                );
            }
        }

        variants
    }

    fn process_keywords(
        &self,
        _source: &SourceDefinition,
        request: &SearchRequest,
        text: &str,
    ) -> String {
        let replaced = KEYWORD.replace_all(text, |caps: &Captures<'_>| {
            Self::keyword_value(request, caps)
        });
        WHITESPACE.replace_all(replaced.trim(), " ").into_owned()
    }

    fn verify(
        &self,
        source: &SourceDefinition,
        request: &SearchRequest,
        title: &str,
        name: &str,
        size: Option<u64>,
    ) -> Verdict {
        if name.trim().is_empty() {
            return Verdict::Reject("empty name".to_string());
        }

        let lowered = name.to_lowercase();
        if let Some(keyword) = self
            .config
            .exclude_keywords
            .iter()
            .find(|k| !k.is_empty() && lowered.contains(&k.to_lowercase()))
        {
            return Verdict::Reject(format!("excluded keyword '{}'", keyword));
        }

        if !self.config.allowed_resolutions.is_empty() {
            let resolution = detect_resolution(name);
            if !self.config.allowed_resolutions.contains(&resolution) {
                return Verdict::Reject(format!("resolution {} not allowed", resolution));
            }
        }

        if let Some(size) = size.filter(|s| *s > 0) {
            if self.config.min_size_mb > 0 && size < self.config.min_size_mb * MB {
                return Verdict::Reject(format!("size {} below minimum", size));
            }
            if self.config.max_size_mb > 0 && size > self.config.max_size_mb * MB {
                return Verdict::Reject(format!("size {} above maximum", size));
            }
        }

        if self.config.verify_title {
            let name_tokens: HashSet<String> = Self::tokens(name).into_iter().collect();
            let matched = std::iter::once(title)
                .chain(request.titles.values().map(String::as_str))
                .filter(|t| !Self::tokens(t).is_empty())
                .any(|t| Self::title_matches(t, &name_tokens));
            let checkable = !Self::tokens(title).is_empty();

            if checkable && !matched {
                debug!(source = %source.id, name, title, "Title mismatch");
                return Verdict::Reject(format!("name does not match '{}'", title));
            }
        }

        Verdict::Accept
    }
}
