//! Mock filter for testing.

use std::sync::{PoisonError, RwLock};

use crate::catalog::SourceDefinition;
use crate::filter::{Filter, KeywordFilter, QueryVariant, Verdict};
use crate::searcher::SearchRequest;

/// Mock implementation of the Filter trait.
///
/// Accepts every named candidate unless its name contains one of the
/// configured reject markers. Query variants and keyword processing come
/// from a default [`KeywordFilter`] unless variants are scripted.
#[derive(Debug, Default)]
pub struct MockFilter {
    keywords: KeywordFilter,
    variants: RwLock<Option<Vec<QueryVariant>>>,
    rejects: RwLock<Vec<String>>,
    verified: RwLock<Vec<String>>,
}

impl MockFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use these variants for every source.
    pub fn set_variants(&self, variants: Vec<QueryVariant>) {
        *self.variants.write().unwrap_or_else(PoisonError::into_inner) = Some(variants);
    }

    /// Reject candidates whose name contains `marker`.
    pub fn reject_containing(&self, marker: &str) {
        self.rejects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(marker.to_string());
    }

    /// Names of every candidate passed to `verify`.
    pub fn verified(&self) -> Vec<String> {
        self.verified
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Filter for MockFilter {
    fn query_variants(
        &self,
        source: &SourceDefinition,
        request: &SearchRequest,
    ) -> Vec<QueryVariant> {
        match &*self.variants.read().unwrap_or_else(PoisonError::into_inner) {
            Some(variants) => variants.clone(),
            None => self.keywords.query_variants(source, request),
        }
    }

    fn process_keywords(
        &self,
        source: &SourceDefinition,
        request: &SearchRequest,
        text: &str,
    ) -> String {
        self.keywords.process_keywords(source, request, text)
    }

    fn verify(
        &self,
        _source: &SourceDefinition,
        _request: &SearchRequest,
        _title: &str,
        name: &str,
        _size: Option<u64>,
    ) -> Verdict {
        self.verified
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.to_string());

        if name.trim().is_empty() {
            return Verdict::Reject("empty name".to_string());
        }
        let rejects = self.rejects.read().unwrap_or_else(PoisonError::into_inner);
        match rejects.iter().find(|marker| name.contains(marker.as_str())) {
            Some(marker) => Verdict::Reject(format!("contains '{}'", marker)),
            None => Verdict::Accept,
        }
    }
}
