//! Search API handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use trawl_core::{
    ContentKind, NormalizedRecord, SearchError, SearchOutcome, SearchRequest, SourceSummary,
};

use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct SearchBody {
    /// Title to search for. `query` is accepted for free-text searches.
    #[serde(default, alias = "query")]
    pub title: String,
    /// Alternate titles keyed by language code.
    #[serde(default)]
    pub titles: BTreeMap<String, String>,
    #[serde(default)]
    pub kind: Option<ContentKind>,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub episode: Option<u32>,
    /// Forces an anime search regardless of `kind`.
    #[serde(default)]
    pub anime: bool,
    #[serde(default)]
    pub silent: bool,
    #[serde(default)]
    pub identifiers: BTreeMap<String, String>,
}

impl SearchBody {
    /// Build the engine request. Returns `None` for an empty title.
    pub fn into_request(self) -> Option<SearchRequest> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return None;
        }

        let kind = if self.anime {
            ContentKind::Anime
        } else {
            self.kind.unwrap_or_default()
        };
        let mut request = if kind == ContentKind::General && self.titles.is_empty() {
            SearchRequest::general(title)
        } else {
            SearchRequest::new(title, kind)
        };

        for (language, alternate) in self.titles {
            request = request.with_title(&language, alternate);
        }
        for (key, value) in self.identifiers {
            request = request.with_identifier(&key, value);
        }
        request.year = self.year;
        request.season = self.season;
        request.episode = self.episode;
        request.silent = self.silent;
        Some(request)
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<NormalizedRecord>,
    /// Sources that did not answer before the deadline.
    pub timed_out: Vec<String>,
    pub sources_queried: usize,
    pub duration_ms: u64,
}

impl From<SearchOutcome> for SearchResponse {
    fn from(outcome: SearchOutcome) -> Self {
        Self {
            results: outcome.records,
            timed_out: outcome.timed_out,
            sources_queried: outcome.sources_queried,
            duration_ms: outcome.duration_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SourcesResponse {
    pub sources: Vec<SourceSummary>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/search
///
/// Run a search across every enabled source.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SearchBody>,
) -> Result<Json<SearchResponse>, impl IntoResponse> {
    let Some(request) = body.into_request() else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Title must not be empty".to_string(),
            }),
        ));
    };

    match state.coordinator().search_detailed(&request).await {
        Ok(outcome) => {
            if !outcome.timed_out.is_empty() && !request.silent {
                info!(
                    title = %request.title,
                    timed_out = ?outcome.timed_out,
                    "Search returned partial results"
                );
            }
            Ok(Json(SearchResponse::from(outcome)))
        }
        Err(e @ SearchError::NoSourcesEnabled(_)) => {
            warn!(kind = %request.kind, "Search rejected: {}", e);
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}

/// GET /api/v1/sources
///
/// List catalog sources with their enabled state.
pub async fn list_sources(State(state): State<Arc<AppState>>) -> Json<SourcesResponse> {
    Json(SourcesResponse {
        sources: state.catalog().entries().map(|e| e.summary()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: serde_json::Value) -> SearchBody {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_query_alias_builds_general_request() {
        let request = body(serde_json::json!({ "query": "Dune" }))
            .into_request()
            .unwrap();
        assert_eq!(request.kind, ContentKind::General);
        assert_eq!(request.title, "Dune");
        assert_eq!(request.titles.get("original").map(String::as_str), Some("Dune"));
    }

    #[test]
    fn test_anime_flag_forces_kind() {
        let request = body(serde_json::json!({
            "title": "Akira",
            "kind": "movie",
            "anime": true,
            "titles": { "JA": "アキラ" },
            "year": 1988
        }))
        .into_request()
        .unwrap();
        assert_eq!(request.kind, ContentKind::Anime);
        assert_eq!(request.year, Some(1988));
        assert_eq!(request.alternate_title("ja"), Some("アキラ"));
    }

    #[test]
    fn test_blank_title_rejected() {
        assert!(body(serde_json::json!({ "title": "   " }))
            .into_request()
            .is_none());
        assert!(SearchBody::default().into_request().is_none());
    }
}
