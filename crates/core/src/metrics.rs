//! Prometheus metrics for the search engine.
//!
//! Covers:
//! - Searches (outcome, duration)
//! - Sources (results, failures, timeouts, rejected candidates)
//! - Subpage resolution

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Searches
// =============================================================================

/// Searches total by outcome.
pub static SEARCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trawl_searches_total", "Total searches"),
        &["outcome"], // "complete", "partial", "no_sources"
    )
    .unwrap()
});

/// Search duration in seconds.
pub static SEARCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("trawl_search_duration_seconds", "Duration of searches")
            .buckets(vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0]),
        &["outcome"],
    )
    .unwrap()
});

/// Records returned per search after the global pass.
pub static SEARCH_RESULTS: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("trawl_search_results", "Records returned per search")
            .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]),
    )
    .unwrap()
});

// =============================================================================
// Sources
// =============================================================================

/// Records kept per source, after cutoff.
pub static SOURCE_RESULTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trawl_source_results_total", "Records produced by each source"),
        &["source"],
    )
    .unwrap()
});

/// Source runs that ended in an error.
pub static SOURCE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trawl_source_failures_total", "Failed source runs"),
        &["source", "kind"], // kind: "network", "timeout", "login", "token", "parse", "panic"
    )
    .unwrap()
});

/// Sources that had not reported when the deadline passed.
pub static SOURCES_TIMED_OUT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "trawl_sources_timed_out_total",
            "Sources that missed the search deadline",
        ),
        &["source"],
    )
    .unwrap()
});

/// Candidates dropped by the filter.
pub static CANDIDATES_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "trawl_candidates_rejected_total",
            "Candidates rejected during verification",
        ),
        &["source"],
    )
    .unwrap()
});

// =============================================================================
// Subpages
// =============================================================================

/// Subpage fetches by result.
pub static SUBPAGE_FETCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trawl_subpage_fetches_total", "Subpage resolutions"),
        &["result"], // "resolved", "unresolved", "failed"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Searches
        Box::new(SEARCHES_TOTAL.clone()),
        Box::new(SEARCH_DURATION.clone()),
        Box::new(SEARCH_RESULTS.clone()),
        // Sources
        Box::new(SOURCE_RESULTS.clone()),
        Box::new(SOURCE_FAILURES.clone()),
        Box::new(SOURCES_TIMED_OUT.clone()),
        Box::new(CANDIDATES_REJECTED.clone()),
        // Subpages
        Box::new(SUBPAGE_FETCHES.clone()),
    ]
}
