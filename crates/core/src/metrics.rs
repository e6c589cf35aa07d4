//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Provider calls (requests, durations, rate limit waits)
//! - Per-provider result caches
//! - Aggregation (failovers, merged result sizes)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Provider Metrics
// =============================================================================

/// Provider calls total by outcome.
pub static PROVIDER_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "bookshelf_provider_requests_total",
            "Total metadata provider calls",
        ),
        &["provider", "operation", "result"], // result: "success", "not_found", "error", "timeout"
    )
    .unwrap()
});

/// Provider call duration in seconds.
pub static PROVIDER_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "bookshelf_provider_request_duration_seconds",
            "Duration of metadata provider calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["provider", "operation"],
    )
    .unwrap()
});

/// Times a request had to wait for a rate limit slot.
pub static RATE_LIMIT_WAITS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "bookshelf_rate_limit_waits_total",
            "Total requests delayed by a provider rate limiter",
        ),
        &["provider"],
    )
    .unwrap()
});

// =============================================================================
// Cache Metrics
// =============================================================================

/// Cache lookups by cache and result.
pub static CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "bookshelf_metadata_cache_lookups_total",
            "Total provider cache lookups",
        ),
        &["cache", "result"], // result: "hit", "miss"
    )
    .unwrap()
});

// =============================================================================
// Aggregation Metrics
// =============================================================================

/// Times the aggregation service moved on to the next provider.
pub static FAILOVER_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "bookshelf_failover_attempts_total",
            "Total failovers to a lower-priority provider",
        ),
        &["operation"],
    )
    .unwrap()
});

/// Merged result count per search.
pub static AGGREGATE_RESULTS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "bookshelf_aggregate_results",
            "Number of results returned per aggregated search",
        )
        .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
        &["operation"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Providers
        Box::new(PROVIDER_REQUESTS.clone()),
        Box::new(PROVIDER_REQUEST_DURATION.clone()),
        Box::new(RATE_LIMIT_WAITS.clone()),
        // Caches
        Box::new(CACHE_LOOKUPS.clone()),
        // Aggregation
        Box::new(FAILOVER_ATTEMPTS.clone()),
        Box::new(AGGREGATE_RESULTS.clone()),
    ]
}
