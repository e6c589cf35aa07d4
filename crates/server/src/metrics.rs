//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the Bookshelf metadata server:
//! - HTTP request metrics (latency, counts)
//! - Provider health (collected dynamically)
//! - Core provider, cache and aggregation metrics, registered from
//!   `bookshelf_core::metrics`

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use regex_lite::Regex;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "bookshelf_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bookshelf_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "bookshelf_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Provider Health (collected dynamically)
// =============================================================================

/// Providers currently suspended after failures.
pub static PROVIDERS_BLOCKED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "bookshelf_providers_blocked",
        "Number of metadata providers currently blocked by failure backoff",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Providers
    registry
        .register(Box::new(PROVIDERS_BLOCKED.clone()))
        .unwrap();

    // Core metrics (provider calls, caches, aggregation)
    for metric in bookshelf_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the provider status table.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let blocked = state.status_tracker().blocked_providers().len();
    PROVIDERS_BLOCKED.set(blocked as i64);
}

static ENTITY_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(author|book|isbn|asin)/[^/]+").unwrap());

static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = ENTITY_SEGMENT.replace_all(path, "/$1/{id}");
    let result = NUMERIC_SEGMENT.replace_all(&result, "/{id}$1");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_provider_id() {
        assert_eq!(normalize_path("/api/v1/providers/12"), "/api/v1/providers/{id}");
    }

    #[test]
    fn test_normalize_path_foreign_ids() {
        assert_eq!(
            normalize_path("/api/v1/metadata/author/OL23919A"),
            "/api/v1/metadata/author/{id}"
        );
        assert_eq!(
            normalize_path("/api/v1/metadata/search/isbn/9780261103573"),
            "/api/v1/metadata/search/isbn/{id}"
        );
        assert_eq!(
            normalize_path("/api/v1/metadata/search/asin/B007978NPG"),
            "/api/v1/metadata/search/asin/{id}"
        );
    }

    #[test]
    fn test_normalize_path_search_routes_untouched() {
        assert_eq!(
            normalize_path("/api/v1/metadata/search/author"),
            "/api/v1/metadata/search/author"
        );
        assert_eq!(normalize_path("/api/v1/health"), "/api/v1/health");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("bookshelf_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        PROVIDERS_BLOCKED.set(0);
        bookshelf_core::metrics::FAILOVER_ATTEMPTS
            .with_label_values(&["get_author"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("bookshelf_providers_blocked"));
        assert!(output.contains("bookshelf_failover_attempts_total"));
    }
}
