//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized naming conventions for the
//! search pipeline, provider calls, and cache behavior.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// Metrics prefix for all PaperGraph metrics
pub const METRICS_PREFIX: &str = "papergraph";

/// Register all metric descriptions
pub fn register_metrics() {
    // Search metrics
    describe_counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of graph search queries"
    );

    describe_histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Graph search latency in seconds"
    );

    describe_gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of nodes returned from search"
    );

    // Provider metrics
    describe_counter!(
        format!("{}_provider_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total provider API requests"
    );

    describe_counter!(
        format!("{}_provider_rate_limited_total", METRICS_PREFIX),
        Unit::Count,
        "Provider requests rejected by upstream rate limits"
    );

    describe_histogram!(
        format!("{}_provider_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Provider API latency in seconds"
    );

    // Cache metrics
    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache misses"
    );

    // Enrichment metrics
    describe_counter!(
        format!("{}_enrichment_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Background citation enrichment task runs"
    );

    describe_counter!(
        format!("{}_enrichment_edges_total", METRICS_PREFIX),
        Unit::Count,
        "Citation edges added by background enrichment"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record search metrics
pub fn record_search(duration_secs: f64, cached: bool, node_count: usize) {
    let source = if cached { "cache" } else { "pipeline" };

    counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        "source" => source
    )
    .increment(1);

    histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        "source" => source
    )
    .record(duration_secs);

    gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        "source" => source
    )
    .set(node_count as f64);
}

/// Helper to record provider call metrics
pub fn record_provider_call(provider: &str, duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_provider_requests_total", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_provider_duration_seconds", METRICS_PREFIX),
        "provider" => provider.to_string()
    )
    .record(duration_secs);
}

/// Helper to record upstream rate-limit rejections
pub fn record_rate_limited(provider: &str) {
    counter!(
        format!("{}_provider_rate_limited_total", METRICS_PREFIX),
        "provider" => provider.to_string()
    )
    .increment(1);
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool, cache_name: &str) {
    if hit {
        counter!(
            format!("{}_cache_hits_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    } else {
        counter!(
            format!("{}_cache_misses_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    }
}

/// Helper to record background enrichment outcomes
pub fn record_enrichment(edges_added: usize, failed_papers: usize) {
    let status = if failed_papers == 0 { "clean" } else { "partial" };

    counter!(
        format!("{}_enrichment_runs_total", METRICS_PREFIX),
        "status" => status
    )
    .increment(1);

    counter!(format!("{}_enrichment_edges_total", METRICS_PREFIX)).increment(edges_added as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_helpers_do_not_panic() {
        record_search(0.25, false, 120);
        record_provider_call("openalex", 0.8, true);
        record_rate_limited("semantic_scholar");
        record_cache(true, "search");
        record_enrichment(12, 1);
    }
}
