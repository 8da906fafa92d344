//! Prometheus metrics for semindex
//!
//! Counters and histograms for embedding, storage and indexing. Metrics
//! are observational only.

use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::sync::Once;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Total embedding generation requests
    pub static ref EMBEDDING_REQUESTS: Counter = Counter::with_opts(
        Opts::new(
            "semindex_embedding_requests_total",
            "Total embedding generation requests"
        )
    ).expect("Failed to create EMBEDDING_REQUESTS counter");

    /// Embedding generation latency in seconds
    pub static ref EMBEDDING_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "semindex_embedding_latency_seconds",
            "Embedding generation latency in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0])
    ).expect("Failed to create EMBEDDING_LATENCY histogram");

    /// Point upsert latency in seconds
    pub static ref UPSERT_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "semindex_upsert_latency_seconds",
            "Point upsert latency in seconds"
        ).buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0])
    ).expect("Failed to create UPSERT_LATENCY histogram");

    /// Files embedded and stored
    pub static ref FILES_INDEXED: Counter = Counter::with_opts(
        Opts::new(
            "semindex_files_indexed_total",
            "Files embedded and stored"
        )
    ).expect("Failed to create FILES_INDEXED counter");

    /// Eligible files that failed at some stage
    pub static ref FILES_FAILED: Counter = Counter::with_opts(
        Opts::new(
            "semindex_files_failed_total",
            "Eligible files that failed at some stage"
        )
    ).expect("Failed to create FILES_FAILED counter");

    /// Wall time of a whole indexing run in seconds
    pub static ref INDEX_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "semindex_indexing_duration_seconds",
            "Wall time of an indexing run in seconds"
        ).buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0])
    ).expect("Failed to create INDEX_LATENCY histogram");

    /// Total number of search requests
    pub static ref SEARCH_REQUESTS: Counter = Counter::with_opts(
        Opts::new(
            "semindex_search_requests_total",
            "Total number of search requests"
        )
    ).expect("Failed to create SEARCH_REQUESTS counter");
}

static REGISTER: Once = Once::new();

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(EMBEDDING_REQUESTS.clone()),
            Box::new(EMBEDDING_LATENCY.clone()),
            Box::new(UPSERT_LATENCY.clone()),
            Box::new(FILES_INDEXED.clone()),
            Box::new(FILES_FAILED.clone()),
            Box::new(INDEX_LATENCY.clone()),
            Box::new(SEARCH_REQUESTS.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                tracing::warn!("Failed to register metric: {}", e);
            }
        }
    });
}

/// Gather all metrics and encode them in Prometheus text format
///
/// Returns an empty string if encoding fails.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Metrics contained invalid UTF-8: {}", e);
        String::new()
    })
}
