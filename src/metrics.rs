//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("profilesync_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");
    pub static ref HTTP_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "profilesync_http_request_duration_seconds",
            "HTTP request duration in seconds"
        ).buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["method", "endpoint"]
    ).expect("metric can be created");

    // Source Metrics
    pub static ref STRATEGY_ATTEMPTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("profilesync_strategy_attempts_total", "Retrieval strategy attempts by outcome"),
        &["strategy", "outcome"]
    ).expect("metric can be created");
    pub static ref SOURCE_FETCH_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "profilesync_source_fetch_duration_seconds",
            "Profile document fetch duration in seconds"
        ).buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["strategy"]
    ).expect("metric can be created");

    // Sync Metrics
    pub static ref PROFILE_CACHE_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("profilesync_profile_cache_total", "Freshness gate decisions"),
        &["result"]
    ).expect("metric can be created");
    pub static ref PROFILE_SYNC_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("profilesync_profile_sync_total", "Profile synchronization attempts by outcome"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref REFRESH_CYCLE_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("profilesync_refresh_cycle_candidates_total", "Batch refresh candidates by outcome"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref LAST_REFRESH_CYCLE_TIMESTAMP: IntGauge = IntGauge::new(
        "profilesync_last_refresh_cycle_timestamp_seconds",
        "Unix time of the last completed refresh cycle"
    ).expect("metric can be created");

    // Image Metrics
    pub static ref IMAGE_PROXY_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("profilesync_image_proxy_total", "Image proxy requests by outcome"),
        &["outcome"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("profilesync_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .expect("HTTP_REQUESTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))
        .expect("HTTP_REQUEST_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(STRATEGY_ATTEMPTS_TOTAL.clone()))
        .expect("STRATEGY_ATTEMPTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(SOURCE_FETCH_DURATION_SECONDS.clone()))
        .expect("SOURCE_FETCH_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(PROFILE_CACHE_TOTAL.clone()))
        .expect("PROFILE_CACHE_TOTAL can be registered");
    REGISTRY
        .register(Box::new(PROFILE_SYNC_TOTAL.clone()))
        .expect("PROFILE_SYNC_TOTAL can be registered");
    REGISTRY
        .register(Box::new(REFRESH_CYCLE_TOTAL.clone()))
        .expect("REFRESH_CYCLE_TOTAL can be registered");
    REGISTRY
        .register(Box::new(LAST_REFRESH_CYCLE_TIMESTAMP.clone()))
        .expect("LAST_REFRESH_CYCLE_TIMESTAMP can be registered");
    REGISTRY
        .register(Box::new(IMAGE_PROXY_TOTAL.clone()))
        .expect("IMAGE_PROXY_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
