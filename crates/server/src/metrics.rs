//! Prometheus metrics for the depot server.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no paths, registry ids or checksums, only aggregate counts.
//!
//! **Deployment Requirement**: The `/metrics` endpoint MUST be network-restricted
//! to authorized Prometheus scraper IPs only.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Dispatch metrics
pub static MAVEN_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "depot_maven_requests_total",
            "Maven requests by resolution outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static BROWSER_REJECTIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_browser_rejections_total",
        "Requests rejected because they came from an interactive browser",
    )
    .expect("metric creation failed")
});

pub static UPSTREAM_PROBE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "depot_upstream_probe_duration_seconds",
            "Time taken to probe an upstream for an artifact",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
    )
    .expect("metric creation failed")
});

// Cache population metrics
pub static UPLOAD_CALLBACKS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "depot_upload_callbacks_total",
            "Upload callbacks from the streaming proxy by result",
        ),
        &["result"],
    )
    .expect("metric creation failed")
});

pub static POPULATE_RACE_LOSSES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_populate_race_losses_total",
        "Upload callbacks whose object lost to a concurrently cached one",
    )
    .expect("metric creation failed")
});

// Eviction metrics
pub static EVICTIONS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_evictions_completed_total",
        "Cache entries physically removed by the reaper",
    )
    .expect("metric creation failed")
});

pub static EVICTIONS_FAILED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_evictions_failed_total",
        "Reaper claims released after a failure",
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(MAVEN_REQUESTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BROWSER_REJECTIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPSTREAM_PROBE_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_CALLBACKS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(POPULATE_RACE_LOSSES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(EVICTIONS_COMPLETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(EVICTIONS_FAILED.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Count a resolved Maven request.
pub fn record_request(outcome: &str) {
    MAVEN_REQUESTS.with_label_values(&[outcome]).inc();
}

/// Count an upload callback.
pub fn record_upload_callback(result: &str) {
    UPLOAD_CALLBACKS.with_label_values(&[result]).inc();
}
