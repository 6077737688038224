//! Metrics and observability utilities
//!
//! Prometheus-style metric names and helpers shared by the session engine and
//! the gateway.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Sahay metrics
pub const METRICS_PREFIX: &str = "sahay";

/// Histogram buckets for HTTP request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00, 30.00, 60.00,
];

/// Buckets for generative backend latency (model calls routinely take seconds)
pub const BACKEND_BUCKETS: &[f64] = &[
    0.250, 0.500, 1.000, 2.000, 4.000, 8.000, 15.00, 30.00, 60.00, 120.0,
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Backend metrics
    describe_counter!(
        format!("{}_backend_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total generative backend calls"
    );

    describe_histogram!(
        format!("{}_backend_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Generative backend latency in seconds"
    );

    // Document metrics
    describe_counter!(
        format!("{}_documents_processed_total", METRICS_PREFIX),
        Unit::Count,
        "Total uploaded documents by outcome"
    );

    describe_histogram!(
        format!("{}_document_pages", METRICS_PREFIX),
        Unit::Count,
        "Pages per successfully processed document"
    );

    // Session metrics
    describe_gauge!(
        format!("{}_sessions_active", METRICS_PREFIX),
        Unit::Count,
        "Live sessions"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record one generative backend call
pub fn record_backend_call(action: &str, model: &str, duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_backend_requests_total", METRICS_PREFIX),
        "action" => action.to_string(),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_backend_duration_seconds", METRICS_PREFIX),
        "action" => action.to_string()
    )
    .record(duration_secs);
}

/// Helper to record a document upload
pub fn record_document(success: bool, page_count: usize) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_documents_processed_total", METRICS_PREFIX),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(format!("{}_document_pages", METRICS_PREFIX)).record(page_count as f64);
    }
}

/// Helper to publish the live session count
pub fn record_active_sessions(count: usize) {
    gauge!(format!("{}_sessions_active", METRICS_PREFIX)).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [LATENCY_BUCKETS, BACKEND_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_helpers_without_recorder() {
        // No recorder installed: helpers must be no-ops
        let metrics = RequestMetrics::start("POST", "/v1/sessions");
        metrics.finish(201);
        record_backend_call("summary", "mock-generative", 0.2, true);
        record_document(false, 0);
        record_active_sessions(3);
    }
}
