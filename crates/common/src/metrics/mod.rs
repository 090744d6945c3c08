//! Metrics and observability utilities
//!
//! Prometheus metrics for the HTTP surface and the publication pipeline,
//! with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all ScholarMint metrics
pub const METRICS_PREFIX: &str = "scholarmint";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00,
];

/// Buckets for pipeline steps; pinning and minting take seconds to minutes
pub const PIPELINE_BUCKETS: &[f64] = &[
    0.050, 0.250, 1.000, 2.500, 5.000, 10.00, 30.00, 60.00, 120.0, 300.0,
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

    // Pipeline metrics
    describe_counter!(
        format!("{}_pipeline_steps_total", METRICS_PREFIX),
        Unit::Count,
        "Pipeline step executions by step and outcome"
    );

    describe_histogram!(
        format!("{}_pipeline_step_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Pipeline step latency in seconds"
    );

    describe_counter!(
        format!("{}_pinned_bytes_total", METRICS_PREFIX),
        Unit::Bytes,
        "Bytes uploaded to the pinning service"
    );

    describe_counter!(
        format!("{}_mint_attempts_total", METRICS_PREFIX),
        Unit::Count,
        "IP asset registration attempts by network and outcome"
    );

    // Ownership metrics
    describe_counter!(
        format!("{}_ownership_updates_total", METRICS_PREFIX),
        Unit::Count,
        "Claim and link attempts by action and outcome"
    );

    // Draft metrics
    describe_counter!(
        format!("{}_autosaves_total", METRICS_PREFIX),
        Unit::Count,
        "Draft auto-save writes by outcome"
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

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "error"
    }
}

/// Record one pipeline step execution
pub fn record_pipeline_step(step: &str, duration_secs: f64, success: bool) {
    counter!(
        format!("{}_pipeline_steps_total", METRICS_PREFIX),
        "step" => step.to_string(),
        "outcome" => outcome(success)
    )
    .increment(1);

    histogram!(
        format!("{}_pipeline_step_duration_seconds", METRICS_PREFIX),
        "step" => step.to_string()
    )
    .record(duration_secs);
}

/// Record an upload to the pinning service
pub fn record_pinned_bytes(kind: &str, bytes: usize) {
    counter!(
        format!("{}_pinned_bytes_total", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .increment(bytes as u64);
}

/// Record an IP asset registration attempt
pub fn record_mint(network: &str, success: bool) {
    counter!(
        format!("{}_mint_attempts_total", METRICS_PREFIX),
        "network" => network.to_string(),
        "outcome" => outcome(success)
    )
    .increment(1);
}

/// Record a claim or link attempt; `result` is `ok` or the rejection reason
pub fn record_ownership(action: &str, result: &str) {
    counter!(
        format!("{}_ownership_updates_total", METRICS_PREFIX),
        "action" => action.to_string(),
        "outcome" => result.to_string()
    )
    .increment(1);
}

/// Record an auto-save write
pub fn record_autosave(success: bool) {
    counter!(
        format!("{}_autosaves_total", METRICS_PREFIX),
        "outcome" => outcome(success)
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [LATENCY_BUCKETS, PIPELINE_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        let metrics = RequestMetrics::start("POST", "/v1/drafts");
        metrics.finish(201);
        record_pipeline_step("pdf", 0.2, true);
        record_pinned_bytes("pdf", 1024);
        record_mint("testnet", false);
        record_ownership("claim", "already_claimed");
        record_autosave(true);
    }
}
