//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Queue traffic (produced, delivered, acked, reclaimed)
//! - Encoding (outcomes, durations)

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Queue Metrics
// =============================================================================

/// Jobs produced onto the queue.
pub static JOBS_PRODUCED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("pixerd_jobs_produced_total", "Total jobs produced").unwrap()
});

/// Jobs delivered to a consumer (first delivery only).
pub static JOBS_DELIVERED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("pixerd_jobs_delivered_total", "Total jobs delivered").unwrap()
});

/// Jobs acknowledged by consumers.
pub static JOBS_ACKED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("pixerd_jobs_acked_total", "Total jobs acknowledged").unwrap()
});

/// Stale pending jobs reclaimed from dead consumers.
pub static JOBS_RECLAIMED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "pixerd_jobs_reclaimed_total",
        "Total stale pending jobs reclaimed",
    )
    .unwrap()
});

// =============================================================================
// Encoding Metrics
// =============================================================================

/// Encode attempts total by result.
pub static ENCODES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pixerd_encodes_total", "Total encode attempts"),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

/// Encode duration in seconds.
pub static ENCODE_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("pixerd_encode_duration_seconds", "Duration of encodes")
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Queue
        Box::new(JOBS_PRODUCED.clone()),
        Box::new(JOBS_DELIVERED.clone()),
        Box::new(JOBS_ACKED.clone()),
        Box::new(JOBS_RECLAIMED.clone()),
        // Encoding
        Box::new(ENCODES_TOTAL.clone()),
        Box::new(ENCODE_DURATION.clone()),
    ]
}
