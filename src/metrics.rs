use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, Encoder, Histogram,
    HistogramVec, IntCounterVec, TextEncoder,
};
use std::time::Instant;

use crate::scope::ScopeKind;

lazy_static! {
    // Request metrics
    pub static ref STATS_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "stats_requests_total",
        "Total number of statistics requests received",
        &["scope"]
    ).unwrap();

    pub static ref STATS_REQUEST_ERRORS: IntCounterVec = register_int_counter_vec!(
        "stats_request_errors_total",
        "Total number of statistics requests answered with an error",
        &["kind"]
    ).unwrap();

    pub static ref STATS_REQUEST_DURATION: Histogram = register_histogram!(
        "stats_request_duration_seconds",
        "Statistics request duration in seconds",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]
    ).unwrap();

    // Backend metrics
    pub static ref BACKEND_QUERY_DURATION: HistogramVec = register_histogram_vec!(
        "stats_backend_query_duration_seconds",
        "Duration of individual range queries against the metrics backend",
        &["metric"],
        vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0]
    ).unwrap();
}

/// Counts a request on creation and records its duration when dropped.
pub struct RequestTimer {
    start: Instant,
}

impl RequestTimer {
    pub fn new(scope: ScopeKind) -> Self {
        STATS_REQUESTS.with_label_values(&[scope.as_str()]).inc();
        Self {
            start: Instant::now(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        STATS_REQUEST_DURATION.observe(duration);
    }
}

pub fn record_request_error(kind: &str) {
    STATS_REQUEST_ERRORS.with_label_values(&[kind]).inc();
}

pub fn record_backend_query(metric: &str, duration: f64) {
    BACKEND_QUERY_DURATION.with_label_values(&[metric]).observe(duration);
}

/// Renders every registered metric in the text exposition format.
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
