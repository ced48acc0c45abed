// prometheus exporter setup

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::IntoResponse;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

pub const ENTRIES_RECEIVED_TOTAL: &str = "collector_entries_received_total";
pub const ENTRIES_DROPPED_TOTAL: &str = "collector_entries_dropped_total";
pub const ENTRIES_FLUSHED_TOTAL: &str = "collector_entries_flushed_total";
pub const FLUSH_BATCH_SIZE: &str = "collector_flush_batch_size";
pub const FLUSH_ERRORS_TOTAL: &str = "collector_flush_errors_total";
pub const FLUSH_DURATION_SECONDS: &str = "collector_flush_duration_seconds";

pub fn report_received_entries(quantity: u64) {
    counter!(ENTRIES_RECEIVED_TOTAL).increment(quantity);
}

pub fn report_dropped_entries(cause: &'static str, quantity: u64) {
    counter!(ENTRIES_DROPPED_TOTAL, "cause" => cause).increment(quantity);
}

pub fn report_flush(batch_size: usize, elapsed: Duration, success: bool) {
    histogram!(FLUSH_BATCH_SIZE).record(batch_size as f64);
    histogram!(FLUSH_DURATION_SECONDS).record(elapsed.as_secs_f64());
    if success {
        counter!(ENTRIES_FLUSHED_TOTAL).increment(batch_size as u64);
    } else {
        counter!(FLUSH_ERRORS_TOTAL).increment(1);
        report_dropped_entries("flush_failed", batch_size as u64);
    }
}

pub fn setup_metrics_recorder() -> PrometheusHandle {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
    ];
    const BATCH_SIZES: &[f64] = &[
        1.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 5000.0,
    ];

    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Suffix("_seconds".to_string()), EXPONENTIAL_SECONDS)
        .expect("valid duration buckets")
        .set_buckets_for_metric(Matcher::Suffix("_batch_size".to_string()), BATCH_SIZES)
        .expect("valid batch size buckets")
        .install_recorder()
        .expect("failed to install prometheus recorder")
}

/// Middleware to record some common HTTP metrics
pub async fn track_metrics(req: Request<Body>, next: Next) -> impl IntoResponse {
    let start = Instant::now();

    let path = if let Some(matched_path) = req.extensions().get::<MatchedPath>() {
        matched_path.as_str().to_owned()
    } else {
        req.uri().path().to_owned()
    };

    let method = req.method().clone();

    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let labels = [
        ("method", method.to_string()),
        ("path", path),
        ("status", status),
    ];

    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_requests_duration_seconds", &labels).record(latency);

    response
}
