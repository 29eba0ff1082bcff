//! Telemetry module for EmailBill
//!
//! Prometheus counters for HTTP traffic, OAuth flows, token refreshes and
//! link gate rejections.

use crate::{EmailBillError, Result};
use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use once_cell::sync::Lazy;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, TextEncoder, register_counter_vec,
    register_histogram_vec,
};

/// HTTP requests total counter
static HTTP_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "emailbill_http_requests_total",
        "Total number of HTTP requests received",
        &["handler", "method", "code"]
    )
    .expect("register emailbill_http_requests_total")
});

/// HTTP request duration histogram
static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        HistogramOpts::new(
            "emailbill_http_request_duration_seconds",
            "Duration of HTTP requests in seconds"
        ),
        &["handler", "method"]
    )
    .expect("register emailbill_http_request_duration_seconds")
});

static AUTH_FLOWS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "emailbill_auth_flows_total",
        "Completed OAuth callbacks by provider and outcome",
        &["provider", "outcome"]
    )
    .expect("register emailbill_auth_flows_total")
});

static TOKEN_REFRESHES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "emailbill_token_refreshes_total",
        "Access token refresh attempts by provider and outcome",
        &["provider", "outcome"]
    )
    .expect("register emailbill_token_refreshes_total")
});

static GATE_REJECTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "emailbill_gate_rejections_total",
        "Requests rejected by the link gate",
        &["reason"]
    )
    .expect("register emailbill_gate_rejections_total")
});

/// Record HTTP request metric
pub fn record_http_request(handler: &str, method: &str, status_code: u16) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[handler, method, &status_code.to_string()])
        .inc();
}

/// Record HTTP request duration
pub fn record_http_duration(handler: &str, method: &str, duration_secs: f64) {
    HTTP_REQUEST_DURATION
        .with_label_values(&[handler, method])
        .observe(duration_secs);
}

/// Record the outcome of an OAuth callback (`success` or an error reason)
pub fn record_auth_flow(provider: &str, outcome: &str) {
    AUTH_FLOWS_TOTAL.with_label_values(&[provider, outcome]).inc();
}

pub fn record_token_refresh(provider: &str, outcome: &str) {
    TOKEN_REFRESHES_TOTAL
        .with_label_values(&[provider, outcome])
        .inc();
}

pub fn record_gate_rejection(reason: &str) {
    GATE_REJECTIONS_TOTAL.with_label_values(&[reason]).inc();
}

/// Get Prometheus metrics in text format
pub fn get_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| EmailBillError::config(format!("Failed to encode metrics: {}", e)))?;

    String::from_utf8(buffer)
        .map_err(|e| EmailBillError::config(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Axum middleware recording request count and latency per matched route
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let handler = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = req.method().to_string();
    let start = std::time::Instant::now();

    let response = next.run(req).await;

    record_http_request(&handler, &method, response.status().as_u16());
    record_http_duration(&handler, &method, start.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_metrics() {
        record_http_request("/api/user", "GET", 200);
        record_http_duration("/api/user", "GET", 0.123);
        record_auth_flow("google", "success");
        record_token_refresh("clio", "failure");
        record_gate_rejection("partially_linked");

        let metrics = get_metrics().unwrap();

        assert!(metrics.contains("emailbill_http_requests_total"));
        assert!(metrics.contains("emailbill_http_request_duration_seconds"));
        assert!(metrics.contains("emailbill_auth_flows_total"));
        assert!(metrics.contains("emailbill_token_refreshes_total"));
        assert!(metrics.contains("emailbill_gate_rejections_total"));
    }

    #[test]
    fn test_gate_rejections_are_labelled() {
        record_gate_rejection("unauthenticated");

        let metrics = get_metrics().unwrap();
        assert!(metrics.contains("reason=\"unauthenticated\""));
    }
}
