//! Prometheus metrics: request counts/latencies plus ledger debit counts,
//! exposed at `GET /metrics` for scraping.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder, GaugeVec, HistogramVec,
    TextEncoder,
};
use std::time::Instant;

lazy_static! {
    pub static ref HTTP_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "often_http_request_duration_seconds",
        "HTTP request latency in seconds",
        &["method", "path", "status"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    )
    .unwrap();

    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "often_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_CONNECTIONS_ACTIVE: GaugeVec = register_gauge_vec!(
        "often_http_connections_active",
        "Number of active HTTP connections",
        &[]
    )
    .unwrap();

    pub static ref AUTH_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "often_auth_failures_total",
        "Total number of authentication failures",
        &["reason"]
    )
    .unwrap();

    /// One increment per committed `llm_usage` journal entry, labeled by
    /// provider, tracked alongside the generic HTTP metrics.
    pub static ref LEDGER_DEBITS_TOTAL: CounterVec = register_counter_vec!(
        "often_ledger_debits_total",
        "Total number of committed llm_usage ledger debits",
        &["provider"]
    )
    .unwrap();
}

/// Collapse path segments that look like ids (UUIDs, numeric ids) so
/// per-route metrics don't fan out into one series per account.
fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    let mut normalized = Vec::new();

    for segment in segments {
        if segment.is_empty() {
            continue;
        }

        if segment.len() == 36 && segment.contains('-') {
            normalized.push(":id");
        } else if segment.parse::<i64>().is_ok() {
            normalized.push(":id");
        } else {
            normalized.push(segment);
        }
    }

    format!("/{}", normalized.join("/"))
}

pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    HTTP_CONNECTIONS_ACTIVE.with_label_values(&[]).inc();

    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();
    let status_str = status.as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[method.as_str(), &path, &status_str])
        .observe(duration.as_secs_f64());
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), &path, &status_str])
        .inc();
    HTTP_CONNECTIONS_ACTIVE.with_label_values(&[]).dec();

    tracing::debug!(
        target: "metrics",
        method = %method,
        path = %path,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        "request completed"
    );

    response
}

pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            buffer,
        ),
        Err(e) => {
            tracing::error!("failed to encode metrics: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
                format!("failed to encode metrics: {e}").into_bytes(),
            )
        }
    }
}

pub fn record_auth_failure(reason: &str) {
    AUTH_FAILURES_TOTAL.with_label_values(&[reason]).inc();
    tracing::warn!(target: "security", reason = %reason, "authentication failure recorded");
}

pub fn record_ledger_debit(provider: &str) {
    LEDGER_DEBITS_TOTAL.with_label_values(&[provider]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/api/users/123"), "/api/users/:id");
        assert_eq!(
            normalize_path("/api/users/550e8400-e29b-41d4-a716-446655440000"),
            "/api/users/:id"
        );
        assert_eq!(normalize_path("/api/auth/login"), "/api/auth/login");
    }

    #[test]
    fn test_record_auth_failure() {
        record_auth_failure("invalid_password");
        let metric_families = prometheus::gather();
        assert!(!metric_families.is_empty());
    }
}
