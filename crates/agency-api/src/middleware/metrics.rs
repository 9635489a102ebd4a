//! # Prometheus Metrics
//!
//! HTTP request counters and latency are recorded by the middleware.
//! Gateway callbacks are counted by outcome from the callback handler.
//! Everything is exposed in text format at `GET /metrics`.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use prometheus::core::Collector;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use uuid::Uuid;

/// Shared metrics backed by one registry. Clones share the same series.
#[derive(Clone)]
pub struct ApiMetrics {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    http_errors_total: IntCounterVec,
    gateway_callbacks_total: IntCounterVec,
}

impl std::fmt::Debug for ApiMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiMetrics")
            .field("requests", &self.requests())
            .field("errors", &self.errors())
            .finish()
    }
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("agency_http_requests_total", "Total HTTP requests"),
            &["method", "path", "status"],
        )?;
        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "agency_http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["method", "path"],
        )?;
        let http_errors_total = IntCounterVec::new(
            Opts::new("agency_http_errors_total", "HTTP responses with a 4xx or 5xx status"),
            &["method", "path", "status"],
        )?;
        let gateway_callbacks_total = IntCounterVec::new(
            Opts::new("agency_gateway_callbacks_total", "Gateway callbacks by outcome"),
            &["outcome"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(http_errors_total.clone()))?;
        registry.register(Box::new(gateway_callbacks_total.clone()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                http_requests_total,
                http_request_duration_seconds,
                http_errors_total,
                gateway_callbacks_total,
            }),
        })
    }

    /// Requests seen, summed over all labels.
    pub fn requests(&self) -> u64 {
        sum(&self.inner.http_requests_total)
    }

    /// Responses with a 4xx or 5xx status.
    pub fn errors(&self) -> u64 {
        sum(&self.inner.http_errors_total)
    }

    /// Callbacks recorded under `outcome`.
    pub fn callbacks(&self, outcome: &str) -> u64 {
        self.inner
            .gateway_callbacks_total
            .with_label_values(&[outcome])
            .get()
    }

    pub(crate) fn record_callback(&self, outcome: &str) {
        self.inner
            .gateway_callbacks_total
            .with_label_values(&[outcome])
            .inc();
    }

    fn record_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status = status.to_string();
        self.inner
            .http_requests_total
            .with_label_values(&[method, path, &status])
            .inc();
        self.inner
            .http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
        if status.starts_with('4') || status.starts_with('5') {
            self.inner
                .http_errors_total
                .with_label_values(&[method, path, &status])
                .inc();
        }
    }

    /// Encode every registered series in Prometheus text format.
    pub fn gather_and_encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.inner.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn sum(counter: &IntCounterVec) -> u64 {
    counter
        .collect()
        .iter()
        .flat_map(|family| family.get_metric())
        .map(|m| m.get_counter().get_value() as u64)
        .sum()
}

/// Replace id segments so every sale or agency does not get its own series.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| if Uuid::parse_str(segment).is_ok() { "{id}" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}

/// Record method, normalized path, status and latency of every response.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let metrics = request.extensions().get::<ApiMetrics>().cloned();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());
    let start = Instant::now();

    let response = next.run(request).await;

    if let Some(m) = metrics {
        m.record_request(&method, &path, response.status().as_u16(), start.elapsed().as_secs_f64());
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_metrics_are_zero() {
        let m = ApiMetrics::new().unwrap();
        assert_eq!(m.requests(), 0);
        assert_eq!(m.errors(), 0);
        assert_eq!(m.callbacks("completed"), 0);
    }

    #[test]
    fn errors_are_4xx_and_5xx_only() {
        let m = ApiMetrics::new().unwrap();
        m.record_request("GET", "/v1/sales/{id}", 200, 0.01);
        m.record_request("POST", "/v1/sales", 409, 0.02);
        m.record_request("POST", "/v1/sales/{id}/payment-token", 502, 0.3);
        assert_eq!(m.requests(), 3);
        assert_eq!(m.errors(), 2);
    }

    #[test]
    fn clones_share_series() {
        let m = ApiMetrics::new().unwrap();
        m.clone().record_callback("duplicate");
        assert_eq!(m.callbacks("duplicate"), 1);
    }

    #[test]
    fn uuid_segments_collapse() {
        let id = Uuid::new_v4();
        assert_eq!(normalize_path(&format!("/v1/sales/{id}/refund")), "/v1/sales/{id}/refund");
        assert_eq!(normalize_path("/v1/packages"), "/v1/packages");
    }

    #[test]
    fn encoded_output_names_series() {
        let m = ApiMetrics::new().unwrap();
        m.record_request("GET", "/health/liveness", 200, 0.001);
        m.record_callback("completed");
        let text = m.gather_and_encode().unwrap();
        assert!(text.contains("agency_http_requests_total"));
        assert!(text.contains("agency_gateway_callbacks_total{outcome=\"completed\"} 1"));
    }
}
