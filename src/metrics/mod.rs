use crate::error::{LimiterError, Result};
use axum::{
    body::Body,
    extract::State,
    http::{Response, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{debug, info};

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Create a new metrics service and install it as the global recorder
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            LimiterError::Config(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    /// Register all metrics with descriptions
    fn register_metrics() {
        describe_counter!(
            "ratelimit_decisions_total",
            "Rate limit decisions by tier, backend and outcome"
        );
        describe_counter!(
            "ratelimit_backend_failures_total",
            "Shared backend failures that fell back to the local store"
        );

        debug!("All metrics registered with descriptions");
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(service): State<MetricsService>) -> impl IntoResponse {
    let metrics = service.render();
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(Body::from(metrics))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Record a rate limit decision
pub fn record_decision(tier: &str, backend: &str, allowed: bool) {
    let labels = [
        ("tier", tier.to_string()),
        ("backend", backend.to_string()),
        ("outcome", if allowed { "allowed" } else { "denied" }.to_string()),
    ];
    counter!("ratelimit_decisions_total", &labels).increment(1);
}

/// Record a shared backend failure that fell back to the local store
pub fn record_backend_failure(backend: &str) {
    let labels = [("backend", backend.to_string())];
    counter!("ratelimit_backend_failures_total", &labels).increment(1);
}
