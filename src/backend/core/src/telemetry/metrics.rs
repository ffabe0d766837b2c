//! Prometheus metrics for requests, authentication, and authorization decisions.
//!
//! Counters are recorded through the `metrics` facade everywhere in the crate.
//! Without an installed recorder they are no-ops, which is what tests rely on.
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_core::telemetry::metrics::RequestDurationHistogram;
//!
//! RequestDurationHistogram::record("GET", "/api/roles", 200, 0.004);
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection and the `/metrics` endpoint are enabled
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Histogram buckets for request durations (in seconds)
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            duration_buckets: default_duration_buckets(),
        }
    }
}

fn default_metrics_enabled() -> bool { true }

fn default_duration_buckets() -> Vec<f64> {
    vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
}

/// Handle to the installed Prometheus recorder, if any.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    prometheus_handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("prometheus_handle", &self.prometheus_handle.is_some())
            .finish()
    }
}

impl MetricsRegistry {
    /// A registry with no recorder; `render` yields `None`.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.prometheus_handle.is_some()
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> Option<String> {
        self.prometheus_handle.as_ref().map(|h| h.render())
    }
}

/// Initialize the metrics subsystem.
///
/// # Errors
///
/// Returns an error if the buckets are invalid or a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> anyhow::Result<MetricsRegistry> {
    if !config.enabled {
        return Ok(MetricsRegistry::disabled());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets(&config.duration_buckets)?
        .install_recorder()?;

    register_metric_descriptions();

    tracing::info!("Metrics initialized");

    Ok(MetricsRegistry {
        prometheus_handle: Some(handle),
    })
}

fn register_metric_descriptions() {
    describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!("http_requests_total", "Total number of HTTP requests");

    describe_counter!("auth_success_total", "Successful token authentications");
    describe_counter!("auth_errors_total", "Rejected authentication attempts by error type");
    describe_counter!("login_attempts_total", "Login attempts by outcome");
    describe_counter!("authz_decisions_total", "Authorization decisions by outcome");

    describe_counter!("rate_limit_rejected_total", "Requests rejected by the rate limiter");
    describe_counter!("warden_errors_total", "Errors raised by code and category");
}

/// Request duration histogram for HTTP requests.
pub struct RequestDurationHistogram;

impl RequestDurationHistogram {
    /// Record a completed request.
    pub fn record(method: &str, path: &str, status_code: u16, duration_seconds: f64) {
        histogram!(
            "http_request_duration_seconds",
            "method" => method.to_string(),
            "path" => path.to_string(),
            "status_code" => status_code.to_string(),
        )
        .record(duration_seconds);

        counter!(
            "http_requests_total",
            "method" => method.to_string(),
            "path" => path.to_string(),
            "status_code" => status_code.to_string(),
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_config_defaults() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert!(!config.duration_buckets.is_empty());
    }

    #[test]
    fn test_disabled_registry_renders_nothing() {
        let registry = init_metrics(&MetricsConfig {
            enabled: false,
            ..Default::default()
        })
        .unwrap();
        assert!(!registry.is_enabled());
        assert!(registry.render().is_none());
    }

    #[test]
    fn test_record_without_recorder_is_noop() {
        RequestDurationHistogram::record("GET", "/health", 200, 0.001);
    }
}
