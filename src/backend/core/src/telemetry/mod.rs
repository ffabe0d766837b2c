//! Telemetry: structured logging and Prometheus metrics.
//!
//! - **Logging**: JSON/pretty/compact output through `tracing-subscriber`
//! - **Metrics**: Prometheus counters and histograms through the `metrics` facade
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_core::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let handle = init_telemetry(&TelemetryConfig::default())?;
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{init_metrics, MetricsConfig, MetricsRegistry, RequestDurationHistogram};

/// Logging and metrics configuration together.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Initialize logging and metrics. Call once at startup.
///
/// # Errors
///
/// Returns an error if either component fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<MetricsRegistry> {
    init_logging(&config.logging)?;
    let registry = init_metrics(&config.metrics)?;
    ::tracing::debug!(metrics_enabled = registry.is_enabled(), "Telemetry initialized");
    Ok(registry)
}
