//! Fleet Observability
//!
//! Structured logging setup (JSON by default), optional OpenTelemetry span
//! export, and the Prometheus metrics the registry, mirror and router
//! report into.

#[cfg(feature = "metrics")]
pub mod metrics;

#[cfg(feature = "tracing")]
pub mod trace;

#[cfg(feature = "opentelemetry")]
pub mod otel;

#[cfg(feature = "metrics")]
pub use metrics::{FleetMetrics, MetricsError, MirrorOp, RoutingOutcome};

#[cfg(feature = "tracing")]
pub use trace::{TelemetryGuard, init_tracing};

/// Latency buckets in seconds, 5ms to 10s
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// How log lines are rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable text
    Text,
}

impl std::str::FromStr for LogFormat {
    type Err = ObservabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "pretty" => Ok(LogFormat::Text),
            other => Err(ObservabilityError::Config(format!(
                "unknown log format: {other}"
            ))),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Service name attached to exported spans
    pub service_name: String,
    /// Log line rendering
    pub log_format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset
    pub default_filter: String,
    /// OTLP endpoint; spans are exported only when set
    pub otel_endpoint: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "fleet".to_string(),
            log_format: LogFormat::Json,
            default_filter: "info".to_string(),
            otel_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .ok()
                .filter(|v| !v.is_empty()),
        }
    }
}

impl ObservabilityConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    pub fn with_otel_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.otel_endpoint = endpoint;
        self
    }
}

/// Observability framework errors
#[derive(thiserror::Error, Debug)]
pub enum ObservabilityError {
    #[error("Tracing initialization failed: {0}")]
    TracingInit(String),

    #[error("OpenTelemetry setup failed: {0}")]
    OpenTelemetryInit(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[cfg(feature = "metrics")]
    #[error("Metrics error: {0}")]
    Metrics(#[from] metrics::MetricsError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("json", LogFormat::Json)]
    #[case("JSON", LogFormat::Json)]
    #[case("text", LogFormat::Text)]
    #[case("pretty", LogFormat::Text)]
    fn test_log_format_parse(#[case] raw: &str, #[case] expected: LogFormat) {
        assert_eq!(raw.parse::<LogFormat>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_log_format() {
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_config_builders() {
        let config = ObservabilityConfig::new("fleet-registry")
            .with_log_format(LogFormat::Text)
            .with_default_filter("debug")
            .with_otel_endpoint(Some("http://collector:4317".into()));
        assert_eq!(config.service_name, "fleet-registry");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.default_filter, "debug");
        assert!(config.otel_endpoint.is_some());
    }
}
