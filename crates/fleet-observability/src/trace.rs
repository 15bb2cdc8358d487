//! Tracing subscriber setup

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{LogFormat, ObservabilityConfig, ObservabilityError};

/// Keeps span export alive; flush with [`TelemetryGuard::shutdown`]
#[derive(Debug, Default)]
#[must_use = "dropping the guard early loses buffered spans"]
pub struct TelemetryGuard {
    #[cfg(feature = "opentelemetry")]
    provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Flush and stop span export
    pub fn shutdown(self) {
        #[cfg(feature = "opentelemetry")]
        if let Some(provider) = self.provider
            && let Err(e) = provider.shutdown()
        {
            tracing::warn!(error = %e, "Failed to flush spans on shutdown");
        }
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` wins over `config.default_filter`. When an OTLP endpoint is
/// configured and the `opentelemetry` feature is on, spans are exported as
/// well; credentials for the collector come from `OTEL_EXPORTER_OTLP_HEADERS`.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<TelemetryGuard, ObservabilityError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))
        .map_err(|e| ObservabilityError::Config(format!("invalid log filter: {e}")))?;

    let json_layer = (config.log_format == LogFormat::Json)
        .then(|| tracing_subscriber::fmt::layer().json().with_current_span(true));
    let text_layer =
        (config.log_format == LogFormat::Text).then(|| tracing_subscriber::fmt::layer());

    #[cfg(feature = "opentelemetry")]
    let provider = match &config.otel_endpoint {
        Some(endpoint) => Some(crate::otel::tracer_provider(endpoint, &config.service_name)?),
        None => None,
    };
    #[cfg(feature = "opentelemetry")]
    let otel_layer = provider.as_ref().map(|provider| {
        use opentelemetry::trace::TracerProvider;
        tracing_opentelemetry::layer().with_tracer(provider.tracer("fleet"))
    });
    #[cfg(not(feature = "opentelemetry"))]
    let otel_layer: Option<tracing_subscriber::layer::Identity> = None;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| ObservabilityError::TracingInit(e.to_string()))?;

    tracing::info!(
        service = %config.service_name,
        format = ?config.log_format,
        otel = config.otel_endpoint.is_some(),
        "Initialized structured tracing"
    );

    Ok(TelemetryGuard {
        #[cfg(feature = "opentelemetry")]
        provider,
    })
}
