//! OpenTelemetry span export over OTLP/gRPC

use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};

use crate::ObservabilityError;

/// Build a batching tracer provider exporting to `endpoint`
///
/// The exporter reads `OTEL_EXPORTER_OTLP_HEADERS` for collector
/// credentials.
pub fn tracer_provider(
    endpoint: &str,
    service_name: &str,
) -> Result<SdkTracerProvider, ObservabilityError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| {
            ObservabilityError::OpenTelemetryInit(format!("Failed to create exporter: {}", e))
        })?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();
    opentelemetry::global::set_tracer_provider(provider.clone());
    Ok(provider)
}
