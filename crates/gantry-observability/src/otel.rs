//! OpenTelemetry Integration
//!
//! Installs an OTLP span exporter next to the log layer so cache command spans
//! reach an external tracing backend.

use crate::{ObservabilityConfig, ObservabilityError};

/// OpenTelemetry configuration
#[derive(Debug, Clone)]
pub struct OtelConfig {
    /// OTLP endpoint URL
    pub endpoint: String,
    /// Service name for telemetry
    pub service_name: String,
    /// Service version
    pub service_version: String,
}

impl OtelConfig {
    /// Create new OpenTelemetry configuration
    pub fn new(endpoint: String, service_name: String) -> Self {
        Self {
            endpoint,
            service_name,
            service_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Initialize the OTLP exporter together with the log layer
pub fn init_otel_exporter(
    config: &OtelConfig,
    observability: &ObservabilityConfig,
) -> Result<(), ObservabilityError> {
    use opentelemetry::trace::TracerProvider;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::SdkTracerProvider;
    use tracing_opentelemetry::OpenTelemetryLayer;
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.endpoint)
        .build()
        .map_err(|e| {
            ObservabilityError::OpenTelemetryInit(format!("Failed to create exporter: {}", e))
        })?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    let tracer = tracer_provider.tracer(config.service_name.clone());
    let telemetry_layer = OpenTelemetryLayer::new(tracer);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&observability.log_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .with(telemetry_layer)
        .try_init()
        .map_err(|e| ObservabilityError::OpenTelemetryInit(e.to_string()))?;

    tracing::info!(
        endpoint = config.endpoint,
        service = config.service_name,
        version = config.service_version,
        "OpenTelemetry exporter initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otel_config_creation() {
        let config = OtelConfig::new(
            "http://localhost:4317".to_string(),
            "gantry-test".to_string(),
        );

        assert_eq!(config.endpoint, "http://localhost:4317");
        assert_eq!(config.service_name, "gantry-test");
        assert_eq!(config.service_version, env!("CARGO_PKG_VERSION"));
    }
}
