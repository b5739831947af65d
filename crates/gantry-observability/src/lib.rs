//! Gantry Observability
//!
//! Tracing bootstrap for gantry services and the per-command span helper used by
//! the cache client. Spans follow the OpenTelemetry database semantic conventions
//! so that, with the `opentelemetry` feature enabled, every cache command shows up
//! as a client span in the configured OTLP backend.

pub mod trace;

#[cfg(feature = "opentelemetry")]
pub mod otel;

pub use trace::{CommandSpan, CommandTracer, init_tracing};

/// Observability configuration
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Install a global tracing subscriber
    pub tracing_enabled: bool,
    /// Emit JSON formatted log lines instead of the human readable format
    pub json_logs: bool,
    /// Default filter directive when `RUST_LOG` is not set
    pub log_filter: String,
    /// OpenTelemetry endpoint (optional)
    pub otel_endpoint: Option<String>,
    /// Service name reported to the tracing backend
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            tracing_enabled: true,
            json_logs: true,
            log_filter: "info".to_string(),
            otel_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            service_name: "gantry".to_string(),
        }
    }
}

/// Initialize the global tracing pipeline.
///
/// With an OTLP endpoint configured and the `opentelemetry` feature enabled the
/// exporter layer is installed alongside the log layer; otherwise only logs are
/// emitted.
pub fn init_observability(config: &ObservabilityConfig) -> Result<(), ObservabilityError> {
    if !config.tracing_enabled {
        return Ok(());
    }

    #[cfg(feature = "opentelemetry")]
    if let Some(endpoint) = &config.otel_endpoint {
        let otel = otel::OtelConfig::new(endpoint.clone(), config.service_name.clone());
        return otel::init_otel_exporter(&otel, config);
    }

    init_tracing(config)
}

/// Observability framework errors
#[derive(thiserror::Error, Debug)]
pub enum ObservabilityError {
    #[error("Tracing initialization failed: {0}")]
    TracingInit(String),

    #[error("OpenTelemetry setup failed: {0}")]
    OpenTelemetryInit(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_tracing_is_noop() {
        let config = ObservabilityConfig {
            tracing_enabled: false,
            ..Default::default()
        };
        assert!(init_observability(&config).is_ok());
    }

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert!(config.tracing_enabled);
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.service_name, "gantry");
    }
}
