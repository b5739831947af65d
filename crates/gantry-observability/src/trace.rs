//! Structured tracing bootstrap and per-command spans.
//!
//! [`CommandTracer`] is handed to each cache backend at construction time. A
//! disabled tracer produces [`tracing::Span::none`], so instrumented and plain
//! clients execute exactly the same code path.

use crate::{ObservabilityConfig, ObservabilityError};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::field::Empty;

/// Per-client tracer. Cheap to clone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandTracer {
    name: Option<&'static str>,
}

impl CommandTracer {
    /// Tracer that never creates spans
    pub const fn noop() -> Self {
        Self { name: None }
    }

    /// Tracer that tags every span with `name`
    pub const fn named(name: &'static str) -> Self {
        Self { name: Some(name) }
    }

    pub fn is_enabled(&self) -> bool {
        self.name.is_some()
    }

    pub fn name(&self) -> Option<&'static str> {
        self.name
    }

    /// Start a client span for one command invocation.
    pub fn start(&self, operation: &'static str, key: Option<&str>) -> CommandSpan {
        let Some(name) = self.name else {
            return CommandSpan::disabled();
        };

        let span = tracing::info_span!(
            "cache.command",
            otel.name = operation,
            otel.kind = "client",
            otel.status_code = Empty,
            db.system = "redis",
            db.operation = operation,
            db.redis.key = Empty,
            error.kind = Empty,
            error.message = Empty,
            tracer = name,
        );
        if let Some(key) = key {
            span.record("db.redis.key", key);
        }

        CommandSpan {
            span,
            operation,
            started: Instant::now(),
            failed: false,
        }
    }
}

/// A single traced command. Ends when [`CommandSpan::end`] is called or the
/// value is dropped.
#[derive(Debug)]
pub struct CommandSpan {
    span: tracing::Span,
    operation: &'static str,
    started: Instant,
    failed: bool,
}

impl CommandSpan {
    fn disabled() -> Self {
        Self {
            span: tracing::Span::none(),
            operation: "",
            started: Instant::now(),
            failed: false,
        }
    }

    /// The underlying span, for use with `tracing::Instrument`
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Mark the span as failed. `kind` should be a low-cardinality label.
    pub fn record_error(&mut self, kind: &'static str, error: &dyn fmt::Display) {
        self.failed = true;
        if self.span.is_disabled() {
            return;
        }
        self.span.record("otel.status_code", "ERROR");
        self.span.record("error.kind", kind);
        self.span.record("error.message", tracing::field::display(error));
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Close the span, setting an OK status unless an error was recorded.
    pub fn end(self) {
        if self.span.is_disabled() {
            return;
        }
        if !self.failed {
            self.span.record("otel.status_code", "OK");
        }
        self.span.in_scope(|| {
            tracing::debug!(
                operation = self.operation,
                duration_us = self.started.elapsed().as_micros() as u64,
                failed = self.failed,
                "cache command finished"
            );
        });
    }
}

/// Install the global subscriber: env filter plus a JSON or pretty fmt layer.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), ObservabilityError> {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    let installed = if config.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    };
    installed.map_err(|e| ObservabilityError::TracingInit(e.to_string()))?;

    tracing::info!(
        service = config.service_name,
        json = config.json_logs,
        "Initialized structured tracing"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_tracer_creates_disabled_spans() {
        let tracer = CommandTracer::noop();
        assert!(!tracer.is_enabled());

        let mut span = tracer.start("get", Some("user:1"));
        assert!(span.span().is_disabled());
        span.record_error("command", &"boom");
        assert!(span.failed());
        span.end();
    }

    #[test]
    fn test_named_tracer() {
        let tracer = CommandTracer::named("gantry.cache");
        assert!(tracer.is_enabled());
        assert_eq!(tracer.name(), Some("gantry.cache"));

        let span = tracer.start("set", None);
        assert!(!span.failed());
        assert!(span.elapsed() < Duration::from_secs(1));
        span.end();
    }

    #[test]
    fn test_default_tracer_is_noop() {
        assert_eq!(CommandTracer::default(), CommandTracer::noop());
    }
}
