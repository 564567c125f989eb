//! # Relay Telemetry
//!
//! Observability plumbing for the relay middleware.
//!
//! ## Components
//!
//! - **Telemetry root**: immutable per-process context, copied per message
//! - **Meter**: observable-gauge port with a Prometheus adapter and a recording adapter
//! - **Metrics**: Prometheus families for consumed and published messages
//! - **Tracing**: OpenTelemetry spans exported over OTLP
//! - **Logging**: structured `tracing` output, JSON in containers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relay_telemetry::{init_telemetry, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TelemetryConfig::from_env();
//!     let guard = init_telemetry(config).await.expect("Failed to init telemetry");
//!
//!     let root = guard.root().clone();
//!     // Hand `root` to the middleware core
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | `http://localhost:4317` | OTLP endpoint |
//! | `OTEL_SERVICE_NAME` | `relay` | Service name in traces and scopes |
//! | `RELAY_LOG_LEVEL` | `info` | Log level filter |
//! | `RELAY_CONSOLE_OUTPUT` | `true` | Console log output |
//! | `RELAY_JSON_LOGS` | `false` (`true` in containers) | JSON log lines |
//! | `RELAY_ENVIRONMENT` | `development` | Deployment environment |
//! | `RELAY_TRACE_SAMPLE_RATIO` | `1.0` | Root trace sampling ratio |

#![warn(missing_docs)]

mod config;
mod context;
mod logging;
mod meter;
mod metrics;
mod tracing_setup;

pub use config::{parse_flag, TelemetryConfig};
pub use context::{
    PropagatedContext, RequestScope, RequestScopeExt, ScopedTelemetry, TelemetryRoot,
    TRACEPARENT_HEADER,
};
pub use logging::init_logging;
pub use meter::{
    prometheus_name, GaugeDescriptor, Meter, MeterCallback, ObservableGauge, Observation,
    Observer, PrometheusMeter, RecordingMeter,
};
pub use metrics::{
    encode_metrics, HistogramTimer, MessagingMetrics, REGISTRY, SUBJECT_ATTRIBUTE,
    SUBSCRIPTIONS_DELIVERED_COUNT, SUBSCRIPTIONS_DROPPED_COUNT, SUBSCRIPTIONS_PENDING_BYTES,
    SUBSCRIPTIONS_PENDING_COUNT, UNIT_BYTES,
};
pub use tracing_setup::{init_tracing, TracingGuard};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Tracer provider or subscriber installation failed.
    #[error("Failed to initialize OpenTelemetry tracer: {0}")]
    TracerInit(String),

    /// Console logging could not be installed.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// An instrument or callback could not be registered.
    #[error("Failed to initialize metrics: {0}")]
    MetricsInit(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize tracing export and structured logging.
///
/// Returns a guard that must be held for the lifetime of the application.
/// When dropped, it flushes pending spans.
pub async fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    if config.service_name.trim().is_empty() {
        return Err(TelemetryError::Config("service name is empty".to_string()));
    }

    let tracing_guard = tracing_setup::init_tracing(&config).await?;
    let root = TelemetryRoot::from_config(&config);

    Ok(TelemetryGuard {
        _tracing: tracing_guard,
        root,
    })
}

/// Guard that keeps telemetry active. Drop to flush and shutdown.
pub struct TelemetryGuard {
    _tracing: TracingGuard,
    root: TelemetryRoot,
}

impl TelemetryGuard {
    /// Telemetry root derived from the configuration.
    pub fn root(&self) -> &TelemetryRoot {
        &self.root
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

/// Span for one message, carrying the standard `subject` field.
///
/// # Example
///
/// ```rust,ignore
/// use relay_telemetry::message_span;
///
/// let span = message_span!("relay.consume", msg.subject, queue = "workers");
/// ```
#[macro_export]
macro_rules! message_span {
    ($name:expr, $subject:expr $(, $($field:tt)*)?) => {
        tracing::info_span!($name, subject = %$subject $(, $($field)*)?)
    };
}
