//! Structured logging.
//!
//! Logs are emitted through `tracing`. Two subscriber setups share the same
//! filter and formatting:
//!
//! - [`init_logging`]: console output only (tests, local tools)
//! - [`init_telemetry`](crate::init_telemetry): console output plus OTLP trace export
//!
//! JSON output carries `timestamp`, `level`, `target`, `subject` and the
//! span fields of the enclosing message span.

use tracing::Subscriber;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::{TelemetryConfig, TelemetryError};

/// Filter from `RUST_LOG`, falling back to the configured level.
pub(crate) fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Console layer, JSON in containers, pretty otherwise. `None` when console
/// output is disabled.
pub(crate) fn fmt_layer<S>(config: &TelemetryConfig) -> Option<Box<dyn Layer<S> + Send + Sync>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    if !config.console_output {
        return None;
    }

    let layer = if config.json_logs {
        fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(true)
            .boxed()
    };
    Some(layer)
}

/// Install a console-only subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    tracing_subscriber::registry()
        .with(env_filter(config)?)
        .with(fmt_layer(config))
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    tracing::debug!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "Structured logging initialized"
    );
    Ok(())
}

/// Log a message-related event with the standard `subject` field.
///
/// ```rust,ignore
/// log_msg_event!(warn, msg.subject, "Payload rejected", size = msg.size());
/// ```
#[macro_export]
macro_rules! log_msg_event {
    ($level:ident, $subject:expr, $msg:literal $(, $($field:tt)*)?) => {
        tracing::$level!(
            subject = %$subject,
            $($($field)*,)?
            $msg
        )
    };
}
