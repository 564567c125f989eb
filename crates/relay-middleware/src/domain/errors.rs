//! Middleware error types.

use relay_bus::BusError;
use relay_telemetry::TelemetryError;
use thiserror::Error;

/// Errors from constructing a [`Core`](crate::Core).
///
/// All of them are startup errors; callers are expected to abort.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A guarded core already exists in this process.
    #[error("not allow create multiple instances")]
    MultipleInstances,

    /// Instruments or the collection callback could not be registered.
    #[error("metrics setup failed: {0}")]
    Metrics(#[from] TelemetryError),
}

/// Errors returned by message handlers and middleware units.
///
/// These never reach the transport: the wrapped handler discards them after
/// the chain has had a chance to log, count and trace them.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The message was rejected before reaching the handler.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The handler panicked; the panic message is preserved.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// Publishing through the transport failed.
    #[error("publish failed: {0}")]
    Publish(#[from] BusError),

    /// Any other handler failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    /// Short label for metrics and span status.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Panicked(_) => "panic",
            Self::Publish(_) => "publish",
            Self::Other(_) => "handler",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiple_instances_message() {
        assert_eq!(
            CoreError::MultipleInstances.to_string(),
            "not allow create multiple instances"
        );
    }

    #[test]
    fn test_conversions() {
        let err: HandlerError = BusError::Closed.into();
        assert!(matches!(err, HandlerError::Publish(BusError::Closed)));
        assert_eq!(err.kind(), "publish");

        let err: HandlerError = anyhow::anyhow!("database unavailable").into();
        assert_eq!(err.to_string(), "database unavailable");
        assert_eq!(err.kind(), "handler");

        let err: CoreError = TelemetryError::MetricsInit("duplicate".into()).into();
        assert!(matches!(err, CoreError::Metrics(_)));
    }
}
