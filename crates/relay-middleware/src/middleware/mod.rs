//! Built-in middleware units.
//!
//! Default handler configuration (execution is the reverse):
//!
//! ```text
//! config:  [Validation, Recovery, Metrics, Logging, Tracing]
//! runs:    Tracing → Logging → Metrics → Recovery → Validation → handler
//! ```
//!
//! Default publish configuration: `[Metrics, Logging, Tracing]`, so tracing
//! injects `traceparent` before the message is logged, counted and sent.
//!
//! Units added through [`CoreBuilder`](crate::CoreBuilder) are appended to
//! the defaults and therefore run first.

pub mod logging;
pub mod metrics;
pub mod recovery;
pub mod tracing;
pub mod validation;

pub use self::logging::LoggingLayer;
pub use self::metrics::MetricsLayer;
pub use self::recovery::RecoveryLayer;
pub use self::tracing::TracingLayer;
pub use self::validation::ValidationLayer;

use relay_telemetry::MessagingMetrics;
use std::fmt;
use std::sync::Arc;

use crate::config::MiddlewareConfig;
use crate::domain::chain::{HandlerLayer, PublishLayer};
use crate::domain::handler::MsgHandler;
use crate::ports::Publisher;

/// A handler middleware unit.
#[derive(Clone)]
pub enum Middleware {
    Tracing(TracingLayer),
    Logging(LoggingLayer),
    Metrics(MetricsLayer),
    Recovery(RecoveryLayer),
    Validation(ValidationLayer),
    /// User-supplied unit
    Custom(Arc<dyn HandlerLayer>),
}

impl Middleware {
    /// Wrap a user-supplied unit.
    pub fn custom<L: HandlerLayer + 'static>(layer: L) -> Self {
        Self::Custom(Arc::new(layer))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Tracing(_) => "tracing",
            Self::Logging(_) => "logging",
            Self::Metrics(_) => "metrics",
            Self::Recovery(_) => "recovery",
            Self::Validation(_) => "validation",
            Self::Custom(_) => "custom",
        }
    }
}

impl HandlerLayer for Middleware {
    fn layer(&self, inner: MsgHandler) -> MsgHandler {
        match self {
            Self::Tracing(l) => HandlerLayer::layer(l, inner),
            Self::Logging(l) => HandlerLayer::layer(l, inner),
            Self::Metrics(l) => HandlerLayer::layer(l, inner),
            Self::Recovery(l) => l.layer(inner),
            Self::Validation(l) => l.layer(inner),
            Self::Custom(l) => l.layer(inner),
        }
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A publish middleware unit.
#[derive(Clone)]
pub enum PublishMiddleware {
    Tracing(TracingLayer),
    Logging(LoggingLayer),
    Metrics(MetricsLayer),
    /// User-supplied unit
    Custom(Arc<dyn PublishLayer>),
}

impl PublishMiddleware {
    /// Wrap a user-supplied unit.
    pub fn custom<L: PublishLayer + 'static>(layer: L) -> Self {
        Self::Custom(Arc::new(layer))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Tracing(_) => "tracing",
            Self::Logging(_) => "logging",
            Self::Metrics(_) => "metrics",
            Self::Custom(_) => "custom",
        }
    }
}

impl PublishLayer for PublishMiddleware {
    fn layer(&self, inner: Arc<dyn Publisher>) -> Arc<dyn Publisher> {
        match self {
            Self::Tracing(l) => PublishLayer::layer(l, inner),
            Self::Logging(l) => PublishLayer::layer(l, inner),
            Self::Metrics(l) => PublishLayer::layer(l, inner),
            Self::Custom(l) => l.layer(inner),
        }
    }
}

impl fmt::Debug for PublishMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Default handler units for `config`. `metrics` is required for the
/// metrics unit to be installed.
pub fn default_middleware(
    config: &MiddlewareConfig,
    metrics: Option<&MessagingMetrics>,
) -> Vec<Middleware> {
    let mut list = Vec::new();
    if let Some(limit) = config.max_payload_bytes {
        list.push(Middleware::Validation(ValidationLayer::new(limit)));
    }
    if config.recovery {
        list.push(Middleware::Recovery(RecoveryLayer::new()));
    }
    if let (true, Some(metrics)) = (config.metrics, metrics) {
        list.push(Middleware::Metrics(MetricsLayer::new(metrics.clone())));
    }
    if config.logging {
        list.push(Middleware::Logging(LoggingLayer::new()));
    }
    if config.tracing {
        list.push(Middleware::Tracing(TracingLayer::new()));
    }
    list
}

/// Default publish units for `config`.
pub fn default_publish_middleware(
    config: &MiddlewareConfig,
    metrics: Option<&MessagingMetrics>,
) -> Vec<PublishMiddleware> {
    let mut list = Vec::new();
    if let (true, Some(metrics)) = (config.metrics, metrics) {
        list.push(PublishMiddleware::Metrics(MetricsLayer::new(metrics.clone())));
    }
    if config.logging {
        list.push(PublishMiddleware::Logging(LoggingLayer::new()));
    }
    if config.tracing {
        list.push(PublishMiddleware::Tracing(TracingLayer::new()));
    }
    list
}
