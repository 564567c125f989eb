//! Request-scoped telemetry context.
//!
//! A process holds one immutable [`TelemetryRoot`]. Every delivered message
//! gets its own [`ScopedTelemetry`] copied from it, so concurrent handler
//! invocations never share mutable per-request state.
//!
//! ## Example
//!
//! ```rust,ignore
//! let root = TelemetryRoot::new("billing-consumer");
//!
//! // Per message
//! let cx = root.copy().context();
//! let scope = cx.request_scope().expect("scope attached");
//! tracing::info!(request_id = %scope.request_id, "handling message");
//! ```
//!
//! Trace context crosses process boundaries as a W3C `traceparent` header
//! ([`PropagatedContext`]).

use opentelemetry::{
    trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState},
    Context, KeyValue,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// W3C trace context header name.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Trace context that can be serialized and sent across process boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagatedContext {
    /// Trace ID (32 hex characters)
    pub trace_id: String,
    /// Parent span ID (16 hex characters)
    pub span_id: String,
    /// Trace flags (sampled, etc.)
    pub trace_flags: u8,
}

impl PropagatedContext {
    /// Create an empty context (no parent trace)
    pub fn empty() -> Self {
        Self {
            trace_id: "00000000000000000000000000000000".to_string(),
            span_id: "0000000000000000".to_string(),
            trace_flags: 0,
        }
    }

    /// Check if this context is valid (has a real trace)
    pub fn is_valid(&self) -> bool {
        !self.trace_id.chars().all(|c| c == '0')
    }

    /// Extract the span context carried by an OpenTelemetry context.
    pub fn from_context(cx: &Context) -> Self {
        let span = cx.span();
        let span_context = span.span_context();
        if !span_context.is_valid() {
            return Self::empty();
        }

        Self {
            trace_id: span_context.trace_id().to_string(),
            span_id: span_context.span_id().to_string(),
            trace_flags: span_context.trace_flags().to_u8(),
        }
    }

    /// Parse a `traceparent` header: `version-trace_id-parent_id-trace_flags`.
    pub fn from_traceparent(header: &str) -> Option<Self> {
        let parts: Vec<&str> = header.trim().split('-').collect();
        if parts.len() != 4 || parts[0] != "00" {
            return None;
        }
        if parts[1].len() != 32 || parts[2].len() != 16 || parts[3].len() != 2 {
            return None;
        }

        // Reject non-hex ids early
        TraceId::from_hex(parts[1]).ok()?;
        SpanId::from_hex(parts[2]).ok()?;
        let trace_flags = u8::from_str_radix(parts[3], 16).ok()?;

        let ctx = Self {
            trace_id: parts[1].to_lowercase(),
            span_id: parts[2].to_lowercase(),
            trace_flags,
        };
        ctx.is_valid().then_some(ctx)
    }

    /// Render as a `traceparent` header value.
    pub fn to_traceparent(&self) -> String {
        format!("00-{}-{}-{:02x}", self.trace_id, self.span_id, self.trace_flags)
    }

    /// Build a remote span context from this propagated context.
    pub fn to_span_context(&self) -> Option<SpanContext> {
        if !self.is_valid() {
            return None;
        }

        let trace_id = TraceId::from_hex(&self.trace_id).ok()?;
        let span_id = SpanId::from_hex(&self.span_id).ok()?;

        Some(SpanContext::new(
            trace_id,
            span_id,
            TraceFlags::new(self.trace_flags),
            true, // remote = true (came from another process)
            TraceState::default(),
        ))
    }
}

/// Per-invocation values attached to a derived [`Context`].
#[derive(Debug, Clone)]
pub struct RequestScope {
    /// Unique id of this handler invocation.
    pub request_id: Uuid,
    /// Service that owns the telemetry root.
    pub service_name: Arc<str>,
    /// Attributes copied from the root.
    pub attributes: Arc<[KeyValue]>,
}

/// Access to the [`RequestScope`] carried by a context.
pub trait RequestScopeExt {
    /// The request scope, if the context was derived from a [`TelemetryRoot`].
    fn request_scope(&self) -> Option<&RequestScope>;
}

impl RequestScopeExt for Context {
    fn request_scope(&self) -> Option<&RequestScope> {
        self.get::<RequestScope>()
    }
}

/// Process-wide, immutable source of request-scoped contexts.
#[derive(Debug, Clone)]
pub struct TelemetryRoot {
    base: Context,
    service_name: Arc<str>,
    attributes: Arc<[KeyValue]>,
}

impl TelemetryRoot {
    /// Create a root with an empty base context.
    pub fn new(service_name: &str) -> Self {
        Self {
            base: Context::new(),
            service_name: Arc::from(service_name),
            attributes: Arc::from(Vec::<KeyValue>::new()),
        }
    }

    /// Create a root named after the configured service.
    pub fn from_config(config: &crate::TelemetryConfig) -> Self {
        Self::new(&config.service_name).with_attributes(vec![KeyValue::new(
            "deployment.environment",
            config.environment.clone(),
        )])
    }

    /// Replace the base context every copy starts from.
    #[must_use]
    pub fn with_base(mut self, base: Context) -> Self {
        self.base = base;
        self
    }

    /// Replace the attributes copied into every request scope.
    #[must_use]
    pub fn with_attributes(mut self, attributes: Vec<KeyValue>) -> Self {
        self.attributes = Arc::from(attributes);
        self
    }

    /// Service name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Derive an independent scope for one invocation.
    ///
    /// Cheap: clones two `Arc`s and the base context, and allocates a request id.
    pub fn copy(&self) -> ScopedTelemetry {
        ScopedTelemetry {
            base: self.base.clone(),
            scope: RequestScope {
                request_id: Uuid::new_v4(),
                service_name: Arc::clone(&self.service_name),
                attributes: Arc::clone(&self.attributes),
            },
        }
    }
}

/// Telemetry for a single invocation.
#[derive(Debug, Clone)]
pub struct ScopedTelemetry {
    base: Context,
    scope: RequestScope,
}

impl ScopedTelemetry {
    /// Id of this invocation.
    pub fn request_id(&self) -> Uuid {
        self.scope.request_id
    }

    /// Continue a remote trace.
    #[must_use]
    pub fn with_parent(mut self, parent: &PropagatedContext) -> Self {
        if let Some(span_context) = parent.to_span_context() {
            self.base = self.base.with_remote_span_context(span_context);
        }
        self
    }

    /// The context value handed to handlers.
    pub fn context(&self) -> Context {
        self.base.with_value(self.scope.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";

    #[test]
    fn test_empty_context() {
        let ctx = PropagatedContext::empty();
        assert!(!ctx.is_valid());
        assert!(ctx.to_span_context().is_none());
    }

    #[test]
    fn test_traceparent_parsing() {
        let ctx = PropagatedContext::from_traceparent(HEADER).expect("valid header");
        assert_eq!(ctx.trace_id, "0af7651916cd43dd8448eb211c80319c");
        assert_eq!(ctx.span_id, "b7ad6b7169203331");
        assert_eq!(ctx.trace_flags, 1);
        assert_eq!(ctx.to_traceparent(), HEADER);
    }

    #[test]
    fn test_invalid_traceparent() {
        assert!(PropagatedContext::from_traceparent("invalid").is_none());
        assert!(PropagatedContext::from_traceparent("01-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01").is_none());
        assert!(PropagatedContext::from_traceparent("00-zzf7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01").is_none());
        assert!(PropagatedContext::from_traceparent("00-00000000000000000000000000000000-b7ad6b7169203331-01").is_none());
    }

    #[test]
    fn test_copy_yields_independent_scopes() {
        let root = TelemetryRoot::new("orders");
        let a = root.copy().context();
        let b = root.copy().context();

        let scope_a = a.request_scope().expect("scope");
        let scope_b = b.request_scope().expect("scope");
        assert_ne!(scope_a.request_id, scope_b.request_id);
        assert_eq!(&*scope_a.service_name, "orders");
    }

    #[test]
    fn test_with_parent_continues_trace() {
        let parent = PropagatedContext::from_traceparent(HEADER).expect("valid header");
        let cx = TelemetryRoot::new("orders").copy().with_parent(&parent).context();

        let extracted = PropagatedContext::from_context(&cx);
        assert_eq!(extracted.trace_id, parent.trace_id);
        assert_eq!(extracted.span_id, parent.span_id);
    }

    #[test]
    fn test_root_context_has_no_trace() {
        let cx = TelemetryRoot::new("orders").copy().context();
        assert!(!PropagatedContext::from_context(&cx).is_valid());
    }

    #[test]
    fn test_from_config_sets_environment() {
        let config = crate::TelemetryConfig::default();
        let root = TelemetryRoot::from_config(&config);
        let cx = root.copy().context();
        let scope = cx.request_scope().expect("scope");

        assert_eq!(root.service_name(), "relay");
        assert_eq!(scope.attributes.len(), 1);
        assert_eq!(scope.attributes[0].key.as_str(), "deployment.environment");
    }
}
