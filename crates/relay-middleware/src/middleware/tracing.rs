//! Tracing middleware for OpenTelemetry integration.
//!
//! Consume side: one `relay.consume` span per message, parented on the
//! `traceparent` header when the publisher sent one. The handler context
//! carries the remote span context so nested publishes continue the trace.
//!
//! Publish side: one `relay.publish` span per message, and the current trace
//! context injected as a `traceparent` header.

use async_trait::async_trait;
use opentelemetry::trace::TraceContextExt;
use opentelemetry::Context;
use relay_bus::Message;
use relay_telemetry::{PropagatedContext, RequestScopeExt, TRACEPARENT_HEADER};
use std::sync::Arc;
use tracing::{info_span, Instrument, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::domain::chain::{HandlerLayer, PublishLayer};
use crate::domain::errors::HandlerError;
use crate::domain::handler::MsgHandler;
use crate::ports::Publisher;

/// Tracing layer that creates spans for each message
#[derive(Debug, Clone, Default)]
pub struct TracingLayer;

impl TracingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl HandlerLayer for TracingLayer {
    fn layer(&self, inner: MsgHandler) -> MsgHandler {
        Arc::new(move |cx: Context, msg: Message| {
            let inner = Arc::clone(&inner);

            let request_id = cx
                .request_scope()
                .map(|scope| scope.request_id.to_string())
                .unwrap_or_default();
            let span = info_span!(
                "relay.consume",
                subject = %msg.subject,
                request_id = %request_id,
                otel.kind = "consumer",
                otel.status_code = tracing::field::Empty,
                error.kind = tracing::field::Empty,
            );

            let cx = match extract_trace_context(&msg) {
                Some(parent) => {
                    let cx = cx.with_remote_span_context(parent);
                    span.set_parent(cx.clone());
                    cx
                }
                None => cx,
            };

            Box::pin(async move {
                let fut = span.in_scope(|| inner(cx, msg));
                let result = fut.instrument(span.clone()).await;
                record_status(&span, &result);
                result
            })
        })
    }
}

impl PublishLayer for TracingLayer {
    fn layer(&self, inner: Arc<dyn Publisher>) -> Arc<dyn Publisher> {
        Arc::new(TracedPublisher { inner })
    }
}

struct TracedPublisher {
    inner: Arc<dyn Publisher>,
}

#[async_trait]
impl Publisher for TracedPublisher {
    async fn publish(&self, cx: &Context, mut msg: Message) -> Result<(), HandlerError> {
        let span = info_span!(
            "relay.publish",
            subject = %msg.subject,
            otel.kind = "producer",
            otel.status_code = tracing::field::Empty,
            error.kind = tracing::field::Empty,
        );
        if cx.has_active_span() {
            span.set_parent(cx.clone());
        }

        if msg.header(TRACEPARENT_HEADER).is_none() {
            inject_trace_context(&span, cx, &mut msg);
        }

        let result = self.inner.publish(cx, msg).instrument(span.clone()).await;
        record_status(&span, &result);
        result
    }
}

/// Remote parent from the `traceparent` header (W3C Trace Context)
fn extract_trace_context(msg: &Message) -> Option<opentelemetry::trace::SpanContext> {
    msg.header(TRACEPARENT_HEADER)
        .and_then(PropagatedContext::from_traceparent)
        .and_then(|parent| parent.to_span_context())
}

/// Add the trace context to outgoing message headers.
///
/// Prefers the exported span; without an OpenTelemetry layer installed that
/// span has no context and the caller's context is propagated instead.
fn inject_trace_context(span: &Span, cx: &Context, msg: &mut Message) {
    let mut propagated = PropagatedContext::from_context(&span.context());
    if !propagated.is_valid() {
        propagated = PropagatedContext::from_context(cx);
    }
    if propagated.is_valid() {
        msg.headers
            .insert(TRACEPARENT_HEADER.to_string(), propagated.to_traceparent());
    }
}

fn record_status(span: &Span, result: &Result<(), HandlerError>) {
    match result {
        Ok(()) => {
            span.record("otel.status_code", "OK");
        }
        Err(e) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.kind", e.kind());
        }
    }
}
