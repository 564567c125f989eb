//! Structured logging of received and published messages.

use async_trait::async_trait;
use opentelemetry::Context;
use relay_bus::Message;
use relay_telemetry::log_msg_event;
use std::sync::Arc;

use crate::domain::chain::{HandlerLayer, PublishLayer};
use crate::domain::errors::HandlerError;
use crate::domain::handler::MsgHandler;
use crate::ports::Publisher;

/// Logs every message at debug level and every failure at error level.
#[derive(Debug, Clone, Default)]
pub struct LoggingLayer;

impl LoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl HandlerLayer for LoggingLayer {
    fn layer(&self, inner: MsgHandler) -> MsgHandler {
        Arc::new(move |cx: Context, msg: Message| {
            let inner = Arc::clone(&inner);
            Box::pin(async move {
                let subject = msg.subject.clone();
                log_msg_event!(debug, subject, "Message received", size = msg.size());

                let result = inner(cx, msg).await;
                if let Err(e) = &result {
                    log_msg_event!(error, subject, "Message handler failed", error = %e, kind = e.kind());
                }
                result
            })
        })
    }
}

impl PublishLayer for LoggingLayer {
    fn layer(&self, inner: Arc<dyn Publisher>) -> Arc<dyn Publisher> {
        Arc::new(LoggedPublisher { inner })
    }
}

struct LoggedPublisher {
    inner: Arc<dyn Publisher>,
}

#[async_trait]
impl Publisher for LoggedPublisher {
    async fn publish(&self, cx: &Context, msg: Message) -> Result<(), HandlerError> {
        let subject = msg.subject.clone();
        log_msg_event!(debug, subject, "Publishing message", size = msg.size());

        let result = self.inner.publish(cx, msg).await;
        if let Err(e) = &result {
            log_msg_event!(warn, subject, "Publish failed", error = %e);
        }
        result
    }
}
