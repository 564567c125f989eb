//! Payload validation.

use opentelemetry::Context;
use relay_bus::Message;
use std::sync::Arc;

use crate::domain::chain::HandlerLayer;
use crate::domain::errors::HandlerError;
use crate::domain::handler::MsgHandler;

/// Rejects messages whose payload exceeds `max_payload_bytes`. Rejected
/// messages never reach the inner handler.
#[derive(Debug, Clone)]
pub struct ValidationLayer {
    max_payload_bytes: usize,
}

impl ValidationLayer {
    pub fn new(max_payload_bytes: usize) -> Self {
        Self { max_payload_bytes }
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }
}

impl HandlerLayer for ValidationLayer {
    fn layer(&self, inner: MsgHandler) -> MsgHandler {
        let limit = self.max_payload_bytes;
        Arc::new(move |cx: Context, msg: Message| {
            let size = msg.size();
            if size > limit {
                return Box::pin(async move {
                    Err(HandlerError::Validation(format!(
                        "payload of {size} bytes exceeds limit of {limit} bytes"
                    )))
                });
            }
            inner(cx, msg)
        })
    }
}
