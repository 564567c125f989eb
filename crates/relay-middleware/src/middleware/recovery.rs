//! Panic recovery.
//!
//! A panicking handler would otherwise take its subscription worker down
//! with it. The panic is turned into [`HandlerError::Panicked`] so outer
//! units log and count it like any other failure.

use futures::FutureExt;
use opentelemetry::Context;
use relay_bus::Message;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::domain::chain::HandlerLayer;
use crate::domain::errors::HandlerError;
use crate::domain::handler::MsgHandler;

/// Catches panics raised while building or polling the inner handler.
#[derive(Debug, Clone, Default)]
pub struct RecoveryLayer;

impl RecoveryLayer {
    pub fn new() -> Self {
        Self
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl HandlerLayer for RecoveryLayer {
    fn layer(&self, inner: MsgHandler) -> MsgHandler {
        Arc::new(move |cx: Context, msg: Message| {
            let inner = Arc::clone(&inner);
            Box::pin(async move {
                let subject = msg.subject.clone();

                let outcome = match panic::catch_unwind(AssertUnwindSafe(|| inner(cx, msg))) {
                    Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
                    Err(payload) => Err(payload),
                };

                outcome.unwrap_or_else(|payload| {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(subject = %subject, panic = %message, "Handler panicked");
                    Err(HandlerError::Panicked(message))
                })
            })
        })
    }
}
