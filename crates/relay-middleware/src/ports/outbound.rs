//! Outbound port: publishing.

use async_trait::async_trait;
use opentelemetry::Context;
use relay_bus::Message;

use crate::domain::errors::HandlerError;

/// Publishes messages on behalf of handlers and application code.
///
/// The base implementation talks to the transport; publish middleware
/// units wrap it.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `msg` within the request context `cx`.
    async fn publish(&self, cx: &Context, msg: Message) -> Result<(), HandlerError>;
}
