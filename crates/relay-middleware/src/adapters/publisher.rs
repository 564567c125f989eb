//! Transport-backed publisher and the reply post-hook.

use async_trait::async_trait;
use opentelemetry::Context;
use relay_bus::{Message, Transport};
use std::sync::Arc;

use crate::domain::errors::HandlerError;
use crate::domain::handler::PostHook;
use crate::ports::Publisher;

/// Base publisher: hands messages straight to the transport.
pub struct TransportPublisher<T: Transport> {
    conn: Arc<T>,
}

impl<T: Transport> TransportPublisher<T> {
    pub fn new(conn: Arc<T>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl<T: Transport> Publisher for TransportPublisher<T> {
    async fn publish(&self, _cx: &Context, msg: Message) -> Result<(), HandlerError> {
        self.conn.publish(msg).await?;
        Ok(())
    }
}

/// Post-hook that publishes the response to the message's reply subject.
///
/// Messages without a reply subject are left alone.
pub fn reply_post_hook(publisher: Arc<dyn Publisher>) -> PostHook {
    Arc::new(move |cx: Context, msg: Message, response| {
        let publisher = Arc::clone(&publisher);
        Box::pin(async move {
            let Some(reply) = msg.reply else {
                return Ok(());
            };
            publisher.publish(&cx, Message::new(reply, response)).await
        })
    })
}
