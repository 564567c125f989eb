//! Connection facade.
//!
//! [`ConnContext`] wraps a transport connection: subscriptions go through
//! [`Core::wrap`] and are registered with the subscription aggregator,
//! publishes go through the publish chain.

use bytes::Bytes;
use opentelemetry::Context;
use relay_bus::{BusError, Message, SubscriptionHandle, Transport, TransportHandler};
use std::sync::Arc;

use crate::core::Core;
use crate::domain::errors::HandlerError;
use crate::domain::handler::{adapt_post_fn, MsgHandler, PostFn, PostHook};
use crate::ports::Publisher;

/// A transport connection bound to a [`Core`].
pub struct ConnContext<T: Transport> {
    conn: Arc<T>,
    publisher: Arc<dyn Publisher>,
    /// Overrides the core's post-hook for this connection.
    post_hook: Option<PostHook>,
    core: Arc<Core>,
}

impl<T: Transport> Clone for ConnContext<T> {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            publisher: Arc::clone(&self.publisher),
            post_hook: self.post_hook.clone(),
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Transport> ConnContext<T> {
    pub(crate) fn new(conn: Arc<T>, publisher: Arc<dyn Publisher>, core: Arc<Core>) -> Self {
        Self {
            conn,
            publisher,
            post_hook: None,
            core,
        }
    }

    /// Replace the post-hook used by the legacy subscribe calls on this
    /// connection.
    #[must_use]
    pub fn with_post_hook(mut self, hook: PostHook) -> Self {
        self.post_hook = Some(hook);
        self
    }

    /// The underlying transport connection.
    pub fn conn(&self) -> &T {
        &self.conn
    }

    pub fn core(&self) -> &Arc<Core> {
        &self.core
    }

    /// Publisher with the publish chain applied.
    pub fn publisher(&self) -> Arc<dyn Publisher> {
        Arc::clone(&self.publisher)
    }

    /// Express interest in `subject`. The subject may contain wildcards:
    /// `*` matches one token, `>` one or more trailing tokens.
    pub async fn subscribe(
        &self,
        subject: &str,
        handler: MsgHandler,
    ) -> Result<T::Subscription, BusError> {
        let result = self.conn.subscribe(subject, self.core.wrap(handler)).await;
        self.core.stats().hook(result)
    }

    /// Join queue group `queue` on `subject`. Each message is handled by one
    /// member of the group.
    pub async fn queue_subscribe(
        &self,
        subject: &str,
        queue: &str,
        handler: MsgHandler,
    ) -> Result<T::Subscription, BusError> {
        let result = self
            .conn
            .queue_subscribe(subject, queue, self.core.wrap(handler))
            .await;
        self.core.stats().hook(result)
    }

    /// Subscribe with a legacy post function.
    #[deprecated(note = "use `subscribe` with a `MsgHandler`")]
    pub async fn subscribe_post(
        &self,
        subject: &str,
        post: PostFn,
    ) -> Result<T::Subscription, BusError> {
        self.subscribe(subject, self.adapt(post)).await
    }

    /// Queue-subscribe with a legacy post function.
    #[deprecated(note = "use `queue_subscribe` with a `MsgHandler`")]
    pub async fn queue_subscribe_post(
        &self,
        subject: &str,
        queue: &str,
        post: PostFn,
    ) -> Result<T::Subscription, BusError> {
        self.queue_subscribe(subject, queue, self.adapt(post)).await
    }

    /// Wrap a handler for use with the raw transport, e.g. for batching
    /// consumers that manage their own subscriptions.
    pub fn build_wrapped_handler(&self, handler: MsgHandler) -> TransportHandler {
        self.core.wrap(handler)
    }

    /// Publish `payload` to `subject` through the publish chain.
    pub async fn publish(
        &self,
        cx: &Context,
        subject: &str,
        payload: impl Into<Bytes>,
    ) -> Result<(), HandlerError> {
        self.publisher.publish(cx, Message::new(subject, payload)).await
    }

    /// Publish a complete message through the publish chain.
    pub async fn publish_msg(&self, cx: &Context, msg: Message) -> Result<(), HandlerError> {
        self.publisher.publish(cx, msg).await
    }

    /// Unsubscribe and stop reporting the subscription.
    pub fn unsubscribe(&self, sub: &T::Subscription) -> Result<(), BusError> {
        let result = sub.unsubscribe();
        self.core.stats().deregister(sub.id());
        result
    }

    fn adapt(&self, post: PostFn) -> MsgHandler {
        match &self.post_hook {
            Some(hook) => adapt_post_fn(post, Some(hook.clone())),
            None => self.core.adapt(post),
        }
    }
}
