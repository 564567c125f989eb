//! # Transport Capability
//!
//! The surface the middleware layer consumes: subscribe, queue-subscribe,
//! publish, and per-subscription delivery counters.

use crate::message::Message;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Errors from transport operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The subject is malformed for the requested operation.
    #[error("Invalid subject: {0:?}")]
    InvalidSubject(String),

    /// The queue group name is empty or contains separators.
    #[error("Invalid queue group: {0:?}")]
    InvalidQueue(String),

    /// The subscription was unsubscribed; its counters are no longer readable.
    #[error("Subscription {0} is closed")]
    SubscriptionClosed(SubscriptionId),

    /// Subscribing requires a running tokio runtime to drive the handler.
    #[error("No async runtime available to drive subscription handlers")]
    NoRuntime,

    /// The transport was closed.
    #[error("Transport closed")]
    Closed,
}

/// Stable identity of a subscription for the lifetime of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sid-{}", self.0)
    }
}

/// Delivery callback registered with a transport.
///
/// Transport callbacks have no error channel: whatever the handler does with
/// a failure has to happen before the future completes.
pub type TransportHandler = Arc<dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync>;

/// Build a [`TransportHandler`] from an async closure.
pub fn transport_handler<F, Fut>(f: F) -> TransportHandler
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |msg| Box::pin(f(msg)))
}

/// A live subscription and its delivery counters.
pub trait SubscriptionHandle: Send + Sync + 'static {
    /// Stable identity.
    fn id(&self) -> SubscriptionId;

    /// Subject (possibly with wildcards) this subscription listens on.
    fn subject(&self) -> &str;

    /// Queue group, if this is a queue subscription.
    fn queue(&self) -> Option<&str>;

    /// Messages and bytes buffered but not yet handed to the handler.
    fn pending(&self) -> Result<(u64, u64), BusError>;

    /// Messages discarded because the buffer was full.
    fn dropped(&self) -> Result<u64, BusError>;

    /// Messages handed to the handler since the subscription was created.
    fn delivered(&self) -> Result<u64, BusError>;

    /// Whether the subscription still receives messages.
    fn is_valid(&self) -> bool;

    /// Stop receiving messages. Counter reads fail afterwards.
    fn unsubscribe(&self) -> Result<(), BusError>;
}

/// A publish/subscribe transport.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Handle type returned by subscribe calls.
    type Subscription: SubscriptionHandle + Clone;

    /// Express interest in a subject. Every matching message is delivered.
    async fn subscribe(
        &self,
        subject: &str,
        handler: TransportHandler,
    ) -> Result<Self::Subscription, BusError>;

    /// Join a queue group. Each message goes to one member of the group.
    async fn queue_subscribe(
        &self,
        subject: &str,
        queue: &str,
        handler: TransportHandler,
    ) -> Result<Self::Subscription, BusError>;

    /// Publish a message.
    ///
    /// # Returns
    ///
    /// The number of subscriptions that accepted the message.
    async fn publish(&self, message: Message) -> Result<usize, BusError>;
}
