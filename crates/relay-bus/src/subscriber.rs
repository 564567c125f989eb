//! # Subscriptions
//!
//! Per-subscription buffer, delivery worker, and counters.

use crate::message::Message;
use crate::transport::{BusError, SubscriptionHandle, SubscriptionId, TransportHandler};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, trace};

/// Delivery counters of one subscription.
#[derive(Debug, Default)]
pub(crate) struct DeliveryStats {
    pending_msgs: AtomicU64,
    pending_bytes: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
}

impl DeliveryStats {
    fn enqueue(&self, bytes: u64) {
        self.pending_msgs.fetch_add(1, Ordering::AcqRel);
        self.pending_bytes.fetch_add(bytes, Ordering::AcqRel);
    }

    fn dequeue(&self, bytes: u64) {
        self.pending_msgs.fetch_sub(1, Ordering::AcqRel);
        self.pending_bytes.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// Shared state between the bus, the delivery worker and every handle clone.
pub(crate) struct SubscriptionState {
    id: SubscriptionId,
    subject: String,
    queue: Option<String>,
    sender: mpsc::Sender<Message>,
    stats: DeliveryStats,
    closed: AtomicBool,
    shutdown: Notify,
}

impl SubscriptionState {
    pub(crate) fn id(&self) -> SubscriptionId {
        self.id
    }

    pub(crate) fn subject(&self) -> &str {
        &self.subject
    }

    pub(crate) fn queue(&self) -> Option<&str> {
        self.queue.as_deref()
    }

    /// Try to buffer a message for this subscription.
    ///
    /// Pending counters are raised before the send so the worker never
    /// decrements below zero.
    pub(crate) fn offer(&self, message: Message) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        let bytes = message.size() as u64;
        self.stats.enqueue(bytes);

        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.dequeue(bytes);
                self.stats.dropped.fetch_add(1, Ordering::AcqRel);
                trace!(sid = %self.id, subject = %self.subject, "Buffer full, message dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.dequeue(bytes);
                false
            }
        }
    }

    /// Mark closed and stop the worker. Returns false if already closed.
    pub(crate) fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        // notify_one keeps a permit if the worker is busy in the handler
        self.shutdown.notify_one();
        true
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            Err(BusError::SubscriptionClosed(self.id))
        } else {
            Ok(())
        }
    }
}

/// Create subscription state and spawn its delivery worker.
pub(crate) fn spawn_subscription(
    id: SubscriptionId,
    subject: &str,
    queue: Option<&str>,
    capacity: usize,
    handler: TransportHandler,
) -> Result<Arc<SubscriptionState>, BusError> {
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| BusError::NoRuntime)?;

    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let state = Arc::new(SubscriptionState {
        id,
        subject: subject.to_string(),
        queue: queue.map(str::to_string),
        sender,
        stats: DeliveryStats::default(),
        closed: AtomicBool::new(false),
        shutdown: Notify::new(),
    });

    runtime.spawn(deliver(Arc::clone(&state), receiver, handler));
    Ok(state)
}

async fn deliver(
    state: Arc<SubscriptionState>,
    mut receiver: mpsc::Receiver<Message>,
    handler: TransportHandler,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = state.shutdown.notified() => break,
            next = receiver.recv() => match next {
                Some(message) => message,
                None => break,
            },
        };

        if state.closed.load(Ordering::Acquire) {
            break;
        }

        state.stats.dequeue(message.size() as u64);
        state.stats.delivered.fetch_add(1, Ordering::AcqRel);
        handler(message).await;
    }

    debug!(sid = %state.id, subject = %state.subject, "Subscription worker stopped");
}

/// Handle to a subscription on an [`InMemoryBus`](crate::InMemoryBus).
///
/// Clones share the same subscription. Dropping handles does not
/// unsubscribe; call [`SubscriptionHandle::unsubscribe`].
#[derive(Clone)]
pub struct BusSubscription {
    pub(crate) state: Arc<SubscriptionState>,
    pub(crate) on_unsubscribe: Arc<dyn Fn(SubscriptionId) + Send + Sync>,
}

impl std::fmt::Debug for BusSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusSubscription")
            .field("id", &self.state.id)
            .field("subject", &self.state.subject)
            .field("queue", &self.state.queue)
            .finish()
    }
}

impl SubscriptionHandle for BusSubscription {
    fn id(&self) -> SubscriptionId {
        self.state.id
    }

    fn subject(&self) -> &str {
        &self.state.subject
    }

    fn queue(&self) -> Option<&str> {
        self.state.queue.as_deref()
    }

    fn pending(&self) -> Result<(u64, u64), BusError> {
        self.state.ensure_open()?;
        Ok((
            self.state.stats.pending_msgs.load(Ordering::Acquire),
            self.state.stats.pending_bytes.load(Ordering::Acquire),
        ))
    }

    fn dropped(&self) -> Result<u64, BusError> {
        self.state.ensure_open()?;
        Ok(self.state.stats.dropped.load(Ordering::Acquire))
    }

    fn delivered(&self) -> Result<u64, BusError> {
        self.state.ensure_open()?;
        Ok(self.state.stats.delivered.load(Ordering::Acquire))
    }

    fn is_valid(&self) -> bool {
        !self.state.closed.load(Ordering::Acquire)
    }

    fn unsubscribe(&self) -> Result<(), BusError> {
        if !self.state.close() {
            return Err(BusError::SubscriptionClosed(self.state.id));
        }
        (self.on_unsubscribe)(self.state.id);
        debug!(sid = %self.state.id, subject = %self.state.subject, "Unsubscribed");
        Ok(())
    }
}
