//! # In-Memory Bus
//!
//! Single-process implementation of [`Transport`]. Suitable for tests and
//! single-node deployments; networked transports implement the same trait.

use crate::message::Message;
use crate::subject::{matches, validate_filter, validate_subject};
use crate::subscriber::{spawn_subscription, BusSubscription, SubscriptionState};
use crate::transport::{BusError, SubscriptionId, Transport, TransportHandler};
use crate::{DEFAULT_PENDING_LIMIT, TOKEN_SEPARATOR};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

struct BusInner {
    /// Active subscriptions by id.
    subscriptions: RwLock<HashMap<SubscriptionId, Arc<SubscriptionState>>>,

    /// Next subscription id.
    next_id: AtomicU64,

    /// Round-robin cursor per queue group, keyed by (subject, queue).
    queue_cursors: Mutex<HashMap<(String, String), u64>>,

    /// Total messages published.
    messages_published: AtomicU64,

    /// Per-subscription buffer size.
    pending_limit: usize,
}

/// In-process publish/subscribe bus.
///
/// Cloning is cheap; clones share subscriptions and counters.
#[derive(Clone)]
pub struct InMemoryBus {
    inner: Arc<BusInner>,
}

impl InMemoryBus {
    /// Create a bus with the default per-subscription buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_pending_limit(DEFAULT_PENDING_LIMIT)
    }

    /// Create a bus whose subscriptions buffer at most `pending_limit` messages.
    #[must_use]
    pub fn with_pending_limit(pending_limit: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscriptions: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                queue_cursors: Mutex::new(HashMap::new()),
                messages_published: AtomicU64::new(0),
                pending_limit,
            }),
        }
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner
            .subscriptions
            .read()
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    /// Total messages published, including those nobody received.
    #[must_use]
    pub fn messages_published(&self) -> u64 {
        self.inner.messages_published.load(Ordering::Relaxed)
    }

    /// Per-subscription buffer size.
    #[must_use]
    pub fn pending_limit(&self) -> usize {
        self.inner.pending_limit
    }

    fn add_subscription(
        &self,
        subject: &str,
        queue: Option<&str>,
        handler: TransportHandler,
    ) -> Result<BusSubscription, BusError> {
        validate_filter(subject)?;
        if let Some(queue) = queue {
            if queue.is_empty() || queue.contains(TOKEN_SEPARATOR) || queue.contains(' ') {
                return Err(BusError::InvalidQueue(queue.to_string()));
            }
        }

        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let state = spawn_subscription(id, subject, queue, self.inner.pending_limit, handler)?;

        {
            let mut subs = self.inner.subscriptions.write().map_err(|_| BusError::Closed)?;
            subs.insert(id, Arc::clone(&state));
        }

        debug!(sid = %id, subject = %subject, queue = ?queue, "New subscription created");

        let inner = Arc::downgrade(&self.inner);
        Ok(BusSubscription {
            state,
            on_unsubscribe: Arc::new(move |id| {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                if let Ok(mut subs) = inner.subscriptions.write() {
                    subs.remove(&id);
                };
            }),
        })
    }

    /// Pick the receivers of a message: every plain subscription, one member
    /// per queue group.
    fn receivers(&self, subject: &str) -> Result<Vec<Arc<SubscriptionState>>, BusError> {
        let subs = self.inner.subscriptions.read().map_err(|_| BusError::Closed)?;

        let mut plain = Vec::new();
        let mut groups: BTreeMap<(&str, &str), Vec<&Arc<SubscriptionState>>> = BTreeMap::new();

        for state in subs.values() {
            if !matches(state.subject(), subject) {
                continue;
            }
            match state.queue() {
                Some(queue) => groups
                    .entry((state.subject(), queue))
                    .or_default()
                    .push(state),
                None => plain.push(Arc::clone(state)),
            }
        }

        if groups.is_empty() {
            return Ok(plain);
        }

        let mut cursors = self.inner.queue_cursors.lock().map_err(|_| BusError::Closed)?;
        for ((filter, queue), mut members) in groups {
            members.sort_by_key(|s| s.id());
            let cursor = cursors
                .entry((filter.to_string(), queue.to_string()))
                .or_insert(0);
            let pick = (*cursor % members.len() as u64) as usize;
            *cursor = cursor.wrapping_add(1);
            plain.push(Arc::clone(members[pick]));
        }

        Ok(plain)
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryBus {
    type Subscription = BusSubscription;

    async fn subscribe(
        &self,
        subject: &str,
        handler: TransportHandler,
    ) -> Result<BusSubscription, BusError> {
        self.add_subscription(subject, None, handler)
    }

    async fn queue_subscribe(
        &self,
        subject: &str,
        queue: &str,
        handler: TransportHandler,
    ) -> Result<BusSubscription, BusError> {
        self.add_subscription(subject, Some(queue), handler)
    }

    async fn publish(&self, message: Message) -> Result<usize, BusError> {
        validate_subject(&message.subject)?;

        // Always increment counter (publish was attempted)
        self.inner.messages_published.fetch_add(1, Ordering::Relaxed);

        let subject = message.subject.clone();
        let receivers = self.receivers(&subject)?;
        if receivers.is_empty() {
            warn!(subject = %subject, "Message dropped (no receivers)");
            return Ok(0);
        }

        let accepted = receivers
            .iter()
            .filter(|state| state.offer(message.clone()))
            .count();

        debug!(
            subject = %subject,
            receivers = receivers.len(),
            accepted = accepted,
            "Message published"
        );
        Ok(accepted)
    }
}
