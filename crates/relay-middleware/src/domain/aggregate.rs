//! Per-subject delivery statistics.

use relay_bus::{BusError, SubscriptionHandle};
use std::collections::BTreeMap;

/// Sum of delivery counters across subscriptions sharing a subject.
///
/// Built fresh on every collection tick and discarded afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubjectAggregate {
    /// Messages buffered, not yet handled.
    pub pending_messages: u64,
    /// Bytes buffered, not yet handled.
    pub pending_bytes: u64,
    /// Messages dropped on full buffers.
    pub dropped: u64,
    /// Messages handed to handlers.
    pub delivered: u64,
}

impl SubjectAggregate {
    /// Add one subscription's counters.
    pub fn add(&mut self, counters: &SubscriptionCounters) {
        self.pending_messages = self.pending_messages.saturating_add(counters.pending_messages);
        self.pending_bytes = self.pending_bytes.saturating_add(counters.pending_bytes);
        self.dropped = self.dropped.saturating_add(counters.dropped);
        self.delivered = self.delivered.saturating_add(counters.delivered);
    }
}

/// Counters of a single subscription, read together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionCounters {
    /// Messages buffered, not yet handled.
    pub pending_messages: u64,
    /// Bytes buffered, not yet handled.
    pub pending_bytes: u64,
    /// Messages dropped on a full buffer.
    pub dropped: u64,
    /// Messages handed to the handler.
    pub delivered: u64,
}

impl SubscriptionCounters {
    /// Read every counter of `handle`. Fails if any read fails.
    pub fn read<H: SubscriptionHandle + ?Sized>(handle: &H) -> Result<Self, BusError> {
        let (pending_messages, pending_bytes) = handle.pending()?;
        Ok(Self {
            pending_messages,
            pending_bytes,
            dropped: handle.dropped()?,
            delivered: handle.delivered()?,
        })
    }
}

/// Group subscriptions by subject and sum their counters.
///
/// Handles whose counters cannot be read are skipped.
pub fn aggregate<'a, H, I>(handles: I) -> BTreeMap<String, SubjectAggregate>
where
    H: SubscriptionHandle + ?Sized + 'a,
    I: IntoIterator<Item = &'a H>,
{
    let mut by_subject: BTreeMap<String, SubjectAggregate> = BTreeMap::new();

    for handle in handles {
        let counters = match SubscriptionCounters::read(handle) {
            Ok(counters) => counters,
            Err(e) => {
                tracing::trace!(sid = %handle.id(), error = %e, "Skipping unreadable subscription");
                continue;
            }
        };

        by_subject
            .entry(handle.subject().to_string())
            .or_default()
            .add(&counters);
    }

    by_subject
}
