//! Subscription statistics.
//!
//! [`SubscriptionStatMetric`] keeps every live subscription handle in a
//! sharded concurrent map. The metrics backend calls back on its own
//! schedule; each call walks the map, sums the counters per subject and emits
//! four gauges per subject:
//!
//! | Gauge | Value |
//! |-------|-------|
//! | `subscriptions-pending-count` | buffered messages |
//! | `subscriptions-pending-bytes` | buffered bytes |
//! | `subscriptions-dropped-count` | messages dropped on full buffers |
//! | `subscriptions-delivered-count` | messages handed to handlers |
//!
//! Registration never waits for a collection pass to finish and vice versa
//! beyond the per-shard locks of the map.

use dashmap::DashMap;
use opentelemetry::KeyValue;
use relay_bus::{BusError, SubscriptionHandle, SubscriptionId};
use relay_telemetry::{
    GaugeDescriptor, Meter, ObservableGauge, SUBJECT_ATTRIBUTE, SUBSCRIPTIONS_DELIVERED_COUNT,
    SUBSCRIPTIONS_DROPPED_COUNT, SUBSCRIPTIONS_PENDING_BYTES, SUBSCRIPTIONS_PENDING_COUNT,
    UNIT_BYTES,
};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::aggregate::{aggregate, SubjectAggregate};
use crate::domain::errors::CoreError;

type Records = DashMap<SubscriptionId, Arc<dyn SubscriptionHandle>>;

#[derive(Clone)]
struct SubscriptionGauges {
    pending_count: ObservableGauge,
    pending_bytes: ObservableGauge,
    dropped_count: ObservableGauge,
    delivered_count: ObservableGauge,
}

impl SubscriptionGauges {
    fn create(meter: &dyn Meter) -> Result<Self, CoreError> {
        let gauge = |name: &str, description: &str| {
            GaugeDescriptor::new(name, description).with_attribute_keys(&[SUBJECT_ATTRIBUTE])
        };

        Ok(Self {
            pending_count: meter.i64_observable_gauge(gauge(
                SUBSCRIPTIONS_PENDING_COUNT,
                "Messages buffered by subscriptions, not yet handled",
            ))?,
            pending_bytes: meter.i64_observable_gauge(
                gauge(
                    SUBSCRIPTIONS_PENDING_BYTES,
                    "Bytes buffered by subscriptions, not yet handled",
                )
                .with_unit(UNIT_BYTES),
            )?,
            dropped_count: meter.i64_observable_gauge(gauge(
                SUBSCRIPTIONS_DROPPED_COUNT,
                "Messages dropped because a subscription buffer was full",
            ))?,
            delivered_count: meter.i64_observable_gauge(gauge(
                SUBSCRIPTIONS_DELIVERED_COUNT,
                "Messages handed to subscription handlers",
            ))?,
        })
    }

    fn all(&self) -> [ObservableGauge; 4] {
        [
            self.pending_count.clone(),
            self.pending_bytes.clone(),
            self.dropped_count.clone(),
            self.delivered_count.clone(),
        ]
    }
}

fn gauge_value(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn snapshot_of(records: &Records) -> BTreeMap<String, SubjectAggregate> {
    let handles: Vec<Arc<dyn SubscriptionHandle>> =
        records.iter().map(|entry| Arc::clone(entry.value())).collect();
    aggregate(handles.iter().map(Arc::as_ref))
}

/// Concurrent registry of live subscriptions, reported as per-subject gauges.
pub struct SubscriptionStatMetric {
    records: Arc<Records>,
}

impl SubscriptionStatMetric {
    /// Create the four gauges and register the collection callback.
    ///
    /// Any failure here is a setup failure; the aggregator cannot run
    /// without its instruments.
    pub fn new(meter: &dyn Meter) -> Result<Self, CoreError> {
        let gauges = SubscriptionGauges::create(meter)?;
        let records: Arc<Records> = Arc::new(DashMap::new());

        let tick_records = Arc::clone(&records);
        let tick_gauges = gauges.clone();
        meter.register_callback(
            &gauges.all(),
            Box::new(move |_cx, observer| {
                for (subject, totals) in snapshot_of(&tick_records) {
                    let attributes = [KeyValue::new(SUBJECT_ATTRIBUTE, subject)];
                    observer.observe(
                        &tick_gauges.pending_count,
                        gauge_value(totals.pending_messages),
                        &attributes,
                    );
                    observer.observe(
                        &tick_gauges.pending_bytes,
                        gauge_value(totals.pending_bytes),
                        &attributes,
                    );
                    observer.observe(
                        &tick_gauges.dropped_count,
                        gauge_value(totals.dropped),
                        &attributes,
                    );
                    observer.observe(
                        &tick_gauges.delivered_count,
                        gauge_value(totals.delivered),
                        &attributes,
                    );
                }
            }),
        )?;

        tracing::debug!("Subscription stat metrics registered");
        Ok(Self { records })
    }

    /// Track subscriptions. Registering a handle twice has no further effect.
    pub fn register<S, I>(&self, subs: I)
    where
        S: SubscriptionHandle,
        I: IntoIterator<Item = S>,
    {
        for sub in subs {
            self.records
                .entry(sub.id())
                .or_insert_with(|| Arc::new(sub));
        }
    }

    /// Register the subscription if the transport call succeeded; return
    /// the result unchanged.
    pub fn hook<S>(&self, result: Result<S, BusError>) -> Result<S, BusError>
    where
        S: SubscriptionHandle + Clone,
    {
        if let Ok(sub) = &result {
            self.register([sub.clone()]);
        }
        result
    }

    /// Stop tracking a subscription. The next collection excludes it.
    pub fn deregister(&self, id: SubscriptionId) -> bool {
        self.records.remove(&id).is_some()
    }

    /// Whether a subscription is tracked.
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.records.contains_key(&id)
    }

    /// Number of tracked subscriptions.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no subscription is tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Per-subject totals as a collection pass would compute them now.
    pub fn snapshot(&self) -> BTreeMap<String, SubjectAggregate> {
        snapshot_of(&self.records)
    }
}
