//! Metric names and Prometheus families for relay messaging.
//!
//! ## Subscription gauges
//!
//! Produced by the subscription aggregator through a [`Meter`](crate::Meter),
//! one series per subject. The names are a stable contract:
//!
//! | Name | Unit |
//! |------|------|
//! | `subscriptions-pending-count` | messages |
//! | `subscriptions-pending-bytes` | bytes |
//! | `subscriptions-dropped-count` | messages |
//! | `subscriptions-delivered-count` | messages |
//!
//! ## Handler / publish families
//!
//! Recorded directly by the metrics middleware units, naming convention
//! `relay_<what>_<unit>`.

use lazy_static::lazy_static;
use parking_lot::Mutex;
use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts,
    Registry, TextEncoder,
};
use std::time::Instant;

use crate::TelemetryError;

/// Messages buffered but not yet handled, per subject.
pub const SUBSCRIPTIONS_PENDING_COUNT: &str = "subscriptions-pending-count";

/// Bytes buffered but not yet handled, per subject.
pub const SUBSCRIPTIONS_PENDING_BYTES: &str = "subscriptions-pending-bytes";

/// Messages dropped because a subscription buffer was full, per subject.
pub const SUBSCRIPTIONS_DROPPED_COUNT: &str = "subscriptions-dropped-count";

/// Messages handed to handlers, per subject.
pub const SUBSCRIPTIONS_DELIVERED_COUNT: &str = "subscriptions-delivered-count";

/// Attribute key every subscription gauge is labelled with.
pub const SUBJECT_ATTRIBUTE: &str = "subject";

/// Unit of the pending-bytes gauge.
pub const UNIT_BYTES: &str = "By";

lazy_static! {
    /// Process-wide metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    static ref GLOBAL_MESSAGING: Mutex<Option<MessagingMetrics>> = Mutex::new(None);
}

/// Counters and latency histograms for consumed and published messages.
#[derive(Clone)]
pub struct MessagingMetrics {
    /// Handled messages by subject and status (ok/error)
    pub consumed: IntCounterVec,
    /// Handler latency by subject
    pub handler_duration: HistogramVec,
    /// Published messages by subject and status (ok/error)
    pub published: IntCounterVec,
}

impl MessagingMetrics {
    /// Create unregistered families.
    pub fn new() -> Result<Self, TelemetryError> {
        let consumed = IntCounterVec::new(
            Opts::new(
                "relay_consumed_messages_total",
                "Messages handled by subscription handlers",
            ),
            &["subject", "status"],
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

        let buckets = exponential_buckets(0.0001, 2.0, 16)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        let handler_duration = HistogramVec::new(
            HistogramOpts::new(
                "relay_handler_duration_seconds",
                "Time spent in subscription handlers",
            )
            .buckets(buckets),
            &["subject"],
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

        let published = IntCounterVec::new(
            Opts::new("relay_published_messages_total", "Messages published"),
            &["subject", "status"],
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

        Ok(Self {
            consumed,
            handler_duration,
            published,
        })
    }

    /// Create the families and register them with `registry`.
    pub fn register(registry: &Registry) -> Result<Self, TelemetryError> {
        let metrics = Self::new()?;

        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(metrics.consumed.clone()),
            Box::new(metrics.handler_duration.clone()),
            Box::new(metrics.published.clone()),
        ];
        for collector in collectors {
            registry
                .register(collector)
                .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        }

        Ok(metrics)
    }

    /// Families registered with [`REGISTRY`], created on first use.
    ///
    /// Later calls return the same families instead of registering again.
    pub fn global() -> Result<Self, TelemetryError> {
        let mut slot = GLOBAL_MESSAGING.lock();
        if let Some(metrics) = slot.as_ref() {
            return Ok(metrics.clone());
        }

        let metrics = Self::register(&REGISTRY)?;
        *slot = Some(metrics.clone());
        Ok(metrics)
    }
}

/// Encode all metrics of `registry` as Prometheus text format.
pub fn encode_metrics(registry: &Registry) -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: Histogram) -> Self {
        Self {
            histogram,
            start: Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}
