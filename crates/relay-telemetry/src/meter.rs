//! Metrics backend capability.
//!
//! The middleware layer only needs two things from a metrics backend:
//! create an asynchronous (observable) gauge, and register a callback that
//! produces observations whenever the backend collects.
//!
//! | Adapter | Collection tick |
//! |---------|-----------------|
//! | [`PrometheusMeter`] | every `Registry::gather()` (i.e. every scrape) |
//! | [`RecordingMeter`] | every [`RecordingMeter::collect`] call |
//!
//! A [`PrometheusMeter`] can be asked for the same instruments again: an
//! identical descriptor returns the existing handle, and a callback for the
//! same set of gauges replaces the previous one. This is what lets a
//! process rebuild its middleware core on [`REGISTRY`](crate::REGISTRY).

use crate::TelemetryError;
use lazy_static::lazy_static;
use opentelemetry::{Context, KeyValue};
use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{IntGaugeVec, Opts, Registry};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

/// Description of an observable gauge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaugeDescriptor {
    /// Instrument name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Unit (`By` for bytes), if any.
    pub unit: Option<String>,
    /// Attribute keys observations are labelled with.
    pub attribute_keys: Vec<String>,
}

impl GaugeDescriptor {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            unit: None,
            attribute_keys: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    #[must_use]
    pub fn with_attribute_keys(mut self, keys: &[&str]) -> Self {
        self.attribute_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }
}

/// Handle to a gauge created by a [`Meter`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObservableGauge {
    name: Arc<str>,
}

impl ObservableGauge {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Sink for observations during one collection tick.
pub trait Observer {
    fn observe(&self, gauge: &ObservableGauge, value: i64, attributes: &[KeyValue]);
}

/// Callback invoked by the backend on every collection tick.
pub type MeterCallback = Box<dyn Fn(&Context, &dyn Observer) + Send + Sync>;

/// A metrics backend that supports observable gauges.
pub trait Meter: Send + Sync {
    /// Create an observable gauge.
    fn i64_observable_gauge(
        &self,
        descriptor: GaugeDescriptor,
    ) -> Result<ObservableGauge, TelemetryError>;

    /// Register a callback producing observations for `gauges`.
    fn register_callback(
        &self,
        gauges: &[ObservableGauge],
        callback: MeterCallback,
    ) -> Result<(), TelemetryError>;
}

/// Prometheus metric names allow `[a-zA-Z0-9_:]` only.
pub fn prometheus_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == ':' { c } else { '_' })
        .collect()
}

// =============================================================================
// PROMETHEUS
// =============================================================================

lazy_static! {
    static ref GLOBAL_METER: Arc<PrometheusMeter> =
        Arc::new(PrometheusMeter::new(crate::REGISTRY.clone()));
}

#[derive(Clone)]
struct PrometheusGauge {
    handle: ObservableGauge,
    vec: IntGaugeVec,
    descriptor: GaugeDescriptor,
}

/// Callback slot shared with the registered collector.
type CallbackSlot = Arc<Mutex<MeterCallback>>;

/// [`Meter`] backed by a Prometheus registry.
pub struct PrometheusMeter {
    registry: Registry,
    gauges: Mutex<HashMap<Arc<str>, PrometheusGauge>>,
    /// Installed callbacks, keyed by the sorted names of their gauges.
    callbacks: Mutex<HashMap<Vec<Arc<str>>, CallbackSlot>>,
}

impl PrometheusMeter {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            gauges: Mutex::new(HashMap::new()),
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    /// The shared meter on the process-wide [`REGISTRY`](crate::REGISTRY).
    ///
    /// Every caller gets the same instance, so instruments and callbacks
    /// are registered with the registry at most once.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_METER)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Meter for PrometheusMeter {
    fn i64_observable_gauge(
        &self,
        descriptor: GaugeDescriptor,
    ) -> Result<ObservableGauge, TelemetryError> {
        let mut gauges = self.gauges.lock();
        if let Some(existing) = gauges.get(descriptor.name.as_str()) {
            if existing.descriptor == descriptor {
                return Ok(existing.handle.clone());
            }
            return Err(TelemetryError::MetricsInit(format!(
                "instrument {} already exists with a different description",
                descriptor.name
            )));
        }

        let help = match &descriptor.unit {
            Some(unit) => format!("{} ({})", descriptor.description, unit),
            None => descriptor.description.clone(),
        };
        let keys: Vec<&str> = descriptor.attribute_keys.iter().map(String::as_str).collect();
        let vec = IntGaugeVec::new(Opts::new(prometheus_name(&descriptor.name), help), &keys)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

        let handle = ObservableGauge {
            name: Arc::from(descriptor.name.as_str()),
        };
        gauges.insert(
            Arc::clone(&handle.name),
            PrometheusGauge {
                handle: handle.clone(),
                vec,
                descriptor,
            },
        );
        Ok(handle)
    }

    fn register_callback(
        &self,
        gauges: &[ObservableGauge],
        callback: MeterCallback,
    ) -> Result<(), TelemetryError> {
        let gauges = {
            let known = self.gauges.lock();
            gauges
                .iter()
                .map(|g| {
                    known.get(&g.name).cloned().ok_or_else(|| {
                        TelemetryError::MetricsInit(format!("unknown instrument {}", g.name))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut key: Vec<Arc<str>> = gauges.iter().map(|g| Arc::clone(&g.handle.name)).collect();
        key.sort();
        key.dedup();

        let mut callbacks = self.callbacks.lock();
        if let Some(slot) = callbacks.get(&key) {
            *slot.lock() = callback;
            tracing::debug!(gauges = ?key, "Replaced gauge callback");
            return Ok(());
        }

        let slot: CallbackSlot = Arc::new(Mutex::new(callback));
        let collector = CallbackCollector {
            gauges,
            callback: Arc::clone(&slot),
            tick: Mutex::new(()),
        };
        self.registry
            .register(Box::new(collector))
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        callbacks.insert(key, slot);
        Ok(())
    }
}

/// Runs the callback on every gather and exports what it observed.
struct CallbackCollector {
    gauges: Vec<PrometheusGauge>,
    callback: CallbackSlot,
    /// Serializes concurrent scrapes so reset/observe/collect stay consistent.
    tick: Mutex<()>,
}

impl Collector for CallbackCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.gauges.iter().flat_map(|g| g.vec.desc()).collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let _tick = self.tick.lock();

        // Each tick is a complete snapshot: series not observed now disappear
        for gauge in &self.gauges {
            gauge.vec.reset();
        }

        let observer = PrometheusObserver {
            gauges: &self.gauges,
        };
        let callback = self.callback.lock();
        (*callback)(&Context::current(), &observer);

        self.gauges.iter().flat_map(|g| g.vec.collect()).collect()
    }
}

struct PrometheusObserver<'a> {
    gauges: &'a [PrometheusGauge],
}

impl Observer for PrometheusObserver<'_> {
    fn observe(&self, gauge: &ObservableGauge, value: i64, attributes: &[KeyValue]) {
        let Some(target) = self.gauges.iter().find(|g| g.handle == *gauge) else {
            tracing::warn!(gauge = %gauge.name(), "Observation for unregistered gauge ignored");
            return;
        };

        let values: Vec<String> = target
            .descriptor
            .attribute_keys
            .iter()
            .map(|key| {
                attributes
                    .iter()
                    .find(|kv| kv.key.as_str() == key)
                    .map(|kv| kv.value.as_str().into_owned())
                    .unwrap_or_default()
            })
            .collect();
        let values: Vec<&str> = values.iter().map(String::as_str).collect();

        target.vec.with_label_values(&values).set(value);
    }
}

// =============================================================================
// RECORDING
// =============================================================================

/// One observation captured by [`RecordingMeter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub gauge: String,
    pub value: i64,
    pub attributes: Vec<(String, String)>,
}

impl Observation {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// In-memory [`Meter`] that runs its callbacks on demand.
///
/// Used by tests and by tools that want to inspect gauges without a
/// Prometheus scrape.
#[derive(Default)]
pub struct RecordingMeter {
    descriptors: Mutex<Vec<GaugeDescriptor>>,
    callbacks: Mutex<Vec<(Vec<ObservableGauge>, MeterCallback)>>,
    fail_instruments: bool,
    fail_callbacks: bool,
}

impl RecordingMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A meter whose instrument creation always fails.
    pub fn failing_instruments() -> Self {
        Self {
            fail_instruments: true,
            ..Self::default()
        }
    }

    /// A meter whose callback registration always fails.
    pub fn failing_callbacks() -> Self {
        Self {
            fail_callbacks: true,
            ..Self::default()
        }
    }

    /// Descriptors of every gauge created so far.
    pub fn descriptors(&self) -> Vec<GaugeDescriptor> {
        self.descriptors.lock().clone()
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.lock().len()
    }

    /// Run one collection tick and return everything observed.
    pub fn collect(&self) -> Vec<Observation> {
        let cx = Context::current();
        let callbacks = self.callbacks.lock();
        let mut observations = Vec::new();

        for (gauges, callback) in callbacks.iter() {
            let observer = RecordingObserver {
                gauges,
                observations: RefCell::new(Vec::new()),
            };
            callback(&cx, &observer);
            observations.extend(observer.observations.into_inner());
        }

        observations
    }
}

impl Meter for RecordingMeter {
    fn i64_observable_gauge(
        &self,
        descriptor: GaugeDescriptor,
    ) -> Result<ObservableGauge, TelemetryError> {
        if self.fail_instruments {
            return Err(TelemetryError::MetricsInit(format!(
                "instrument {} rejected",
                descriptor.name
            )));
        }

        let handle = ObservableGauge {
            name: Arc::from(descriptor.name.as_str()),
        };
        self.descriptors.lock().push(descriptor);
        Ok(handle)
    }

    fn register_callback(
        &self,
        gauges: &[ObservableGauge],
        callback: MeterCallback,
    ) -> Result<(), TelemetryError> {
        if self.fail_callbacks {
            return Err(TelemetryError::MetricsInit("callback rejected".to_string()));
        }
        self.callbacks.lock().push((gauges.to_vec(), callback));
        Ok(())
    }
}

struct RecordingObserver<'a> {
    gauges: &'a [ObservableGauge],
    observations: RefCell<Vec<Observation>>,
}

impl Observer for RecordingObserver<'_> {
    fn observe(&self, gauge: &ObservableGauge, value: i64, attributes: &[KeyValue]) {
        if !self.gauges.contains(gauge) {
            return;
        }
        self.observations.borrow_mut().push(Observation {
            gauge: gauge.name().to_string(),
            value,
            attributes: attributes
                .iter()
                .map(|kv| (kv.key.as_str().to_string(), kv.value.as_str().into_owned()))
                .collect(),
        });
    }
}
