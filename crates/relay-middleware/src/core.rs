//! Core registry: configured middleware, wrapped handlers, publishers.

use prometheus::Registry;
use relay_bus::{Transport, TransportHandler};
use relay_telemetry::{MessagingMetrics, Meter, PrometheusMeter, TelemetryRoot};
use std::sync::Arc;

use crate::adapters::TransportPublisher;
use crate::config::MiddlewareConfig;
use crate::conn::ConnContext;
use crate::domain::chain::{compose, compose_publisher};
use crate::domain::errors::CoreError;
use crate::domain::guard::{SingletonGuard, PROCESS_GUARD};
use crate::domain::handler::{adapt_post_fn, MsgHandler, PostFn, PostHook};
use crate::middleware::{default_middleware, default_publish_middleware, Middleware, PublishMiddleware};
use crate::ports::Publisher;
use crate::stats::SubscriptionStatMetric;

/// Holds the configured middleware chains and the subscription aggregator.
///
/// Built once at startup through [`Core::builder`] and shared (`Arc<Core>`)
/// by every [`ConnContext`].
pub struct Core {
    handlers: Vec<Middleware>,
    publishers: Vec<PublishMiddleware>,
    telemetry: TelemetryRoot,
    post_hook: Option<PostHook>,
    stats: Arc<SubscriptionStatMetric>,
    guarded: bool,
}

impl Core {
    pub fn builder() -> CoreBuilder {
        CoreBuilder::default()
    }

    /// Turn a handler into a transport callback.
    ///
    /// The handler units are composed once. Each delivery derives a fresh
    /// request context from the telemetry root, runs the composed handler and
    /// drops its result: transport callbacks have no error channel, so
    /// failures must be reported by the units themselves.
    pub fn wrap(&self, handler: MsgHandler) -> TransportHandler {
        let composed = compose(handler, &self.handlers);
        let root = self.telemetry.clone();

        Arc::new(move |msg| {
            let composed = Arc::clone(&composed);
            let cx = root.copy().context();
            Box::pin(async move {
                let _ = composed(cx, msg).await;
            })
        })
    }

    /// Apply the publish units to `base`.
    pub fn use_publisher(&self, base: Arc<dyn Publisher>) -> Arc<dyn Publisher> {
        compose_publisher(base, &self.publishers)
    }

    /// Bind a transport connection to this core.
    pub fn use_conn<T: Transport>(self: &Arc<Self>, conn: T) -> ConnContext<T> {
        let conn = Arc::new(conn);
        let publisher = self.use_publisher(Arc::new(TransportPublisher::new(Arc::clone(&conn))));
        ConnContext::new(conn, publisher, Arc::clone(self))
    }

    /// Adapt a legacy post function using the configured post-hook.
    pub fn adapt(&self, post: PostFn) -> MsgHandler {
        adapt_post_fn(post, self.post_hook.clone())
    }

    pub fn stats(&self) -> &Arc<SubscriptionStatMetric> {
        &self.stats
    }

    pub fn telemetry(&self) -> &TelemetryRoot {
        &self.telemetry
    }

    pub fn post_hook(&self) -> Option<&PostHook> {
        self.post_hook.as_ref()
    }

    /// Handler units in configuration order.
    pub fn middleware(&self) -> &[Middleware] {
        &self.handlers
    }

    /// Publish units in configuration order.
    pub fn publish_middleware(&self) -> &[PublishMiddleware] {
        &self.publishers
    }

    /// Whether this core holds a construction guard.
    pub fn is_guarded(&self) -> bool {
        self.guarded
    }
}

/// Builder for [`Core`].
///
/// ```rust,ignore
/// let core = Core::builder()
///     .config(MiddlewareConfig::from_env())
///     .telemetry(guard.root().clone())
///     .post_hook(my_hook)
///     .build()?;
/// ```
pub struct CoreBuilder {
    config: MiddlewareConfig,
    telemetry: Option<TelemetryRoot>,
    meter: Option<Arc<dyn Meter>>,
    registry: Option<Registry>,
    middleware: Vec<Middleware>,
    publish_middleware: Vec<PublishMiddleware>,
    post_hook: Option<PostHook>,
    guard: Option<&'static SingletonGuard>,
}

impl Default for CoreBuilder {
    fn default() -> Self {
        Self {
            config: MiddlewareConfig::default(),
            telemetry: None,
            meter: None,
            registry: None,
            middleware: Vec::new(),
            publish_middleware: Vec::new(),
            post_hook: None,
            guard: Some(&PROCESS_GUARD),
        }
    }
}

impl CoreBuilder {
    /// Select the built-in units.
    #[must_use]
    pub fn config(mut self, config: MiddlewareConfig) -> Self {
        self.config = config;
        self
    }

    /// Telemetry root every request context is derived from.
    #[must_use]
    pub fn telemetry(mut self, root: TelemetryRoot) -> Self {
        self.telemetry = Some(root);
        self
    }

    /// Backend for the subscription gauges. Defaults to a
    /// [`PrometheusMeter`] on the registry.
    #[must_use]
    pub fn meter(mut self, meter: Arc<dyn Meter>) -> Self {
        self.meter = Some(meter);
        self
    }

    /// Registry for the messaging metrics (and the default meter).
    ///
    /// Defaults to the process-wide [`REGISTRY`](relay_telemetry::REGISTRY),
    /// whose families and gauges are shared: a core built after
    /// [`SingletonGuard::reset`] takes over the gauge callback of the
    /// previous one.
    #[must_use]
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Append a handler unit. It runs before the built-in ones.
    #[must_use]
    pub fn with_middleware(mut self, unit: Middleware) -> Self {
        self.middleware.push(unit);
        self
    }

    /// Append a publish unit. It runs before the built-in ones.
    #[must_use]
    pub fn with_publish_middleware(mut self, unit: PublishMiddleware) -> Self {
        self.publish_middleware.push(unit);
        self
    }

    /// Hook run after successful legacy post functions.
    #[must_use]
    pub fn post_hook(mut self, hook: PostHook) -> Self {
        self.post_hook = Some(hook);
        self
    }

    /// Enforce single construction with `guard` instead of [`PROCESS_GUARD`].
    #[must_use]
    pub fn guard(mut self, guard: &'static SingletonGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Build without any construction guard.
    #[must_use]
    pub fn standalone(mut self) -> Self {
        self.guard = None;
        self
    }

    /// Build the core.
    ///
    /// # Errors
    ///
    /// - [`CoreError::MultipleInstances`] if the guard is already held
    /// - [`CoreError::Metrics`] if instruments cannot be registered; the
    ///   guard is released again in that case
    pub fn build(self) -> Result<Arc<Core>, CoreError> {
        let guard = self.guard;
        if let Some(guard) = guard {
            if !guard.try_acquire() {
                tracing::error!("Refusing to create a second middleware core");
                return Err(CoreError::MultipleInstances);
            }
        }

        match self.assemble(guard.is_some()) {
            Ok(core) => Ok(Arc::new(core)),
            Err(e) => {
                if let Some(guard) = guard {
                    guard.reset();
                }
                Err(e)
            }
        }
    }

    fn assemble(self, guarded: bool) -> Result<Core, CoreError> {
        // The process-wide registry is shared by every core built without
        // one, so its meter and families are reused across rebuilds
        let meter: Arc<dyn Meter> = match (self.meter, &self.registry) {
            (Some(meter), _) => meter,
            (None, Some(registry)) => Arc::new(PrometheusMeter::new(registry.clone())),
            (None, None) => PrometheusMeter::global(),
        };

        let stats = SubscriptionStatMetric::new(meter.as_ref())?;

        let metrics = match (&self.registry, self.config.metrics) {
            (_, false) => None,
            (Some(registry), true) => Some(MessagingMetrics::register(registry)?),
            (None, true) => Some(MessagingMetrics::global()?),
        };

        let mut handlers = default_middleware(&self.config, metrics.as_ref());
        handlers.extend(self.middleware);
        let mut publishers = default_publish_middleware(&self.config, metrics.as_ref());
        publishers.extend(self.publish_middleware);

        let telemetry = self
            .telemetry
            .unwrap_or_else(|| TelemetryRoot::new("relay"));

        tracing::info!(
            service = %telemetry.service_name(),
            middleware = ?handlers,
            publish_middleware = ?publishers,
            guarded,
            "Middleware core created"
        );

        Ok(Core {
            handlers,
            publishers,
            telemetry,
            post_hook: self.post_hook,
            stats: Arc::new(stats),
            guarded,
        })
    }
}
