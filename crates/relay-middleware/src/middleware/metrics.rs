//! Prometheus counters and latency histograms for handlers and publishes.

use async_trait::async_trait;
use opentelemetry::Context;
use relay_bus::Message;
use relay_telemetry::{HistogramTimer, MessagingMetrics};
use std::fmt;
use std::sync::Arc;

use crate::domain::chain::{HandlerLayer, PublishLayer};
use crate::domain::errors::HandlerError;
use crate::domain::handler::MsgHandler;
use crate::ports::Publisher;

fn status(result: &Result<(), HandlerError>) -> &'static str {
    if result.is_ok() {
        "ok"
    } else {
        "error"
    }
}

/// Records `relay_consumed_messages_total`, `relay_handler_duration_seconds`
/// and `relay_published_messages_total`.
#[derive(Clone)]
pub struct MetricsLayer {
    metrics: MessagingMetrics,
}

impl MetricsLayer {
    pub fn new(metrics: MessagingMetrics) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &MessagingMetrics {
        &self.metrics
    }
}

impl fmt::Debug for MetricsLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsLayer").finish_non_exhaustive()
    }
}

impl HandlerLayer for MetricsLayer {
    fn layer(&self, inner: MsgHandler) -> MsgHandler {
        let metrics = self.metrics.clone();
        Arc::new(move |cx: Context, msg: Message| {
            let inner = Arc::clone(&inner);
            let metrics = metrics.clone();
            Box::pin(async move {
                let subject = msg.subject.clone();
                let timer = HistogramTimer::new(
                    metrics.handler_duration.with_label_values(&[subject.as_str()]),
                );

                let result = inner(cx, msg).await;
                drop(timer);

                metrics
                    .consumed
                    .with_label_values(&[subject.as_str(), status(&result)])
                    .inc();
                result
            })
        })
    }
}

impl PublishLayer for MetricsLayer {
    fn layer(&self, inner: Arc<dyn Publisher>) -> Arc<dyn Publisher> {
        Arc::new(MeteredPublisher {
            inner,
            metrics: self.metrics.clone(),
        })
    }
}

struct MeteredPublisher {
    inner: Arc<dyn Publisher>,
    metrics: MessagingMetrics,
}

#[async_trait]
impl Publisher for MeteredPublisher {
    async fn publish(&self, cx: &Context, msg: Message) -> Result<(), HandlerError> {
        let subject = msg.subject.clone();
        let result = self.inner.publish(cx, msg).await;
        self.metrics
            .published
            .with_label_values(&[subject.as_str(), status(&result)])
            .inc();
        result
    }
}
