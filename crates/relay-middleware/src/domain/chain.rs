//! Middleware chain composition.
//!
//! Units are folded in configuration order, each wrapping the result of the
//! previous step:
//!
//! ```text
//! config:   [A, B, C]
//! fold:     C(B(A(base)))
//! runs:     C → B → A → base
//! ```
//!
//! The last-configured unit is outermost. Composition cannot fail and is
//! deterministic for a fixed configuration.

use std::sync::Arc;

use super::handler::MsgHandler;
use crate::ports::Publisher;

/// A unit that wraps a message handler.
pub trait HandlerLayer: Send + Sync {
    /// Return a handler that runs this unit around `inner`.
    fn layer(&self, inner: MsgHandler) -> MsgHandler;
}

/// A unit that wraps a publisher.
pub trait PublishLayer: Send + Sync {
    /// Return a publisher that runs this unit around `inner`.
    fn layer(&self, inner: Arc<dyn Publisher>) -> Arc<dyn Publisher>;
}

/// Compose `units` around `base`.
pub fn compose<L: HandlerLayer>(base: MsgHandler, units: &[L]) -> MsgHandler {
    units.iter().fold(base, |current, unit| unit.layer(current))
}

/// Compose publish `units` around `base`.
pub fn compose_publisher<L: PublishLayer>(
    base: Arc<dyn Publisher>,
    units: &[L],
) -> Arc<dyn Publisher> {
    units.iter().fold(base, |current, unit| unit.layer(current))
}

impl<T: HandlerLayer + ?Sized> HandlerLayer for Arc<T> {
    fn layer(&self, inner: MsgHandler) -> MsgHandler {
        (**self).layer(inner)
    }
}

impl<T: PublishLayer + ?Sized> PublishLayer for Arc<T> {
    fn layer(&self, inner: Arc<dyn Publisher>) -> Arc<dyn Publisher> {
        (**self).layer(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::HandlerError;
    use crate::domain::handler::handler_fn;
    use async_trait::async_trait;
    use opentelemetry::Context;
    use parking_lot::Mutex;
    use relay_bus::Message;

    type Trace = Arc<Mutex<Vec<&'static str>>>;

    struct Tag {
        name: &'static str,
        trace: Trace,
    }

    impl HandlerLayer for Tag {
        fn layer(&self, inner: MsgHandler) -> MsgHandler {
            let name = self.name;
            let trace = Arc::clone(&self.trace);
            Arc::new(move |cx, msg| {
                trace.lock().push(name);
                inner(cx, msg)
            })
        }
    }

    fn tags(names: &[&'static str], trace: &Trace) -> Vec<Tag> {
        names
            .iter()
            .map(|&name| Tag {
                name,
                trace: Arc::clone(trace),
            })
            .collect()
    }

    fn recording_base(trace: &Trace) -> MsgHandler {
        let trace = Arc::clone(trace);
        handler_fn(move |_cx, _msg| {
            let trace = Arc::clone(&trace);
            async move {
                trace.lock().push("base");
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_execution_is_reverse_of_configuration() {
        let trace: Trace = Arc::default();
        let handler = compose(recording_base(&trace), &tags(&["A", "B", "C"], &trace));

        handler(Context::new(), Message::new("x", "")).await.unwrap();

        assert_eq!(*trace.lock(), vec!["C", "B", "A", "base"]);
    }

    #[tokio::test]
    async fn test_empty_chain_is_base() {
        let trace: Trace = Arc::default();
        let handler = compose::<Tag>(recording_base(&trace), &[]);

        handler(Context::new(), Message::new("x", "")).await.unwrap();

        assert_eq!(*trace.lock(), vec!["base"]);
    }

    #[tokio::test]
    async fn test_order_is_stable_across_invocations() {
        let trace: Trace = Arc::default();
        let handler = compose(recording_base(&trace), &tags(&["A", "B"], &trace));

        for _ in 0..3 {
            handler(Context::new(), Message::new("x", "")).await.unwrap();
        }

        assert_eq!(
            *trace.lock(),
            vec!["B", "A", "base", "B", "A", "base", "B", "A", "base"]
        );
    }

    struct RecordingPublisher {
        trace: Trace,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, _cx: &Context, _msg: Message) -> Result<(), HandlerError> {
            self.trace.lock().push("base");
            Ok(())
        }
    }

    struct PubTag {
        name: &'static str,
        trace: Trace,
    }

    struct PubTagged {
        name: &'static str,
        trace: Trace,
        inner: Arc<dyn Publisher>,
    }

    #[async_trait]
    impl Publisher for PubTagged {
        async fn publish(&self, cx: &Context, msg: Message) -> Result<(), HandlerError> {
            self.trace.lock().push(self.name);
            self.inner.publish(cx, msg).await
        }
    }

    impl PublishLayer for PubTag {
        fn layer(&self, inner: Arc<dyn Publisher>) -> Arc<dyn Publisher> {
            Arc::new(PubTagged {
                name: self.name,
                trace: Arc::clone(&self.trace),
                inner,
            })
        }
    }

    #[tokio::test]
    async fn test_publish_chain_is_reverse_of_configuration() {
        let trace: Trace = Arc::default();
        let units: Vec<PubTag> = ["A", "B", "C"]
            .into_iter()
            .map(|name| PubTag {
                name,
                trace: Arc::clone(&trace),
            })
            .collect();
        let base: Arc<dyn Publisher> = Arc::new(RecordingPublisher {
            trace: Arc::clone(&trace),
        });

        let publisher = compose_publisher(base, &units);
        publisher
            .publish(&Context::new(), Message::new("x", ""))
            .await
            .unwrap();

        assert_eq!(*trace.lock(), vec!["C", "B", "A", "base"]);
    }
}
