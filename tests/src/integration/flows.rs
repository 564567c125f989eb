//! # Integration Test Flows
//!
//! Tests that relay-middleware drives the relay-bus transport correctly:
//!
//! 1. **Subscribe → deliver**: wrapped handlers receive published messages
//! 2. **Queue groups**: each message reaches one member, stats sum per subject
//! 3. **Failure isolation**: panics and rejected payloads never stop delivery
//! 4. **Unsubscribe**: the aggregator stops reporting closed subscriptions
//! 5. **Concurrency**: parallel subscribers all land in the aggregator
//! 6. **Process guard**: a reset core rebuilds on the process-wide registry

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{mpsc, Semaphore};
    use tokio::time::timeout;

    use opentelemetry::Context;
    use prometheus::Registry;
    use relay_bus::{InMemoryBus, Message, SubscriptionHandle};
    use relay_middleware::{
        handler_fn, ConnContext, Core, CoreError, HandlerError, MiddlewareConfig, MsgHandler,
        PROCESS_GUARD,
    };
    use relay_telemetry::{encode_metrics, RecordingMeter, REGISTRY};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn test_conn(
        bus: InMemoryBus,
        config: MiddlewareConfig,
    ) -> (ConnContext<InMemoryBus>, Arc<RecordingMeter>) {
        let meter = Arc::new(RecordingMeter::new());
        let core = Core::builder()
            .config(config)
            .meter(meter.clone())
            .registry(Registry::new())
            .standalone()
            .build()
            .expect("core builds");
        (core.use_conn(bus), meter)
    }

    /// Handler forwarding `(tag, message)` to a channel.
    fn forwarding(
        tag: &'static str,
        tx: mpsc::UnboundedSender<(&'static str, Message)>,
    ) -> MsgHandler {
        handler_fn(move |_cx, msg| {
            let tx = tx.clone();
            async move {
                let _ = tx.send((tag, msg));
                Ok(())
            }
        })
    }

    async fn recv_n(
        rx: &mut mpsc::UnboundedReceiver<(&'static str, Message)>,
        n: usize,
    ) -> Vec<(&'static str, Message)> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let item = timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("message within timeout")
                .expect("channel open");
            out.push(item);
        }
        out
    }

    // =============================================================================
    // SUBSCRIBE / PUBLISH
    // =============================================================================

    #[tokio::test]
    async fn test_wildcard_subscription_receives_matching_subjects() {
        let (conn, _meter) = test_conn(InMemoryBus::new(), MiddlewareConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        conn.subscribe("orders.>", forwarding("orders", tx)).await.unwrap();

        let cx = Context::new();
        conn.publish(&cx, "orders.eu.created", "1").await.unwrap();
        conn.publish(&cx, "payments.created", "2").await.unwrap();
        conn.publish(&cx, "orders.us.cancelled", "3").await.unwrap();

        let subjects: Vec<String> = recv_n(&mut rx, 2)
            .await
            .into_iter()
            .map(|(_, msg)| msg.subject)
            .collect();
        assert_eq!(subjects, vec!["orders.eu.created", "orders.us.cancelled"]);

        let snapshot = conn.core().stats().snapshot();
        assert_eq!(snapshot["orders.>"].delivered, 2);
    }

    #[tokio::test]
    async fn test_queue_group_splits_work_and_sums_stats() {
        let (conn, meter) = test_conn(InMemoryBus::new(), MiddlewareConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        conn.queue_subscribe("jobs", "workers", forwarding("w1", tx.clone()))
            .await
            .unwrap();
        conn.queue_subscribe("jobs", "workers", forwarding("w2", tx))
            .await
            .unwrap();

        let cx = Context::new();
        for i in 0..10 {
            conn.publish(&cx, "jobs", format!("job-{i}")).await.unwrap();
        }

        let mut per_worker: HashMap<&str, usize> = HashMap::new();
        for (tag, _) in recv_n(&mut rx, 10).await {
            *per_worker.entry(tag).or_default() += 1;
        }
        assert_eq!(per_worker.len(), 2);
        assert_eq!(per_worker.values().sum::<usize>(), 10);

        // Both members share the subject, so one series per gauge
        let observations = meter.collect();
        assert_eq!(observations.len(), 4);
        let delivered = observations
            .iter()
            .find(|o| o.gauge == relay_telemetry::SUBSCRIPTIONS_DELIVERED_COUNT)
            .expect("delivered gauge");
        assert_eq!(delivered.value, 10);
        assert_eq!(delivered.attribute("subject"), Some("jobs"));
    }

    // =============================================================================
    // FAILURE ISOLATION
    // =============================================================================

    #[tokio::test]
    async fn test_panicking_handler_keeps_subscription_alive() {
        let (conn, _meter) = test_conn(InMemoryBus::new(), MiddlewareConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handler = handler_fn(move |_cx, msg: Message| {
            let tx = tx.clone();
            async move {
                if msg.payload.as_ref() == b"boom" {
                    panic!("cannot process {}", msg.subject);
                }
                let _ = tx.send(("ok", msg));
                Ok(())
            }
        });
        conn.subscribe("tasks", handler).await.unwrap();

        let cx = Context::new();
        conn.publish(&cx, "tasks", "boom").await.unwrap();
        conn.publish(&cx, "tasks", "fine").await.unwrap();

        let received = recv_n(&mut rx, 1).await;
        assert_eq!(received[0].1.payload.as_ref(), b"fine");
        assert_eq!(conn.core().stats().snapshot()["tasks"].delivered, 2);
    }

    #[tokio::test]
    async fn test_oversized_payload_is_rejected_before_handler() {
        let config = MiddlewareConfig {
            max_payload_bytes: Some(8),
            ..MiddlewareConfig::default()
        };
        let (conn, _meter) = test_conn(InMemoryBus::new(), config);
        let (tx, mut rx) = mpsc::unbounded_channel();
        conn.subscribe("uploads", forwarding("uploads", tx)).await.unwrap();

        let cx = Context::new();
        conn.publish(&cx, "uploads", vec![0u8; 64]).await.unwrap();
        conn.publish(&cx, "uploads", "small").await.unwrap();

        // Deliveries are sequential per subscription: once "small" arrives the
        // oversized message has already been rejected
        let received = recv_n(&mut rx, 1).await;
        assert_eq!(received[0].1.payload.as_ref(), b"small");
        assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_handler_errors_do_not_stop_delivery() {
        let (conn, _meter) = test_conn(InMemoryBus::new(), MiddlewareConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handler = handler_fn(move |_cx, msg: Message| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(("seen", msg));
                Err(HandlerError::Validation("always fails".into()))
            }
        });
        conn.subscribe("audit", handler).await.unwrap();

        let cx = Context::new();
        for _ in 0..3 {
            conn.publish(&cx, "audit", "x").await.unwrap();
        }
        assert_eq!(recv_n(&mut rx, 3).await.len(), 3);
    }

    // =============================================================================
    // BACKPRESSURE
    // =============================================================================

    #[tokio::test]
    async fn test_full_buffer_counts_drops() {
        let (conn, _meter) =
            test_conn(InMemoryBus::with_pending_limit(1), MiddlewareConfig::bare());
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let gate = Arc::new(Semaphore::new(0));

        let handler = {
            let gate = Arc::clone(&gate);
            handler_fn(move |_cx, msg: Message| {
                let started_tx = started_tx.clone();
                let gate = Arc::clone(&gate);
                async move {
                    let _ = started_tx.send(("started", msg));
                    gate.acquire().await.expect("gate open").forget();
                    Ok(())
                }
            })
        };
        conn.subscribe("slow", handler).await.unwrap();

        let cx = Context::new();
        conn.publish(&cx, "slow", "first").await.unwrap();
        recv_n(&mut started_rx, 1).await;

        // Handler is blocked: one message fits the buffer, the rest are dropped
        for _ in 0..4 {
            conn.publish(&cx, "slow", "more").await.unwrap();
        }

        let stats = conn.core().stats().snapshot()["slow"];
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.pending_messages, 1);
        assert!(stats.pending_bytes > 0);
        assert_eq!(stats.dropped, 3);

        gate.add_permits(10);
        recv_n(&mut started_rx, 1).await;
        let stats = conn.core().stats().snapshot()["slow"];
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.pending_messages, 0);
    }

    // =============================================================================
    // UNSUBSCRIBE / CONCURRENCY
    // =============================================================================

    #[tokio::test]
    async fn test_unsubscribe_stops_reporting() {
        let bus = InMemoryBus::new();
        let (conn, meter) = test_conn(bus.clone(), MiddlewareConfig::bare());
        let (tx, _rx) = mpsc::unbounded_channel();

        let keep = conn.subscribe("a", forwarding("keep", tx.clone())).await.unwrap();
        let gone = conn.subscribe("b", forwarding("gone", tx)).await.unwrap();
        assert_eq!(meter.collect().len(), 8);

        conn.unsubscribe(&gone).unwrap();

        assert_eq!(bus.subscription_count(), 1);
        assert_eq!(conn.core().stats().len(), 1);
        assert!(conn.core().stats().contains(keep.id()));
        let observations = meter.collect();
        assert_eq!(observations.len(), 4);
        assert!(observations.iter().all(|o| o.attribute("subject") == Some("a")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_subscribes_are_all_tracked() {
        let (conn, meter) = test_conn(InMemoryBus::new(), MiddlewareConfig::bare());

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let conn = conn.clone();
                tokio::spawn(async move {
                    let (tx, _rx) = mpsc::unbounded_channel();
                    conn.subscribe(&format!("load.{}", i % 4), forwarding("load", tx))
                        .await
                })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            assert!(result.expect("task completes").is_ok());
        }

        assert_eq!(conn.core().stats().len(), 16);
        assert_eq!(conn.core().stats().snapshot().len(), 4);
        assert_eq!(meter.collect().len(), 16);
    }

    // =============================================================================
    // PROCESS GUARD
    // =============================================================================

    /// The only test in this suite using the process-wide guard and registry.
    #[tokio::test]
    async fn test_process_wide_core_rebuilds_after_reset() {
        let first = Core::builder().build().expect("first core builds");
        assert!(PROCESS_GUARD.is_held());
        assert!(matches!(
            Core::builder().build(),
            Err(CoreError::MultipleInstances)
        ));

        PROCESS_GUARD.reset();
        let rebuilt = Core::builder()
            .build()
            .expect("core rebuilds on the process registry");

        // The rebuilt core owns the gauge callback now
        let stale = first.use_conn(InMemoryBus::new());
        let (tx, _stale_rx) = mpsc::unbounded_channel();
        stale.subscribe("guard.stale", forwarding("stale", tx)).await.unwrap();

        let conn = rebuilt.use_conn(InMemoryBus::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        conn.subscribe("guard.rebuilt", forwarding("rebuilt", tx)).await.unwrap();
        conn.publish(&Context::new(), "guard.rebuilt", "x").await.unwrap();
        recv_n(&mut rx, 1).await;

        let text = encode_metrics(&REGISTRY).unwrap();
        assert!(text.contains(r#"subscriptions_delivered_count{subject="guard.rebuilt"} 1"#));
        assert!(text.contains(
            r#"relay_published_messages_total{status="ok",subject="guard.rebuilt"} 1"#
        ));
        assert!(!text.contains(r#"subject="guard.stale""#));
    }
}
