//! # Metrics Export
//!
//! Subscription gauges and messaging counters as a Prometheus scrape sees
//! them: one series per subject, recomputed on every gather.

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use opentelemetry::Context;
    use prometheus::Registry;
    use relay_bus::{InMemoryBus, Message};
    use relay_middleware::{handler_fn, ConnContext, Core, MiddlewareConfig};
    use relay_telemetry::encode_metrics;

    fn scraped_conn(registry: &Registry) -> ConnContext<InMemoryBus> {
        Core::builder()
            .config(MiddlewareConfig::default())
            .registry(registry.clone())
            .standalone()
            .build()
            .expect("core builds")
            .use_conn(InMemoryBus::new())
    }

    async fn subscribe_forwarding(
        conn: &ConnContext<InMemoryBus>,
        subject: &str,
    ) -> (relay_bus::BusSubscription, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = conn
            .subscribe(
                subject,
                handler_fn(move |_cx, msg| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(msg);
                        Ok(())
                    }
                }),
            )
            .await
            .expect("subscribe");
        (sub, rx)
    }

    async fn drain(rx: &mut mpsc::UnboundedReceiver<Message>, n: usize) {
        for _ in 0..n {
            timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("message within timeout")
                .expect("channel open");
        }
    }

    #[tokio::test]
    async fn test_scrape_reports_subject_gauges() {
        let registry = Registry::new();
        let conn = scraped_conn(&registry);
        let (_sub, mut rx) = subscribe_forwarding(&conn, "orders.*").await;

        let cx = Context::new();
        for _ in 0..3 {
            conn.publish(&cx, "orders.created", "payload").await.unwrap();
        }
        drain(&mut rx, 3).await;

        let text = encode_metrics(&registry).unwrap();
        assert!(text.contains(r#"subscriptions_delivered_count{subject="orders.*"} 3"#));
        assert!(text.contains(r#"subscriptions_pending_count{subject="orders.*"} 0"#));
        assert!(text.contains(r#"subscriptions_dropped_count{subject="orders.*"} 0"#));
        assert!(text.contains("subscriptions_pending_bytes"));
        assert!(text.contains("(By)"));
        assert!(text.contains(
            r#"relay_published_messages_total{status="ok",subject="orders.created"} 3"#
        ));
    }

    #[tokio::test]
    async fn test_subscriptions_on_one_subject_share_a_series() {
        let registry = Registry::new();
        let conn = scraped_conn(&registry);
        let (_a, mut rx_a) = subscribe_forwarding(&conn, "prices").await;
        let (_b, mut rx_b) = subscribe_forwarding(&conn, "prices").await;

        conn.publish(&Context::new(), "prices", "42").await.unwrap();
        drain(&mut rx_a, 1).await;
        drain(&mut rx_b, 1).await;

        let text = encode_metrics(&registry).unwrap();
        let series: Vec<&str> = text
            .lines()
            .filter(|line| line.starts_with("subscriptions_delivered_count{"))
            .collect();
        assert_eq!(series, vec![r#"subscriptions_delivered_count{subject="prices"} 2"#]);
    }

    #[tokio::test]
    async fn test_unsubscribed_series_disappear() {
        let registry = Registry::new();
        let conn = scraped_conn(&registry);
        let (sub, _rx) = subscribe_forwarding(&conn, "inventory").await;

        let text = encode_metrics(&registry).unwrap();
        assert!(text.contains(r#"subscriptions_delivered_count{subject="inventory"} 0"#));

        conn.unsubscribe(&sub).unwrap();

        let text = encode_metrics(&registry).unwrap();
        assert!(!text.contains(r#"subject="inventory""#));
    }
}
