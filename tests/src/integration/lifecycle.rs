//! # Lifecycle Scenarios
//!
//! Subscription and queue lifecycle:
//!
//! - Repeated unsubscribe is harmless and deletes the managed queue once
//! - No delivery happens after unsubscribe returns, on either queue variant
//! - An unsubscribe racing a new subscribe keeps the live managed queue
//! - A second subscribe replaces the running loop
//! - A managed engine re-provisions after its queue was released

#[cfg(test)]
mod tests {
    use super::super::support::{
        assert_quiet, collect, managed_engine, next, shared_engine, transport,
    };
    use queue_pubsub::domain::fifo_queue_attributes;
    use queue_pubsub::{
        PubSubEngine, QueueTransport, QueueVariant, SubscriptionId, TransportOperation,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_unsubscribe_twice_deletes_queue_once() {
        let transport = transport();
        let engine = managed_engine(&transport);
        let (id, _rx) = collect(&engine, "orders");
        let queue = engine.create_queue().await.expect("provision");

        engine.unsubscribe(id).await.expect("first unsubscribe");
        engine.unsubscribe(id).await.expect("second unsubscribe");

        assert_eq!(transport.calls(TransportOperation::DeleteQueue), 1);
        assert!(!transport.queue_exists(&queue));
        assert!(engine.queue_handle().await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_subscription_is_ignored() {
        let transport = transport();
        let engine = managed_engine(&transport);
        let (id, mut rx) = collect(&engine, "orders");

        engine
            .unsubscribe(SubscriptionId(9_999))
            .await
            .expect("unknown id");
        assert_eq!(engine.active_subscription(), Some(id));

        engine.publish("orders", &1).await.expect("publish");
        assert_eq!(next(&mut rx).await, json!(1));
        engine.unsubscribe(id).await.expect("unsubscribe");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_no_callbacks_after_unsubscribe_returns() {
        let transport = transport();
        let engine = Arc::new(managed_engine(&transport));
        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = delivered.clone();

        let id = engine
            .subscribe("ticks", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .expect("subscribe");

        for n in 0..20 {
            engine.publish("ticks", &n).await.expect("publish");
        }
        engine.unsubscribe(id).await.expect("unsubscribe");
        let at_stop = delivered.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), at_stop);
        assert!(engine.active_subscription().is_none());
    }

    #[tokio::test]
    async fn test_shared_queue_keeps_messages_after_unsubscribe() {
        let transport = transport();
        let queue = transport
            .create_queue("Q.fifo", &fifo_queue_attributes())
            .await
            .expect("create");
        let engine = shared_engine(&transport, &queue);
        let (id, mut rx) = collect(&engine, "orders");

        engine.unsubscribe(id).await.expect("unsubscribe");
        engine.publish("orders", &"late").await.expect("publish");

        assert_quiet(&mut rx).await;
        assert_eq!(transport.queue_len(&queue), Some(1));
        assert_eq!(transport.calls(TransportOperation::DeleteMessage), 0);
        assert_eq!(transport.calls(TransportOperation::DeleteQueue), 0);
    }

    #[tokio::test]
    async fn test_pending_unsubscribe_keeps_queue_of_new_subscription() {
        let transport = transport();
        let engine = Arc::new(managed_engine(&transport));
        let (old, _old_rx) = collect(&engine, "orders");

        let pending = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.unsubscribe(old).await })
        };
        tokio::task::yield_now().await;

        let (current, mut rx) = collect(&engine, "orders");
        for n in 1..=3 {
            engine.publish("orders", &n).await.expect("publish");
        }
        pending
            .await
            .expect("unsubscribe task")
            .expect("unsubscribe");

        for expected in 1..=3 {
            assert_eq!(next(&mut rx).await, json!(expected));
        }
        assert_eq!(engine.active_subscription(), Some(current));
        let queue = engine.queue_handle().await.expect("provisioned");
        assert!(transport.queue_exists(&queue));
        engine.unsubscribe(current).await.expect("unsubscribe");
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_trigger() {
        let transport = transport();
        let engine = managed_engine(&transport);
        let (first, mut first_rx) = collect(&engine, "orders");
        let (second, mut second_rx) = collect(&engine, "refunds");

        assert_eq!(engine.active_subscription(), Some(second));
        assert_eq!(engine.active_trigger().map(|t| t.into_inner()), Some("refunds".into()));

        engine.publish("refunds", &"r-1").await.expect("publish");
        engine.publish("orders", &"o-1").await.expect("publish");

        assert_eq!(next(&mut second_rx).await, json!("r-1"));
        assert_quiet(&mut second_rx).await;
        assert_quiet(&mut first_rx).await;

        // The stale handle leaves the replacement running
        engine.unsubscribe(first).await.expect("stale");
        assert_eq!(engine.active_subscription(), Some(second));
        engine.unsubscribe(second).await.expect("unsubscribe");
    }

    #[tokio::test]
    async fn test_managed_engine_reprovisions_after_release() {
        let transport = transport();
        let engine = managed_engine(&transport);
        assert_eq!(engine.variant(), QueueVariant::Managed);

        let (id, _rx) = collect(&engine, "orders");
        let first = engine.create_queue().await.expect("provision");
        engine.unsubscribe(id).await.expect("unsubscribe");

        let (id, mut rx) = collect(&engine, "orders");
        engine.publish("orders", &"again").await.expect("publish");
        assert_eq!(next(&mut rx).await, json!("again"));

        let second = engine.queue_handle().await.expect("provisioned");
        assert_ne!(first, second);
        assert_eq!(transport.calls(TransportOperation::CreateQueue), 2);
        engine.unsubscribe(id).await.expect("unsubscribe");
    }

    #[tokio::test]
    async fn test_dropping_engine_stops_loop() {
        let transport = transport();
        let engine = managed_engine(&transport);
        let (_id, _rx) = collect(&engine, "orders");
        engine.create_queue().await.expect("provision");
        drop(engine);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let settled = transport.calls(TransportOperation::ReceiveMessage);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.calls(TransportOperation::ReceiveMessage), settled);
    }

    #[tokio::test]
    async fn test_engine_behind_trait_object() {
        let transport = transport();
        let engine: Arc<dyn PubSubEngine> = Arc::new(managed_engine(&transport));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let id = engine
            .subscribe(
                "orders".into(),
                Arc::new(move |payload| {
                    let _ = tx.send(payload);
                }),
                Default::default(),
            )
            .await
            .expect("subscribe");
        engine
            .publish_value(&"orders".into(), json!({"via": "trait"}))
            .await
            .expect("publish");

        assert_eq!(next(&mut rx).await, json!({"via": "trait"}));
        engine.unsubscribe(id).await.expect("unsubscribe");
        engine.unsubscribe(id).await.expect("repeat");
        assert_eq!(transport.calls(TransportOperation::DeleteQueue), 1);
    }
}
