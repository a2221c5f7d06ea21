//! # Delivery Scenarios
//!
//! Routing by trigger over managed and shared queues:
//!
//! 1. **Managed queue:** subscribe, publish, receive once, message deleted
//! 2. **Shared queue:** two engines on one queue never see each other's messages
//! 3. **Publish before subscribe:** the lazily provisioned queue keeps the message
//! 4. **Interleaving:** random mixes of two triggers arrive in order, without leaks

#[cfg(test)]
mod tests {
    use super::super::support::{
        assert_quiet, collect, managed_engine, next, shared_engine, transport,
    };
    use queue_pubsub::domain::fifo_queue_attributes;
    use queue_pubsub::{QueueTransport, TransportOperation};
    use rand::{Rng, SeedableRng};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[tokio::test]
    async fn test_managed_queue_delivers_once_and_deletes() {
        let transport = transport();
        let engine = managed_engine(&transport);
        let (id, mut rx) = collect(&engine, "orders");

        engine
            .publish("orders", &json!({"id": 1}))
            .await
            .expect("publish");

        assert_eq!(next(&mut rx).await, json!({"id": 1}));
        assert_quiet(&mut rx).await;

        let queue = engine.queue_handle().await.expect("provisioned");
        assert_eq!(transport.queue_len(&queue), Some(0));
        assert_eq!(transport.calls(TransportOperation::DeleteMessage), 1);

        engine.unsubscribe(id).await.expect("unsubscribe");
    }

    #[tokio::test]
    async fn test_shared_queue_routes_by_trigger() {
        let transport = transport();
        let queue = transport
            .create_queue("Q.fifo", &fifo_queue_attributes())
            .await
            .expect("create");
        let orders = shared_engine(&transport, &queue);
        let shipping = shared_engine(&transport, &queue);

        let (orders_id, mut orders_rx) = collect(&orders, "orders");
        let (shipping_id, mut shipping_rx) = collect(&shipping, "shipping");

        orders.publish("shipping", &json!({"x": 1})).await.expect("publish");

        assert_eq!(next(&mut shipping_rx).await, json!({"x": 1}));
        assert_quiet(&mut orders_rx).await;

        orders.unsubscribe(orders_id).await.expect("unsubscribe");
        shipping.unsubscribe(shipping_id).await.expect("unsubscribe");
        assert!(transport.queue_exists(&queue));
    }

    #[tokio::test]
    async fn test_message_for_unsubscribed_trigger_stays_queued() {
        let transport = transport();
        let engine = managed_engine(&transport);
        let (id, mut rx) = collect(&engine, "orders");

        engine.publish("audit", &"kept").await.expect("publish");
        engine.publish("orders", &"taken").await.expect("publish");

        assert_eq!(next(&mut rx).await, json!("taken"));
        assert_quiet(&mut rx).await;

        let queue = engine.queue_handle().await.expect("provisioned");
        assert_eq!(transport.queue_len(&queue), Some(1));
        engine.unsubscribe(id).await.expect("unsubscribe");
    }

    #[tokio::test]
    async fn test_publish_before_subscribe_is_not_lost() {
        let transport = transport();
        let engine = managed_engine(&transport);

        engine
            .publish("orders", &json!({"id": 42}))
            .await
            .expect("publish");
        assert_eq!(transport.calls(TransportOperation::CreateQueue), 1);

        let (id, mut rx) = collect(&engine, "orders");
        assert_eq!(next(&mut rx).await, json!({"id": 42}));

        // The loop reuses the queue provisioned by publish
        assert_eq!(transport.calls(TransportOperation::CreateQueue), 1);
        engine.unsubscribe(id).await.expect("unsubscribe");
    }

    #[tokio::test]
    async fn test_identical_payloads_are_not_collapsed() {
        let transport = transport();
        let engine = managed_engine(&transport);
        let (id, mut rx) = collect(&engine, "orders");

        for _ in 0..3 {
            engine.publish("orders", &json!({"same": true})).await.expect("publish");
        }

        for _ in 0..3 {
            assert_eq!(next(&mut rx).await, json!({"same": true}));
        }
        assert_quiet(&mut rx).await;
        engine.unsubscribe(id).await.expect("unsubscribe");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_random_interleaving_never_leaks_across_triggers() {
        let transport = transport();
        let queue = transport
            .create_queue("mixed.fifo", &fifo_queue_attributes())
            .await
            .expect("create");
        let alpha = shared_engine(&transport, &queue);
        let beta = shared_engine(&transport, &queue);
        let (alpha_id, mut alpha_rx) = collect(&alpha, "alpha");
        let (beta_id, mut beta_rx) = collect(&beta, "beta");

        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
        let mut expected_alpha = Vec::new();
        let mut expected_beta = Vec::new();
        for seq in 0..60u32 {
            if rng.gen_bool(0.5) {
                alpha.publish("alpha", &json!({"t": "alpha", "seq": seq})).await.expect("publish");
                expected_alpha.push(seq);
            } else {
                alpha.publish("beta", &json!({"t": "beta", "seq": seq})).await.expect("publish");
                expected_beta.push(seq);
            }
        }

        for seq in &expected_alpha {
            let payload = next(&mut alpha_rx).await;
            assert_eq!(payload["t"], "alpha");
            assert_eq!(payload["seq"], *seq);
        }
        for seq in &expected_beta {
            let payload = next(&mut beta_rx).await;
            assert_eq!(payload["t"], "beta");
            assert_eq!(payload["seq"], *seq);
        }
        assert_quiet(&mut alpha_rx).await;
        assert_quiet(&mut beta_rx).await;
        assert_eq!(transport.queue_len(&queue), Some(0));

        alpha.unsubscribe(alpha_id).await.expect("unsubscribe");
        beta.unsubscribe(beta_id).await.expect("unsubscribe");
    }

    #[tokio::test]
    async fn test_json_payloads_round_trip() {
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        struct Order {
            id: u64,
            items: Vec<String>,
            note: Option<String>,
        }

        let transport = transport();
        let engine = managed_engine(&transport);
        let (id, mut rx) = collect(&engine, "orders");

        let payloads = vec![
            json!(null),
            json!(true),
            json!(-17),
            json!(2.5),
            json!("text with \"quotes\" and ünïcode"),
            json!([1, "two", [3]]),
            json!({"nested": {"deep": [null, {}]}}),
        ];
        for payload in &payloads {
            engine.publish("orders", payload).await.expect("publish");
        }
        for payload in &payloads {
            assert_eq!(&next(&mut rx).await, payload);
        }

        let order = Order {
            id: 7,
            items: vec!["apple".to_string(), "pear".to_string()],
            note: None,
        };
        engine.publish("orders", &order).await.expect("publish");
        let decoded: Order = serde_json::from_value(next(&mut rx).await).expect("decode");
        assert_eq!(decoded, order);

        engine.unsubscribe(id).await.expect("unsubscribe");
    }
}
