//! # Resilience Scenarios
//!
//! Errors surface to callers on publish, while the poll loop keeps running
//! across transient receive and delete failures.

#[cfg(test)]
mod tests {
    use super::super::support::{assert_quiet, collect, managed_engine, next, transport};
    use parking_lot::Mutex;
    use queue_pubsub::{
        PollError, ProvisionError, PublishError, SubscribeOptions, TransportOperation,
    };
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_unencodable_payload_fails_publish() {
        let transport = transport();
        let engine = managed_engine(&transport);

        // Non-string map keys have no JSON representation
        let mut payload: HashMap<(u8, u8), &str> = HashMap::new();
        payload.insert((1, 1), "a");

        let err = engine.publish("orders", &payload).await.unwrap_err();
        assert!(matches!(err, PublishError::Encoding(_)));
        assert_eq!(transport.calls(TransportOperation::CreateQueue), 0);
        assert_eq!(transport.calls(TransportOperation::SendMessage), 0);
    }

    #[tokio::test]
    async fn test_send_failure_is_not_silent() {
        let transport = transport();
        let engine = managed_engine(&transport);
        engine.create_queue().await.expect("provision");
        transport.fail_next(TransportOperation::SendMessage, "invalid credentials");

        let err = engine.publish("orders", &1).await.unwrap_err();
        assert!(err.to_string().contains("invalid credentials"));

        let queue = engine.queue_handle().await.expect("provisioned");
        assert_eq!(transport.queue_len(&queue), Some(0));
    }

    #[tokio::test]
    async fn test_provision_failure_is_reported() {
        let transport = transport();
        let engine = managed_engine(&transport);
        transport.fail_next(TransportOperation::CreateQueue, "quota exceeded");

        let err = engine.publish("orders", &1).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::Provision(ProvisionError::Create { .. })
        ));
    }

    #[tokio::test]
    async fn test_loop_survives_receive_and_delete_failures() {
        let transport = transport();
        let engine = managed_engine(&transport);
        engine.create_queue().await.expect("provision");

        let kinds = Arc::new(Mutex::new(Vec::new()));
        let seen = kinds.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let options = SubscribeOptions::default().with_error_handler(move |err: &PollError| {
            seen.lock().push(err.kind());
        });

        transport.fail_next(TransportOperation::ReceiveMessage, "blip 1");
        transport.fail_next(TransportOperation::ReceiveMessage, "blip 2");
        transport.fail_next(TransportOperation::DeleteMessage, "ack lost");
        engine.publish("orders", &json!({"id": 1})).await.expect("publish");

        let id = engine
            .subscribe_with(
                "orders",
                Arc::new(move |payload| {
                    let _ = tx.send(payload);
                }),
                options,
            )
            .expect("subscribe");

        // Delivered exactly once, after the failed acknowledgment is retried
        assert_eq!(next(&mut rx).await, json!({"id": 1}));
        assert_quiet(&mut rx).await;
        assert_eq!(kinds.lock().as_slice(), &["receive", "receive", "delete"]);

        engine.unsubscribe(id).await.expect("unsubscribe");
    }

    #[tokio::test]
    async fn test_handler_panic_does_not_stop_loop() {
        let transport = transport();
        let engine = managed_engine(&transport);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (err_tx, mut err_rx) = mpsc::unbounded_channel();

        let options = SubscribeOptions::default().with_error_handler(move |err: &PollError| {
            let _ = err_tx.send(err.kind());
        });
        let id = engine
            .subscribe_with(
                "orders",
                Arc::new(move |payload: serde_json::Value| {
                    if payload == json!("poison") {
                        panic!("cannot handle poison");
                    }
                    let _ = tx.send(payload);
                }),
                options,
            )
            .expect("subscribe");

        engine.publish("orders", &"poison").await.expect("publish");
        engine.publish("orders", &"fine").await.expect("publish");

        assert_eq!(next(&mut rx).await, json!("fine"));
        let kind = tokio::time::timeout(super::super::support::DELIVERY_WAIT, err_rx.recv())
            .await
            .expect("error reported")
            .expect("open");
        assert_eq!(kind, "handler");

        // At-most-once: the poison message was acknowledged before dispatch
        let queue = engine.queue_handle().await.expect("provisioned");
        assert_eq!(transport.queue_len(&queue), Some(0));
        engine.unsubscribe(id).await.expect("unsubscribe");
    }

    #[tokio::test]
    async fn test_failed_queue_deletion_surfaces_and_can_be_retried() {
        let transport = transport();
        let engine = managed_engine(&transport);
        let (id, _rx) = collect(&engine, "orders");
        let queue = engine.create_queue().await.expect("provision");
        transport.fail_next(TransportOperation::DeleteQueue, "access denied");

        let err = engine.unsubscribe(id).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Delete { .. }));
        assert!(transport.queue_exists(&queue));

        engine.delete_queue().await.expect("retry");
        assert!(!transport.queue_exists(&queue));
    }
}
