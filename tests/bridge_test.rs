mod common;

use common::started_store;
use purchase_coordinator::domain::options::PurchaseOptions;
use purchase_coordinator::domain::transaction::Transaction;
use purchase_coordinator::interfaces::bridge::{BridgeResult, PluginBridge};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

fn thread_name() -> Option<String> {
    std::thread::current().name().map(str::to_string)
}

#[tokio::test]
async fn test_results_are_delivered_on_delivery_thread() {
    let store = started_store("bridge-delivery").await;
    let bridge = PluginBridge::new(store.coordinator.clone());

    let (tx, rx) = oneshot::channel();
    bridge.purchase(
        "consumable".to_string(),
        PurchaseOptions::default(),
        move |result: BridgeResult<Transaction>| {
            let _ = tx.send((result, thread_name()));
        },
    );

    let (result, thread) = rx.await.unwrap();
    assert_eq!(thread.as_deref(), Some("bridge-delivery"));
    match result {
        BridgeResult::Success { value } => assert_eq!(value.product_id, "consumable"),
        BridgeResult::Failure { code, .. } => panic!("unexpected failure {code}"),
    }
}

#[tokio::test]
async fn test_failures_carry_stable_codes() {
    let store = started_store("bridge-codes").await;
    let bridge = PluginBridge::new(store.coordinator.clone());

    let (tx, rx) = oneshot::channel();
    bridge.purchase(
        "invalid_product".to_string(),
        PurchaseOptions::default(),
        move |result| {
            let _ = tx.send(result.to_message());
        },
    );
    let message = rx.await.unwrap();
    assert_eq!(message["status"], "failure");
    assert_eq!(message["code"], "ProductNotFound");

    let (tx, rx) = oneshot::channel();
    bridge.finish(42, move |result| {
        let _ = tx.send(result.to_message());
    });
    assert_eq!(rx.await.unwrap()["code"], "TransactionNotFound");
}

#[tokio::test]
async fn test_query_operations_through_bridge() {
    let store = started_store("bridge-queries").await;
    let bridge = PluginBridge::new(store.coordinator.clone());

    let (tx, rx) = oneshot::channel();
    bridge.can_make_payments(move |result| {
        let _ = tx.send(result.to_message());
    });
    assert_eq!(rx.await.unwrap(), json!({"status": "success", "value": true}));

    let (tx, rx) = oneshot::channel();
    bridge.products(
        BTreeSet::from(["lifetime".to_string(), "missing".to_string()]),
        move |result| {
            let _ = tx.send(result);
        },
    );
    match rx.await.unwrap() {
        BridgeResult::Success { value } => {
            assert_eq!(value.len(), 1);
            assert_eq!(value[0].id, "lifetime");
        }
        other => panic!("unexpected {other:?}"),
    }

    let (tx, rx) = oneshot::channel();
    bridge.is_win_back_offer_eligible(
        "subscription_silver".to_string(),
        "winback_silver".to_string(),
        move |result| {
            let _ = tx.send(result);
        },
    );
    assert_eq!(rx.await.unwrap(), BridgeResult::Success { value: true });

    let (tx, rx) = oneshot::channel();
    bridge.fetch_transaction(7, move |result| {
        let _ = tx.send(result.to_message());
    });
    assert_eq!(rx.await.unwrap(), json!({"status": "success", "value": null}));

    let (tx, rx) = oneshot::channel();
    bridge.restore_purchases(move |result| {
        let _ = tx.send(result.to_message());
    });
    assert_eq!(rx.await.unwrap()["status"], "success");

    let (tx, rx) = oneshot::channel();
    bridge.transactions(move |result| {
        let _ = tx.send(result);
    });
    assert_eq!(rx.await.unwrap(), BridgeResult::Success { value: vec![] });
}

#[tokio::test]
async fn test_update_observers_and_results_share_one_thread() {
    let store = started_store("bridge-observers").await;
    let (events, mut received) = mpsc::unbounded_channel();

    let observer_events = events.clone();
    store
        .coordinator
        .subscribe_updates(Arc::new(move |tx: &Transaction| {
            let _ = observer_events.send(("update", tx.id, thread_name()));
        }))
        .await;

    let bridge = PluginBridge::new(store.coordinator.clone());
    bridge.purchase(
        "lifetime".to_string(),
        PurchaseOptions::default(),
        move |result: BridgeResult<Transaction>| {
            if let BridgeResult::Success { value } = result {
                let _ = events.send(("result", value.id, thread_name()));
            }
        },
    );

    let first = received.recv().await.unwrap();
    let second = received.recv().await.unwrap();
    for (_, _, thread) in [&first, &second] {
        assert_eq!(thread.as_deref(), Some("bridge-observers"));
    }
    assert_eq!(first.1, second.1);
    let kinds: BTreeSet<_> = [first.0, second.0].into_iter().collect();
    assert_eq!(kinds, BTreeSet::from(["result", "update"]));
}
