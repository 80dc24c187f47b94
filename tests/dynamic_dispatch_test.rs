use purchase_coordinator::domain::ports::{
    SharedStoreBackend, SharedTransactionStore, StoreBackend, TransactionStore,
    TransactionStoreFactory,
};
use purchase_coordinator::domain::transaction::TransactionUpdate;
use purchase_coordinator::infrastructure::in_memory::InMemoryTransactionStore;
use purchase_coordinator::infrastructure::local_store::{LocalStoreBackend, StoreFixture};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

#[tokio::test]
async fn test_ports_as_trait_objects() {
    let backend: SharedStoreBackend = Arc::new(LocalStoreBackend::new(StoreFixture::default()));
    let store: SharedTransactionStore = Arc::new(InMemoryTransactionStore::new());

    let tx = TransactionUpdate::new(json!({
        "id": 1, "originalId": 1, "productId": "consumable", "purchaseState": "purchased"
    }))
    .parse()
    .unwrap();

    // Verify Send + Sync by spawning tasks
    let backend_handle = tokio::spawn(async move {
        let ids = BTreeSet::from(["consumable".to_string()]);
        backend.query_products(&ids).await.unwrap()
    });

    let store_handle = tokio::spawn(async move {
        store.upsert(tx).await.unwrap();
        store.get(1).await.unwrap().unwrap()
    });

    assert!(backend_handle.await.unwrap().is_empty());
    assert_eq!(store_handle.await.unwrap().id, 1);
}

#[tokio::test]
async fn test_store_factory_produces_independent_stores() {
    let factory: TransactionStoreFactory =
        Box::new(|| Arc::new(InMemoryTransactionStore::new()) as SharedTransactionStore);

    let first = factory();
    let second = factory();
    let tx = TransactionUpdate::new(json!({
        "id": 2, "originalId": 2, "productId": "lifetime", "purchaseState": "restored"
    }))
    .parse()
    .unwrap();

    let handle = tokio::spawn(async move {
        first.upsert(tx).await.unwrap();
        first.unfinished().await.unwrap().len()
    });

    assert_eq!(handle.await.unwrap(), 1);
    assert!(second.unfinished().await.unwrap().is_empty());
}
