#![allow(dead_code)]

use purchase_coordinator::application::coordinator::PurchaseCoordinator;
use purchase_coordinator::application::delivery::DeliveryContext;
use purchase_coordinator::application::listener::ListenerHandle;
use purchase_coordinator::config::CoordinatorConfig;
use purchase_coordinator::infrastructure::in_memory::InMemoryTransactionStore;
use purchase_coordinator::infrastructure::local_store::{LocalStoreBackend, StoreFixture};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

pub const FIXTURE_PATH: &str = "tests/fixtures/store.json";

pub fn fixture() -> StoreFixture {
    let file = File::open(FIXTURE_PATH).expect("fixture file");
    StoreFixture::from_reader(file).expect("valid fixture")
}

pub struct TestStore {
    pub coordinator: Arc<PurchaseCoordinator>,
    pub backend: LocalStoreBackend,
    pub listener: ListenerHandle,
}

/// A coordinator over the local backend with its listener running.
pub async fn started_store(thread_name: &str) -> TestStore {
    started_store_with(fixture(), thread_name).await
}

pub async fn started_store_with(fixture: StoreFixture, thread_name: &str) -> TestStore {
    let backend = LocalStoreBackend::new(fixture);
    let coordinator = Arc::new(PurchaseCoordinator::new(
        Arc::new(backend.clone()),
        Arc::new(InMemoryTransactionStore::new()),
        DeliveryContext::new(thread_name).expect("delivery thread"),
        &CoordinatorConfig::default(),
    ));
    let listener = coordinator.start_listener().await.expect("listener starts");
    TestStore {
        coordinator,
        backend,
        listener,
    }
}

pub fn write_fixture(path: &Path, fixture: &StoreFixture) {
    let file = File::create(path).expect("create fixture");
    serde_json::to_writer(file, fixture).expect("write fixture");
}
