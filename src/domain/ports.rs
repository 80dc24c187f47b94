use super::options::PurchaseOptions;
use super::product::Product;
use super::subscription::SubscriptionStatus;
use super::transaction::{Transaction, TransactionId, TransactionUpdate};
use crate::error::{BackendError, Result};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Ordered stream of updates pushed by the backend to a single consumer.
pub type UpdateStream = mpsc::Receiver<TransactionUpdate>;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// The purchasing service the coordinator mediates.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn can_make_payments(&self) -> bool;

    /// Returns the products the backend knows among `ids`.
    async fn query_products(&self, ids: &BTreeSet<String>) -> BackendResult<Vec<Product>>;

    /// Submits a purchase intent. Acceptance only means the purchase is under
    /// way; its outcome arrives on the update stream.
    async fn submit_purchase(
        &self,
        product: &Product,
        options: &PurchaseOptions,
    ) -> BackendResult<()>;

    async fn submit_restore(&self) -> BackendResult<()>;

    async fn acknowledge_transaction(&self, tx_id: TransactionId) -> BackendResult<()>;

    async fn subscribe_transaction_updates(&self) -> BackendResult<UpdateStream>;

    async fn query_subscription_status(
        &self,
        product_id: &str,
    ) -> BackendResult<Option<SubscriptionStatus>>;
}

/// Index of unfinished transactions keyed by their durable id.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Inserts or replaces a transaction. Returns `false` without storing
    /// anything when the id has already been retired.
    async fn upsert(&self, tx: Transaction) -> Result<bool>;
    async fn get(&self, tx_id: TransactionId) -> Result<Option<Transaction>>;
    /// Marks the transaction finished and removes it from the index.
    async fn retire(&self, tx_id: TransactionId) -> Result<Option<Transaction>>;
    async fn unfinished(&self) -> Result<Vec<Transaction>>;
    /// Drops every unfinished transaction, retiring their ids. Returns the
    /// ids retired.
    async fn clear(&self) -> Result<Vec<TransactionId>>;
}

pub type SharedStoreBackend = Arc<dyn StoreBackend>;
pub type SharedTransactionStore = Arc<dyn TransactionStore>;
pub type TransactionStoreFactory = Box<dyn Fn() -> SharedTransactionStore + Send + Sync>;
