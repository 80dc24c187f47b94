use crate::domain::ports::TransactionStore;
use crate::domain::transaction::{Transaction, TransactionId};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    unfinished: BTreeMap<TransactionId, Transaction>,
    retired: HashSet<TransactionId>,
}

/// A thread-safe in-memory store for unfinished transactions.
///
/// Retired ids are remembered for the lifetime of the store so a redelivered
/// update can never bring a finished transaction back.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryTransactionStore {
    /// Creates a new, empty in-memory transaction store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn upsert(&self, tx: Transaction) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.retired.contains(&tx.id) {
            return Ok(false);
        }
        inner.unfinished.insert(tx.id, tx);
        Ok(true)
    }

    async fn get(&self, tx_id: TransactionId) -> Result<Option<Transaction>> {
        let inner = self.inner.read().await;
        Ok(inner.unfinished.get(&tx_id).cloned())
    }

    async fn retire(&self, tx_id: TransactionId) -> Result<Option<Transaction>> {
        let mut inner = self.inner.write().await;
        let Some(mut tx) = inner.unfinished.remove(&tx_id) else {
            return Ok(None);
        };
        inner.retired.insert(tx_id);
        tx.finished = true;
        Ok(Some(tx))
    }

    async fn unfinished(&self) -> Result<Vec<Transaction>> {
        let inner = self.inner.read().await;
        Ok(inner.unfinished.values().cloned().collect())
    }

    async fn clear(&self) -> Result<Vec<TransactionId>> {
        let mut inner = self.inner.write().await;
        let ids: Vec<TransactionId> = inner.unfinished.keys().copied().collect();
        inner.retired.extend(ids.iter().copied());
        inner.unfinished.clear();
        Ok(ids)
    }
}
