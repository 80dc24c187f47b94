use super::correlation::Correlator;
use super::delivery::DeliveryContext;
use crate::domain::ports::{SharedStoreBackend, SharedTransactionStore, UpdateStream};
use crate::domain::transaction::{Transaction, TransactionUpdate};
use crate::error::{PurchaseError, Result};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Callback notified, on the delivery context, of every accepted update.
pub type UpdateObserver = Arc<dyn Fn(&Transaction) + Send + Sync>;

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    dropped: AtomicU64,
    ignored: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ListenerStats {
    /// Updates stored and correlated.
    pub accepted: u64,
    /// Malformed payloads.
    pub dropped: u64,
    /// Redeliveries of retired transactions.
    pub ignored: u64,
}

/// Subscription to backend-pushed transaction updates.
///
/// One task consumes the stream in arrival order, so store upserts and
/// correlation never race each other.
pub struct TransactionUpdateListener {
    backend: SharedStoreBackend,
    worker: Arc<Worker>,
    started: AtomicBool,
}

struct Worker {
    store: SharedTransactionStore,
    correlator: Arc<Correlator>,
    delivery: DeliveryContext,
    observers: RwLock<Vec<UpdateObserver>>,
    counters: Counters,
    running: AtomicBool,
}

impl TransactionUpdateListener {
    pub fn new(
        backend: SharedStoreBackend,
        store: SharedTransactionStore,
        correlator: Arc<Correlator>,
        delivery: DeliveryContext,
    ) -> Self {
        Self {
            backend,
            worker: Arc::new(Worker {
                store,
                correlator,
                delivery,
                observers: RwLock::new(Vec::new()),
                counters: Counters::default(),
                running: AtomicBool::new(false),
            }),
            started: AtomicBool::new(false),
        }
    }

    /// Subscribes to the backend and spawns the consumer task. The listener
    /// can be started once.
    pub async fn start(&self) -> Result<ListenerHandle> {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PurchaseError::ListenerAlreadyStarted);
        }

        let stream = match self.backend.subscribe_transaction_updates().await {
            Ok(stream) => stream,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        self.worker.running.store(true, Ordering::SeqCst);
        let worker = self.worker.clone();
        let join = tokio::spawn(worker.run(stream));
        info!("transaction listener started");

        Ok(ListenerHandle {
            join,
            worker: self.worker.clone(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.worker.running.load(Ordering::SeqCst)
    }

    pub async fn add_observer(&self, observer: UpdateObserver) {
        self.worker.observers.write().await.push(observer);
    }

    pub fn stats(&self) -> ListenerStats {
        self.worker.stats()
    }
}

impl Worker {
    async fn run(self: Arc<Self>, mut stream: UpdateStream) {
        while let Some(update) = stream.recv().await {
            self.handle(update).await;
        }

        self.running.store(false, Ordering::SeqCst);
        let failed = self
            .correlator
            .close(PurchaseError::BackendUnavailable(
                "transaction update stream closed".to_string(),
            ))
            .await;
        error!(failed, "transaction update stream closed");
    }

    async fn handle(&self, update: TransactionUpdate) {
        let tx = match update.parse() {
            Ok(tx) => tx,
            Err(e) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "dropping malformed transaction update");
                return;
            }
        };

        match self.store.upsert(tx.clone()).await {
            Ok(true) => {}
            Ok(false) => {
                self.counters.ignored.fetch_add(1, Ordering::Relaxed);
                warn!(tx_id = tx.id, "ignoring update for finished transaction");
                return;
            }
            Err(e) => {
                error!(tx_id = tx.id, error = %e, "failed to store transaction update");
                return;
            }
        }
        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
        debug!(
            tx_id = tx.id,
            product_id = %tx.product_id,
            state = ?tx.purchase_state,
            "stored transaction update"
        );

        self.correlator.observe(&tx).await;

        let observers = self.observers.read().await.clone();
        for observer in observers {
            let tx = tx.clone();
            if !self.delivery.post(move || observer(&tx)) {
                warn!("delivery context gone, dropping update notification");
            }
        }
    }

    fn stats(&self) -> ListenerStats {
        ListenerStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            ignored: self.counters.ignored.load(Ordering::Relaxed),
        }
    }
}

/// Handle to the running listener task.
pub struct ListenerHandle {
    join: JoinHandle<()>,
    worker: Arc<Worker>,
}

impl ListenerHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stops consuming updates. Requests still pending fail with
    /// `BackendUnavailable`.
    pub async fn stop(self) {
        self.join.abort();
        let _ = self.join.await;
        self.worker.running.store(false, Ordering::SeqCst);
        self.worker
            .correlator
            .close(PurchaseError::BackendUnavailable(
                "transaction listener stopped".to_string(),
            ))
            .await;
        info!("transaction listener stopped");
    }
}
