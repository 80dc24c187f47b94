use super::catalog::ProductCatalog;
use super::correlation::Correlator;
use super::delivery::DeliveryContext;
use super::eligibility::EligibilityChecker;
use super::listener::{ListenerHandle, ListenerStats, TransactionUpdateListener, UpdateObserver};
use crate::config::CoordinatorConfig;
use crate::domain::options::PurchaseOptions;
use crate::domain::ports::{SharedStoreBackend, SharedTransactionStore};
use crate::domain::product::Product;
use crate::domain::transaction::{Transaction, TransactionId};
use crate::error::{PurchaseError, Result};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// The main entry point for purchase lifecycle coordination.
///
/// `PurchaseCoordinator` submits purchases to the backend, waits for the
/// matching transaction update delivered by the listener, and finishes
/// transactions exactly once.
pub struct PurchaseCoordinator {
    backend: SharedStoreBackend,
    store: SharedTransactionStore,
    catalog: ProductCatalog,
    eligibility: EligibilityChecker,
    correlator: Arc<Correlator>,
    listener: TransactionUpdateListener,
    delivery: DeliveryContext,
    finishing: Mutex<HashSet<TransactionId>>,
}

impl PurchaseCoordinator {
    /// Creates a new `PurchaseCoordinator`.
    ///
    /// # Arguments
    ///
    /// * `backend` - The purchasing service.
    /// * `store` - The index of unfinished transactions.
    /// * `delivery` - The context public callbacks are delivered on.
    /// * `config` - Timeouts and buffer sizes.
    pub fn new(
        backend: SharedStoreBackend,
        store: SharedTransactionStore,
        delivery: DeliveryContext,
        config: &CoordinatorConfig,
    ) -> Self {
        let catalog = ProductCatalog::new(backend.clone(), config.catalog_timeout());
        let eligibility = EligibilityChecker::new(catalog.clone(), backend.clone());
        let correlator = Arc::new(Correlator::new());
        let listener = TransactionUpdateListener::new(
            backend.clone(),
            store.clone(),
            correlator.clone(),
            delivery.clone(),
        );
        Self {
            backend,
            store,
            catalog,
            eligibility,
            correlator,
            listener,
            delivery,
            finishing: Mutex::new(HashSet::new()),
        }
    }

    /// Starts consuming backend transaction updates. Fails with
    /// `ListenerAlreadyStarted` on a second call.
    pub async fn start_listener(&self) -> Result<ListenerHandle> {
        self.listener.start().await
    }

    pub fn listener_stats(&self) -> ListenerStats {
        self.listener.stats()
    }

    pub fn delivery(&self) -> &DeliveryContext {
        &self.delivery
    }

    /// Registers a callback notified of every accepted transaction update.
    pub async fn subscribe_updates(&self, observer: UpdateObserver) {
        self.listener.add_observer(observer).await;
    }

    pub async fn can_make_payments(&self) -> bool {
        self.backend.can_make_payments().await
    }

    pub async fn products(&self, identifiers: &BTreeSet<String>) -> Result<Vec<Product>> {
        self.catalog.fetch_products(identifiers).await
    }

    /// Purchases `product_id` and waits for the backend to report the outcome.
    ///
    /// Unknown products fail before anything is submitted. A submission the
    /// backend rejects resolves immediately; otherwise the call resolves with
    /// the first `purchased` or `failed` update for this product, first seen
    /// after the request was registered, that no earlier request has claimed.
    pub async fn purchase(&self, product_id: &str, options: PurchaseOptions) -> Result<Transaction> {
        options.validate()?;
        // Fast path only; the correlator rejects registration once closed.
        if !self.listener.is_running() {
            return Err(PurchaseError::ListenerNotStarted);
        }

        let product = self
            .catalog
            .product(product_id)
            .await?
            .ok_or_else(|| PurchaseError::ProductNotFound(product_id.to_string()))?;

        if product.is_subscription()
            && let Some(offer_id) = options.win_back_offer_id.as_deref()
            && !self.eligibility.check(&product, offer_id).await?
        {
            return Err(PurchaseError::WinBackNotEligible {
                product_id: product.id.clone(),
                offer_id: offer_id.to_string(),
            });
        }

        // Registered before submitting so an update racing the
        // acknowledgement still finds its request.
        let ticket = self.correlator.register(&product.id).await?;

        if let Err(e) = self.backend.submit_purchase(&product, &options).await {
            self.correlator.withdraw(&ticket).await;
            warn!(product_id = %product.id, error = %e, "purchase submission rejected");
            return Err(e.into_purchase_error());
        }
        self.correlator.mark_awaiting(&ticket).await;
        debug!(request_id = ticket.id, product_id = %product.id, "purchase awaiting correlation");

        let result = ticket.resolution().await;
        match &result {
            Ok(tx) => info!(tx_id = tx.id, product_id = %tx.product_id, "purchase completed"),
            Err(e) => info!(product_id = %product.id, code = e.code(), "purchase failed"),
        }
        result
    }

    /// Acknowledges a transaction on the backend and retires it.
    ///
    /// Unknown, already finished, and concurrently finishing ids all fail
    /// with `TransactionNotFound`; the backend is acknowledged at most once.
    pub async fn finish(&self, tx_id: TransactionId) -> Result<()> {
        {
            let mut finishing = self.finishing.lock().await;
            if finishing.contains(&tx_id) || self.store.get(tx_id).await?.is_none() {
                return Err(PurchaseError::TransactionNotFound(tx_id));
            }
            finishing.insert(tx_id);
        }

        let outcome = self.acknowledge_and_retire(tx_id).await;
        self.finishing.lock().await.remove(&tx_id);
        outcome
    }

    async fn acknowledge_and_retire(&self, tx_id: TransactionId) -> Result<()> {
        self.backend.acknowledge_transaction(tx_id).await?;
        self.store
            .retire(tx_id)
            .await?
            .ok_or(PurchaseError::TransactionNotFound(tx_id))?;
        self.correlator.forget(tx_id).await;
        info!(tx_id, "transaction finished");
        Ok(())
    }

    /// Asks the backend to redeliver previous purchases.
    ///
    /// Resolves once the backend accepts the request. The restored
    /// transactions arrive later through the update listener.
    pub async fn restore_purchases(&self) -> Result<()> {
        self.backend.submit_restore().await?;
        info!("restore requested");
        Ok(())
    }

    /// Unfinished transactions ordered by id.
    pub async fn transactions(&self) -> Result<Vec<Transaction>> {
        self.store.unfinished().await
    }

    pub async fn fetch_transaction(&self, tx_id: TransactionId) -> Result<Option<Transaction>> {
        self.store.get(tx_id).await
    }

    pub async fn is_win_back_offer_eligible(&self, product_id: &str, offer_id: &str) -> Result<bool> {
        self.eligibility
            .is_win_back_offer_eligible(product_id, offer_id)
            .await
    }

    /// Drops every unfinished transaction without acknowledging it.
    pub async fn clear_transactions(&self) -> Result<()> {
        let cleared = self.store.clear().await?;
        for tx_id in &cleared {
            self.correlator.forget(*tx_id).await;
        }
        info!(cleared = cleared.len(), "transactions cleared");
        Ok(())
    }
}
