use crate::domain::options::PurchaseOptions;
use crate::domain::ports::{BackendResult, StoreBackend, UpdateStream};
use crate::domain::product::Product;
use crate::domain::subscription::SubscriptionStatus;
use crate::domain::transaction::{PurchaseState, TransactionId, TransactionUpdate};
use crate::error::{BackendError, FailureReason};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::Read;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

/// Knobs controlling how the simulated store answers purchases.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSettings {
    #[serde(default = "default_true")]
    pub can_make_payments: bool,
    /// Purchases are held for approval and delivered as `deferred`.
    #[serde(default)]
    pub ask_to_buy: bool,
    /// Purchases are accepted, then delivered as `failed` with this reason.
    #[serde(default)]
    pub fail_purchases: Option<FailureReason>,
    /// Purchase submissions are rejected outright with this reason.
    #[serde(default)]
    pub reject_purchases: Option<FailureReason>,
    #[serde(default = "default_first_id")]
    pub first_transaction_id: TransactionId,
}

fn default_true() -> bool {
    true
}

fn default_first_id() -> TransactionId {
    1
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            can_make_payments: true,
            ask_to_buy: false,
            fail_purchases: None,
            reject_purchases: None,
            first_transaction_id: default_first_id(),
        }
    }
}

/// JSON description of a simulated store.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct StoreFixture {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub subscription_statuses: HashMap<String, SubscriptionStatus>,
    #[serde(default)]
    pub settings: SimulationSettings,
}

impl StoreFixture {
    pub fn from_reader<R: Read>(source: R) -> serde_json::Result<Self> {
        serde_json::from_reader(source)
    }
}

#[derive(Debug, Clone)]
struct DeliveredPurchase {
    id: TransactionId,
    original_id: TransactionId,
    product_id: String,
}

struct LocalState {
    products: BTreeMap<String, Product>,
    statuses: HashMap<String, SubscriptionStatus>,
    settings: SimulationSettings,
    online: bool,
    next_id: TransactionId,
    history: Vec<DeliveredPurchase>,
    deferred: HashMap<TransactionId, DeliveredPurchase>,
    acknowledged: HashSet<TransactionId>,
    submitted: Vec<String>,
    subscribers: Vec<mpsc::Sender<TransactionUpdate>>,
}

impl LocalState {
    fn ensure_online(&self) -> BackendResult<()> {
        if self.online {
            Ok(())
        } else {
            Err(BackendError::Network("store is offline".to_string()))
        }
    }

    fn allocate_id(&mut self) -> TransactionId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn original_id_for(&self, product: &Product, id: TransactionId) -> TransactionId {
        if !product.is_restorable() {
            return id;
        }
        self.history
            .iter()
            .find(|p| p.product_id == product.id)
            .map(|p| p.original_id)
            .unwrap_or(id)
    }

    fn live_subscribers(&mut self) -> Vec<mpsc::Sender<TransactionUpdate>> {
        self.subscribers.retain(|s| !s.is_closed());
        self.subscribers.clone()
    }
}

fn rejection(reason: FailureReason) -> BackendError {
    match reason {
        FailureReason::Network => BackendError::Network("simulated network failure".to_string()),
        FailureReason::UserCancelled => BackendError::UserCancelled,
        FailureReason::ItemUnavailable => {
            BackendError::ItemUnavailable("simulated unavailability".to_string())
        }
        FailureReason::Unknown => BackendError::Unknown("simulated failure".to_string()),
    }
}

async fn broadcast(subscribers: Vec<mpsc::Sender<TransactionUpdate>>, update: TransactionUpdate) {
    for subscriber in subscribers {
        // A closed subscriber has stopped listening; nothing to deliver to.
        let _ = subscriber.send(update.clone()).await;
    }
}

/// A fixture-driven [`StoreBackend`] simulating a storefront in process.
///
/// Transaction ids are allocated from a strictly increasing counter. Every
/// update is delivered to all live subscribers in submission order.
#[derive(Clone)]
pub struct LocalStoreBackend {
    state: Arc<Mutex<LocalState>>,
    buffer: usize,
}

impl LocalStoreBackend {
    pub fn new(fixture: StoreFixture) -> Self {
        let products = fixture
            .products
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        let next_id = fixture.settings.first_transaction_id.max(1);
        Self {
            state: Arc::new(Mutex::new(LocalState {
                products,
                statuses: fixture.subscription_statuses,
                settings: fixture.settings,
                online: true,
                next_id,
                history: Vec::new(),
                deferred: HashMap::new(),
                acknowledged: HashSet::new(),
                submitted: Vec::new(),
                subscribers: Vec::new(),
            })),
            buffer: 64,
        }
    }

    /// Capacity of each subscriber's update channel.
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    pub async fn set_online(&self, online: bool) {
        self.state.lock().await.online = online;
    }

    pub async fn set_settings(&self, settings: SimulationSettings) {
        self.state.lock().await.settings = settings;
    }

    pub async fn set_subscription_status(&self, product_id: &str, status: SubscriptionStatus) {
        self.state
            .lock()
            .await
            .statuses
            .insert(product_id.to_string(), status);
    }

    /// Product ids of every purchase the store accepted or rejected, in order.
    pub async fn submitted_purchases(&self) -> Vec<String> {
        self.state.lock().await.submitted.clone()
    }

    pub async fn acknowledged(&self) -> Vec<TransactionId> {
        let mut ids: Vec<_> = self.state.lock().await.acknowledged.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Pushes a raw payload to every subscriber.
    pub async fn push_update(&self, update: TransactionUpdate) {
        let subscribers = self.state.lock().await.live_subscribers();
        broadcast(subscribers, update).await;
    }

    /// Approves a purchase held by ask-to-buy, delivering it as purchased
    /// under the same transaction id.
    pub async fn approve_deferred(&self, tx_id: TransactionId) -> BackendResult<()> {
        let (subscribers, update) = {
            let mut state = self.state.lock().await;
            let purchase = state
                .deferred
                .remove(&tx_id)
                .ok_or_else(|| BackendError::Unknown(format!("no deferred transaction {tx_id}")))?;
            let update = payload(&purchase, PurchaseState::Purchased, None, None);
            state.history.push(purchase);
            (state.live_subscribers(), update)
        };
        broadcast(subscribers, update).await;
        Ok(())
    }

    /// Drops every subscriber, ending their update streams.
    pub async fn close_streams(&self) {
        self.state.lock().await.subscribers.clear();
    }
}

fn payload(
    purchase: &DeliveredPurchase,
    state: PurchaseState,
    failure: Option<FailureReason>,
    options: Option<&PurchaseOptions>,
) -> TransactionUpdate {
    let mut value = json!({
        "id": purchase.id,
        "originalId": purchase.original_id,
        "productId": purchase.product_id,
        "purchaseState": state,
        "purchaseDate": Utc::now(),
        "environment": "local",
    });
    if let Some(reason) = failure {
        value["failureReason"] = json!(reason);
    }
    if let Some(options) = options {
        value["quantity"] = json!(options.quantity);
        if let Some(token) = options.app_account_token {
            value["appAccountToken"] = json!(token);
        }
        if let Some(offer) = &options.promotional_offer {
            value["offerId"] = json!(offer.offer_id);
        }
        if let Some(offer_id) = &options.win_back_offer_id {
            value["offerId"] = json!(offer_id);
        }
    }
    TransactionUpdate::new(value)
}

#[async_trait]
impl StoreBackend for LocalStoreBackend {
    async fn can_make_payments(&self) -> bool {
        let state = self.state.lock().await;
        state.online && state.settings.can_make_payments
    }

    async fn query_products(&self, ids: &BTreeSet<String>) -> BackendResult<Vec<Product>> {
        let state = self.state.lock().await;
        state.ensure_online()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn submit_purchase(
        &self,
        product: &Product,
        options: &PurchaseOptions,
    ) -> BackendResult<()> {
        let (subscribers, update) = {
            let mut state = self.state.lock().await;
            state.ensure_online()?;
            state.submitted.push(product.id.clone());

            if !state.products.contains_key(&product.id) {
                return Err(BackendError::ItemUnavailable(product.id.clone()));
            }
            if !state.settings.can_make_payments {
                return Err(BackendError::Unknown("payments are disabled".to_string()));
            }
            if let Some(reason) = state.settings.reject_purchases {
                return Err(rejection(reason));
            }

            let id = state.allocate_id();
            let purchase = DeliveredPurchase {
                id,
                original_id: state.original_id_for(product, id),
                product_id: product.id.clone(),
            };

            let update = if state.settings.ask_to_buy {
                let update = payload(&purchase, PurchaseState::Deferred, None, Some(options));
                state.deferred.insert(id, purchase);
                update
            } else if let Some(reason) = state.settings.fail_purchases {
                payload(&purchase, PurchaseState::Failed, Some(reason), Some(options))
            } else {
                let update = payload(&purchase, PurchaseState::Purchased, None, Some(options));
                state.history.push(purchase);
                update
            };
            debug!(tx_id = id, product_id = %product.id, "local store accepted purchase");
            (state.live_subscribers(), update)
        };

        broadcast(subscribers, update).await;
        Ok(())
    }

    async fn submit_restore(&self) -> BackendResult<()> {
        let (subscribers, updates) = {
            let mut state = self.state.lock().await;
            state.ensure_online()?;

            let restorable: Vec<DeliveredPurchase> = state
                .history
                .iter()
                .filter(|p| {
                    state
                        .products
                        .get(&p.product_id)
                        .is_some_and(Product::is_restorable)
                })
                .cloned()
                .collect();

            let mut updates = Vec::with_capacity(restorable.len());
            for purchase in restorable {
                let restored = DeliveredPurchase {
                    id: state.allocate_id(),
                    original_id: purchase.original_id,
                    product_id: purchase.product_id,
                };
                updates.push(payload(&restored, PurchaseState::Restored, None, None));
            }
            (state.live_subscribers(), updates)
        };

        // The request is accepted now; redelivery happens afterwards.
        tokio::spawn(async move {
            for update in updates {
                broadcast(subscribers.clone(), update).await;
            }
        });
        Ok(())
    }

    async fn acknowledge_transaction(&self, tx_id: TransactionId) -> BackendResult<()> {
        let mut state = self.state.lock().await;
        state.ensure_online()?;
        if tx_id == 0 || tx_id >= state.next_id {
            return Err(BackendError::Unknown(format!("unknown transaction {tx_id}")));
        }
        state.acknowledged.insert(tx_id);
        Ok(())
    }

    async fn subscribe_transaction_updates(&self) -> BackendResult<UpdateStream> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.state.lock().await.subscribers.push(tx);
        Ok(rx)
    }

    async fn query_subscription_status(
        &self,
        product_id: &str,
    ) -> BackendResult<Option<SubscriptionStatus>> {
        let state = self.state.lock().await;
        state.ensure_online()?;
        Ok(state.statuses.get(product_id).cloned())
    }
}
