use crate::application::coordinator::PurchaseCoordinator;
use crate::domain::options::PurchaseOptions;
use crate::domain::product::Product;
use crate::domain::transaction::{Transaction, TransactionId};
use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// Outcome of a bridged call, as handed to the plugin-facing layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BridgeResult<T> {
    Success { value: T },
    Failure { code: String, message: String },
}

impl<T> From<Result<T>> for BridgeResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => BridgeResult::Success { value },
            Err(err) => BridgeResult::Failure {
                code: err.code().to_string(),
                message: err.to_string(),
            },
        }
    }
}

impl<T: Serialize> BridgeResult<T> {
    /// The JSON message sent across the language boundary.
    pub fn to_message(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({
                "status": "failure",
                "code": "SerializationFailed",
                "message": e.to_string(),
            })
        })
    }
}

/// Callback surface over a [`PurchaseCoordinator`].
///
/// Every operation runs on the tokio runtime and its result is delivered on
/// the coordinator's delivery context.
#[derive(Clone)]
pub struct PluginBridge {
    coordinator: Arc<PurchaseCoordinator>,
}

impl PluginBridge {
    pub fn new(coordinator: Arc<PurchaseCoordinator>) -> Self {
        Self { coordinator }
    }

    fn dispatch<T, Fut, Op, Cb>(&self, op: Op, callback: Cb)
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        Op: FnOnce(Arc<PurchaseCoordinator>) -> Fut,
        Cb: FnOnce(BridgeResult<T>) + Send + 'static,
    {
        let coordinator = self.coordinator.clone();
        let delivery = coordinator.delivery().clone();
        let fut = op(coordinator);
        tokio::spawn(async move {
            let result = BridgeResult::from(fut.await);
            if !delivery.post(move || callback(result)) {
                warn!("delivery context gone, dropping bridge result");
            }
        });
    }

    pub fn can_make_payments<Cb>(&self, callback: Cb)
    where
        Cb: FnOnce(BridgeResult<bool>) + Send + 'static,
    {
        self.dispatch(
            |c| async move { Ok(c.can_make_payments().await) },
            callback,
        );
    }

    pub fn products<Cb>(&self, identifiers: BTreeSet<String>, callback: Cb)
    where
        Cb: FnOnce(BridgeResult<Vec<Product>>) + Send + 'static,
    {
        self.dispatch(
            move |c| async move { c.products(&identifiers).await },
            callback,
        );
    }

    pub fn purchase<Cb>(&self, product_id: String, options: PurchaseOptions, callback: Cb)
    where
        Cb: FnOnce(BridgeResult<Transaction>) + Send + 'static,
    {
        self.dispatch(
            move |c| async move { c.purchase(&product_id, options).await },
            callback,
        );
    }

    pub fn transactions<Cb>(&self, callback: Cb)
    where
        Cb: FnOnce(BridgeResult<Vec<Transaction>>) + Send + 'static,
    {
        self.dispatch(|c| async move { c.transactions().await }, callback);
    }

    pub fn fetch_transaction<Cb>(&self, tx_id: TransactionId, callback: Cb)
    where
        Cb: FnOnce(BridgeResult<Option<Transaction>>) + Send + 'static,
    {
        self.dispatch(
            move |c| async move { c.fetch_transaction(tx_id).await },
            callback,
        );
    }

    pub fn finish<Cb>(&self, tx_id: TransactionId, callback: Cb)
    where
        Cb: FnOnce(BridgeResult<()>) + Send + 'static,
    {
        self.dispatch(move |c| async move { c.finish(tx_id).await }, callback);
    }

    pub fn restore_purchases<Cb>(&self, callback: Cb)
    where
        Cb: FnOnce(BridgeResult<()>) + Send + 'static,
    {
        self.dispatch(|c| async move { c.restore_purchases().await }, callback);
    }

    pub fn is_win_back_offer_eligible<Cb>(&self, product_id: String, offer_id: String, callback: Cb)
    where
        Cb: FnOnce(BridgeResult<bool>) + Send + 'static,
    {
        self.dispatch(
            move |c| async move { c.is_win_back_offer_eligible(&product_id, &offer_id).await },
            callback,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PurchaseError;
    use serde_json::json;

    #[test]
    fn test_success_message_shape() {
        let result: BridgeResult<bool> = Ok(true).into();
        assert_eq!(
            result.to_message(),
            json!({"status": "success", "value": true})
        );
    }

    #[test]
    fn test_failure_message_carries_stable_code() {
        let result: BridgeResult<()> = Err(PurchaseError::TransactionNotFound(12)).into();
        assert_eq!(
            result.to_message(),
            json!({
                "status": "failure",
                "code": "TransactionNotFound",
                "message": "transaction not found: 12",
            })
        );
    }
}
