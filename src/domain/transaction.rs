use crate::error::{FailureReason, PurchaseError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable transaction identifier assigned by the backend.
pub type TransactionId = u64;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseState {
    Purchasing,
    Purchased,
    Failed,
    Restored,
    Deferred,
}

impl PurchaseState {
    /// Outcomes of a new purchase. `restored` is a redelivery of an earlier
    /// one and never answers a purchase request.
    pub fn resolves_purchase(&self) -> bool {
        matches!(self, PurchaseState::Purchased | PurchaseState::Failed)
    }
}

/// A purchase transaction observed on the backend update stream.
///
/// Created when the backend reports a purchase attempt, mutated by the
/// update listener as later updates arrive, and retired once finished.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub original_id: TransactionId,
    pub product_id: String,
    pub purchase_state: PurchaseState,
    #[serde(default)]
    pub finished: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_account_token: Option<Uuid>,
    /// The update payload exactly as the backend delivered it.
    #[serde(skip_deserializing)]
    pub payload: serde_json::Value,
}

impl Transaction {
    /// The error a failed transaction resolves its purchase request with.
    pub fn failure(&self) -> Option<PurchaseError> {
        (self.purchase_state == PurchaseState::Failed)
            .then(|| PurchaseError::PurchaseFailed(self.failure_reason.unwrap_or_default()))
    }
}

/// One raw payload pushed by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionUpdate {
    pub payload: serde_json::Value,
}

impl TransactionUpdate {
    pub fn new(payload: serde_json::Value) -> Self {
        Self { payload }
    }

    /// Decodes the payload into a well-formed transaction record.
    pub fn parse(&self) -> Result<Transaction> {
        let mut tx: Transaction = serde_json::from_value(self.payload.clone())
            .map_err(|e| PurchaseError::MalformedUpdate(e.to_string()))?;

        if tx.id == 0 || tx.original_id == 0 {
            return Err(PurchaseError::MalformedUpdate(
                "transaction ids must be non-zero".to_string(),
            ));
        }
        if tx.product_id.trim().is_empty() {
            return Err(PurchaseError::MalformedUpdate(
                "missing product id".to_string(),
            ));
        }

        // Finishing is local state, never taken from the wire.
        tx.finished = false;
        tx.payload = self.payload.clone();
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_parses_and_keeps_payload() {
        let payload = json!({
            "id": 7,
            "originalId": 7,
            "productId": "consumable",
            "purchaseState": "purchased",
            "purchaseDate": "2026-01-01T00:00:00Z",
            "storefront": "USA"
        });
        let tx = TransactionUpdate::new(payload.clone()).parse().unwrap();

        assert_eq!(tx.id, 7);
        assert_eq!(tx.purchase_state, PurchaseState::Purchased);
        assert!(!tx.finished);
        assert_eq!(tx.payload, payload);
        assert!(tx.failure().is_none());
    }

    #[test]
    fn test_wire_finished_flag_is_ignored() {
        let payload = json!({
            "id": 1, "originalId": 1, "productId": "p", "purchaseState": "purchased", "finished": true
        });
        assert!(!TransactionUpdate::new(payload).parse().unwrap().finished);
    }

    #[test]
    fn test_malformed_updates_rejected() {
        let cases = [
            json!({"id": "seven"}),
            json!({"id": 1, "originalId": 1, "productId": "p", "purchaseState": "refunded"}),
            json!({"id": 0, "originalId": 1, "productId": "p", "purchaseState": "purchased"}),
            json!({"id": 1, "originalId": 1, "productId": " ", "purchaseState": "purchased"}),
            json!("not an object"),
        ];
        for payload in cases {
            assert!(matches!(
                TransactionUpdate::new(payload).parse(),
                Err(PurchaseError::MalformedUpdate(_))
            ));
        }
    }

    #[test]
    fn test_failed_transaction_defaults_to_unknown_reason() {
        let payload = json!({
            "id": 3, "originalId": 3, "productId": "p", "purchaseState": "failed"
        });
        let tx = TransactionUpdate::new(payload).parse().unwrap();
        assert_eq!(
            tx.failure(),
            Some(PurchaseError::PurchaseFailed(FailureReason::Unknown))
        );
    }

    #[test]
    fn test_purchase_resolving_states() {
        assert!(PurchaseState::Purchased.resolves_purchase());
        assert!(PurchaseState::Failed.resolves_purchase());
        assert!(!PurchaseState::Restored.resolves_purchase());
        assert!(!PurchaseState::Deferred.resolves_purchase());
        assert!(!PurchaseState::Purchasing.resolves_purchase());
    }
}
