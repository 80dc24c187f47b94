use crate::error::{PurchaseError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A signed promotional offer attached to a purchase.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PromotionalOffer {
    pub offer_id: String,
    pub key_id: String,
    pub nonce: Uuid,
    /// Milliseconds since the Unix epoch at signing time.
    pub timestamp: i64,
    /// Base64 signature produced by the merchant server.
    pub signature: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOptions {
    /// Opaque token binding the purchase to an account in the caller's system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_account_token: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotional_offer: Option<PromotionalOffer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub win_back_offer_id: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

impl Default for PurchaseOptions {
    fn default() -> Self {
        Self {
            app_account_token: None,
            promotional_offer: None,
            win_back_offer_id: None,
            quantity: default_quantity(),
        }
    }
}

impl PurchaseOptions {
    pub fn with_win_back_offer(mut self, offer_id: impl Into<String>) -> Self {
        self.win_back_offer_id = Some(offer_id.into());
        self
    }

    pub fn with_promotional_offer(mut self, offer: PromotionalOffer) -> Self {
        self.promotional_offer = Some(offer);
        self
    }

    pub fn with_app_account_token(mut self, token: Uuid) -> Self {
        self.app_account_token = Some(token);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.promotional_offer.is_some() && self.win_back_offer_id.is_some() {
            return Err(PurchaseError::InvalidOptions(
                "promotional offer and win-back offer are mutually exclusive".to_string(),
            ));
        }
        if self.quantity == 0 {
            return Err(PurchaseError::InvalidOptions(
                "quantity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
