use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub enum RenewalState {
    Subscribed,
    Expired,
    InGracePeriod,
    InBillingRetryPeriod,
    Revoked,
}

/// The user's current status for one subscription product.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    pub state: RenewalState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
    /// Win-back offers the backend currently makes available to this user.
    #[serde(default)]
    pub eligible_win_back_offer_ids: Vec<String>,
}

impl SubscriptionStatus {
    /// Lapsed subscribers are the only audience for win-back offers.
    pub fn is_lapsed(&self) -> bool {
        self.state == RenewalState::Expired
    }

    pub fn offers_win_back(&self, offer_id: &str) -> bool {
        self.eligible_win_back_offer_ids
            .iter()
            .any(|id| id == offer_id)
    }
}
