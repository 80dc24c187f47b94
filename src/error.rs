use crate::domain::transaction::TransactionId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a purchase attempt failed, as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureReason {
    Network,
    UserCancelled,
    ItemUnavailable,
    #[default]
    Unknown,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Network => "network",
            FailureReason::UserCancelled => "userCancelled",
            FailureReason::ItemUnavailable => "itemUnavailable",
            FailureReason::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reported by a [`StoreBackend`](crate::domain::ports::StoreBackend).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(String),
    #[error("user cancelled the purchase")]
    UserCancelled,
    #[error("item unavailable: {0}")]
    ItemUnavailable(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend error: {0}")]
    Unknown(String),
}

impl BackendError {
    /// Maps a failed purchase submission onto the caller-facing error.
    pub fn into_purchase_error(self) -> PurchaseError {
        match self {
            BackendError::Network(_) => PurchaseError::PurchaseFailed(FailureReason::Network),
            BackendError::UserCancelled => {
                PurchaseError::PurchaseFailed(FailureReason::UserCancelled)
            }
            BackendError::ItemUnavailable(_) => {
                PurchaseError::PurchaseFailed(FailureReason::ItemUnavailable)
            }
            BackendError::Unavailable(msg) => PurchaseError::BackendUnavailable(msg),
            BackendError::Unknown(_) => PurchaseError::PurchaseFailed(FailureReason::Unknown),
        }
    }
}

/// Outside of a purchase submission every backend failure means the
/// operation could not reach the store.
impl From<BackendError> for PurchaseError {
    fn from(err: BackendError) -> Self {
        PurchaseError::BackendUnavailable(err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PurchaseError {
    #[error("product not found: {0}")]
    ProductNotFound(String),
    #[error("product is not a subscription: {0}")]
    NotASubscription(String),
    #[error("not eligible for win-back offer {offer_id} on {product_id}")]
    WinBackNotEligible {
        product_id: String,
        offer_id: String,
    },
    #[error("purchase failed: {0}")]
    PurchaseFailed(FailureReason),
    #[error("transaction not found: {0}")]
    TransactionNotFound(TransactionId),
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("malformed transaction update: {0}")]
    MalformedUpdate(String),
    #[error("invalid purchase options: {0}")]
    InvalidOptions(String),
    #[error("transaction listener already started")]
    ListenerAlreadyStarted,
    #[error("transaction listener not started")]
    ListenerNotStarted,
}

impl PurchaseError {
    /// Stable code carried across the bridge boundary.
    pub fn code(&self) -> &'static str {
        match self {
            PurchaseError::ProductNotFound(_) => "ProductNotFound",
            PurchaseError::NotASubscription(_) => "NotASubscription",
            PurchaseError::WinBackNotEligible { .. } => "WinBackNotEligible",
            PurchaseError::PurchaseFailed(_) => "PurchaseFailed",
            PurchaseError::TransactionNotFound(_) => "TransactionNotFound",
            PurchaseError::BackendUnavailable(_) => "BackendUnavailable",
            PurchaseError::MalformedUpdate(_) => "MalformedUpdate",
            PurchaseError::InvalidOptions(_) => "InvalidOptions",
            PurchaseError::ListenerAlreadyStarted => "ListenerAlreadyStarted",
            PurchaseError::ListenerNotStarted => "ListenerNotStarted",
        }
    }
}

pub type Result<T> = std::result::Result<T, PurchaseError>;
