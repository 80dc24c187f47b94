use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub enum ProductType {
    Consumable,
    NonConsumable,
    AutoRenewable,
    NonRenewable,
}

/// Immutable snapshot of a product as reported by the backend.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// The unique identifier of the product.
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    /// ISO 4217 currency code.
    pub currency: String,
    pub r#type: ProductType,
    /// Subscription group for auto-renewable products.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_group: Option<String>,
}

impl Product {
    pub fn is_subscription(&self) -> bool {
        self.r#type == ProductType::AutoRenewable
    }

    /// Whether a restore redelivers purchases of this product.
    pub fn is_restorable(&self) -> bool {
        matches!(
            self.r#type,
            ProductType::NonConsumable | ProductType::AutoRenewable
        )
    }
}
