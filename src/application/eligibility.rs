use super::catalog::ProductCatalog;
use crate::domain::ports::SharedStoreBackend;
use crate::domain::product::Product;
use crate::error::{PurchaseError, Result};
use tracing::debug;

/// Decides whether a user may redeem a win-back offer.
#[derive(Clone)]
pub struct EligibilityChecker {
    catalog: ProductCatalog,
    backend: SharedStoreBackend,
}

impl EligibilityChecker {
    pub fn new(catalog: ProductCatalog, backend: SharedStoreBackend) -> Self {
        Self { catalog, backend }
    }

    /// Only structural problems are errors: an unknown product or one that is
    /// not a subscription. Not being eligible is `Ok(false)`.
    pub async fn is_win_back_offer_eligible(&self, product_id: &str, offer_id: &str) -> Result<bool> {
        let product = self
            .catalog
            .product(product_id)
            .await?
            .ok_or_else(|| PurchaseError::ProductNotFound(product_id.to_string()))?;
        self.check(&product, offer_id).await
    }

    /// Eligible when the subscription has lapsed and the backend lists the
    /// offer among the ones available to this user.
    pub async fn check(&self, product: &Product, offer_id: &str) -> Result<bool> {
        if !product.is_subscription() {
            return Err(PurchaseError::NotASubscription(product.id.clone()));
        }

        let status = self.backend.query_subscription_status(&product.id).await?;
        let eligible = status
            .as_ref()
            .is_some_and(|s| s.is_lapsed() && s.offers_win_back(offer_id));

        debug!(
            product_id = %product.id,
            offer_id,
            state = ?status.map(|s| s.state),
            eligible,
            "evaluated win-back eligibility"
        );
        Ok(eligible)
    }
}
