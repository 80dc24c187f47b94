use crate::domain::ports::SharedStoreBackend;
use crate::domain::product::Product;
use crate::error::{PurchaseError, Result};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

/// Product metadata lookups against the backend.
#[derive(Clone)]
pub struct ProductCatalog {
    backend: SharedStoreBackend,
    timeout: Duration,
}

impl ProductCatalog {
    pub fn new(backend: SharedStoreBackend, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Fetches the products among `identifiers` that the backend knows.
    ///
    /// Unknown identifiers are omitted rather than reported, so the result
    /// may be shorter than the request or empty. A backend failure or a query
    /// exceeding the configured timeout yields `BackendUnavailable`.
    pub async fn fetch_products(&self, identifiers: &BTreeSet<String>) -> Result<Vec<Product>> {
        if identifiers.is_empty() {
            return Ok(Vec::new());
        }

        let products = tokio::time::timeout(self.timeout, self.backend.query_products(identifiers))
            .await
            .map_err(|_| {
                PurchaseError::BackendUnavailable(format!(
                    "product query timed out after {:?}",
                    self.timeout
                ))
            })??;

        let mut seen = BTreeSet::new();
        let products: Vec<Product> = products
            .into_iter()
            .filter(|p| identifiers.contains(&p.id) && seen.insert(p.id.clone()))
            .collect();

        debug!(
            requested = identifiers.len(),
            found = products.len(),
            "fetched products"
        );
        Ok(products)
    }

    pub async fn product(&self, id: &str) -> Result<Option<Product>> {
        let ids = BTreeSet::from([id.to_string()]);
        Ok(self.fetch_products(&ids).await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::options::PurchaseOptions;
    use crate::domain::ports::{BackendResult, StoreBackend, UpdateStream};
    use crate::domain::product::ProductType;
    use crate::domain::subscription::SubscriptionStatus;
    use crate::domain::transaction::TransactionId;
    use crate::error::BackendError;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    /// Returns a fixed product list regardless of the query, or hangs.
    struct CannedBackend {
        products: Vec<Product>,
        hang: bool,
    }

    #[async_trait]
    impl StoreBackend for CannedBackend {
        async fn can_make_payments(&self) -> bool {
            true
        }

        async fn query_products(&self, _ids: &BTreeSet<String>) -> BackendResult<Vec<Product>> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok(self.products.clone())
        }

        async fn submit_purchase(&self, _: &Product, _: &PurchaseOptions) -> BackendResult<()> {
            Err(BackendError::Unknown("unused".into()))
        }

        async fn submit_restore(&self) -> BackendResult<()> {
            Ok(())
        }

        async fn acknowledge_transaction(&self, _: TransactionId) -> BackendResult<()> {
            Ok(())
        }

        async fn subscribe_transaction_updates(&self) -> BackendResult<UpdateStream> {
            Err(BackendError::Unavailable("unused".into()))
        }

        async fn query_subscription_status(
            &self,
            _: &str,
        ) -> BackendResult<Option<SubscriptionStatus>> {
            Ok(None)
        }
    }

    fn product(id: &str) -> Product {
        Product {
            id: id.into(),
            display_name: id.into(),
            description: String::new(),
            price: dec!(1.0),
            currency: "USD".into(),
            r#type: ProductType::Consumable,
            subscription_group: None,
        }
    }

    #[tokio::test]
    async fn test_unrequested_and_duplicate_products_dropped() {
        let backend = CannedBackend {
            products: vec![product("a"), product("a"), product("extra")],
            hang: false,
        };
        let catalog = ProductCatalog::new(Arc::new(backend), Duration::from_secs(1));
        let ids = BTreeSet::from(["a".to_string(), "b".to_string()]);

        let products = catalog.fetch_products(&ids).await.unwrap();
        assert_eq!(products, vec![product("a")]);
    }

    #[tokio::test]
    async fn test_empty_request_skips_backend() {
        let backend = CannedBackend {
            products: vec![],
            hang: true,
        };
        let catalog = ProductCatalog::new(Arc::new(backend), Duration::from_secs(1));
        assert!(catalog.fetch_products(&BTreeSet::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let backend = CannedBackend {
            products: vec![],
            hang: true,
        };
        let catalog = ProductCatalog::new(Arc::new(backend), Duration::from_millis(50));
        let result = catalog.product("a").await;
        assert!(matches!(result, Err(PurchaseError::BackendUnavailable(_))));
    }
}
