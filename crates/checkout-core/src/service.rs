//! Checkout Service
//!
//! The composition both transport bindings call: extension pre-hooks, store
//! mutation, extension post-hooks. Adapters serialize the returned checkout
//! in their own wire format; the flow through here is identical either way.

use std::sync::Arc;

use crate::catalog::{Catalog, Product};
use crate::error::Result;
use crate::model::{Checkout, CheckoutId, CompleteRequest, CheckoutUpdate, CreateCheckoutRequest, Readiness};
use crate::pipeline::ExtensionPipeline;
use crate::store::CheckoutStore;

/// Transport-agnostic checkout operations
pub struct CheckoutService {
    store: CheckoutStore,
    pipeline: ExtensionPipeline,
    catalog: Arc<dyn Catalog>,
}

impl CheckoutService {
    pub fn new(store: CheckoutStore, pipeline: ExtensionPipeline) -> Self {
        let catalog = store.catalog().clone();
        Self {
            store,
            pipeline,
            catalog,
        }
    }

    pub fn pipeline(&self) -> &ExtensionPipeline {
        &self.pipeline
    }

    /// Create a checkout
    pub fn create(&self, request: CreateCheckoutRequest) -> Result<Checkout> {
        let (currency, mut update) = request.into_update();
        let mut messages = Vec::new();
        self.pipeline.before_mutation(&mut update, None, &mut messages)?;

        let mut checkout = self.store.create(currency, update, messages)?;
        self.pipeline.after_mutation(&mut checkout)?;
        Ok(checkout)
    }

    /// Get a checkout. Response hooks run on reads too, so every response
    /// carries the same extension enrichment (e.g. the AP2 signature).
    pub fn get(&self, id: &CheckoutId) -> Result<Checkout> {
        let mut checkout = self.store.get(id)?;
        self.pipeline.after_mutation(&mut checkout)?;
        Ok(checkout)
    }

    /// Apply a partial update
    pub fn update(&self, id: &CheckoutId, mut update: CheckoutUpdate) -> Result<Checkout> {
        let current = self.store.get(id)?;
        let mut messages = Vec::new();
        self.pipeline
            .before_mutation(&mut update, Some(&current), &mut messages)?;

        let mut checkout = self.store.update(id, update, messages)?;
        self.pipeline.after_mutation(&mut checkout)?;
        Ok(checkout)
    }

    /// Read-side readiness check
    pub fn validate_ready(&self, id: &CheckoutId) -> Result<Readiness> {
        self.store.validate_ready(id)
    }

    /// Complete the checkout and place the order
    pub fn complete(&self, id: &CheckoutId, request: &CompleteRequest) -> Result<Checkout> {
        let current = self.store.get(id)?;
        self.pipeline.before_complete(request, &current)?;

        let mut checkout = self.store.complete(id, request)?;
        self.pipeline.after_mutation(&mut checkout)?;
        Ok(checkout)
    }

    /// Cancel the checkout
    pub fn cancel(&self, id: &CheckoutId) -> Result<Checkout> {
        let mut checkout = self.store.cancel(id)?;
        self.pipeline.after_mutation(&mut checkout)?;
        Ok(checkout)
    }

    /// Search the product catalog
    pub fn search_products(&self, query: &str) -> Result<Vec<Product>> {
        self.catalog.search(query)
    }

    /// Get a product by id
    pub fn get_product(&self, id: &str) -> Result<Option<Product>> {
        self.catalog.get_product(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityRegistry;
    use crate::catalog::MemoryCatalog;
    use crate::model::{ItemRef, LineItemInput};
    use crate::payment::MockPaymentProcessor;

    fn service() -> CheckoutService {
        let catalog = Arc::new(MemoryCatalog::with_demo_products());
        let store = CheckoutStore::new(catalog, Arc::new(MockPaymentProcessor));
        let pipeline = ExtensionPipeline::new(Arc::new(CapabilityRegistry::new()));
        CheckoutService::new(store, pipeline)
    }

    #[test]
    fn test_create_and_get_round_trip() {
        let service = service();
        let checkout = service
            .create(CreateCheckoutRequest {
                line_items: vec![LineItemInput {
                    item: ItemRef { id: "sku_mug".into() },
                    quantity: 2,
                }],
                currency: "USD".into(),
                buyer: None,
                fulfillment: None,
                payment: None,
                discounts: None,
            })
            .unwrap();

        let fetched = service.get(&checkout.id).unwrap();
        assert_eq!(fetched.id, checkout.id);
        assert_eq!(fetched.subtotal(), 1000);
    }

    #[test]
    fn test_search_products() {
        let service = service();
        let hits = service.search_products("mug").unwrap();
        assert_eq!(hits.len(), 1);
    }
}
