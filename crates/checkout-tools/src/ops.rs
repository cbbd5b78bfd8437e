//! Checkout Operations
//!
//! The seven tools of the binding: five checkout operations plus the
//! read-only catalog helpers agents use to discover products before
//! creating a checkout.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use checkout_core::error::{CheckoutError, Result};
use checkout_core::model::{CheckoutId, CheckoutUpdate, CompleteRequest, CreateCheckoutRequest};
use checkout_core::CheckoutService;

use crate::tool::{checkout_response, CheckoutTool, ParameterSchema, ToolCall, ToolRegistry, ToolSchema};

/// Assemble a typed request from a subset of the call's arguments
fn parse_args<T: DeserializeOwned>(call: &ToolCall, keys: &[&str]) -> Result<T> {
    let mut object = serde_json::Map::new();
    for key in keys {
        if let Some(value) = call.arguments.get(*key) {
            object.insert((*key).to_string(), value.clone());
        }
    }
    serde_json::from_value(Value::Object(object))
        .map_err(|e| CheckoutError::InvalidRequest(format!("invalid arguments: {e}")))
}

fn string_arg(call: &ToolCall, name: &str) -> Result<String> {
    call.arguments
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or_else(|| CheckoutError::InvalidRequest(format!("{name} is required")))
}

/// Register all checkout tools against a service
pub fn register_checkout_tools(registry: &mut ToolRegistry, service: Arc<CheckoutService>) {
    registry.register(CreateCheckoutTool { service: service.clone() });
    registry.register(GetCheckoutTool { service: service.clone() });
    registry.register(UpdateCheckoutTool { service: service.clone() });
    registry.register(CompleteCheckoutTool { service: service.clone() });
    registry.register(CancelCheckoutTool { service: service.clone() });
    registry.register(SearchProductsTool { service: service.clone() });
    registry.register(GetProductTool { service });
}

/// Creates a new checkout session
pub struct CreateCheckoutTool {
    service: Arc<CheckoutService>,
}

#[async_trait]
impl CheckoutTool for CreateCheckoutTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "create_checkout".into(),
            description: "Create a new checkout with line items. Each line item needs an item.id and a quantity.".into(),
            parameters: vec![
                ParameterSchema::required("line_items", "array", "Line items, each {item: {id}, quantity}"),
                ParameterSchema::optional("currency", "string", "ISO 4217 currency code (default USD)"),
                ParameterSchema::optional("buyer", "object", "Buyer contact info (email, first_name, last_name)"),
                ParameterSchema::optional("fulfillment", "object", "Fulfillment methods and destinations"),
                ParameterSchema::optional("payment", "object", "Payment instruments and selection"),
                ParameterSchema::optional("discounts", "object", "Discount codes to apply"),
                ParameterSchema::optional("ucp_meta", "object", "UCP platform profile envelope"),
            ],
            has_side_effects: true,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value> {
        let request: CreateCheckoutRequest = parse_args(
            call,
            &["line_items", "currency", "buyer", "fulfillment", "payment", "discounts"],
        )?;
        let checkout = self.service.create(request)?;
        checkout_response(&checkout)
    }
}

/// Retrieves the current state of a checkout session
pub struct GetCheckoutTool {
    service: Arc<CheckoutService>,
}

#[async_trait]
impl CheckoutTool for GetCheckoutTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_checkout".into(),
            description: "Get the current state of a checkout".into(),
            parameters: vec![
                ParameterSchema::required("id", "string", "Checkout identifier"),
                ParameterSchema::optional("ucp_meta", "object", "UCP platform profile envelope"),
            ],
            has_side_effects: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value> {
        let id = CheckoutId::from_string(string_arg(call, "id")?);
        let checkout = self.service.get(&id)?;
        checkout_response(&checkout)
    }
}

/// Updates an existing checkout session
pub struct UpdateCheckoutTool {
    service: Arc<CheckoutService>,
}

#[async_trait]
impl CheckoutTool for UpdateCheckoutTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "update_checkout".into(),
            description: "Update a checkout. Each provided section (line_items, buyer, fulfillment, payment, discounts) replaces the stored one in full.".into(),
            parameters: vec![
                ParameterSchema::required("id", "string", "Checkout identifier"),
                ParameterSchema::optional("line_items", "array", "Replacement line items"),
                ParameterSchema::optional("buyer", "object", "Replacement buyer info"),
                ParameterSchema::optional("fulfillment", "object", "Replacement fulfillment configuration"),
                ParameterSchema::optional("payment", "object", "Payment instruments and selection"),
                ParameterSchema::optional("discounts", "object", "Discount codes to apply"),
                ParameterSchema::optional("ucp_meta", "object", "UCP platform profile envelope"),
            ],
            has_side_effects: true,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value> {
        let id = CheckoutId::from_string(string_arg(call, "id")?);
        let update: CheckoutUpdate = parse_args(
            call,
            &["line_items", "buyer", "fulfillment", "payment", "discounts"],
        )?;
        let checkout = self.service.update(&id, update)?;
        checkout_response(&checkout)
    }
}

/// Finalizes the checkout and places the order
pub struct CompleteCheckoutTool {
    service: Arc<CheckoutService>,
}

#[async_trait]
impl CheckoutTool for CompleteCheckoutTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "complete_checkout".into(),
            description: "Complete the checkout and place the order. Requires an idempotency_key so retries are safe.".into(),
            parameters: vec![
                ParameterSchema::required("id", "string", "Checkout identifier"),
                ParameterSchema::required("idempotency_key", "string", "UUID for retry safety"),
                ParameterSchema::optional("payment", "object", "Payment instrument submitted by the buyer"),
                ParameterSchema::optional("ap2", "object", "AP2 checkout mandate, when negotiated"),
                ParameterSchema::optional("ucp_meta", "object", "UCP platform profile envelope"),
            ],
            has_side_effects: true,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value> {
        let id = CheckoutId::from_string(string_arg(call, "id")?);
        let request: CompleteRequest = parse_args(call, &["idempotency_key", "payment", "ap2"])?;
        let checkout = self.service.complete(&id, &request)?;
        checkout_response(&checkout)
    }
}

/// Cancels a checkout session
pub struct CancelCheckoutTool {
    service: Arc<CheckoutService>,
}

#[async_trait]
impl CheckoutTool for CancelCheckoutTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "cancel_checkout".into(),
            description: "Cancel a checkout. Allowed from any non-terminal status.".into(),
            parameters: vec![
                ParameterSchema::required("id", "string", "Checkout identifier"),
                ParameterSchema::optional("ucp_meta", "object", "UCP platform profile envelope"),
            ],
            has_side_effects: true,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value> {
        let id = CheckoutId::from_string(string_arg(call, "id")?);
        let checkout = self.service.cancel(&id)?;
        checkout_response(&checkout)
    }
}

/// Searches the product catalog
pub struct SearchProductsTool {
    service: Arc<CheckoutService>,
}

#[async_trait]
impl CheckoutTool for SearchProductsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "search_products".into(),
            description: "Search the product catalog. Use before creating a checkout to find item ids.".into(),
            parameters: vec![
                ParameterSchema::required("query", "string", "Search query"),
                ParameterSchema::optional("ucp_meta", "object", "UCP platform profile envelope"),
            ],
            has_side_effects: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value> {
        let query = string_arg(call, "query")?;
        let results = self.service.search_products(&query)?;
        Ok(serde_json::json!({
            "status": "success",
            "results": serde_json::to_value(results)?,
        }))
    }
}

/// Retrieves product details by ID
pub struct GetProductTool {
    service: Arc<CheckoutService>,
}

#[async_trait]
impl CheckoutTool for GetProductTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_product".into(),
            description: "Get details of a product by id".into(),
            parameters: vec![
                ParameterSchema::required("product_id", "string", "Product identifier"),
                ParameterSchema::optional("ucp_meta", "object", "UCP platform profile envelope"),
            ],
            has_side_effects: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value> {
        let product_id = string_arg(call, "product_id")?;
        let product = self
            .service
            .get_product(&product_id)?
            .ok_or(CheckoutError::ProductNotFound(product_id))?;
        Ok(serde_json::json!({
            "status": "success",
            "product": serde_json::to_value(product)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_core::capability::CapabilityRegistry;
    use checkout_core::{
        CheckoutStore, ExtensionPipeline, MemoryCatalog, MockPaymentProcessor, UCP_CHECKOUT_KEY,
    };
    use checkout_extensions::{Ap2Extension, DiscountExtension, MockSigner};

    fn registry_with(caps: CapabilityRegistry) -> ToolRegistry {
        let catalog = Arc::new(MemoryCatalog::with_demo_products());
        let store = CheckoutStore::new(catalog.clone(), Arc::new(MockPaymentProcessor));
        let caps = Arc::new(caps);

        let mut pipeline = ExtensionPipeline::new(caps);
        pipeline.register(Arc::new(DiscountExtension::with_demo_codes(catalog)));
        pipeline.register(Arc::new(Ap2Extension::new(Arc::new(MockSigner::default()))));

        let service = Arc::new(CheckoutService::new(store, pipeline));
        let mut registry = ToolRegistry::new();
        register_checkout_tools(&mut registry, service);
        registry
    }

    fn registry() -> ToolRegistry {
        registry_with(CapabilityRegistry::new())
    }

    fn create_call() -> ToolCall {
        ToolCall::new("create_checkout").with_argument(
            "line_items",
            serde_json::json!([{"item": {"id": "sku_mug"}, "quantity": 2}]),
        )
    }

    fn ready_call() -> ToolCall {
        create_call()
            .with_argument("buyer", serde_json::json!({"email": "buyer@example.com"}))
            .with_argument(
                "payment",
                serde_json::json!({
                    "instruments": [{"id": "pi_1", "type": "card"}],
                    "selected_instrument_id": "pi_1",
                }),
            )
    }

    #[tokio::test]
    async fn test_registry_has_all_operations() {
        let registry = registry();
        assert_eq!(registry.len(), 7);
        for name in [
            "create_checkout",
            "get_checkout",
            "update_checkout",
            "complete_checkout",
            "cancel_checkout",
            "search_products",
            "get_product",
        ] {
            assert!(registry.get(name).is_some(), "missing tool {name}");
        }
    }

    #[tokio::test]
    async fn test_create_and_get_round_trip() {
        let registry = registry();

        let created = registry.dispatch(&create_call()).await;
        assert_eq!(created["status"], "success");
        let id = created[UCP_CHECKOUT_KEY]["id"].as_str().unwrap().to_string();

        let fetched = registry
            .dispatch(&ToolCall::new("get_checkout").with_argument("id", serde_json::json!(id)))
            .await;
        assert_eq!(fetched["status"], "success");
        assert_eq!(fetched[UCP_CHECKOUT_KEY]["id"], created[UCP_CHECKOUT_KEY]["id"]);
    }

    #[tokio::test]
    async fn test_get_unknown_checkout_envelope() {
        let registry = registry();
        let response = registry
            .dispatch(&ToolCall::new("get_checkout").with_argument("id", serde_json::json!("nope")))
            .await;
        assert_eq!(response["status"], "error");
        assert_eq!(response["errors"][0]["code"], "CHECKOUT_NOT_FOUND");
        assert_eq!(response["errors"][0]["severity"], "recoverable");
    }

    #[tokio::test]
    async fn test_complete_requires_idempotency_key() {
        let registry = registry();
        let created = registry.dispatch(&ready_call()).await;
        let id = created[UCP_CHECKOUT_KEY]["id"].as_str().unwrap().to_string();

        let response = registry
            .dispatch(&ToolCall::new("complete_checkout").with_argument("id", serde_json::json!(id)))
            .await;
        assert_eq!(response["status"], "error");
        assert_eq!(response["errors"][0]["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_complete_idempotent_through_binding() {
        let registry = registry();
        let created = registry.dispatch(&ready_call()).await;
        let id = created[UCP_CHECKOUT_KEY]["id"].as_str().unwrap().to_string();

        let complete = ToolCall::new("complete_checkout")
            .with_argument("id", serde_json::json!(id))
            .with_argument("idempotency_key", serde_json::json!("key-1"));

        let first = registry.dispatch(&complete).await;
        assert_eq!(first["status"], "success");
        assert_eq!(first[UCP_CHECKOUT_KEY]["status"], "completed");

        let replay = registry.dispatch(&complete).await;
        assert_eq!(
            first[UCP_CHECKOUT_KEY]["order"]["id"],
            replay[UCP_CHECKOUT_KEY]["order"]["id"]
        );

        let other_key = ToolCall::new("complete_checkout")
            .with_argument("id", serde_json::json!(id))
            .with_argument("idempotency_key", serde_json::json!("key-2"));
        let rejected = registry.dispatch(&other_key).await;
        assert_eq!(rejected["errors"][0]["code"], "CHECKOUT_ALREADY_COMPLETED");
    }

    #[tokio::test]
    async fn test_cancel_then_complete_envelope() {
        let registry = registry();
        let created = registry.dispatch(&ready_call()).await;
        let id = created[UCP_CHECKOUT_KEY]["id"].as_str().unwrap().to_string();

        let canceled = registry
            .dispatch(&ToolCall::new("cancel_checkout").with_argument("id", serde_json::json!(&id)))
            .await;
        assert_eq!(canceled[UCP_CHECKOUT_KEY]["status"], "canceled");

        let response = registry
            .dispatch(
                &ToolCall::new("complete_checkout")
                    .with_argument("id", serde_json::json!(&id))
                    .with_argument("idempotency_key", serde_json::json!("key-1")),
            )
            .await;
        assert_eq!(response["errors"][0]["code"], "CHECKOUT_CANCELED");
    }

    #[tokio::test]
    async fn test_discounts_applied_when_negotiated() {
        let mut caps = CapabilityRegistry::new();
        caps.enable(checkout_core::Capability::new(
            checkout_core::capability::DISCOUNT_CAPABILITY,
        ));
        let registry = registry_with(caps);

        let call = create_call()
            .with_argument("discounts", serde_json::json!({"codes": ["SAVE10"]}));
        let response = registry.dispatch(&call).await;

        let applied = &response[UCP_CHECKOUT_KEY]["discounts"]["applied"];
        assert_eq!(applied[0]["code"], "SAVE10");
        // 2 mugs at 500 = 1000 subtotal, SAVE10 fully applies
        assert_eq!(applied[0]["amount"], 1000);
    }

    #[tokio::test]
    async fn test_discounts_ignored_when_not_negotiated() {
        let registry = registry();
        let call = create_call()
            .with_argument("discounts", serde_json::json!({"codes": ["SAVE10"]}));
        let response = registry.dispatch(&call).await;

        assert!(response[UCP_CHECKOUT_KEY]["discounts"]["applied"]
            .as_array()
            .is_none_or(Vec::is_empty));
    }

    #[tokio::test]
    async fn test_ap2_signature_on_responses_when_negotiated() {
        let registry = registry_with(CapabilityRegistry::with_all_capabilities());
        let response = registry.dispatch(&create_call()).await;

        let authorization = response[UCP_CHECKOUT_KEY]["ap2"]["merchant_authorization"]
            .as_str()
            .unwrap();
        assert!(authorization.contains(".."));
    }

    #[tokio::test]
    async fn test_search_and_get_product() {
        let registry = registry();

        let hits = registry
            .dispatch(&ToolCall::new("search_products").with_argument("query", serde_json::json!("espresso")))
            .await;
        assert_eq!(hits["status"], "success");
        assert_eq!(hits["results"][0]["id"], "sku_espresso_maker");

        let product = registry
            .dispatch(
                &ToolCall::new("get_product")
                    .with_argument("product_id", serde_json::json!("sku_grinder")),
            )
            .await;
        assert_eq!(product["product"]["price"], 5999);

        let missing = registry
            .dispatch(
                &ToolCall::new("get_product")
                    .with_argument("product_id", serde_json::json!("sku_nope")),
            )
            .await;
        assert_eq!(missing["errors"][0]["code"], "PRODUCT_NOT_FOUND");
    }
}
