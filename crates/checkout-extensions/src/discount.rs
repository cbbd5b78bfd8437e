//! Discount Extension
//!
//! Resolves submitted discount codes against the merchant's code table and
//! injects automatic discounts. Runs before the store mutation so the
//! applied list is part of what gets stored; rejected codes become messages
//! pointing at the offending entry.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use checkout_core::capability::DISCOUNT_CAPABILITY;
use checkout_core::catalog::Catalog;
use checkout_core::error::Result;
use checkout_core::model::{
    AppliedDiscount, Checkout, CheckoutMessage, CheckoutUpdate, DiscountsUpdate,
};
use checkout_core::pipeline::CheckoutExtension;

/// Rejection code for unknown discount codes
pub const DISCOUNT_CODE_INVALID: &str = "discount_code_invalid";

/// Rejection code for expired discount codes
pub const DISCOUNT_CODE_EXPIRED: &str = "discount_code_expired";

/// Rejection code for a code submitted more than once
pub const DISCOUNT_CODE_ALREADY_APPLIED: &str = "discount_code_already_applied";

/// Priority automatic discounts default to (apply last)
pub const AUTOMATIC_PRIORITY: i32 = 99;

/// A discount rule in the merchant's code table
#[derive(Clone, Debug)]
pub struct DiscountRule {
    pub title: String,

    /// Fixed amount off in cents (ignored when `percent` is set)
    pub amount: i64,

    /// Percentage off the subtotal
    pub percent: Option<u32>,

    /// Stacking order (lower = applied first)
    pub priority: i32,

    pub expired: bool,
}

impl DiscountRule {
    pub fn fixed(title: impl Into<String>, amount: i64) -> Self {
        Self {
            title: title.into(),
            amount,
            percent: None,
            priority: 1,
            expired: false,
        }
    }

    pub fn percent(title: impl Into<String>, percent: u32) -> Self {
        Self {
            title: title.into(),
            amount: 0,
            percent: Some(percent),
            priority: 1,
            expired: false,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn expired(mut self) -> Self {
        self.expired = true;
        self
    }

    /// Discount amount for a given subtotal, clamped to the subtotal
    fn amount_for(&self, subtotal: i64) -> i64 {
        let raw = match self.percent {
            Some(percent) => {
                let exact = Decimal::from(subtotal) * Decimal::from(percent) / Decimal::from(100);
                exact.round().to_i64().unwrap_or(0)
            }
            None => self.amount,
        };
        raw.min(subtotal)
    }
}

/// Discount engine: code table plus business-side automatic discounts
pub struct DiscountExtension {
    catalog: Arc<dyn Catalog>,
    codes: HashMap<String, DiscountRule>,
    automatic: Vec<(String, i64)>,
}

impl DiscountExtension {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            catalog,
            codes: HashMap::new(),
            automatic: Vec::new(),
        }
    }

    /// Extension seeded with demo codes
    pub fn with_demo_codes(catalog: Arc<dyn Catalog>) -> Self {
        let mut ext = Self::new(catalog);
        ext.add_code("SAVE10", DiscountRule::fixed("$10 Off Your Order", 1000));
        ext.add_code("SAVE20", DiscountRule::fixed("$20 Off Your Order", 2000));
        ext.add_code("PERCENT10", DiscountRule::percent("10% Off", 10));
        ext.add_code("WELCOME", DiscountRule::fixed("Welcome Discount", 500).with_priority(2));
        ext.add_code("EXPIRED", DiscountRule::fixed("Expired Code", 1000).expired());
        ext
    }

    /// Register a code. Codes are case-insensitive.
    pub fn add_code(&mut self, code: impl Into<String>, rule: DiscountRule) {
        self.codes.insert(code.into().to_uppercase(), rule);
    }

    /// Register an automatic discount applied to every checkout
    pub fn add_automatic(&mut self, title: impl Into<String>, amount: i64) {
        self.automatic.push((title.into(), amount));
    }

    /// Subtotal of the checkout as the update will leave it. When the update
    /// replaces line items, prices are resolved through the catalog;
    /// otherwise the current subtotal applies.
    fn prospective_subtotal(&self, update: &CheckoutUpdate, current: Option<&Checkout>) -> i64 {
        if let Some(inputs) = &update.line_items {
            let mut subtotal = 0i64;
            for input in inputs {
                if let Ok(Some(product)) = self.catalog.get_product(&input.item.id) {
                    subtotal += product.price * i64::from(input.quantity);
                }
            }
            return subtotal;
        }
        current.map_or(0, Checkout::subtotal)
    }

    fn resolve(
        &self,
        codes: &[String],
        subtotal: i64,
        messages: &mut Vec<CheckoutMessage>,
    ) -> Vec<AppliedDiscount> {
        let mut applied: Vec<AppliedDiscount> = Vec::new();

        for (index, code) in codes.iter().enumerate() {
            let key = code.to_uppercase();
            let path = format!("$.discounts.codes[{index}]");

            if applied.iter().any(|a| a.code.as_deref() == Some(key.as_str())) {
                messages.push(CheckoutMessage::warning(
                    DISCOUNT_CODE_ALREADY_APPLIED,
                    path,
                    format!("Code '{code}' has already been applied"),
                ));
                continue;
            }

            let Some(rule) = self.codes.get(&key) else {
                messages.push(CheckoutMessage::warning(
                    DISCOUNT_CODE_INVALID,
                    path,
                    format!("Code '{code}' is not valid"),
                ));
                continue;
            };

            if rule.expired {
                messages.push(CheckoutMessage::warning(
                    DISCOUNT_CODE_EXPIRED,
                    path,
                    format!("Code '{code}' has expired"),
                ));
                continue;
            }

            applied.push(AppliedDiscount {
                id: None,
                code: Some(key),
                title: rule.title.clone(),
                amount: rule.amount_for(subtotal),
                automatic: false,
                priority: rule.priority,
                method: None,
                allocations: None,
            });
        }

        for (title, amount) in &self.automatic {
            applied.push(AppliedDiscount {
                id: None,
                code: None,
                title: title.clone(),
                amount: (*amount).min(subtotal),
                automatic: true,
                priority: AUTOMATIC_PRIORITY,
                method: None,
                allocations: None,
            });
        }

        applied.sort_by_key(|a| a.priority);
        applied
    }
}

impl CheckoutExtension for DiscountExtension {
    fn capability(&self) -> &str {
        DISCOUNT_CAPABILITY
    }

    fn before_mutation(
        &self,
        update: &mut CheckoutUpdate,
        current: Option<&Checkout>,
        messages: &mut Vec<CheckoutMessage>,
    ) -> Result<()> {
        // Re-resolve on every mutation: line-item changes move the subtotal
        // the clamp is computed against.
        let codes = match &update.discounts {
            Some(discounts) => discounts.codes.clone(),
            None => current.map(|c| c.discounts.codes.clone()).unwrap_or_default(),
        };

        if codes.is_empty() && self.automatic.is_empty() {
            return Ok(());
        }

        let subtotal = self.prospective_subtotal(update, current);
        let applied = self.resolve(&codes, subtotal, messages);

        tracing::debug!(
            submitted = codes.len(),
            applied = applied.len(),
            subtotal,
            "Resolved discount codes"
        );

        update.discounts = Some(DiscountsUpdate { codes, applied });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_core::catalog::{MemoryCatalog, Product};
    use checkout_core::model::{ItemRef, LineItemInput};

    fn catalog() -> Arc<dyn Catalog> {
        let mut catalog = MemoryCatalog::new();
        catalog.add(Product {
            id: "sku_cheap".into(),
            title: "Cheap Thing".into(),
            description: String::new(),
            price: 500,
            image_url: None,
            available: 10,
        });
        Arc::new(catalog)
    }

    fn update_with(codes: &[&str]) -> CheckoutUpdate {
        CheckoutUpdate {
            line_items: Some(vec![LineItemInput {
                item: ItemRef { id: "sku_cheap".into() },
                quantity: 1,
            }]),
            discounts: Some(DiscountsUpdate {
                codes: codes.iter().map(|c| (*c).to_string()).collect(),
                applied: Vec::new(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_fixed_discount_clamped_to_subtotal() {
        let ext = DiscountExtension::with_demo_codes(catalog());
        let mut update = update_with(&["SAVE10"]);
        let mut messages = Vec::new();

        ext.before_mutation(&mut update, None, &mut messages).unwrap();

        let applied = &update.discounts.unwrap().applied;
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].amount, 500); // clamped, not 1000
        assert!(messages.is_empty());
    }

    #[test]
    fn test_unknown_code_becomes_message() {
        let ext = DiscountExtension::with_demo_codes(catalog());
        let mut update = update_with(&["NOPE"]);
        let mut messages = Vec::new();

        ext.before_mutation(&mut update, None, &mut messages).unwrap();

        assert!(update.discounts.unwrap().applied.is_empty());
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].code, DISCOUNT_CODE_INVALID);
        assert_eq!(messages[0].path, "$.discounts.codes[0]");
    }

    #[test]
    fn test_expired_code_becomes_message() {
        let ext = DiscountExtension::with_demo_codes(catalog());
        let mut update = update_with(&["EXPIRED"]);
        let mut messages = Vec::new();

        ext.before_mutation(&mut update, None, &mut messages).unwrap();

        assert_eq!(messages[0].code, DISCOUNT_CODE_EXPIRED);
    }

    #[test]
    fn test_duplicate_code_reported_once() {
        let ext = DiscountExtension::with_demo_codes(catalog());
        let mut update = update_with(&["WELCOME", "welcome"]);
        let mut messages = Vec::new();

        ext.before_mutation(&mut update, None, &mut messages).unwrap();

        let discounts = update.discounts.unwrap();
        assert_eq!(discounts.applied.len(), 1);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].code, DISCOUNT_CODE_ALREADY_APPLIED);
        // submission order preserved, duplicates and all
        assert_eq!(discounts.codes, vec!["WELCOME", "welcome"]);
    }

    #[test]
    fn test_percent_discount_rounds_to_cents() {
        let ext = DiscountExtension::with_demo_codes(catalog());
        let mut update = update_with(&["PERCENT10"]);
        let mut messages = Vec::new();

        ext.before_mutation(&mut update, None, &mut messages).unwrap();

        // 10% of 500 cents
        assert_eq!(update.discounts.unwrap().applied[0].amount, 50);
    }

    #[test]
    fn test_automatic_discount_applies_last() {
        let mut ext = DiscountExtension::with_demo_codes(catalog());
        ext.add_automatic("Loyalty Reward", 100);
        let mut update = update_with(&["SAVE10"]);
        let mut messages = Vec::new();

        ext.before_mutation(&mut update, None, &mut messages).unwrap();

        let applied = update.discounts.unwrap().applied;
        assert_eq!(applied.len(), 2);
        assert!(!applied[0].automatic);
        assert!(applied[1].automatic);
        assert_eq!(applied[1].priority, AUTOMATIC_PRIORITY);
    }
}
