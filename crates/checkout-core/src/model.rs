//! Checkout Data Model
//!
//! The checkout aggregate and its component types. Amounts are integer minor
//! units (cents). `totals` is always derived from line items, applied
//! discounts, and fulfillment; it is never set directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique checkout identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckoutId(String);

impl CheckoutId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CheckoutId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CheckoutId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Checkout lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    Incomplete,
    ReadyForComplete,
    Completed,
    Canceled,
}

impl CheckoutStatus {
    /// Terminal statuses permit no further mutation
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckoutStatus::Completed | CheckoutStatus::Canceled)
    }
}

/// A purchasable item as resolved from the catalog
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Item {
    pub id: String,

    pub title: String,

    /// Unit price in cents
    pub price: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// A line in the checkout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LineItem {
    pub item: Item,

    /// Quantity, always >= 1 once stored
    pub quantity: u32,
}

impl LineItem {
    /// Extended price for this line
    pub fn amount(&self) -> i64 {
        self.item.price * i64::from(self.quantity)
    }
}

/// Buyer privacy consent choices.
///
/// Each flag is tri-state: absent means the buyer has not expressed a
/// choice, which is distinct from an explicit `false`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferences: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub marketing: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_of_data: Option<bool>,
}

impl Consent {
    /// Whether any flag has been explicitly provided
    pub fn has_any(&self) -> bool {
        self.analytics.is_some()
            || self.preferences.is_some()
            || self.marketing.is_some()
            || self.sale_of_data.is_some()
    }
}

/// Buyer contact profile
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Buyer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub consent: Option<Consent>,
}

/// Postal address used as a fulfillment destination
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PostalAddress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street_address: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_address: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_locality: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_region: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_country: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// A selectable fulfillment option (e.g., a shipping speed)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FulfillmentOption {
    pub id: String,

    pub title: String,

    /// Cost in cents
    pub amount: i64,
}

/// A group of fulfillment options with at most one selection
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FulfillmentOptionGroup {
    pub id: String,

    pub options: Vec<FulfillmentOption>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_option_id: Option<String>,
}

impl FulfillmentOptionGroup {
    /// The selected option, or the cheapest as the default
    pub fn effective_option(&self) -> Option<&FulfillmentOption> {
        if let Some(selected) = &self.selected_option_id {
            return self.options.iter().find(|o| &o.id == selected);
        }
        self.options.iter().min_by_key(|o| o.amount)
    }
}

/// A fulfillment method (shipping to one or more destinations)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FulfillmentMethod {
    pub id: String,

    /// Method kind, e.g. "shipping"
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_item_ids: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destinations: Vec<PostalAddress>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<FulfillmentOptionGroup>,
}

impl FulfillmentMethod {
    pub fn shipping(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: "shipping".into(),
            line_item_ids: None,
            destinations: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Cost contributed by this method to the totals
    pub fn amount(&self) -> i64 {
        self.groups
            .iter()
            .filter_map(|g| g.effective_option())
            .map(|o| o.amount)
            .sum()
    }
}

/// Fulfillment configuration for the checkout
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Fulfillment {
    #[serde(default)]
    pub methods: Vec<FulfillmentMethod>,
}

impl Fulfillment {
    /// Whether any method has a resolved destination
    pub fn has_destination(&self) -> bool {
        self.methods.iter().any(|m| !m.destinations.is_empty())
    }
}

/// A payment instrument offered to or selected by the buyer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentInstrument {
    pub id: String,

    /// Instrument kind, e.g. "card"
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_text: Option<String>,

    /// Opaque credential backing this instrument, e.g. handed over by an
    /// embedding host through the payment.credential delegation. Consumed
    /// by the payment processor at authorization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<serde_json::Value>,
}

/// Payment state on the checkout
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Payment {
    #[serde(default)]
    pub instruments: Vec<PaymentInstrument>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_instrument_id: Option<String>,
}

impl Payment {
    /// The currently selected instrument, if any
    pub fn selected(&self) -> Option<&PaymentInstrument> {
        let id = self.selected_instrument_id.as_deref()?;
        self.instruments.iter().find(|i| i.id == id)
    }
}

/// How an applied discount was distributed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationMethod {
    Each,
    Across,
}

/// Allocation of a discount to a specific target
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiscountAllocation {
    /// JSONPath to the target (e.g., `$.line_items[0]`)
    pub target: String,

    /// Amount allocated to this target in cents
    pub amount: i64,
}

/// A discount that has been applied to the checkout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppliedDiscount {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Discount code; absent for automatic discounts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    pub title: String,

    /// Total discount amount in cents
    pub amount: i64,

    /// True if applied without a code
    #[serde(default)]
    pub automatic: bool,

    /// Stacking order (lower = applied first)
    pub priority: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<AllocationMethod>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocations: Option<Vec<DiscountAllocation>>,
}

/// Discount state on the checkout
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Discounts {
    /// Submitted codes, in submission order (may include invalid entries)
    #[serde(default)]
    pub codes: Vec<String>,

    /// All active discounts, sorted by priority
    #[serde(default)]
    pub applied: Vec<AppliedDiscount>,
}

impl Discounts {
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty() && self.applied.is_empty()
    }
}

/// Kind of a derived total line
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalKind {
    Subtotal,
    Discount,
    Fulfillment,
    Total,
}

/// One derived total line
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Total {
    #[serde(rename = "type")]
    pub kind: TotalKind,

    pub display_text: String,

    /// Amount in cents
    pub amount: i64,
}

/// Message severity on the checkout
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Info,
    Warning,
    Error,
}

/// A transient message attached to the checkout.
///
/// Messages are replaced, not accumulated, on each mutation. `path` is a
/// JSONPath-like pointer to the field the message concerns.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,

    pub code: String,

    pub path: String,

    pub content: String,
}

impl CheckoutMessage {
    pub fn error(code: impl Into<String>, path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Error,
            code: code.into(),
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn warning(code: impl Into<String>, path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Warning,
            code: code.into(),
            path: path.into(),
            content: content.into(),
        }
    }
}

/// The placed order, present only after successful completion
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: String,

    pub permalink_url: String,
}

/// AP2 data attached to checkout responses when the capability is negotiated
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ap2Response {
    /// JWS Detached Content signature over the checkout, excluding `ap2`
    pub merchant_authorization: String,
}

/// AP2 data accepted on completion requests
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ap2CompleteRequest {
    /// SD-JWT+kb credential proving buyer authorization
    pub checkout_mandate: String,
}

/// The checkout aggregate
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkout {
    pub id: CheckoutId,

    pub status: CheckoutStatus,

    /// ISO 4217 currency code
    pub currency: String,

    pub line_items: Vec<LineItem>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer: Option<Buyer>,

    pub fulfillment: Fulfillment,

    pub payment: Payment,

    #[serde(default, skip_serializing_if = "Discounts::is_empty")]
    pub discounts: Discounts,

    /// Derived totals; recomputed after every mutation
    pub totals: Vec<Total>,

    /// Transient messages; replaced on each mutation
    #[serde(default)]
    pub messages: Vec<CheckoutMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ap2: Option<Ap2Response>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Checkout {
    pub fn new(currency: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: CheckoutId::new(),
            status: CheckoutStatus::Incomplete,
            currency: currency.into(),
            line_items: Vec::new(),
            buyer: None,
            fulfillment: Fulfillment::default(),
            payment: Payment::default(),
            discounts: Discounts::default(),
            totals: Vec::new(),
            messages: Vec::new(),
            order: None,
            ap2: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sum of extended line prices in cents
    pub fn subtotal(&self) -> i64 {
        self.line_items.iter().map(LineItem::amount).sum()
    }

    /// Total applied discount, clamped to the subtotal
    pub fn discount_total(&self) -> i64 {
        let applied: i64 = self.discounts.applied.iter().map(|d| d.amount).sum();
        applied.min(self.subtotal())
    }

    /// Total fulfillment cost across methods
    pub fn fulfillment_total(&self) -> i64 {
        self.fulfillment.methods.iter().map(FulfillmentMethod::amount).sum()
    }

    /// Derive the totals sequence from current state.
    ///
    /// Pure function of line items, applied discounts, and fulfillment.
    pub fn derive_totals(&self) -> Vec<Total> {
        let subtotal = self.subtotal();
        let discount = self.discount_total();
        let fulfillment = self.fulfillment_total();

        let mut totals = vec![Total {
            kind: TotalKind::Subtotal,
            display_text: "Subtotal".into(),
            amount: subtotal,
        }];

        if discount > 0 {
            totals.push(Total {
                kind: TotalKind::Discount,
                display_text: "Discount".into(),
                amount: -discount,
            });
        }

        if !self.fulfillment.methods.is_empty() {
            totals.push(Total {
                kind: TotalKind::Fulfillment,
                display_text: "Shipping".into(),
                amount: fulfillment,
            });
        }

        totals.push(Total {
            kind: TotalKind::Total,
            display_text: "Total".into(),
            amount: subtotal - discount + fulfillment,
        });

        totals
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Update the activity timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ============================================================================
// Request Types
// ============================================================================

/// Reference to a catalog item by identifier
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemRef {
    pub id: String,
}

/// Line item as submitted in requests
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LineItemInput {
    pub item: ItemRef,

    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

/// Payment fields accepted in requests
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PaymentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_instrument_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruments: Option<Vec<PaymentInstrument>>,
}

/// Discount fields accepted in requests
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DiscountsUpdate {
    #[serde(default)]
    pub codes: Vec<String>,

    /// Resolved by the discount extension; never accepted from the wire
    #[serde(skip)]
    pub applied: Vec<AppliedDiscount>,
}

/// Partial update applied to a checkout.
///
/// Each present section replaces the corresponding checkout section in full.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CheckoutUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_items: Option<Vec<LineItemInput>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer: Option<Buyer>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfillment: Option<Fulfillment>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentUpdate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub discounts: Option<DiscountsUpdate>,
}

/// Request to create a checkout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateCheckoutRequest {
    pub line_items: Vec<LineItemInput>,

    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer: Option<Buyer>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfillment: Option<Fulfillment>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentUpdate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub discounts: Option<DiscountsUpdate>,
}

fn default_currency() -> String {
    "USD".into()
}

impl CreateCheckoutRequest {
    /// Split into currency plus the update sections shared with `update`
    pub fn into_update(self) -> (String, CheckoutUpdate) {
        (
            self.currency,
            CheckoutUpdate {
                line_items: Some(self.line_items),
                buyer: self.buyer,
                fulfillment: self.fulfillment,
                payment: self.payment,
                discounts: self.discounts,
            },
        )
    }
}

/// Request to complete a checkout and place the order
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompleteRequest {
    /// Caller-supplied token for retry safety
    pub idempotency_key: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentUpdate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ap2: Option<Ap2CompleteRequest>,
}

/// Result of a read-side readiness check
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: bool,

    #[serde(default)]
    pub messages: Vec<CheckoutMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, price: i64) -> Item {
        Item {
            id: id.into(),
            title: format!("Item {id}"),
            price,
            image_url: None,
        }
    }

    #[test]
    fn test_subtotal() {
        let mut checkout = Checkout::new("USD");
        checkout.line_items.push(LineItem { item: item("a", 250), quantity: 2 });
        checkout.line_items.push(LineItem { item: item("b", 100), quantity: 1 });
        assert_eq!(checkout.subtotal(), 600);
    }

    #[test]
    fn test_discount_clamped_to_subtotal() {
        let mut checkout = Checkout::new("USD");
        checkout.line_items.push(LineItem { item: item("a", 500), quantity: 1 });
        checkout.discounts.applied.push(AppliedDiscount {
            id: None,
            code: Some("BIG".into()),
            title: "Big".into(),
            amount: 1000,
            automatic: false,
            priority: 1,
            method: None,
            allocations: None,
        });
        assert_eq!(checkout.discount_total(), 500);
        let total = checkout.derive_totals();
        let grand = total.iter().find(|t| t.kind == TotalKind::Total).unwrap();
        assert_eq!(grand.amount, 0);
    }

    #[test]
    fn test_effective_option_defaults_to_cheapest() {
        let group = FulfillmentOptionGroup {
            id: "g1".into(),
            options: vec![
                FulfillmentOption { id: "express".into(), title: "Express".into(), amount: 1500 },
                FulfillmentOption { id: "standard".into(), title: "Standard".into(), amount: 500 },
            ],
            selected_option_id: None,
        };
        assert_eq!(group.effective_option().unwrap().id, "standard");
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(CheckoutStatus::ReadyForComplete).unwrap();
        assert_eq!(json, "ready_for_complete");
    }

    #[test]
    fn test_consent_tri_state() {
        let consent = Consent { analytics: Some(false), ..Default::default() };
        assert!(consent.has_any());
        let json = serde_json::to_value(&consent).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 1);
    }
}
