//! Checkout Store
//!
//! Single authority for checkout state transitions. Totals and status are
//! re-derived after every mutating call so extensions never duplicate the
//! math. Mutations to a single checkout are serialized through a per-key
//! lock; unrelated checkouts mutate concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use uuid::Uuid;

use crate::catalog::Catalog;
use crate::error::{CheckoutError, Result};
use crate::model::{
    Checkout, CheckoutId, CheckoutMessage, CheckoutStatus, CheckoutUpdate, CompleteRequest,
    LineItem, Order, Readiness,
};
use crate::payment::PaymentProcessor;

struct Entry {
    checkout: Checkout,
    /// Idempotency key that completed this checkout
    completion_key: Option<String>,
}

/// In-memory checkout store keyed by checkout identifier
pub struct CheckoutStore {
    catalog: Arc<dyn Catalog>,
    processor: Arc<dyn PaymentProcessor>,
    entries: RwLock<HashMap<CheckoutId, Arc<Mutex<Entry>>>>,
}

impl CheckoutStore {
    pub fn new(catalog: Arc<dyn Catalog>, processor: Arc<dyn PaymentProcessor>) -> Self {
        Self {
            catalog,
            processor,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    /// Create a new checkout from an initial update.
    ///
    /// Fails with `InvalidRequest` when no line items are given or an item
    /// id is unknown, and `MerchandiseUnavailable` when inventory is short.
    pub fn create(
        &self,
        currency: impl Into<String>,
        update: CheckoutUpdate,
        mut messages: Vec<CheckoutMessage>,
    ) -> Result<Checkout> {
        if update.line_items.as_ref().is_none_or(Vec::is_empty) {
            return Err(CheckoutError::InvalidRequest(
                "at least one line item is required".into(),
            ));
        }

        let mut checkout = Checkout::new(currency);
        self.apply_update(&mut checkout, update, &mut messages)?;
        self.recompute(&mut checkout, messages);

        let id = checkout.id.clone();
        let entry = Entry {
            checkout: checkout.clone(),
            completion_key: None,
        };
        self.entries
            .write()
            .unwrap()
            .insert(id.clone(), Arc::new(Mutex::new(entry)));

        tracing::info!(checkout_id = %id, status = ?checkout.status, "Checkout created");
        Ok(checkout)
    }

    /// Get a checkout by id
    pub fn get(&self, id: &CheckoutId) -> Result<Checkout> {
        let entry = self.entry(id)?;
        let guard = entry.lock().unwrap();
        Ok(guard.checkout.clone())
    }

    /// Apply a partial update. Each present section replaces the stored
    /// section in full; totals and status are re-derived afterward.
    pub fn update(
        &self,
        id: &CheckoutId,
        update: CheckoutUpdate,
        mut messages: Vec<CheckoutMessage>,
    ) -> Result<Checkout> {
        let entry = self.entry(id)?;
        let mut guard = entry.lock().unwrap();

        if guard.checkout.is_terminal() {
            return Err(CheckoutError::InvalidMutation(format!(
                "checkout {} is {:?} and cannot be modified",
                id, guard.checkout.status
            )));
        }

        // Apply on a scratch copy so a rejected update leaves no partial state
        let mut checkout = guard.checkout.clone();
        self.apply_update(&mut checkout, update, &mut messages)?;
        self.recompute(&mut checkout, messages);

        guard.checkout = checkout.clone();
        tracing::info!(checkout_id = %id, status = ?checkout.status, "Checkout updated");
        Ok(checkout)
    }

    /// Read-side readiness check; does not mutate the checkout
    pub fn validate_ready(&self, id: &CheckoutId) -> Result<Readiness> {
        let entry = self.entry(id)?;
        let guard = entry.lock().unwrap();
        Ok(readiness_of(&guard.checkout))
    }

    /// Complete the checkout and place the order.
    ///
    /// The idempotency-key check and the status transition are one critical
    /// section: replaying the same key on a completed checkout returns the
    /// stored result, a different key fails with `AlreadyCompleted`.
    pub fn complete(&self, id: &CheckoutId, request: &CompleteRequest) -> Result<Checkout> {
        if request.idempotency_key.is_empty() {
            return Err(CheckoutError::InvalidRequest(
                "idempotency_key is required".into(),
            ));
        }

        let entry = self.entry(id)?;
        let mut guard = entry.lock().unwrap();

        match guard.checkout.status {
            CheckoutStatus::Completed => {
                if guard.completion_key.as_deref() == Some(request.idempotency_key.as_str()) {
                    tracing::info!(checkout_id = %id, "Replaying completed checkout for idempotent retry");
                    return Ok(guard.checkout.clone());
                }
                return Err(CheckoutError::AlreadyCompleted);
            }
            CheckoutStatus::Canceled => return Err(CheckoutError::CheckoutCanceled),
            _ => {}
        }

        let mut checkout = guard.checkout.clone();

        // Last-moment payment selection submitted with the completion call
        if let Some(payment) = &request.payment {
            if let Some(instruments) = &payment.instruments {
                checkout.payment.instruments = instruments.clone();
            }
            if let Some(selected) = &payment.selected_instrument_id {
                if !checkout.payment.instruments.iter().any(|i| &i.id == selected) {
                    return Err(CheckoutError::InvalidRequest(format!(
                        "unknown payment instrument: {selected}"
                    )));
                }
                checkout.payment.selected_instrument_id = Some(selected.clone());
            }
        }

        let readiness = readiness_of(&checkout);
        if !readiness.ready {
            let reasons: Vec<&str> = readiness.messages.iter().map(|m| m.content.as_str()).collect();
            return Err(CheckoutError::NotReady(reasons.join("; ")));
        }

        let instrument = checkout
            .payment
            .selected()
            .ok_or_else(|| CheckoutError::NotReady("a payment instrument must be selected".into()))?
            .clone();

        let total = checkout.subtotal() - checkout.discount_total() + checkout.fulfillment_total();
        let authorization = self
            .processor
            .authorize(&instrument, total, &checkout.currency)?;
        if !authorization.approved {
            return Err(CheckoutError::PaymentDeclined(
                authorization
                    .decline_reason
                    .unwrap_or_else(|| "authorization declined".into()),
            ));
        }

        let order_id = format!("order_{}", Uuid::new_v4().simple());
        checkout.order = Some(Order {
            permalink_url: format!("https://merchant.example/orders/{order_id}"),
            id: order_id,
        });
        checkout.status = CheckoutStatus::Completed;
        checkout.totals = checkout.derive_totals();
        checkout.messages = Vec::new();
        checkout.touch();

        guard.checkout = checkout.clone();
        guard.completion_key = Some(request.idempotency_key.clone());

        tracing::info!(
            checkout_id = %id,
            order_id = %checkout.order.as_ref().map(|o| o.id.as_str()).unwrap_or_default(),
            "Checkout completed"
        );
        Ok(checkout)
    }

    /// Cancel the checkout. Allowed from any non-terminal status.
    pub fn cancel(&self, id: &CheckoutId) -> Result<Checkout> {
        let entry = self.entry(id)?;
        let mut guard = entry.lock().unwrap();

        if guard.checkout.is_terminal() {
            return Err(CheckoutError::InvalidMutation(format!(
                "checkout {} is {:?} and cannot be canceled",
                id, guard.checkout.status
            )));
        }

        guard.checkout.status = CheckoutStatus::Canceled;
        guard.checkout.totals = guard.checkout.derive_totals();
        guard.checkout.messages = Vec::new();
        guard.checkout.touch();

        tracing::info!(checkout_id = %id, "Checkout canceled");
        Ok(guard.checkout.clone())
    }

    fn entry(&self, id: &CheckoutId) -> Result<Arc<Mutex<Entry>>> {
        self.entries
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| CheckoutError::NotFound(id.to_string()))
    }

    /// Replace each provided section, resolving line items through the
    /// catalog and validating fulfillment option selections.
    fn apply_update(
        &self,
        checkout: &mut Checkout,
        update: CheckoutUpdate,
        messages: &mut Vec<CheckoutMessage>,
    ) -> Result<()> {
        if let Some(inputs) = update.line_items {
            let mut lines = Vec::new();
            for input in inputs {
                if input.quantity == 0 {
                    continue;
                }
                let item = self.catalog.resolve(&input.item.id, input.quantity)?;
                lines.push(LineItem { item, quantity: input.quantity });
            }
            if lines.is_empty() {
                return Err(CheckoutError::InvalidRequest(
                    "at least one line item is required".into(),
                ));
            }
            checkout.line_items = lines;
        }

        if let Some(buyer) = update.buyer {
            checkout.buyer = Some(buyer);
        }

        if let Some(mut fulfillment) = update.fulfillment {
            for (mi, method) in fulfillment.methods.iter_mut().enumerate() {
                for (gi, group) in method.groups.iter_mut().enumerate() {
                    let unmatched = group
                        .selected_option_id
                        .as_ref()
                        .is_some_and(|sel| !group.options.iter().any(|o| &o.id == sel));
                    if unmatched {
                        let selected = group.selected_option_id.take().unwrap_or_default();
                        messages.push(CheckoutMessage::error(
                            "fulfillment_option_unknown",
                            format!("$.fulfillment.methods[{mi}].groups[{gi}].selected_option_id"),
                            format!("'{selected}' does not match any option in group '{}'", group.id),
                        ));
                    }
                }
            }
            checkout.fulfillment = fulfillment;
        }

        if let Some(payment) = update.payment {
            if let Some(instruments) = payment.instruments {
                checkout.payment.instruments = instruments;
            }
            if let Some(selected) = payment.selected_instrument_id {
                if checkout.payment.instruments.iter().any(|i| i.id == selected) {
                    checkout.payment.selected_instrument_id = Some(selected);
                } else {
                    messages.push(CheckoutMessage::error(
                        "payment_instrument_unknown",
                        "$.payment.selected_instrument_id".to_string(),
                        format!("'{selected}' does not match any available instrument"),
                    ));
                }
            }
        }

        if let Some(discounts) = update.discounts {
            checkout.discounts.codes = discounts.codes;
            checkout.discounts.applied = discounts.applied;
        }

        Ok(())
    }

    /// Re-derive totals, status, and messages after a mutation
    fn recompute(&self, checkout: &mut Checkout, mut messages: Vec<CheckoutMessage>) {
        checkout.totals = checkout.derive_totals();

        let readiness = readiness_of(checkout);
        messages.extend(readiness.messages);
        checkout.messages = messages;

        if !checkout.is_terminal() {
            checkout.status = if readiness.ready {
                CheckoutStatus::ReadyForComplete
            } else {
                CheckoutStatus::Incomplete
            };
        }
        checkout.touch();
    }
}

/// Compute readiness for completion: buyer contact present, a fulfillment
/// destination when any shipping method exists, a payment instrument
/// selected. Each gap becomes a message pointing at the missing field.
pub fn readiness_of(checkout: &Checkout) -> Readiness {
    let mut messages = Vec::new();

    if checkout.buyer.as_ref().and_then(|b| b.email.as_ref()).is_none() {
        messages.push(CheckoutMessage::warning(
            "missing_buyer_email",
            "$.buyer.email",
            "a buyer email address is required",
        ));
    }

    let needs_destination = !checkout.fulfillment.methods.is_empty();
    if needs_destination && !checkout.fulfillment.has_destination() {
        messages.push(CheckoutMessage::warning(
            "missing_fulfillment_address",
            "$.fulfillment.methods[0].destinations",
            "a shipping destination is required",
        ));
    }

    if checkout.payment.selected().is_none() {
        messages.push(CheckoutMessage::warning(
            "missing_payment_instrument",
            "$.payment.selected_instrument_id",
            "a payment instrument must be selected",
        ));
    }

    Readiness {
        ready: messages.is_empty(),
        messages,
    }
}
