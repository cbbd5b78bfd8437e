//! Buyer Consent Extension
//!
//! Transmits buyer privacy choices (analytics, preferences, marketing,
//! sale_of_data) to the business. Incoming consent is merged field-by-field
//! into existing consent: only flags explicitly present in the update
//! overwrite, absent flags are left untouched on either side.

use checkout_core::capability::BUYER_CONSENT_CAPABILITY;
use checkout_core::error::Result;
use checkout_core::model::{Checkout, CheckoutMessage, CheckoutUpdate, Consent};
use checkout_core::pipeline::CheckoutExtension;

/// Field-level overwrite merge. Never invents values for absent fields.
pub fn merge_consent(existing: Option<&Consent>, update: &Consent) -> Consent {
    let mut merged = existing.cloned().unwrap_or_default();
    if update.analytics.is_some() {
        merged.analytics = update.analytics;
    }
    if update.preferences.is_some() {
        merged.preferences = update.preferences;
    }
    if update.marketing.is_some() {
        merged.marketing = update.marketing;
    }
    if update.sale_of_data.is_some() {
        merged.sale_of_data = update.sale_of_data;
    }
    merged
}

/// Consent merger hooked in before buyer updates are stored
pub struct ConsentExtension;

impl CheckoutExtension for ConsentExtension {
    fn capability(&self) -> &str {
        BUYER_CONSENT_CAPABILITY
    }

    fn before_mutation(
        &self,
        update: &mut CheckoutUpdate,
        current: Option<&Checkout>,
        _messages: &mut Vec<CheckoutMessage>,
    ) -> Result<()> {
        let Some(buyer) = update.buyer.as_mut() else {
            return Ok(());
        };

        let existing = current
            .and_then(|c| c.buyer.as_ref())
            .and_then(|b| b.consent.as_ref());

        let merged = match &buyer.consent {
            Some(incoming) => merge_consent(existing, incoming),
            // Buyer replaced without a consent object: carry existing forward
            None => existing.cloned().unwrap_or_default(),
        };

        buyer.consent = merged.has_any().then_some(merged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_overwrites_only_present_fields() {
        let existing = Consent {
            analytics: Some(true),
            marketing: Some(false),
            ..Default::default()
        };
        let update = Consent {
            marketing: Some(true),
            ..Default::default()
        };

        let merged = merge_consent(Some(&existing), &update);
        assert_eq!(merged.analytics, Some(true));
        assert_eq!(merged.marketing, Some(true));
        assert_eq!(merged.preferences, None);
        assert_eq!(merged.sale_of_data, None);
    }

    #[test]
    fn test_merge_with_no_existing() {
        let update = Consent {
            sale_of_data: Some(false),
            ..Default::default()
        };
        let merged = merge_consent(None, &update);
        assert_eq!(merged.sale_of_data, Some(false));
        assert_eq!(merged.analytics, None);
    }

    #[test]
    fn test_buyer_update_without_consent_preserves_existing() {
        use checkout_core::model::Buyer;

        let mut checkout = Checkout::new("USD");
        checkout.buyer = Some(Buyer {
            email: Some("old@example.com".into()),
            consent: Some(Consent {
                analytics: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        });

        let mut update = CheckoutUpdate {
            buyer: Some(Buyer {
                email: Some("new@example.com".into()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let ext = ConsentExtension;
        let mut messages = Vec::new();
        ext.before_mutation(&mut update, Some(&checkout), &mut messages)
            .unwrap();

        let buyer = update.buyer.unwrap();
        assert_eq!(buyer.consent.unwrap().analytics, Some(true));
    }

    #[test]
    fn test_no_buyer_in_update_is_noop() {
        let ext = ConsentExtension;
        let mut update = CheckoutUpdate::default();
        let mut messages = Vec::new();
        ext.before_mutation(&mut update, None, &mut messages).unwrap();
        assert!(update.buyer.is_none());
    }
}
