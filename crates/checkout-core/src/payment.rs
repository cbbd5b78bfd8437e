//! Payment Processing
//!
//! Interface to the payment authorization network. The engine never talks to
//! a real network; completion calls through this trait.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::model::PaymentInstrument;

/// Outcome of a payment authorization attempt
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentAuthorization {
    pub authorization_id: String,

    pub approved: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub decline_reason: Option<String>,
}

/// Payment processor trait
pub trait PaymentProcessor: Send + Sync {
    /// Authorize a charge against the selected instrument
    fn authorize(
        &self,
        instrument: &PaymentInstrument,
        amount: i64,
        currency: &str,
    ) -> Result<PaymentAuthorization>;

    /// Processor name for logs
    fn name(&self) -> &str;
}

/// Mock processor that approves every authorization
pub struct MockPaymentProcessor;

impl PaymentProcessor for MockPaymentProcessor {
    fn authorize(
        &self,
        instrument: &PaymentInstrument,
        amount: i64,
        currency: &str,
    ) -> Result<PaymentAuthorization> {
        tracing::info!(
            instrument_id = %instrument.id,
            amount,
            currency,
            has_credential = instrument.credential.is_some(),
            "Mock payment authorized"
        );
        Ok(PaymentAuthorization {
            authorization_id: Uuid::new_v4().to_string(),
            approved: true,
            decline_reason: None,
        })
    }

    fn name(&self) -> &str {
        "MockPaymentProcessor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_always_approves() {
        let processor = MockPaymentProcessor;
        let instrument = PaymentInstrument {
            id: "pi_1".into(),
            kind: "card".into(),
            display_text: Some("Visa •••• 4242".into()),
            credential: None,
        };
        let auth = processor.authorize(&instrument, 1299, "USD").unwrap();
        assert!(auth.approved);
        assert!(auth.decline_reason.is_none());
    }
}
