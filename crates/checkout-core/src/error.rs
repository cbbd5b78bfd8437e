//! Error Types
//!
//! Shared error taxonomy for the checkout engine. Both transport bindings
//! translate these into their wire formats via [`ApiError`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for checkout operations
pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Checkout engine errors
#[derive(Error, Debug)]
pub enum CheckoutError {
    /// Request is malformed (missing field, bad identifier)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Checkout not found
    #[error("Checkout not found: {0}")]
    NotFound(String),

    /// Product not found in the catalog
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Requested merchandise cannot be fulfilled
    #[error("Merchandise not available: {0}")]
    MerchandiseUnavailable(String),

    /// Mutation not allowed in the checkout's current status
    #[error("Invalid mutation: {0}")]
    InvalidMutation(String),

    /// Checkout is missing information required to complete
    #[error("Checkout not ready: {0}")]
    NotReady(String),

    /// Completion attempted on an already-completed checkout
    #[error("Checkout has already been completed")]
    AlreadyCompleted,

    /// Completion attempted on a canceled checkout
    #[error("Checkout has been canceled and cannot be completed")]
    CheckoutCanceled,

    /// Payment authorization was declined
    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    /// Capability extension rejected the request
    #[error("{code}: {message}")]
    Extension { code: String, message: String },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error severity on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Recoverable,
    RequiresBuyerInput,
    Fatal,
}

impl CheckoutError {
    /// Stable wire code for this error
    pub fn code(&self) -> &str {
        match self {
            CheckoutError::InvalidRequest(_) => "INVALID_REQUEST",
            CheckoutError::NotFound(_) => "CHECKOUT_NOT_FOUND",
            CheckoutError::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            CheckoutError::MerchandiseUnavailable(_) => "MERCHANDISE_NOT_AVAILABLE",
            CheckoutError::InvalidMutation(_) => "INVALID_MUTATION",
            CheckoutError::NotReady(_) => "CHECKOUT_INCOMPLETE",
            CheckoutError::AlreadyCompleted => "CHECKOUT_ALREADY_COMPLETED",
            CheckoutError::CheckoutCanceled => "CHECKOUT_CANCELED",
            CheckoutError::PaymentDeclined(_) => "PAYMENT_DECLINED",
            CheckoutError::Extension { code, .. } => code,
            CheckoutError::Json(_) | CheckoutError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Wire severity for this error
    pub fn severity(&self) -> Severity {
        match self {
            CheckoutError::NotReady(_) => Severity::RequiresBuyerInput,
            CheckoutError::MerchandiseUnavailable(_) => Severity::RequiresBuyerInput,
            _ => Severity::Recoverable,
        }
    }

    /// Message safe to show the caller. Internal details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            CheckoutError::Json(_) | CheckoutError::Internal(_) => {
                "An unexpected error occurred while processing the checkout".into()
            }
            other => other.to_string(),
        }
    }
}

impl From<anyhow::Error> for CheckoutError {
    fn from(err: anyhow::Error) -> Self {
        CheckoutError::Internal(err.to_string())
    }
}

/// UCP error structure carried in error responses
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&CheckoutError> for ApiError {
    fn from(err: &CheckoutError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.user_message(),
            severity: err.severity(),
            details: None,
        }
    }
}

/// Error response envelope shared by both bindings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub errors: Vec<ApiError>,
}

impl ErrorResponse {
    pub fn from_error(err: &CheckoutError) -> Self {
        Self {
            status: "error".into(),
            errors: vec![ApiError::from(err)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(CheckoutError::AlreadyCompleted.code(), "CHECKOUT_ALREADY_COMPLETED");
        assert_eq!(CheckoutError::NotFound("x".into()).code(), "CHECKOUT_NOT_FOUND");
        assert_eq!(
            CheckoutError::Extension {
                code: "mandate_required".into(),
                message: "missing".into()
            }
            .code(),
            "mandate_required"
        );
    }

    #[test]
    fn test_readiness_severity() {
        let err = CheckoutError::NotReady("buyer email missing".into());
        assert_eq!(err.severity(), Severity::RequiresBuyerInput);
        assert_eq!(CheckoutError::AlreadyCompleted.severity(), Severity::Recoverable);
    }

    #[test]
    fn test_internal_message_is_generic() {
        let err = CheckoutError::Internal("lock poisoned at store.rs:42".into());
        assert!(!err.user_message().contains("store.rs"));
    }

    #[test]
    fn test_error_response_shape() {
        let response = ErrorResponse::from_error(&CheckoutError::InvalidRequest(
            "at least one line item is required".into(),
        ));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["errors"][0]["code"], "INVALID_REQUEST");
        assert_eq!(json["errors"][0]["severity"], "recoverable");
    }
}
