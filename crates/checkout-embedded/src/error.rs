//! Embedded Session Errors

use thiserror::Error;

use crate::rpc::codes;

/// Result type alias for embedded session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors raised by the embedded session layer
#[derive(Error, Debug)]
pub enum SessionError {
    /// Opening query parameters are missing or malformed
    #[error("Invalid embedding query: {0}")]
    InvalidQuery(String),

    /// Channel message could not be parsed as JSON-RPC 2.0
    #[error("Parse error: {0}")]
    Parse(String),

    /// Delegated request issued without the delegation being accepted
    #[error("Delegation not accepted: {0}")]
    DelegationNotAccepted(String),

    /// Operation not permitted in the session's current state
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// Pending delegated request timed out
    #[error("Delegated request timed out")]
    Timeout,

    /// The host rejected a delegated request
    #[error("Delegation failed: {0}")]
    DelegationFailed(String),
}

impl SessionError {
    /// JSON-RPC error code this error maps to
    pub fn rpc_code(&self) -> i64 {
        match self {
            SessionError::InvalidQuery(_) => codes::INVALID_REQUEST,
            SessionError::Parse(_) => codes::PARSE_ERROR,
            SessionError::DelegationNotAccepted(_) | SessionError::DelegationFailed(_) => {
                codes::DELEGATION_FAILED
            }
            SessionError::InvalidState(_) => codes::INVALID_STATE,
            // Timeout is reported as a user-cancellation-equivalent failure
            SessionError::Timeout => codes::USER_CANCELLED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_maps_to_user_cancelled() {
        assert_eq!(SessionError::Timeout.rpc_code(), codes::USER_CANCELLED);
    }

    #[test]
    fn test_delegation_codes() {
        let err = SessionError::DelegationNotAccepted("payment.credential".into());
        assert_eq!(err.rpc_code(), codes::DELEGATION_FAILED);
    }
}
