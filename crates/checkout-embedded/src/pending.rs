//! Pending Delegated Requests
//!
//! Finite map from request id to a single-use result slot with a timeout
//! deadline. A slot is resolved exactly once: resolution removes it before
//! the result is delivered, so a late host response after expiry (or a
//! second response) finds no slot and is dropped. Timeout leaves the
//! checkout untouched and is reported as a user-cancellation-equivalent
//! failure; the caller must reissue, nothing retries automatically.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::SessionError;
use crate::rpc::RpcErrorBody;

/// Host-defined timeout for delegated requests
pub const DELEGATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Result delivered to a pending slot
pub type DelegationResult = std::result::Result<Value, RpcErrorBody>;

struct Slot {
    tx: oneshot::Sender<DelegationResult>,
}

/// Map of in-flight delegated requests keyed by request id
#[derive(Default)]
pub struct PendingRequests {
    slots: Mutex<HashMap<String, Slot>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending request and get the receiving half of its slot
    pub fn register(&self, id: impl Into<String>) -> oneshot::Receiver<DelegationResult> {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().unwrap().insert(id.into(), Slot { tx });
        rx
    }

    /// Resolve a pending request with the host's response.
    ///
    /// Returns `false` when no slot exists (already resolved or expired).
    pub fn resolve(&self, id: &str, result: DelegationResult) -> bool {
        let Some(slot) = self.slots.lock().unwrap().remove(id) else {
            tracing::debug!(request_id = %id, "Response for unknown or expired request dropped");
            return false;
        };
        // A dropped receiver just discards the result
        let _ = slot.tx.send(result);
        true
    }

    /// Expire a pending request, resolving it to a timeout error.
    ///
    /// Returns `false` when the slot was already resolved.
    pub fn expire(&self, id: &str) -> bool {
        let Some(slot) = self.slots.lock().unwrap().remove(id) else {
            return false;
        };
        tracing::warn!(request_id = %id, "Delegated request expired");
        let _ = slot.tx.send(Err(RpcErrorBody::new(
            crate::rpc::codes::USER_CANCELLED,
            "Request timed out",
        )));
        true
    }

    /// Await a registered slot, expiring it on deadline
    pub async fn await_response(
        &self,
        id: &str,
        rx: oneshot::Receiver<DelegationResult>,
        timeout: Duration,
    ) -> std::result::Result<DelegationResult, SessionError> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_closed)) => Err(SessionError::InvalidState(
                "pending request slot dropped".into(),
            )),
            Err(_elapsed) => {
                self.expire(id);
                Err(SessionError::Timeout)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_delivers_result() {
        let pending = PendingRequests::new();
        let rx = pending.register("req_1");

        assert!(pending.resolve("req_1", Ok(serde_json::json!({"credential": "tok"}))));
        let result = rx.await.unwrap();
        assert_eq!(result.unwrap()["credential"], "tok");
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_expiry_resolves_exactly_once() {
        let pending = PendingRequests::new();
        let rx = pending.register("req_1");

        assert!(pending.expire("req_1"));
        // The slot is gone: a late host response is dropped
        assert!(!pending.resolve("req_1", Ok(Value::Null)));
        assert!(!pending.expire("req_1"));

        let result = rx.await.unwrap();
        assert_eq!(result.unwrap_err().code, crate::rpc::codes::USER_CANCELLED);
    }

    #[tokio::test]
    async fn test_await_times_out() {
        let pending = PendingRequests::new();
        let rx = pending.register("req_1");

        let err = pending
            .await_response("req_1", rx, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Timeout));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_await_receives_before_deadline() {
        let pending = std::sync::Arc::new(PendingRequests::new());
        let rx = pending.register("req_1");

        let resolver = pending.clone();
        tokio::spawn(async move {
            resolver.resolve("req_1", Ok(serde_json::json!({"ok": true})));
        });

        let result = pending
            .await_response("req_1", rx, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.unwrap()["ok"], true);
    }
}
