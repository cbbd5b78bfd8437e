//! Embedded Session State Machine
//!
//! Per-embedding bookkeeping: created → ready → started → completed, with
//! delegation gating and notification suppression until the checkout is
//! visible. The session references a checkout but never owns it; it is
//! created when a host opens an embedding and discarded when it closes.

use std::collections::VecDeque;

use serde_json::Value;
use uuid::Uuid;

use checkout_core::model::CheckoutId;

use crate::error::{Result, SessionError};
use crate::rpc::{RpcNotification, RpcRequest, RpcResponse};

/// Embedded protocol version
pub const EP_VERSION: &str = "2026-01-11";

/// Delegation identifiers the server implements
pub mod delegations {
    pub const PAYMENT_INSTRUMENTS: &str = "payment.instruments_change";
    pub const PAYMENT_CREDENTIAL: &str = "payment.credential";
    pub const FULFILLMENT_ADDRESS: &str = "fulfillment.address_change";
}

/// All delegations the server implements
pub const SUPPORTED_DELEGATIONS: [&str; 3] = [
    delegations::PAYMENT_INSTRUMENTS,
    delegations::PAYMENT_CREDENTIAL,
    delegations::FULFILLMENT_ADDRESS,
];

/// Embedded protocol method names
pub mod methods {
    // Handshake
    pub const READY: &str = "ec.ready";

    // Lifecycle
    pub const START: &str = "ec.start";
    pub const COMPLETE: &str = "ec.complete";

    // State changes
    pub const LINE_ITEMS_CHANGE: &str = "ec.line_items.change";
    pub const BUYER_CHANGE: &str = "ec.buyer.change";
    pub const PAYMENT_CHANGE: &str = "ec.payment.change";
    pub const FULFILLMENT_CHANGE: &str = "ec.fulfillment.change";
    pub const MESSAGES_CHANGE: &str = "ec.messages.change";

    // Host-bound delegation requests
    pub const PAYMENT_INSTRUMENTS_CHANGE_REQUEST: &str = "ec.payment.instruments_change_request";
    pub const PAYMENT_CREDENTIAL_REQUEST: &str = "ec.payment.credential_request";
    pub const FULFILLMENT_ADDRESS_CHANGE_REQUEST: &str = "ec.fulfillment.address_change_request";
}

/// Kind of state-change notification
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    LineItems,
    Buyer,
    Payment,
    Fulfillment,
    Messages,
}

impl ChangeKind {
    pub fn method(&self) -> &'static str {
        match self {
            ChangeKind::LineItems => methods::LINE_ITEMS_CHANGE,
            ChangeKind::Buyer => methods::BUYER_CHANGE,
            ChangeKind::Payment => methods::PAYMENT_CHANGE,
            ChangeKind::Fulfillment => methods::FULFILLMENT_CHANGE,
            ChangeKind::Messages => methods::MESSAGES_CHANGE,
        }
    }
}

/// Parsed embedding query parameters
#[derive(Clone, Debug)]
pub struct EmbeddedQuery {
    /// Protocol version, `YYYY-MM-DD`
    pub version: String,

    /// Requested delegations, filtered to supported ones
    pub delegations: Vec<String>,

    /// Opaque auth token forwarded by the host
    pub auth: Option<String>,
}

/// Parse the query-parameter contract for opening an embedding.
///
/// Unsupported delegation entries are silently dropped, not rejected.
pub fn parse_query(
    version: Option<&str>,
    delegate: Option<&str>,
    auth: Option<&str>,
) -> Result<EmbeddedQuery> {
    let version = version
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SessionError::InvalidQuery("ec_version parameter is required".into()))?;

    let valid_format = {
        let parts: Vec<&str> = version.split('-').collect();
        parts.len() == 3
            && parts[0].len() == 4
            && parts[1].len() == 2
            && parts[2].len() == 2
            && parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit()))
    };
    if !valid_format {
        return Err(SessionError::InvalidQuery(
            "ec_version must be in YYYY-MM-DD format".into(),
        ));
    }

    let delegations = delegate
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .filter(|d| SUPPORTED_DELEGATIONS.contains(d))
        .map(String::from)
        .collect();

    Ok(EmbeddedQuery {
        version: version.to_string(),
        delegations,
        auth: auth.map(String::from),
    })
}

/// Direction of a logged channel message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

/// One logged channel message
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub direction: Direction,
    pub message: Value,
}

/// Most recent channel messages kept for diagnostics
pub const MESSAGE_HISTORY_LIMIT: usize = 50;

/// An embedded checkout session
pub struct EmbeddedSession {
    pub id: String,
    pub checkout_id: CheckoutId,
    pub version: String,
    pub auth: Option<String>,

    pub requested_delegations: Vec<String>,
    pub accepted_delegations: Vec<String>,

    // Monotonic: once true, never reset
    is_ready: bool,
    is_started: bool,
    is_completed: bool,

    history: VecDeque<HistoryEntry>,
}

impl EmbeddedSession {
    pub fn new(checkout_id: CheckoutId, query: EmbeddedQuery) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            checkout_id,
            version: query.version,
            auth: query.auth,
            requested_delegations: query.delegations,
            accepted_delegations: Vec::new(),
            is_ready: false,
            is_started: false,
            is_completed: false,
            history: VecDeque::new(),
        }
    }

    /// Session constructed with explicit requested delegations (bypassing
    /// query filtering); the handshake still intersects with support.
    pub fn with_requested_delegations(
        checkout_id: CheckoutId,
        requested: Vec<String>,
    ) -> Self {
        let query = EmbeddedQuery {
            version: EP_VERSION.into(),
            delegations: Vec::new(),
            auth: None,
        };
        let mut session = Self::new(checkout_id, query);
        session.requested_delegations = requested;
        session
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready
    }

    pub fn is_started(&self) -> bool {
        self.is_started
    }

    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    /// Build the `ec.ready` handshake request. Accepted delegations are the
    /// intersection of requested and supported, never the union.
    pub fn handshake_request(&mut self) -> RpcRequest {
        let mut accepted: Vec<String> = Vec::new();
        for delegation in &self.requested_delegations {
            if SUPPORTED_DELEGATIONS.contains(&delegation.as_str())
                && !accepted.contains(delegation)
            {
                accepted.push(delegation.clone());
            }
        }
        self.accepted_delegations = accepted;

        let request = RpcRequest::new(
            methods::READY,
            serde_json::json!({ "delegate": self.accepted_delegations }),
        );
        self.log(Direction::Sent, serde_json::to_value(&request).unwrap_or_default());
        request
    }

    /// Record the host's `ec.ready` response, completing the handshake
    pub fn handle_ready_response(&mut self, response: &RpcResponse) {
        self.log(
            Direction::Received,
            serde_json::to_value(response).unwrap_or_default(),
        );
        self.is_ready = true;
        tracing::info!(
            session_id = %self.id,
            checkout_id = %self.checkout_id,
            delegations = ?self.accepted_delegations,
            "Embedded session ready"
        );
    }

    /// Build the `ec.start` notification when the checkout becomes visible.
    ///
    /// Idempotent: a second call has no session-state effect and returns
    /// `None`.
    pub fn start_notification(&mut self, checkout: &Value) -> Result<Option<RpcNotification>> {
        if !self.is_ready {
            return Err(SessionError::InvalidState(
                "session has not completed the ec.ready handshake".into(),
            ));
        }
        if self.is_started {
            return Ok(None);
        }
        self.is_started = true;

        let notification =
            RpcNotification::new(methods::START, serde_json::json!({ "checkout": checkout }));
        self.log(
            Direction::Sent,
            serde_json::to_value(&notification).unwrap_or_default(),
        );
        Ok(Some(notification))
    }

    /// Build a state-change notification for a checkout mutation.
    ///
    /// Notifications are not queued while ready-but-not-started; they are
    /// suppressed entirely until `ec.start` has fired.
    pub fn change_notification(
        &mut self,
        kind: ChangeKind,
        checkout: &Value,
    ) -> Option<RpcNotification> {
        if !self.is_started || self.is_completed {
            return None;
        }

        let notification =
            RpcNotification::new(kind.method(), serde_json::json!({ "checkout": checkout }));
        self.log(
            Direction::Sent,
            serde_json::to_value(&notification).unwrap_or_default(),
        );
        Some(notification)
    }

    /// Build the `ec.complete` notification when the checkout reaches a
    /// terminal completed status. Fires exactly once; irreversible.
    pub fn complete_notification(&mut self, checkout: &Value) -> Option<RpcNotification> {
        if !self.is_started || self.is_completed {
            return None;
        }
        self.is_completed = true;

        let notification =
            RpcNotification::new(methods::COMPLETE, serde_json::json!({ "checkout": checkout }));
        self.log(
            Direction::Sent,
            serde_json::to_value(&notification).unwrap_or_default(),
        );
        tracing::info!(session_id = %self.id, "Embedded session completed");
        Some(notification)
    }

    pub fn is_delegation_accepted(&self, delegation: &str) -> bool {
        self.accepted_delegations.iter().any(|d| d == delegation)
    }

    /// Build a host-bound delegation request.
    ///
    /// Fails locally when the delegation was not accepted - the request is
    /// never put on the wire to be rejected remotely.
    pub fn delegation_request(&mut self, delegation: &str, checkout: &Value) -> Result<RpcRequest> {
        if !self.is_delegation_accepted(delegation) {
            return Err(SessionError::DelegationNotAccepted(delegation.to_string()));
        }

        let method = match delegation {
            delegations::PAYMENT_INSTRUMENTS => methods::PAYMENT_INSTRUMENTS_CHANGE_REQUEST,
            delegations::PAYMENT_CREDENTIAL => methods::PAYMENT_CREDENTIAL_REQUEST,
            delegations::FULFILLMENT_ADDRESS => methods::FULFILLMENT_ADDRESS_CHANGE_REQUEST,
            other => return Err(SessionError::DelegationNotAccepted(other.to_string())),
        };

        let request = RpcRequest::new(method, serde_json::json!({ "checkout": checkout }));
        self.log(Direction::Sent, serde_json::to_value(&request).unwrap_or_default());
        Ok(request)
    }

    /// Record an inbound channel message for diagnostics
    pub fn log_received(&mut self, message: Value) {
        self.log(Direction::Received, message);
    }

    fn log(&mut self, direction: Direction, message: Value) {
        self.history.push_back(HistoryEntry { direction, message });
        while self.history.len() > MESSAGE_HISTORY_LIMIT {
            self.history.pop_front();
        }
    }

    pub fn history(&self) -> &VecDeque<HistoryEntry> {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkout_value() -> Value {
        serde_json::json!({"id": "chk_1", "status": "incomplete"})
    }

    fn session_with(requested: &[&str]) -> EmbeddedSession {
        EmbeddedSession::with_requested_delegations(
            CheckoutId::from_string("chk_1"),
            requested.iter().map(|d| (*d).to_string()).collect(),
        )
    }

    fn ready_session(requested: &[&str]) -> EmbeddedSession {
        let mut session = session_with(requested);
        let request = session.handshake_request();
        session.handle_ready_response(&RpcResponse::new(request.id, serde_json::json!({})));
        session
    }

    #[test]
    fn test_query_requires_version() {
        assert!(parse_query(None, None, None).is_err());
        assert!(parse_query(Some("jan-2026"), None, None).is_err());
        assert!(parse_query(Some("2026-01-11"), None, None).is_ok());
    }

    #[test]
    fn test_query_drops_unsupported_delegations_silently() {
        let query = parse_query(
            Some("2026-01-11"),
            Some("payment.credential, unsupported.x ,fulfillment.address_change"),
            None,
        )
        .unwrap();
        assert_eq!(
            query.delegations,
            vec!["payment.credential", "fulfillment.address_change"]
        );
    }

    #[test]
    fn test_handshake_accepts_intersection() {
        let mut session = session_with(&["payment.credential", "unsupported.x"]);
        let request = session.handshake_request();

        assert_eq!(session.accepted_delegations, vec!["payment.credential"]);
        assert_eq!(request.method, methods::READY);
        assert_eq!(
            request.params["delegate"],
            serde_json::json!(["payment.credential"])
        );
    }

    #[test]
    fn test_start_requires_handshake() {
        let mut session = session_with(&[]);
        assert!(session.start_notification(&checkout_value()).is_err());
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut session = ready_session(&[]);

        let first = session.start_notification(&checkout_value()).unwrap();
        assert!(first.is_some());

        let second = session.start_notification(&checkout_value()).unwrap();
        assert!(second.is_none());
        assert!(session.is_started());
    }

    #[test]
    fn test_notifications_suppressed_until_started() {
        let mut session = ready_session(&[]);

        // Ready but not started: nothing is queued or sent
        assert!(session
            .change_notification(ChangeKind::Buyer, &checkout_value())
            .is_none());

        session.start_notification(&checkout_value()).unwrap();
        let notification = session
            .change_notification(ChangeKind::Buyer, &checkout_value())
            .unwrap();
        assert_eq!(notification.method, methods::BUYER_CHANGE);
    }

    #[test]
    fn test_complete_fires_exactly_once() {
        let mut session = ready_session(&[]);
        session.start_notification(&checkout_value()).unwrap();

        assert!(session.complete_notification(&checkout_value()).is_some());
        assert!(session.complete_notification(&checkout_value()).is_none());
        assert!(session.is_completed());

        // No further change notifications after completion
        assert!(session
            .change_notification(ChangeKind::Payment, &checkout_value())
            .is_none());
    }

    #[test]
    fn test_delegation_request_fails_locally_when_not_accepted() {
        let mut session = ready_session(&["payment.credential"]);
        let history_len = session.history().len();

        let err = session
            .delegation_request(delegations::FULFILLMENT_ADDRESS, &checkout_value())
            .unwrap_err();
        assert!(matches!(err, SessionError::DelegationNotAccepted(_)));
        // Nothing was put on the wire
        assert_eq!(session.history().len(), history_len);
    }

    #[test]
    fn test_delegation_request_when_accepted() {
        let mut session = ready_session(&["payment.credential"]);
        let request = session
            .delegation_request(delegations::PAYMENT_CREDENTIAL, &checkout_value())
            .unwrap();
        assert_eq!(request.method, methods::PAYMENT_CREDENTIAL_REQUEST);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut session = ready_session(&[]);
        session.start_notification(&checkout_value()).unwrap();

        for _ in 0..(MESSAGE_HISTORY_LIMIT * 2) {
            session.change_notification(ChangeKind::Messages, &checkout_value());
        }
        assert_eq!(session.history().len(), MESSAGE_HISTORY_LIMIT);
    }
}
