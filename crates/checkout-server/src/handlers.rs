//! HTTP/WebSocket Handlers

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::Response,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use checkout_core::capability::UCP_VERSION;
use checkout_core::error::{CheckoutError, ErrorResponse};
use checkout_core::model::{
    CheckoutId, CheckoutUpdate, CompleteRequest, PaymentInstrument, PaymentUpdate,
};
use checkout_embedded::session::delegations;
use checkout_embedded::{parse_query, ChangeKind, EmbeddedSession, DELEGATION_TIMEOUT};
use checkout_tools::ToolCall;

use crate::channel::{run_channel, EmbeddedChannel};
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(serde::Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddedParams {
    pub ec_version: Option<String>,
    pub ec_delegate: Option<String>,
    pub ec_auth: Option<String>,
}

type ErrorReply = (StatusCode, Json<ErrorResponse>);

fn error_reply(err: &CheckoutError) -> ErrorReply {
    let status = match err {
        CheckoutError::NotFound(_) | CheckoutError::ProductNotFound(_) => StatusCode::NOT_FOUND,
        CheckoutError::AlreadyCompleted
        | CheckoutError::CheckoutCanceled
        | CheckoutError::InvalidMutation(_) => StatusCode::CONFLICT,
        CheckoutError::Json(_) | CheckoutError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(ErrorResponse::from_error(err)))
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        capabilities: state
            .capabilities
            .names()
            .into_iter()
            .map(String::from)
            .collect(),
    })
}

/// UCP service discovery endpoint
pub async fn ucp_discovery(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({
        "services": {
            "dev.ucp.shopping": {
                "version": UCP_VERSION,
                "capabilities": state.capabilities.capabilities(),
                "mcp": {
                    "schema": "https://ucp.dev/services/shopping/mcp.openrpc.json",
                    "endpoint": "/tools"
                },
                "embedded": {
                    "schema": "https://ucp.dev/services/shopping/embedded.openrpc.json",
                    "endpoint": "/embedded-checkout"
                }
            }
        }
    }))
}

/// List tool schemas for agent runtimes
pub async fn list_tools(State(state): State<AppState>) -> Json<Value> {
    let mut schemas = state.tools.schemas();
    schemas.sort_by(|a, b| a.name.cmp(&b.name));
    Json(serde_json::json!({ "tools": schemas }))
}

/// Invoke one tool of the tool-call binding.
///
/// The response body is always a complete UCP envelope, success or error,
/// so the HTTP status is 200 either way.
pub async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(arguments): Json<HashMap<String, Value>>,
) -> Json<Value> {
    let call = ToolCall {
        name,
        arguments,
        id: None,
    };
    Json(state.tools.dispatch(&call).await)
}

/// Embedding bootstrap: the host fetches the checkout and the session
/// contract before opening the message channel.
pub async fn embedded_bootstrap(
    State(state): State<AppState>,
    Path(checkout_id): Path<String>,
    Query(params): Query<EmbeddedParams>,
) -> Result<Json<Value>, ErrorReply> {
    let query = parse_query(
        params.ec_version.as_deref(),
        params.ec_delegate.as_deref(),
        params.ec_auth.as_deref(),
    )
    .map_err(|e| {
        error_reply(&CheckoutError::InvalidRequest(e.to_string()))
    })?;

    let id = CheckoutId::from_string(checkout_id);
    let checkout = state.service.get(&id).map_err(|e| error_reply(&e))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "session": {
            "version": query.version,
            "delegations": query.delegations,
        },
        "checkout": checkout,
    })))
}

/// Open the embedded JSON-RPC channel for a checkout
pub async fn embedded_channel(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(checkout_id): Path<String>,
    Query(params): Query<EmbeddedParams>,
) -> Result<Response, ErrorReply> {
    let query = parse_query(
        params.ec_version.as_deref(),
        params.ec_delegate.as_deref(),
        params.ec_auth.as_deref(),
    )
    .map_err(|e| error_reply(&CheckoutError::InvalidRequest(e.to_string())))?;

    let id = CheckoutId::from_string(checkout_id);
    let checkout = state.service.get(&id).map_err(|e| error_reply(&e))?;
    let checkout_value = serde_json::to_value(&checkout).map_err(|e| {
        error_reply(&CheckoutError::Internal(e.to_string()))
    })?;

    let session = EmbeddedSession::new(id.clone(), query);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let channel = Arc::new(EmbeddedChannel::new(session, outbound_tx));

    state.channels.register(&id, channel.clone());
    tracing::info!(checkout_id = %id, "Embedded channel opened");

    let channels = state.channels.clone();
    let service = state.service.clone();
    Ok(ws.on_upgrade(move |socket| async move {
        run_channel(socket, channel.clone(), service, outbound_rx, checkout_value).await;
        channels.remove(&id, &channel);
        tracing::info!(checkout_id = %id, "Embedded channel closed");
    }))
}

/// Apply a UI-originated update to the checkout
pub async fn embedded_update(
    State(state): State<AppState>,
    Path(checkout_id): Path<String>,
    Json(update): Json<CheckoutUpdate>,
) -> Result<Json<Value>, ErrorReply> {
    let id = CheckoutId::from_string(checkout_id);

    let touched = touched_kinds(&update);
    let checkout = state.service.update(&id, update).map_err(|e| error_reply(&e))?;

    let checkout_value = serde_json::to_value(&checkout)
        .map_err(|e| error_reply(&CheckoutError::Internal(e.to_string())))?;
    for kind in touched {
        state.channels.notify_change(&id, kind, &checkout_value);
    }
    if !checkout.messages.is_empty() {
        state.channels.notify_change(&id, ChangeKind::Messages, &checkout_value);
    }

    Ok(Json(serde_json::json!({
        "status": "success",
        "checkout": checkout,
    })))
}

/// Complete the checkout from the embedded surface.
///
/// When the payment-credential delegation is accepted, the host is asked
/// for the credential first and the returned credential is attached to the
/// checkout's payment as the selected instrument, so authorization runs
/// against it. A timeout abandons the request and leaves the checkout
/// untouched.
pub async fn embedded_complete(
    State(state): State<AppState>,
    Path(checkout_id): Path<String>,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<Value>, ErrorReply> {
    let id = CheckoutId::from_string(checkout_id);
    let current = state.service.get(&id).map_err(|e| error_reply(&e))?;
    let current_value = serde_json::to_value(&current)
        .map_err(|e| error_reply(&CheckoutError::Internal(e.to_string())))?;

    for channel in state.channels.channels_for(&id) {
        let accepted = channel
            .session
            .lock()
            .unwrap()
            .is_delegation_accepted(delegations::PAYMENT_CREDENTIAL);
        if !accepted {
            continue;
        }

        match channel
            .delegate(delegations::PAYMENT_CREDENTIAL, &current_value, DELEGATION_TIMEOUT)
            .await
        {
            Ok(result) => {
                let Some(instrument) = instrument_from_credential(&result) else {
                    return Err(error_reply(&CheckoutError::Extension {
                        code: "payment_credential_unavailable".into(),
                        message: "host returned no payment credential".into(),
                    }));
                };
                tracing::info!(
                    checkout_id = %id,
                    instrument_id = %instrument.id,
                    "Payment credential received from host"
                );

                // The credential rides on the selected instrument into
                // payment authorization
                let selected = instrument.id.clone();
                let mut instruments = current.payment.instruments.clone();
                instruments.retain(|i| i.id != instrument.id);
                instruments.push(instrument);

                let update = CheckoutUpdate {
                    payment: Some(PaymentUpdate {
                        instruments: Some(instruments),
                        selected_instrument_id: Some(selected),
                    }),
                    ..Default::default()
                };
                let updated = state.service.update(&id, update).map_err(|e| error_reply(&e))?;
                let updated_value = serde_json::to_value(&updated)
                    .map_err(|e| error_reply(&CheckoutError::Internal(e.to_string())))?;
                state.channels.notify_change(&id, ChangeKind::Payment, &updated_value);
            }
            Err(e) => {
                // Checkout state is untouched; the caller must reissue
                tracing::warn!(checkout_id = %id, error = %e, "Credential delegation failed");
                return Err(error_reply(&CheckoutError::Extension {
                    code: "payment_credential_unavailable".into(),
                    message: e.to_string(),
                }));
            }
        }
        break;
    }

    let checkout = state
        .service
        .complete(&id, &request)
        .map_err(|e| error_reply(&e))?;

    let checkout_value = serde_json::to_value(&checkout)
        .map_err(|e| error_reply(&CheckoutError::Internal(e.to_string())))?;
    state.channels.notify_complete(&id, &checkout_value);

    Ok(Json(serde_json::json!({
        "status": "success",
        "checkout": checkout,
    })))
}

/// Cancel the checkout from the embedded surface
pub async fn embedded_cancel(
    State(state): State<AppState>,
    Path(checkout_id): Path<String>,
) -> Result<Json<Value>, ErrorReply> {
    let id = CheckoutId::from_string(checkout_id);
    let checkout = state.service.cancel(&id).map_err(|e| error_reply(&e))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "checkout": checkout,
    })))
}

/// Build the payment instrument backed by a host-delegated credential.
///
/// The delegation result carries `{credential}` on success; a result
/// without one means the host could not produce a credential.
fn instrument_from_credential(result: &Value) -> Option<PaymentInstrument> {
    let credential = result.get("credential")?.clone();
    if credential.is_null() {
        return None;
    }
    Some(PaymentInstrument {
        id: credential
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("pi_delegated")
            .to_string(),
        kind: credential
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("card")
            .to_string(),
        display_text: credential
            .get("display_text")
            .and_then(Value::as_str)
            .map(String::from),
        credential: Some(credential),
    })
}

/// Notification kinds an update touches, in protocol order
fn touched_kinds(update: &CheckoutUpdate) -> Vec<ChangeKind> {
    let mut kinds = Vec::new();
    if update.line_items.is_some() {
        kinds.push(ChangeKind::LineItems);
    }
    if update.buyer.is_some() {
        kinds.push(ChangeKind::Buyer);
    }
    if update.payment.is_some() {
        kinds.push(ChangeKind::Payment);
    }
    if update.fulfillment.is_some() {
        kinds.push(ChangeKind::Fulfillment);
    }
    kinds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touched_kinds_order() {
        let update = CheckoutUpdate {
            buyer: Some(Default::default()),
            payment: Some(Default::default()),
            ..Default::default()
        };
        assert_eq!(
            touched_kinds(&update),
            vec![ChangeKind::Buyer, ChangeKind::Payment]
        );
    }

    #[test]
    fn test_instrument_carries_delegated_credential() {
        let result = serde_json::json!({
            "credential": {
                "id": "pi_host",
                "type": "card",
                "display_text": "Visa •••• 4242",
                "token": "tok_abc123",
            }
        });

        let instrument = instrument_from_credential(&result).unwrap();
        assert_eq!(instrument.id, "pi_host");
        assert_eq!(instrument.kind, "card");
        assert_eq!(
            instrument.credential.as_ref().unwrap()["token"],
            "tok_abc123"
        );
    }

    #[test]
    fn test_missing_credential_yields_none() {
        assert!(instrument_from_credential(&serde_json::json!({})).is_none());
        assert!(instrument_from_credential(&serde_json::json!({"credential": null})).is_none());
        assert!(
            instrument_from_credential(&serde_json::json!({"error": {"code": -32001}})).is_none()
        );
    }

    #[test]
    fn test_error_reply_status_mapping() {
        let (status, _) = error_reply(&CheckoutError::NotFound("x".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = error_reply(&CheckoutError::AlreadyCompleted);
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = error_reply(&CheckoutError::NotReady("missing email".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
