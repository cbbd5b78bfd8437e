//! Embedded Channel
//!
//! WebSocket carrier for the embedded JSON-RPC session. The merchant side
//! initiates the `ec.ready` handshake, pushes lifecycle notifications as the
//! checkout mutates, and forwards delegated requests to the host, awaiting
//! each response through the pending-request map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;

use checkout_core::model::{CheckoutId, CheckoutUpdate, PaymentInstrument, PaymentUpdate};
use checkout_core::CheckoutService;
use checkout_embedded::{
    parse_message, ChangeKind, EmbeddedSession, IncomingMessage, PendingRequests, SessionError,
};

/// One open embedded channel for a checkout
pub struct EmbeddedChannel {
    pub session: Mutex<EmbeddedSession>,
    pub outbound: mpsc::UnboundedSender<String>,
    pub pending: PendingRequests,
}

impl EmbeddedChannel {
    pub fn new(session: EmbeddedSession, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            session: Mutex::new(session),
            outbound,
            pending: PendingRequests::new(),
        }
    }

    fn send_raw(&self, message: &impl serde::Serialize) {
        match serde_json::to_string(message) {
            Ok(raw) => {
                let _ = self.outbound.send(raw);
            }
            Err(e) => tracing::error!(error = %e, "Failed to serialize channel message"),
        }
    }

    /// Forward a delegated request to the host and await its response
    pub async fn delegate(
        &self,
        delegation: &str,
        checkout: &Value,
        timeout: Duration,
    ) -> Result<Value, SessionError> {
        let request = self
            .session
            .lock()
            .unwrap()
            .delegation_request(delegation, checkout)?;
        let request_id = request.id.clone();

        let rx = self.pending.register(request_id.clone());
        self.send_raw(&request);

        match self.pending.await_response(&request_id, rx, timeout).await? {
            Ok(result) => Ok(result),
            Err(error) => Err(SessionError::DelegationFailed(error.message)),
        }
    }
}

/// Open channels keyed by checkout id
#[derive(Default)]
pub struct ChannelHub {
    channels: Mutex<HashMap<String, Vec<Arc<EmbeddedChannel>>>>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, checkout_id: &CheckoutId, channel: Arc<EmbeddedChannel>) {
        self.channels
            .lock()
            .unwrap()
            .entry(checkout_id.to_string())
            .or_default()
            .push(channel);
    }

    pub fn remove(&self, checkout_id: &CheckoutId, channel: &Arc<EmbeddedChannel>) {
        let mut channels = self.channels.lock().unwrap();
        if let Some(list) = channels.get_mut(&checkout_id.to_string()) {
            list.retain(|c| !Arc::ptr_eq(c, channel));
            if list.is_empty() {
                channels.remove(&checkout_id.to_string());
            }
        }
    }

    pub fn channels_for(&self, checkout_id: &CheckoutId) -> Vec<Arc<EmbeddedChannel>> {
        self.channels
            .lock()
            .unwrap()
            .get(&checkout_id.to_string())
            .cloned()
            .unwrap_or_default()
    }

    /// Push a state-change notification to every open channel.
    ///
    /// Sessions that have not started suppress the notification themselves.
    pub fn notify_change(&self, checkout_id: &CheckoutId, kind: ChangeKind, checkout: &Value) {
        for channel in self.channels_for(checkout_id) {
            let notification = channel
                .session
                .lock()
                .unwrap()
                .change_notification(kind, checkout);
            if let Some(notification) = notification {
                channel.send_raw(&notification);
            }
        }
    }

    /// Push the one-time completion notification to every open channel
    pub fn notify_complete(&self, checkout_id: &CheckoutId, checkout: &Value) {
        for channel in self.channels_for(checkout_id) {
            let notification = channel
                .session
                .lock()
                .unwrap()
                .complete_notification(checkout);
            if let Some(notification) = notification {
                channel.send_raw(&notification);
            }
        }
    }
}

/// Payment instruments the host handed back in its `ec.ready` result
fn host_instruments(result: &Value) -> Option<Vec<PaymentInstrument>> {
    let instruments = result.get("checkout")?.get("payment")?.get("instruments")?;
    serde_json::from_value(instruments.clone()).ok().filter(|list: &Vec<_>| !list.is_empty())
}

/// Drive one WebSocket as an embedded channel until it closes
pub async fn run_channel(
    socket: WebSocket,
    channel: Arc<EmbeddedChannel>,
    service: Arc<CheckoutService>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    initial_checkout: Value,
) {
    let (mut sender, mut receiver) = socket.split();

    // Outbound pump: session notifications and delegation requests
    let pump = tokio::spawn(async move {
        while let Some(raw) = outbound_rx.recv().await {
            if sender.send(Message::Text(raw.into())).await.is_err() {
                break;
            }
        }
    });

    // Handshake: the embedded side opens with ec.ready
    let ready_id = {
        let mut session = channel.session.lock().unwrap();
        let request = session.handshake_request();
        channel.send_raw(&request);
        request.id
    };

    while let Some(message) = receiver.next().await {
        let raw = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::error!(error = %e, "Embedded channel error");
                break;
            }
            _ => continue,
        };

        let parsed = match parse_message(raw.as_str()) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping unparseable channel message");
                continue;
            }
        };

        match parsed {
            IncomingMessage::Response(response) => {
                let is_ready_reply = response.id == ready_id;
                if is_ready_reply {
                    // The host may hand over display state with its ready
                    // result; its payment instruments flow through the store
                    // like any other mutation.
                    let mut visible_checkout = initial_checkout.clone();
                    if let Some(instruments) = host_instruments(&response.result) {
                        let checkout_id = channel.session.lock().unwrap().checkout_id.clone();
                        let update = CheckoutUpdate {
                            payment: Some(PaymentUpdate {
                                instruments: Some(instruments),
                                selected_instrument_id: None,
                            }),
                            ..Default::default()
                        };
                        match service.update(&checkout_id, update) {
                            Ok(updated) => {
                                visible_checkout = serde_json::to_value(&updated)
                                    .unwrap_or(visible_checkout);
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Host instruments rejected");
                            }
                        }
                    }

                    let notification = {
                        let mut session = channel.session.lock().unwrap();
                        session.handle_ready_response(&response);
                        session.start_notification(&visible_checkout).ok().flatten()
                    };
                    // Handshake done: the checkout is visible, fire ec.start
                    if let Some(notification) = notification {
                        channel.send_raw(&notification);
                    }
                } else {
                    channel.pending.resolve(&response.id, Ok(response.result));
                }
            }
            IncomingMessage::Error(error) => {
                channel.pending.resolve(&error.id, Err(error.error));
            }
            IncomingMessage::Notification(notification) => {
                let mut session = channel.session.lock().unwrap();
                session.log_received(serde_json::to_value(&notification).unwrap_or_default());
            }
            IncomingMessage::Request(request) => {
                // The host does not issue requests on this channel
                let reply = checkout_embedded::RpcErrorResponse::new(
                    request.id,
                    checkout_embedded::RpcErrorBody::new(
                        checkout_embedded::rpc::codes::METHOD_NOT_FOUND,
                        format!("unsupported method: {}", request.method),
                    ),
                );
                channel.send_raw(&reply);
            }
        }
    }

    pump.abort();
}
