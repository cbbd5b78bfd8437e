//! JSON-RPC 2.0 Messages
//!
//! Wire types for the embedded channel. Requests carry an `id` and expect a
//! response; notifications omit it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::SessionError;

pub const JSONRPC_VERSION: &str = "2.0";

/// Standard and EP-reserved error codes
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    // EP-specific application codes (-32000..-32099)
    pub const USER_CANCELLED: i64 = -32001;
    pub const DELEGATION_FAILED: i64 = -32002;
    pub const CHECKOUT_NOT_FOUND: i64 = -32003;
    pub const INVALID_STATE: i64 = -32004;
}

/// A request expecting a response
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: Uuid::new_v4().simple().to_string(),
            method: method.into(),
            params,
        }
    }
}

/// A one-way notification
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcNotification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            method: method.into(),
            params,
        }
    }
}

/// A success response to a request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: String,
    #[serde(default)]
    pub result: Value,
}

impl RpcResponse {
    pub fn new(id: impl Into<String>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: id.into(),
            result,
        }
    }
}

/// The error member of an error response
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcErrorBody {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// An error response to a request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcErrorResponse {
    pub jsonrpc: String,
    pub id: String,
    pub error: RpcErrorBody,
}

impl RpcErrorResponse {
    pub fn new(id: impl Into<String>, error: RpcErrorBody) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: id.into(),
            error,
        }
    }
}

/// Any message arriving on the channel
#[derive(Clone, Debug)]
pub enum IncomingMessage {
    Request(RpcRequest),
    Notification(RpcNotification),
    Response(RpcResponse),
    Error(RpcErrorResponse),
}

/// Parse and classify a raw channel message
pub fn parse_message(raw: &str) -> Result<IncomingMessage, SessionError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| SessionError::Parse(format!("invalid JSON: {e}")))?;

    if value.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(SessionError::Parse(
            "not a valid JSON-RPC 2.0 message".into(),
        ));
    }

    let message = if value.get("method").is_some() {
        if value.get("id").is_some() {
            IncomingMessage::Request(
                serde_json::from_value(value).map_err(|e| SessionError::Parse(e.to_string()))?,
            )
        } else {
            IncomingMessage::Notification(
                serde_json::from_value(value).map_err(|e| SessionError::Parse(e.to_string()))?,
            )
        }
    } else if value.get("error").is_some() {
        IncomingMessage::Error(
            serde_json::from_value(value).map_err(|e| SessionError::Parse(e.to_string()))?,
        )
    } else if value.get("result").is_some() {
        IncomingMessage::Response(
            serde_json::from_value(value).map_err(|e| SessionError::Parse(e.to_string()))?,
        )
    } else {
        return Err(SessionError::Parse(
            "message is neither request, notification, nor response".into(),
        ));
    };

    Ok(message)
}
