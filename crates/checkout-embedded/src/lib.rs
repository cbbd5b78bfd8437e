//! # checkout-embedded
//!
//! Embedded checkout protocol (EP) session layer: JSON-RPC 2.0 messages
//! exchanged with an embedding host over a postMessage-like channel, the
//! per-embedding session state machine, delegation gating, and pending
//! delegated-request bookkeeping.
//!
//! The session drives the same checkout mutations as the tool-call binding;
//! this crate owns only the transport contract, never checkout state.

pub mod error;
pub mod pending;
pub mod rpc;
pub mod session;

pub use error::{Result, SessionError};
pub use pending::{PendingRequests, DELEGATION_TIMEOUT};
pub use rpc::{
    parse_message, IncomingMessage, RpcErrorBody, RpcErrorResponse, RpcNotification, RpcRequest,
    RpcResponse,
};
pub use session::{
    parse_query, ChangeKind, EmbeddedQuery, EmbeddedSession, EP_VERSION, SUPPORTED_DELEGATIONS,
};
