//! Application State

use std::sync::Arc;

use checkout_core::{CapabilityRegistry, CheckoutService};
use checkout_tools::ToolRegistry;

use crate::channel::ChannelHub;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Transport-agnostic checkout operations
    pub service: Arc<CheckoutService>,

    /// Tool-call binding registry
    pub tools: Arc<ToolRegistry>,

    /// Negotiated capability set, for the discovery document
    pub capabilities: Arc<CapabilityRegistry>,

    /// Open embedded channels keyed by checkout id
    pub channels: Arc<ChannelHub>,
}
