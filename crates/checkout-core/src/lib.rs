//! # checkout-core
//!
//! Checkout resource lifecycle engine: the state machine governing a
//! checkout session, the capability-extension pipeline composed around its
//! mutations, and the shared error taxonomy both transport bindings
//! translate into their wire formats.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     CheckoutService                           │
//! │  ┌──────────────┐  ┌───────────────┐  ┌──────────────────┐  │
//! │  │  Extension   │  │   Checkout    │  │   Capability     │  │
//! │  │  Pipeline    │──│    Store      │──│   Registry       │  │
//! │  └──────────────┘  └───────────────┘  └──────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transport adapters (tool-call, embedded) call the `CheckoutService`;
//! pre-hooks shape what is stored, the store owns every state transition,
//! post-hooks enrich the response. The `Catalog` and `PaymentProcessor`
//! traits are the seams to the merchant's real systems.

pub mod capability;
pub mod catalog;
pub mod error;
pub mod model;
pub mod payment;
pub mod pipeline;
pub mod service;
pub mod store;

pub use capability::{Capability, CapabilityRegistry};
pub use catalog::{Catalog, MemoryCatalog, Product};
pub use error::{ApiError, CheckoutError, ErrorResponse, Result, Severity};
pub use model::{Checkout, CheckoutId, CheckoutStatus, CheckoutUpdate, CompleteRequest, CreateCheckoutRequest};
pub use payment::{MockPaymentProcessor, PaymentProcessor};
pub use pipeline::{CheckoutExtension, ExtensionPipeline};
pub use service::CheckoutService;
pub use store::CheckoutStore;

/// Response key the checkout is wrapped under in tool-call responses
pub const UCP_CHECKOUT_KEY: &str = "a2a.ucp.checkout";
