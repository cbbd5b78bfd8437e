//! # checkout-tools
//!
//! Tool-call transport binding for the checkout engine. Each UCP operation
//! is a named, schema-described tool an LLM agent invokes one call at a
//! time: `create_checkout`, `get_checkout`, `update_checkout`,
//! `complete_checkout`, `cancel_checkout`, plus the read-only helpers
//! `search_products` and `get_product`.
//!
//! One call maps to one store mutation plus the extension pass; responses
//! wrap the checkout under a fixed key and errors carry the shared UCP
//! error structure.

pub mod ops;
pub mod tool;

pub use ops::register_checkout_tools;
pub use tool::{CheckoutTool, ParameterSchema, ToolCall, ToolRegistry, ToolSchema};
