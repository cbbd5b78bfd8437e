//! # checkout-extensions
//!
//! UCP capability extensions composed around the core checkout mutations:
//!
//! - **Discount** - code resolution, clamping, automatic discounts
//! - **Buyer consent** - field-level consent merging
//! - **AP2 mandates** - merchant authorization signatures and buyer mandate
//!   verification, with mock and ECDSA signer strategies
//!
//! Each extension implements
//! [`CheckoutExtension`](checkout_core::pipeline::CheckoutExtension); the
//! capability registry decides which ones run.

pub mod ap2;
pub mod consent;
pub mod discount;

pub use ap2::{Ap2Extension, EcdsaSigner, MandateVerifier, MockSigner, Signer};
pub use consent::{merge_consent, ConsentExtension};
pub use discount::{DiscountExtension, DiscountRule};
