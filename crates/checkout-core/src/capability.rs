//! Capability Registry
//!
//! Declares which UCP capabilities are active for a negotiated profile.
//! Pure lookup/config: the registry decides which extensions run, the
//! extensions themselves never consult negotiation state.

use serde::{Deserialize, Serialize};

/// Protocol version shared by all built-in capabilities
pub const UCP_VERSION: &str = "2026-01-11";

/// Base checkout capability, always present
pub const CHECKOUT_CAPABILITY: &str = "dev.ucp.shopping.checkout";

/// Discount codes and automatic discounts
pub const DISCOUNT_CAPABILITY: &str = "dev.ucp.shopping.discount";

/// Buyer privacy consent transmission
pub const BUYER_CONSENT_CAPABILITY: &str = "dev.ucp.shopping.buyer_consent";

/// AP2 purchase mandates and merchant authorization signatures
pub const AP2_MANDATE_CAPABILITY: &str = "dev.ucp.shopping.ap2_mandate";

/// A named, versioned capability declaration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,

    pub version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
}

impl Capability {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: UCP_VERSION.into(),
            spec: None,
            schema: None,
            extends: None,
        }
    }

    pub fn with_spec(mut self, url: impl Into<String>) -> Self {
        self.spec = Some(url.into());
        self
    }

    pub fn with_schema(mut self, url: impl Into<String>) -> Self {
        self.schema = Some(url.into());
        self
    }

    pub fn extends(mut self, name: impl Into<String>) -> Self {
        self.extends = Some(name.into());
        self
    }
}

/// The set of capabilities negotiated for a session/profile
#[derive(Clone, Debug, Default)]
pub struct CapabilityRegistry {
    active: Vec<Capability>,
}

impl CapabilityRegistry {
    /// Registry with only the base checkout capability
    pub fn new() -> Self {
        let mut registry = Self { active: Vec::new() };
        registry.enable(
            Capability::new(CHECKOUT_CAPABILITY)
                .with_spec("https://ucp.dev/specification/checkout")
                .with_schema("https://ucp.dev/schemas/shopping/checkout.json"),
        );
        registry
    }

    /// Registry with every built-in capability enabled
    pub fn with_all_capabilities() -> Self {
        let mut registry = Self::new();
        registry.enable(
            Capability::new(DISCOUNT_CAPABILITY)
                .with_spec("https://ucp.dev/specification/discount")
                .with_schema("https://ucp.dev/schemas/shopping/discount.json")
                .extends(CHECKOUT_CAPABILITY),
        );
        registry.enable(
            Capability::new(BUYER_CONSENT_CAPABILITY).extends(CHECKOUT_CAPABILITY),
        );
        registry.enable(
            Capability::new(AP2_MANDATE_CAPABILITY)
                .with_spec("https://ucp.dev/specification/ap2-mandates")
                .with_schema("https://ucp.dev/schemas/shopping/ap2_mandate.json")
                .extends(CHECKOUT_CAPABILITY),
        );
        registry
    }

    /// Enable a capability. Re-enabling an active capability is a no-op.
    pub fn enable(&mut self, capability: Capability) {
        if !self.is_active(&capability.name) {
            self.active.push(capability);
        }
    }

    /// Whether the named capability was negotiated
    pub fn is_active(&self, name: &str) -> bool {
        self.active.iter().any(|c| c.name == name)
    }

    /// All negotiated capabilities, for the discovery document
    pub fn capabilities(&self) -> &[Capability] {
        &self.active
    }

    pub fn names(&self) -> Vec<&str> {
        self.active.iter().map(|c| c.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_registry() {
        let registry = CapabilityRegistry::new();
        assert!(registry.is_active(CHECKOUT_CAPABILITY));
        assert!(!registry.is_active(DISCOUNT_CAPABILITY));
    }

    #[test]
    fn test_enable_is_idempotent() {
        let mut registry = CapabilityRegistry::new();
        registry.enable(Capability::new(DISCOUNT_CAPABILITY));
        registry.enable(Capability::new(DISCOUNT_CAPABILITY));
        assert_eq!(registry.capabilities().len(), 2);
    }

    #[test]
    fn test_full_registry() {
        let registry = CapabilityRegistry::with_all_capabilities();
        assert!(registry.is_active(AP2_MANDATE_CAPABILITY));
        assert!(registry.is_active(BUYER_CONSENT_CAPABILITY));
        assert_eq!(registry.capabilities().len(), 4);
    }
}
