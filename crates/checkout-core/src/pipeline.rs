//! Extension Pipeline
//!
//! Capability-scoped filters composed around store mutations. Each extension
//! declares the capability it belongs to; the pipeline consults the
//! [`CapabilityRegistry`](crate::capability::CapabilityRegistry) and skips
//! extensions whose capability was not negotiated. An inactive extension is
//! a complete no-op.
//!
//! Hook order: `before_mutation` hooks run before the store applies an
//! update (they shape what gets stored); `after_mutation` hooks run on the
//! checkout returned to the caller (they enrich the response, e.g. signing);
//! `before_complete` hooks gate completion requests.

use std::sync::Arc;

use crate::capability::CapabilityRegistry;
use crate::error::Result;
use crate::model::{Checkout, CheckoutMessage, CheckoutUpdate, CompleteRequest};

/// A capability extension hooked into the mutation flow.
///
/// All hooks default to no-ops; an extension implements only the hook points
/// its capability needs. Extensions may enrich the checkout handed to them
/// but never persist state themselves - the store is the single authority.
pub trait CheckoutExtension: Send + Sync {
    /// Capability this extension belongs to
    fn capability(&self) -> &str;

    /// Runs before the store applies the update. May rewrite the update and
    /// append messages that the store will attach to the checkout.
    fn before_mutation(
        &self,
        update: &mut CheckoutUpdate,
        current: Option<&Checkout>,
        messages: &mut Vec<CheckoutMessage>,
    ) -> Result<()> {
        let _ = (update, current, messages);
        Ok(())
    }

    /// Runs on the checkout returned to the caller, after the store mutation
    /// (and on reads, so every response carries the same enrichment).
    fn after_mutation(&self, checkout: &mut Checkout) -> Result<()> {
        let _ = checkout;
        Ok(())
    }

    /// Runs before a completion request reaches the store
    fn before_complete(&self, request: &CompleteRequest, current: &Checkout) -> Result<()> {
        let _ = (request, current);
        Ok(())
    }
}

/// Ordered composition of extensions over a negotiated capability set
pub struct ExtensionPipeline {
    registry: Arc<CapabilityRegistry>,
    extensions: Vec<Arc<dyn CheckoutExtension>>,
}

impl ExtensionPipeline {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            extensions: Vec::new(),
        }
    }

    /// Register an extension. Registration order is composition order.
    pub fn register(&mut self, extension: Arc<dyn CheckoutExtension>) {
        self.extensions.push(extension);
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Active extensions in registration order
    fn active(&self) -> impl Iterator<Item = &Arc<dyn CheckoutExtension>> {
        self.extensions
            .iter()
            .filter(|e| self.registry.is_active(e.capability()))
    }

    pub fn before_mutation(
        &self,
        update: &mut CheckoutUpdate,
        current: Option<&Checkout>,
        messages: &mut Vec<CheckoutMessage>,
    ) -> Result<()> {
        for extension in self.active() {
            tracing::debug!(capability = extension.capability(), "pre-mutation hook");
            extension.before_mutation(update, current, messages)?;
        }
        Ok(())
    }

    pub fn after_mutation(&self, checkout: &mut Checkout) -> Result<()> {
        for extension in self.active() {
            extension.after_mutation(checkout)?;
        }
        Ok(())
    }

    pub fn before_complete(&self, request: &CompleteRequest, current: &Checkout) -> Result<()> {
        for extension in self.active() {
            tracing::debug!(capability = extension.capability(), "pre-complete hook");
            extension.before_complete(request, current)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Capability, CapabilityRegistry, DISCOUNT_CAPABILITY};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingExtension {
        capability: String,
        calls: AtomicUsize,
    }

    impl CheckoutExtension for CountingExtension {
        fn capability(&self) -> &str {
            &self.capability
        }

        fn before_mutation(
            &self,
            _update: &mut CheckoutUpdate,
            _current: Option<&Checkout>,
            _messages: &mut Vec<CheckoutMessage>,
        ) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_inactive_extension_never_runs() {
        let registry = Arc::new(CapabilityRegistry::new());
        let mut pipeline = ExtensionPipeline::new(registry);

        let extension = Arc::new(CountingExtension {
            capability: DISCOUNT_CAPABILITY.into(),
            calls: AtomicUsize::new(0),
        });
        pipeline.register(extension.clone());

        let mut update = CheckoutUpdate::default();
        let mut messages = Vec::new();
        pipeline.before_mutation(&mut update, None, &mut messages).unwrap();

        assert_eq!(extension.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_active_extension_runs_once_per_mutation() {
        let mut registry = CapabilityRegistry::new();
        registry.enable(Capability::new(DISCOUNT_CAPABILITY));
        let mut pipeline = ExtensionPipeline::new(Arc::new(registry));

        let extension = Arc::new(CountingExtension {
            capability: DISCOUNT_CAPABILITY.into(),
            calls: AtomicUsize::new(0),
        });
        pipeline.register(extension.clone());

        let mut update = CheckoutUpdate::default();
        let mut messages = Vec::new();
        pipeline.before_mutation(&mut update, None, &mut messages).unwrap();
        pipeline.before_mutation(&mut update, None, &mut messages).unwrap();

        assert_eq!(extension.calls.load(Ordering::SeqCst), 2);
    }
}
