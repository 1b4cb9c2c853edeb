//! Ordered route registry.
//!
//! A registry belongs to exactly one route module and is only touched while
//! that module's declaration function runs, so it needs no locking of its own.

use std::sync::Arc;

use crate::routing::descriptor::RouteDescriptor;
use crate::routing::matcher::CompiledMatcher;

#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: Vec<Arc<RouteDescriptor>>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor, keeping declaration order.
    pub fn register(&mut self, descriptor: RouteDescriptor) {
        tracing::trace!(rule = %descriptor.rule(), endpoint = %descriptor.endpoint(), "Route registered");
        self.routes.push(Arc::new(descriptor));
    }

    /// Drop every registered descriptor.
    pub fn reset(&mut self) {
        self.routes.clear();
    }

    pub fn routes(&self) -> &[Arc<RouteDescriptor>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Freeze the current declarations into a matcher.
    pub fn compile(&self) -> CompiledMatcher {
        CompiledMatcher::new(self.routes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::HandlerResult;
    use crate::web;

    #[test]
    fn test_register_and_reset() {
        let mut registry = RouteRegistry::new();
        web!("/a").register(&mut registry, |_, _| Ok(HandlerResult::None)).unwrap();
        web!("/b").register(&mut registry, |_, _| Ok(HandlerResult::None)).unwrap();

        let rules: Vec<&str> = registry.routes().iter().map(|r| r.rule()).collect();
        assert_eq!(rules, vec!["/a", "/b"]);

        registry.reset();
        assert!(registry.is_empty());
    }
}
