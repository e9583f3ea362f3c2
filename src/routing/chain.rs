use crate::adapter::ServiceAdapter;
use crate::{Error, ErrorContext, Result};
use std::collections::HashSet;
use std::sync::Arc;

/// Ordered providers able to serve one logical operation.
///
/// Immutable once built; the order is the fallback order.
#[derive(Debug, Clone)]
pub struct FallbackChain {
    operation: String,
    adapters: Vec<Arc<ServiceAdapter>>,
}

impl FallbackChain {
    pub fn new(operation: impl Into<String>, adapters: Vec<Arc<ServiceAdapter>>) -> Result<Self> {
        let operation = operation.into();
        let field = format!("chains.{}", operation);
        if adapters.is_empty() {
            return Err(Error::configuration_with_context(
                "fallback chain is empty",
                ErrorContext::new().with_field_path(field),
            ));
        }
        let mut seen = HashSet::new();
        for adapter in &adapters {
            if !seen.insert(adapter.provider()) {
                return Err(Error::configuration_with_context(
                    format!("provider '{}' appears twice in chain", adapter.provider()),
                    ErrorContext::new().with_field_path(field),
                ));
            }
        }
        Ok(Self { operation, adapters })
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn adapters(&self) -> &[Arc<ServiceAdapter>] {
        &self.adapters
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Always false for a constructed chain.
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn providers(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.provider()).collect()
    }

    /// Provider to try after `failed_provider`.
    ///
    /// `None` at the end of the chain; an unknown provider restarts from the
    /// head.
    pub fn next(&self, failed_provider: &str) -> Option<&Arc<ServiceAdapter>> {
        match self
            .adapters
            .iter()
            .position(|a| a.provider() == failed_provider)
        {
            Some(i) => self.adapters.get(i + 1),
            None => self.adapters.first(),
        }
    }
}
