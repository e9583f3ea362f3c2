//! Fallback routing across providers.
//!
//! A [`FallbackChain`] names, per logical operation, the ordered providers
//! able to serve it. The [`FallbackOrchestrator`] walks a chain one provider
//! at a time, moving on only for fallback-eligible errors, and returns
//! [`Error::AggregateFallback`](crate::Error::AggregateFallback) with every
//! cause in chain order once the chain is exhausted.

mod chain;
mod orchestrator;

pub use chain::FallbackChain;
pub use orchestrator::{FallbackOrchestrator, FallbackOutcome};
