//! # ai-lib-resilience
//!
//! Resilient call orchestration for applications that depend on several
//! request-response providers: hosted model APIs, source-control APIs, local
//! inference servers.
//!
//! ## Overview
//!
//! Each provider sits behind a [`ServiceAdapter`](adapter::ServiceAdapter) that
//! combines a cache-aside [`ResponseCache`](cache::ResponseCache), a
//! per-provider [`CircuitBreaker`](resilience::CircuitBreaker) and a
//! [`Transport`](transport::Transport). Adapters are grouped into ordered
//! [`FallbackChain`](routing::FallbackChain)s per logical operation, and a
//! [`HealthMonitor`](health::HealthMonitor) reports composite health without
//! routing through the call path.
//!
//! ## Key Features
//!
//! - **Circuit breaking**: rolling-window failure percentage, single trial call
//!   in half-open, per-call timeouts with cooperative cancellation
//! - **Fallback chains**: sequential, no provider invoked twice, every cause
//!   kept in [`Error::AggregateFallback`]
//! - **Response caching**: SHA-256 fingerprints over normalised parameters,
//!   TTL + LRU memory backend, backend failures bypassed
//! - **Health**: breaker state plus optional concurrent probes, aggregated with
//!   critical-provider awareness
//! - **Telemetry**: audit events and metrics through pluggable sinks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_lib_resilience::config::ResilienceConfig;
//! use ai_lib_resilience::registry::ProviderRegistry;
//! use ai_lib_resilience::telemetry::{NoopMetricsSink, TracingAuditLogger};
//! use ai_lib_resilience::transport::ProviderRequest;
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> ai_lib_resilience::Result<()> {
//!     let config = ResilienceConfig::from_path("resilience.yaml")?;
//!     let registry = ProviderRegistry::from_config(
//!         config,
//!         HashMap::new(),
//!         Arc::new(TracingAuditLogger),
//!         Arc::new(NoopMetricsSink),
//!     )?;
//!
//!     let request = ProviderRequest::new("/v1/chat/completions", serde_json::json!({"model": "m"}));
//!     let response = registry.call("chat", &request).await?;
//!     println!("served by {}", response.provider);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`resilience`] | Circuit breaker |
//! | [`cache`] | Response caching with pluggable backends |
//! | [`transport`] | Provider transport contract and HTTP transport |
//! | [`adapter`] | Per-provider cache → breaker → transport path |
//! | [`routing`] | Fallback chains and the orchestrator |
//! | [`health`] | Composite health reports |
//! | [`telemetry`] | Audit events and metrics sinks |
//! | [`config`] | YAML configuration and validation |
//! | [`registry`] | Startup wiring of all of the above |

pub mod adapter;
pub mod cache;
pub mod config;
pub mod error_code;
pub mod health;
pub mod registry;
pub mod resilience;
pub mod routing;
pub mod telemetry;
pub mod transport;

// Re-export main types for convenience
pub use adapter::ServiceAdapter;
pub use config::ResilienceConfig;
pub use registry::ProviderRegistry;
pub use routing::{FallbackChain, FallbackOrchestrator};
pub use transport::{CallContext, ProviderRequest, ProviderResponse, Transport};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
