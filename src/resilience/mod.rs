//! # Resilience Primitives Module
//!
//! Per-provider circuit breakers that stop calling a failing dependency until
//! it has had time to recover.
//!
//! ## Circuit Breaker
//!
//! - **Closed**: calls pass through; outcomes feed a rolling window
//! - **Open**: failure ratio crossed the threshold, calls fail fast
//! - **Half-Open**: one trial call tests whether the provider recovered
//!
//! ```rust
//! use ai_lib_resilience::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn demo() -> ai_lib_resilience::Result<()> {
//! let config = CircuitBreakerConfig::new()
//!     .with_failure_threshold_pct(50)
//!     .with_minimum_request_volume(10)
//!     .with_reset_timeout(Duration::from_secs(30));
//! let breaker = CircuitBreaker::new("openai", config);
//!
//! let answer = breaker.execute(|_ctx| async { Ok(42) }).await?;
//! assert_eq!(answer, 42);
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState, Transition,
    TransitionObserver,
};
