//! # Response Caching Module
//!
//! Cache-aside storage for provider responses, so repeatable requests do not
//! hit the upstream twice within a TTL.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResponseCache`] | Cache-aside front with TTLs, statistics and failure bypass |
//! | [`CacheConfig`] | Enablement, default TTL, entry size limit, key prefix |
//! | [`CacheBackend`] | Trait for implementing custom cache backends |
//! | [`MemoryCache`] | Bounded in-memory LRU backend with lazy expiry |
//! | [`NullCache`] | No-op backend for disabling caching |
//! | [`CacheKeyGenerator`] | Fingerprints provider + endpoint + normalised params |
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_resilience::cache::{CacheConfig, CacheKeyGenerator, MemoryCache, ResponseCache};
//! use std::time::Duration;
//!
//! # async fn demo() -> ai_lib_resilience::Result<()> {
//! let cache = ResponseCache::new(CacheConfig::default(), Box::new(MemoryCache::new(1000)));
//! let key = CacheKeyGenerator::new().generate(
//!     "github",
//!     "/repos/acme/widgets",
//!     &serde_json::json!({"per_page": 50}),
//! );
//! let repo: String = cache
//!     .get_or_compute(&key, Duration::from_secs(60), || async { Ok("widgets".to_string()) })
//!     .await?;
//! assert_eq!(repo, "widgets");
//! # Ok(())
//! # }
//! ```
//!
//! Concurrent misses on one key are not coalesced; each caller computes.

mod backend;
mod key;
mod manager;

pub use backend::{CacheBackend, MemoryCache, NullCache};
pub use key::{CacheKey, CacheKeyGenerator};
pub use manager::{CacheConfig, CacheStats, Cached, ResponseCache};
