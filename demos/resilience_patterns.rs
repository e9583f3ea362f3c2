//! Resilience Patterns Example
//!
//! Demonstrates the three call-path patterns with in-process fake providers:
//! - Circuit breaker isolating a failing provider
//! - Fallback chain substituting an alternative provider
//! - Cache-aside responses for repeatable requests
//!
//! Usage:
//!   RUST_LOG=info cargo run --example resilience_patterns

use ai_lib_resilience::adapter::ServiceAdapter;
use ai_lib_resilience::cache::{CacheConfig, MemoryCache, ResponseCache};
use ai_lib_resilience::resilience::CircuitBreakerConfig;
use ai_lib_resilience::routing::{FallbackChain, FallbackOrchestrator};
use ai_lib_resilience::telemetry::{AuditDispatcher, InMemoryAuditLogger, NoopMetricsSink};
use ai_lib_resilience::transport::{CallContext, ProviderRequest, ProviderResponse, Transport};
use ai_lib_resilience::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fails every call with 503 while `down` is set.
struct FakeProvider {
    name: &'static str,
    down: bool,
    calls: AtomicU32,
}

impl FakeProvider {
    fn new(name: &'static str, down: bool) -> Arc<Self> {
        Arc::new(Self { name, down, calls: AtomicU32::new(0) })
    }
}

#[async_trait]
impl Transport for FakeProvider {
    async fn call(&self, request: &ProviderRequest, _ctx: CallContext) -> Result<ProviderResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(20)).await;
        if self.down {
            return Err(Error::upstream(self.name, 503, "service unavailable"));
        }
        Ok(ProviderResponse::ok(
            self.name,
            serde_json::json!({"endpoint": request.endpoint, "call": n}),
        ))
    }

    fn name(&self) -> &str {
        self.name
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== AI-Lib Resilience Patterns Demo ===\n");

    demo_circuit_breaker().await;
    demo_fallback_chain().await?;
    demo_cache_aside().await?;
    Ok(())
}

async fn demo_circuit_breaker() {
    println!("--- Example 1: Circuit Breaker ---\n");

    let provider = FakeProvider::new("flaky", true);
    let adapter = ServiceAdapter::builder("flaky", provider.clone())
        .with_breaker_config(
            CircuitBreakerConfig::new()
                .with_minimum_request_volume(4)
                .with_failure_threshold_pct(50)
                .with_reset_timeout(Duration::from_secs(5)),
        )
        .build();

    println!("Breaker: opens at >=50% failures over >=4 calls, 5s reset\n");
    let req = ProviderRequest::new("/v1/chat", serde_json::json!({}));
    for i in 1..=6 {
        match adapter.call(&req).await {
            Ok(_) => println!("Request {}: ok", i),
            Err(e) => println!("Request {}: {} (state: {})", i, e, adapter.breaker_state()),
        }
    }
    println!(
        "\nUpstream saw {} calls; the rest were rejected locally.\n",
        provider.calls.load(Ordering::SeqCst)
    );
}

async fn demo_fallback_chain() -> Result<()> {
    println!("--- Example 2: Fallback Chain ---\n");

    let audit = Arc::new(InMemoryAuditLogger::new(50));
    let orchestrator = FallbackOrchestrator::new(
        AuditDispatcher::new(audit.clone(), Duration::from_millis(50)),
        Arc::new(NoopMetricsSink),
    );
    let chain = FallbackChain::new(
        "chat",
        vec![
            Arc::new(ServiceAdapter::builder("primary", FakeProvider::new("primary", true)).build()),
            Arc::new(ServiceAdapter::builder("secondary", FakeProvider::new("secondary", false)).build()),
        ],
    )?;

    let outcome = orchestrator
        .call_with_fallback_traced(&chain, &ProviderRequest::new("/v1/chat", serde_json::json!({})))
        .await?;
    println!("Served by: {} (attempt {})", outcome.served_by, outcome.attempt_index + 1);
    for cause in &outcome.skipped {
        println!("  skipped: {}", cause);
    }
    println!("Audit events recorded: {}\n", audit.len());
    Ok(())
}

async fn demo_cache_aside() -> Result<()> {
    println!("--- Example 3: Cache-Aside Responses ---\n");

    let cache = Arc::new(ResponseCache::new(
        CacheConfig::default(),
        Box::new(MemoryCache::new(1_000)),
    ));
    let provider = FakeProvider::new("github", false);
    let adapter = ServiceAdapter::builder("github", provider.clone())
        .with_cache(cache.clone())
        .cacheable(Duration::from_secs(60))
        .build();

    let req = ProviderRequest::get("/repos/acme/widgets");
    for i in 1..=3 {
        let resp = adapter.call(&req).await?;
        println!("Request {}: cached={} body={}", i, resp.cached, resp.body);
    }
    let stats = cache.stats();
    println!(
        "\nUpstream calls: {}, cache hit ratio: {:.0}%",
        provider.calls.load(Ordering::SeqCst),
        stats.hit_ratio() * 100.0
    );
    Ok(())
}
