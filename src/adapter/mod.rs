//! Per-provider call path: response cache in front of a circuit breaker in
//! front of a transport.
//!
//! ```text
//! call(request)
//!   └─ cacheable? ── ResponseCache::lookup_or_compute(key, ttl, ..)
//!                       └─ CircuitBreaker::execute_within(ctx, ..)
//!                             └─ Transport::call(request, ctx)
//! ```

mod observer;

pub use observer::TelemetryObserver;

use crate::cache::{CacheConfig, CacheKeyGenerator, NullCache, ResponseCache};
use crate::config::ProviderConfig;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState};
use crate::telemetry::{AuditDispatcher, MetricsSink, NoopMetricsSink};
use crate::transport::{CallContext, ProviderRequest, ProviderResponse, Transport};
use crate::Result;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Call counters for one adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdapterStats {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub cache_hits: u64,
    pub rejected: u64,
}

#[derive(Default)]
struct AtomicAdapterStats {
    calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    cache_hits: AtomicU64,
    rejected: AtomicU64,
}

impl AtomicAdapterStats {
    fn snapshot(&self) -> AdapterStats {
        AdapterStats {
            calls: self.calls.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Most recent live outcome seen by the adapter, read by the health monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Observation {
    pub last_latency_ms: Option<u64>,
    pub last_error: Option<String>,
}

pub struct ServiceAdapterBuilder {
    provider: String,
    transport: Arc<dyn Transport>,
    breaker: CircuitBreakerConfig,
    cache: Option<Arc<ResponseCache>>,
    keys: CacheKeyGenerator,
    cacheable: bool,
    cache_ttl: Duration,
    critical: bool,
    latency_threshold: Duration,
    probe_timeout: Duration,
    audit: Option<AuditDispatcher>,
    metrics: Arc<dyn MetricsSink>,
}

impl ServiceAdapterBuilder {
    pub fn with_breaker_config(mut self, cfg: CircuitBreakerConfig) -> Self {
        self.breaker = cfg;
        self
    }

    /// Share a response cache; without one, caching is off for this adapter.
    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_key_generator(mut self, keys: CacheKeyGenerator) -> Self {
        self.keys = keys;
        self
    }

    pub fn cacheable(mut self, ttl: Duration) -> Self {
        self.cacheable = true;
        self.cache_ttl = ttl;
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn with_latency_threshold(mut self, threshold: Duration) -> Self {
        self.latency_threshold = threshold;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_audit(mut self, audit: AuditDispatcher) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Apply breaker, cache, health and probe settings from configuration.
    pub fn with_provider_config(self, cfg: &ProviderConfig) -> Self {
        let builder = self
            .with_breaker_config(cfg.breaker_config())
            .critical(cfg.critical)
            .with_latency_threshold(cfg.latency_threshold())
            .with_probe_timeout(cfg.probe_timeout());
        if cfg.cacheable {
            builder.cacheable(cfg.cache_ttl())
        } else {
            builder
        }
    }

    pub fn build(self) -> ServiceAdapter {
        let observer = TelemetryObserver::new(
            self.audit.unwrap_or_default(),
            self.metrics.clone(),
        );
        let breaker = CircuitBreaker::new(self.provider.clone(), self.breaker)
            .with_observer(Arc::new(observer));
        self.metrics.set_gauge(
            "circuit_breaker_state",
            &[("provider", self.provider.as_str())],
            CircuitState::Closed.as_gauge(),
        );
        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(ResponseCache::new(
                CacheConfig::new().with_enabled(false),
                Box::new(NullCache::new()),
            ))
        });
        ServiceAdapter {
            provider: self.provider,
            breaker,
            cache,
            keys: self.keys,
            transport: self.transport,
            cacheable: self.cacheable,
            cache_ttl: self.cache_ttl,
            critical: self.critical,
            latency_threshold: self.latency_threshold,
            probe_timeout: self.probe_timeout,
            metrics: self.metrics,
            stats: AtomicAdapterStats::default(),
            observation: Mutex::new(Observation::default()),
        }
    }
}

/// Resilient front for one provider.
///
/// Owns the provider's breaker; shares the response cache with every other
/// adapter in the registry.
pub struct ServiceAdapter {
    provider: String,
    breaker: CircuitBreaker,
    cache: Arc<ResponseCache>,
    keys: CacheKeyGenerator,
    transport: Arc<dyn Transport>,
    cacheable: bool,
    cache_ttl: Duration,
    critical: bool,
    latency_threshold: Duration,
    probe_timeout: Duration,
    metrics: Arc<dyn MetricsSink>,
    stats: AtomicAdapterStats,
    observation: Mutex<Observation>,
}

impl ServiceAdapter {
    pub fn builder(provider: impl Into<String>, transport: Arc<dyn Transport>) -> ServiceAdapterBuilder {
        ServiceAdapterBuilder {
            provider: provider.into(),
            transport,
            breaker: CircuitBreakerConfig::default(),
            cache: None,
            keys: CacheKeyGenerator::new(),
            cacheable: false,
            cache_ttl: Duration::from_secs(300),
            critical: false,
            latency_threshold: Duration::from_secs(2),
            probe_timeout: Duration::from_secs(5),
            audit: None,
            metrics: Arc::new(NoopMetricsSink),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }

    pub fn latency_threshold(&self) -> Duration {
        self.latency_threshold
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        self.breaker.snapshot()
    }

    pub fn stats(&self) -> AdapterStats {
        self.stats.snapshot()
    }

    pub fn last_observation(&self) -> Observation {
        self.observation
            .lock()
            .map(|o| o.clone())
            .unwrap_or_default()
    }

    fn is_cacheable(&self, request: &ProviderRequest) -> bool {
        self.cacheable && request.cacheable != Some(false)
    }

    pub async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        self.call_within(request, &CallContext::unbounded()).await
    }

    /// Serve `request` from cache when allowed, else through the breaker.
    ///
    /// Errors are already classified into the provider taxonomy.
    pub async fn call_within(
        &self,
        request: &ProviderRequest,
        parent: &CallContext,
    ) -> Result<ProviderResponse> {
        let started = Instant::now();
        self.stats.calls.fetch_add(1, Ordering::Relaxed);

        let result = if self.is_cacheable(request) {
            let key = self
                .keys
                .generate(&self.provider, &request.endpoint, &request.params);
            self.cache
                .lookup_or_compute(&key, self.cache_ttl, || self.invoke(request, parent))
                .await
                .map(|c| {
                    let mut response = c.value;
                    response.cached = c.hit;
                    response
                })
        } else {
            self.invoke(request, parent).await
        };

        self.observe(&result, started.elapsed());
        result
    }

    async fn invoke(&self, request: &ProviderRequest, parent: &CallContext) -> Result<ProviderResponse> {
        let transport = &self.transport;
        let provider = self.provider.as_str();
        self.breaker
            .execute_within(parent, |ctx| async move {
                transport
                    .call(request, ctx)
                    .await
                    .map_err(|e| e.classify_for(provider))
            })
            .await
    }

    fn observe(&self, result: &Result<ProviderResponse>, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as u64;
        let outcome = match result {
            Ok(r) if r.cached => {
                self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                "cache_hit"
            }
            Ok(_) => {
                self.stats.successes.fetch_add(1, Ordering::Relaxed);
                "ok"
            }
            Err(crate::Error::CircuitOpen { .. }) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                "circuit_open"
            }
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                e.kind()
            }
        };
        debug!(provider = self.provider.as_str(), outcome, duration_ms = elapsed_ms, "provider call finished");

        let labels = [("provider", self.provider.as_str()), ("outcome", outcome)];
        self.metrics.inc_counter("provider_calls_total", &labels);
        // Abandoned trials re-open the breaker without an observer callback.
        self.metrics.set_gauge(
            "circuit_breaker_state",
            &[("provider", self.provider.as_str())],
            self.breaker.state().as_gauge(),
        );

        // Cache hits and rejections never reached the provider.
        if matches!(outcome, "cache_hit" | "circuit_open") {
            return;
        }
        self.metrics.observe_histogram(
            "provider_call_duration_ms",
            &[("provider", self.provider.as_str())],
            elapsed_ms as f64,
        );
        if let Ok(mut obs) = self.observation.lock() {
            obs.last_latency_ms = Some(elapsed_ms);
            obs.last_error = result.as_ref().err().map(|e| e.to_string());
        }
    }

    /// Liveness probe bounded by `probe_timeout`; returns the probe latency.
    ///
    /// Goes straight to the transport: the breaker is neither consulted nor
    /// updated.
    pub async fn probe(&self) -> Result<Duration> {
        let started = Instant::now();
        let ctx = CallContext::with_timeout(self.probe_timeout);
        match tokio::time::timeout(self.probe_timeout, self.transport.probe(ctx.clone())).await {
            Ok(res) => res
                .map(|()| started.elapsed())
                .map_err(|e| e.classify_for(&self.provider)),
            Err(_) => {
                ctx.cancel();
                Err(crate::Error::Timeout {
                    provider: self.provider.clone(),
                    timeout_ms: self.probe_timeout.as_millis() as u64,
                })
            }
        }
    }
}

impl std::fmt::Debug for ServiceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAdapter")
            .field("provider", &self.provider)
            .field("transport", &self.transport.name())
            .field("state", &self.breaker.state())
            .field("cacheable", &self.cacheable)
            .field("critical", &self.critical)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::telemetry::InMemoryMetricsSink;
    use crate::Error;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    /// Scripted transport: pops one outcome per call, then repeats the last.
    struct Scripted {
        outcomes: Mutex<Vec<std::result::Result<serde_json::Value, u16>>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl Scripted {
        fn new(outcomes: Vec<std::result::Result<serde_json::Value, u16>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(vec![Ok(json!({}))]),
                calls: AtomicUsize::new(0),
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn call(&self, _: &ProviderRequest, _: CallContext) -> Result<ProviderResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = {
                let mut outcomes = self.outcomes.lock().unwrap();
                if outcomes.len() > 1 {
                    outcomes.remove(0)
                } else {
                    outcomes[0].clone()
                }
            };
            match next {
                Ok(body) => Ok(ProviderResponse::ok("scripted", body)),
                Err(status) => Err(Error::upstream("scripted", status, "scripted failure")),
            }
        }

        async fn probe(&self, _: CallContext) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            Ok(())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn shared_cache() -> Arc<ResponseCache> {
        Arc::new(ResponseCache::new(CacheConfig::default(), Box::new(MemoryCache::new(64))))
    }

    #[tokio::test]
    async fn test_cacheable_request_served_once() {
        let transport = Scripted::new(vec![Ok(json!({"id": 1}))]);
        let adapter = ServiceAdapter::builder("github", transport.clone())
            .with_cache(shared_cache())
            .cacheable(Duration::from_secs(60))
            .build();
        let req = ProviderRequest::get("/repos/acme/widgets");

        let first = adapter.call(&req).await.unwrap();
        let second = adapter.call(&req).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(second.body, json!({"id": 1}));
        assert_eq!(transport.calls(), 1);
        assert_eq!(adapter.stats().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_request_opt_out_bypasses_cache() {
        let transport = Scripted::new(vec![Ok(json!({}))]);
        let adapter = ServiceAdapter::builder("github", transport.clone())
            .with_cache(shared_cache())
            .cacheable(Duration::from_secs(60))
            .build();
        let req = ProviderRequest::get("/events").with_cacheable(false);
        adapter.call(&req).await.unwrap();
        adapter.call(&req).await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_non_cacheable_adapter_never_caches() {
        let transport = Scripted::new(vec![Ok(json!({}))]);
        let adapter = ServiceAdapter::builder("openai", transport.clone())
            .with_cache(shared_cache())
            .build();
        let req = ProviderRequest::new("/v1/chat/completions", json!({"model": "m"}));
        adapter.call(&req).await.unwrap();
        adapter.call(&req).await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_open_breaker_and_short_circuit() {
        let transport = Scripted::new(vec![Err(503)]);
        let metrics = Arc::new(InMemoryMetricsSink::new());
        let adapter = ServiceAdapter::builder("flaky", transport.clone())
            .with_breaker_config(CircuitBreakerConfig::new().with_minimum_request_volume(3))
            .with_metrics(metrics.clone())
            .build();
        let req = ProviderRequest::new("/v1/x", json!({}));

        for _ in 0..3 {
            assert!(matches!(adapter.call(&req).await, Err(Error::Upstream { status: 503, .. })));
        }
        assert_eq!(adapter.breaker_state(), CircuitState::Open);
        assert!(matches!(adapter.call(&req).await, Err(Error::CircuitOpen { .. })));
        assert_eq!(transport.calls(), 3);

        assert_eq!(metrics.gauge("circuit_breaker_state", &[("provider", "flaky")]), Some(1.0));
        assert_eq!(
            metrics.counter("provider_calls_total", &[("provider", "flaky"), ("outcome", "upstream")]),
            3
        );
        assert_eq!(
            metrics.counter("provider_calls_total", &[("provider", "flaky"), ("outcome", "circuit_open")]),
            1
        );
        let stats = adapter.stats();
        assert_eq!((stats.calls, stats.failures, stats.rejected), (4, 3, 1));
        assert!(adapter.last_observation().last_error.unwrap().contains("503"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_call_is_not_cached() {
        let transport = Scripted::new(vec![Err(500), Ok(json!({"ok": true}))]);
        let adapter = ServiceAdapter::builder("p", transport.clone())
            .with_cache(shared_cache())
            .cacheable(Duration::from_secs(60))
            .build();
        let req = ProviderRequest::get("/status");
        assert!(adapter.call(&req).await.is_err());
        let res = adapter.call(&req).await.unwrap();
        assert!(!res.cached);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_bounded_and_bypasses_breaker() {
        let transport = Scripted::slow(Duration::from_secs(10));
        let adapter = ServiceAdapter::builder("slow", transport.clone())
            .with_probe_timeout(Duration::from_millis(500))
            .build();
        let err = adapter.probe().await.unwrap_err();
        assert!(matches!(err, Error::Timeout { timeout_ms: 500, .. }));
        assert_eq!(adapter.snapshot().window_volume, 0);
        assert_eq!(adapter.stats().calls, 0);
    }
}
