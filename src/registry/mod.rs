//! Provider registry: the explicit, startup-built wiring of adapters, chains,
//! the shared cache and the health monitor.
//!
//! Everything is constructed once by [`ProviderRegistry::from_config`] and then
//! shared read-only; there is no global lookup and no lazy registration.

use crate::adapter::ServiceAdapter;
use crate::cache::{MemoryCache, NullCache, ResponseCache};
use crate::config::ResilienceConfig;
use crate::health::{HealthMonitor, HealthReport};
use crate::routing::{FallbackChain, FallbackOrchestrator, FallbackOutcome};
use crate::telemetry::{AuditDispatcher, AuditLogger, MetricsSink};
use crate::transport::{CallContext, HttpTransport, ProviderRequest, ProviderResponse, Transport};
use crate::{Error, ErrorContext, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct ProviderRegistry {
    config: ResilienceConfig,
    cache: Arc<ResponseCache>,
    adapters: BTreeMap<String, Arc<ServiceAdapter>>,
    chains: BTreeMap<String, FallbackChain>,
    orchestrator: FallbackOrchestrator,
    monitor: Arc<HealthMonitor>,
}

impl ProviderRegistry {
    /// Build every adapter and chain named by `config`.
    ///
    /// A provider without an entry in `transports` gets an [`HttpTransport`]
    /// for its `base_url`; a provider with neither is a configuration error.
    pub fn from_config(
        config: ResilienceConfig,
        mut transports: HashMap<String, Arc<dyn Transport>>,
        audit: Arc<dyn AuditLogger>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        config.validate()?;

        let audit = AuditDispatcher::new(audit, config.audit_budget());
        let cache_backend: Box<dyn crate::cache::CacheBackend> = if config.cache.enabled {
            Box::new(MemoryCache::new(config.cache.max_entries))
        } else {
            Box::new(NullCache::new())
        };
        let cache = Arc::new(ResponseCache::new(config.cache.cache_config(), cache_backend));

        let mut adapters = BTreeMap::new();
        for (name, provider) in &config.providers {
            let transport = match (transports.remove(name), &provider.base_url) {
                (Some(t), _) => t,
                (None, Some(url)) => Arc::new(HttpTransport::new(name.clone(), url)?) as Arc<dyn Transport>,
                (None, None) => {
                    return Err(Error::configuration_with_context(
                        format!("no transport for provider '{}'", name),
                        ErrorContext::new()
                            .with_field_path(format!("providers.{}.base_url", name))
                            .with_details("supply a transport or set base_url"),
                    ))
                }
            };
            let adapter = ServiceAdapter::builder(name.clone(), transport)
                .with_provider_config(provider)
                .with_cache(cache.clone())
                .with_audit(audit.clone())
                .with_metrics(metrics.clone())
                .build();
            adapters.insert(name.clone(), Arc::new(adapter));
        }

        if let Some(extra) = transports.keys().next() {
            tracing::warn!(provider = extra.as_str(), "transport supplied for unconfigured provider; ignored");
        }

        let mut chains = BTreeMap::new();
        for (operation, members) in &config.chains {
            let members = members
                .iter()
                .map(|m| {
                    adapters
                        .get(m)
                        .cloned()
                        .ok_or_else(|| Error::configuration(format!("unknown provider '{}'", m)))
                })
                .collect::<Result<Vec<_>>>()?;
            chains.insert(operation.clone(), FallbackChain::new(operation.clone(), members)?);
        }

        let monitor = HealthMonitor::new(adapters.values().cloned().collect())
            .with_probes(config.health.probes);

        tracing::info!(
            providers = adapters.len(),
            chains = chains.len(),
            cache = cache.backend_name(),
            "provider registry ready"
        );

        Ok(Self {
            orchestrator: FallbackOrchestrator::new(audit, metrics),
            monitor: Arc::new(monitor),
            config,
            cache,
            adapters,
            chains,
        })
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn adapter(&self, provider: &str) -> Option<&Arc<ServiceAdapter>> {
        self.adapters.get(provider)
    }

    pub fn adapters(&self) -> impl Iterator<Item = &Arc<ServiceAdapter>> {
        self.adapters.values()
    }

    pub fn chain(&self, operation: &str) -> Option<&FallbackChain> {
        self.chains.get(operation)
    }

    pub fn orchestrator(&self) -> &FallbackOrchestrator {
        &self.orchestrator
    }

    fn require_chain(&self, operation: &str) -> Result<&FallbackChain> {
        self.chain(operation).ok_or_else(|| {
            Error::configuration_with_context(
                format!("no fallback chain for operation '{}'", operation),
                ErrorContext::new().with_field_path(format!("chains.{}", operation)),
            )
        })
    }

    /// Serve `request` through the chain configured for `operation`.
    pub async fn call(&self, operation: &str, request: &ProviderRequest) -> Result<ProviderResponse> {
        let chain = self.require_chain(operation)?;
        self.orchestrator.call_with_fallback(chain, request).await
    }

    pub async fn call_within(
        &self,
        operation: &str,
        request: &ProviderRequest,
        ctx: &CallContext,
    ) -> Result<ProviderResponse> {
        let chain = self.require_chain(operation)?;
        self.orchestrator
            .call_with_fallback_within(chain, request, ctx)
            .await
    }

    pub async fn call_traced(&self, operation: &str, request: &ProviderRequest) -> Result<FallbackOutcome> {
        let chain = self.require_chain(operation)?;
        self.orchestrator.call_with_fallback_traced(chain, request).await
    }

    pub async fn health(&self) -> HealthReport {
        self.monitor.check().await
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    /// Start the periodic health monitor at the configured interval.
    pub fn spawn_health_monitor(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        self.monitor
            .clone()
            .spawn_periodic(self.config.health.interval(), shutdown)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.adapters.keys().collect::<Vec<_>>())
            .field("chains", &self.chains.keys().collect::<Vec<_>>())
            .finish()
    }
}
