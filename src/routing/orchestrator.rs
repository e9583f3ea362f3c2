use super::FallbackChain;
use crate::telemetry::{AuditDispatcher, AuditEvent, MetricsSink, NoopMetricsSink};
use crate::transport::{CallContext, ProviderRequest, ProviderResponse};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

/// A successful chain walk, with the providers it had to skip.
#[derive(Debug)]
pub struct FallbackOutcome {
    pub response: ProviderResponse,
    pub served_by: String,
    /// Position of `served_by` in the chain.
    pub attempt_index: usize,
    /// Fallback-eligible errors from the providers tried before it, in order.
    pub skipped: Vec<Error>,
}

/// Walks a [`FallbackChain`] sequentially until one provider succeeds.
///
/// No provider is invoked twice per call and nothing is retried in the
/// background. A non-eligible error (a defective request, caller
/// cancellation) aborts the walk and is returned as-is.
#[derive(Clone)]
pub struct FallbackOrchestrator {
    audit: AuditDispatcher,
    metrics: Arc<dyn MetricsSink>,
}

impl Default for FallbackOrchestrator {
    fn default() -> Self {
        Self::new(AuditDispatcher::noop(), Arc::new(NoopMetricsSink))
    }
}

impl FallbackOrchestrator {
    pub fn new(audit: AuditDispatcher, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { audit, metrics }
    }

    pub async fn call_with_fallback(
        &self,
        chain: &FallbackChain,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse> {
        self.call_with_fallback_within(chain, request, &CallContext::unbounded())
            .await
    }

    /// As [`call_with_fallback`](Self::call_with_fallback), bounded by the
    /// caller's deadline and cancellation.
    pub async fn call_with_fallback_within(
        &self,
        chain: &FallbackChain,
        request: &ProviderRequest,
        ctx: &CallContext,
    ) -> Result<ProviderResponse> {
        self.walk(chain, request, ctx).await.map(|o| o.response)
    }

    pub async fn call_with_fallback_traced(
        &self,
        chain: &FallbackChain,
        request: &ProviderRequest,
    ) -> Result<FallbackOutcome> {
        self.walk(chain, request, &CallContext::unbounded()).await
    }

    async fn walk(
        &self,
        chain: &FallbackChain,
        request: &ProviderRequest,
        ctx: &CallContext,
    ) -> Result<FallbackOutcome> {
        let operation = chain.operation();
        let mut causes: Vec<Error> = Vec::with_capacity(chain.len());

        for (index, adapter) in chain.adapters().iter().enumerate() {
            let provider = adapter.provider();
            if ctx.is_cancelled() {
                return Err(Error::Cancelled {
                    provider: provider.to_string(),
                });
            }
            self.metrics.inc_counter(
                "fallback_attempts_total",
                &[("operation", operation), ("provider", provider)],
            );

            let span = info_span!("fallback_attempt", operation, provider, attempt = index);
            match adapter.call_within(request, ctx).instrument(span).await {
                Ok(response) => {
                    if index > 0 {
                        info!(operation, provider, attempt = index, "served by fallback provider");
                    }
                    return Ok(FallbackOutcome {
                        response,
                        served_by: provider.to_string(),
                        attempt_index: index,
                        skipped: causes,
                    });
                }
                Err(e) if e.is_fallback_eligible() => {
                    let next = chain.next(provider).map(|a| a.provider().to_string());
                    info!(
                        operation,
                        provider,
                        next = next.as_deref().unwrap_or("-"),
                        error = %e,
                        "provider failed; falling back"
                    );
                    self.audit
                        .emit(AuditEvent::fallback_triggered(operation, provider, next, e.to_string()))
                        .await;
                    causes.push(e);
                }
                Err(e) => {
                    info!(operation, provider, error = %e, "non-recoverable error; aborting chain");
                    return Err(e);
                }
            }
        }

        warn!(operation, attempts = causes.len(), "fallback chain exhausted");
        self.audit
            .emit(AuditEvent::chain_exhausted(operation, causes.len()))
            .await;
        Err(Error::AggregateFallback {
            operation: operation.to_string(),
            causes,
        })
    }
}
