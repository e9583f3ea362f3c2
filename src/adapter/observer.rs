use crate::resilience::{Transition, TransitionObserver};
use crate::telemetry::{AuditDispatcher, AuditEvent, MetricsSink};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Publishes breaker transitions as audit events and a state gauge.
pub struct TelemetryObserver {
    audit: AuditDispatcher,
    metrics: Arc<dyn MetricsSink>,
}

impl TelemetryObserver {
    pub fn new(audit: AuditDispatcher, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { audit, metrics }
    }
}

#[async_trait]
impl TransitionObserver for TelemetryObserver {
    async fn on_transition(&self, breaker: &str, transition: Transition) {
        info!(
            provider = breaker,
            from = %transition.from,
            to = %transition.to,
            "circuit breaker transition"
        );
        self.metrics.set_gauge(
            "circuit_breaker_state",
            &[("provider", breaker)],
            transition.to.as_gauge(),
        );
        self.audit
            .emit(AuditEvent::breaker_transition(breaker, transition.from, transition.to))
            .await;
    }
}
