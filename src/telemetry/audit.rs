//! Audit trail for breaker transitions and fallback decisions.

use crate::resilience::CircuitState;
use crate::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

fn timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventKind {
    BreakerTransition {
        provider: String,
        from: CircuitState,
        to: CircuitState,
    },
    FallbackTriggered {
        operation: String,
        from_provider: String,
        /// Next provider in the chain, `None` when the failed one was last.
        to_provider: Option<String>,
        reason: String,
    },
    ChainExhausted {
        operation: String,
        attempts: usize,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: f64,
    #[serde(flatten)]
    pub kind: AuditEventKind,
}

impl AuditEvent {
    pub fn new(kind: AuditEventKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: timestamp(),
            kind,
        }
    }

    pub fn breaker_transition(provider: impl Into<String>, from: CircuitState, to: CircuitState) -> Self {
        Self::new(AuditEventKind::BreakerTransition {
            provider: provider.into(),
            from,
            to,
        })
    }

    pub fn fallback_triggered(
        operation: impl Into<String>,
        from_provider: impl Into<String>,
        to_provider: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(AuditEventKind::FallbackTriggered {
            operation: operation.into(),
            from_provider: from_provider.into(),
            to_provider,
            reason: reason.into(),
        })
    }

    pub fn chain_exhausted(operation: impl Into<String>, attempts: usize) -> Self {
        Self::new(AuditEventKind::ChainExhausted {
            operation: operation.into(),
            attempts,
        })
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            AuditEventKind::BreakerTransition { .. } => "breaker_transition",
            AuditEventKind::FallbackTriggered { .. } => "fallback_triggered",
            AuditEventKind::ChainExhausted { .. } => "chain_exhausted",
        }
    }
}

/// Destination for audit events.
///
/// Implementations may be slow or fail; callers go through
/// [`AuditDispatcher`], which bounds and swallows both.
#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn log(&self, event: AuditEvent) -> Result<()>;
}

/// Default logger: drops everything.
pub struct NoopAuditLogger;

#[async_trait]
impl AuditLogger for NoopAuditLogger {
    async fn log(&self, _event: AuditEvent) -> Result<()> {
        Ok(())
    }
}

/// Keeps the most recent `max_events` events; intended for tests and admin views.
pub struct InMemoryAuditLogger {
    events: RwLock<VecDeque<AuditEvent>>,
    max_events: usize,
}

impl InMemoryAuditLogger {
    pub fn new(max: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            max_events: max,
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .read()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.write() {
            events.clear();
        }
    }
}

#[async_trait]
impl AuditLogger for InMemoryAuditLogger {
    async fn log(&self, event: AuditEvent) -> Result<()> {
        let mut events = self.events.write().unwrap_or_else(|p| p.into_inner());
        events.push_back(event);
        while events.len() > self.max_events {
            events.pop_front();
        }
        Ok(())
    }
}

/// Writes events as structured `tracing` records under the `audit` target.
#[derive(Default)]
pub struct TracingAuditLogger;

#[async_trait]
impl AuditLogger for TracingAuditLogger {
    async fn log(&self, event: AuditEvent) -> Result<()> {
        let payload = serde_json::to_string(&event)?;
        info!(target: "audit", event = event.name(), id = event.id.as_str(), "{}", payload);
        Ok(())
    }
}

/// Fans one event out to several loggers; individual failures are ignored.
#[derive(Default)]
pub struct CompositeAuditLogger {
    loggers: Vec<Arc<dyn AuditLogger>>,
}

impl CompositeAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_logger(mut self, logger: Arc<dyn AuditLogger>) -> Self {
        self.loggers.push(logger);
        self
    }
}

#[async_trait]
impl AuditLogger for CompositeAuditLogger {
    async fn log(&self, event: AuditEvent) -> Result<()> {
        for l in &self.loggers {
            let _ = l.log(event.clone()).await;
        }
        Ok(())
    }
}

/// Emits audit events under a time budget.
///
/// A logger that errors or overruns never affects the call being audited.
#[derive(Clone)]
pub struct AuditDispatcher {
    logger: Arc<dyn AuditLogger>,
    budget: Duration,
}

impl AuditDispatcher {
    pub fn new(logger: Arc<dyn AuditLogger>, budget: Duration) -> Self {
        Self { logger, budget }
    }

    pub fn noop() -> Self {
        Self::new(Arc::new(NoopAuditLogger), Duration::from_millis(100))
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub async fn emit(&self, event: AuditEvent) {
        let name = event.name();
        match tokio::time::timeout(self.budget, self.logger.log(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(event = name, error = %e, "audit logger failed"),
            Err(_) => debug!(
                event = name,
                budget_ms = self.budget.as_millis() as u64,
                "audit logger exceeded budget"
            ),
        }
    }
}

impl Default for AuditDispatcher {
    fn default() -> Self {
        Self::noop()
    }
}
