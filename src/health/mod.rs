//! Composite health reporting.
//!
//! # Data Flow
//! ```text
//! check():
//!     for each adapter (concurrently)
//!     → breaker Open?  unhealthy, no probe
//!     → otherwise probe (if enabled), bounded by probe_timeout
//!     → per-provider status
//!     → aggregate: critical Open ⇒ Unhealthy, any other problem ⇒ Degraded
//!
//! spawn_periodic():
//!     Periodic timer
//!     → check()
//!     → latest() slot
//! ```
//!
//! Health checks observe breakers but never route a call through them: a
//! probe does not count toward any breaker window.

use crate::adapter::ServiceAdapter;
use crate::resilience::CircuitState;
use arc_swap::ArcSwapOption;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    pub status: HealthStatus,
    pub breaker_state: CircuitState,
    pub critical: bool,
    /// Whether a probe ran during this check.
    pub probed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_latency_ms: Option<u64>,
    /// Latency of the most recent live call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub overall: HealthStatus,
    pub providers: BTreeMap<String, ProviderHealth>,
    pub checked_at_ms: u64,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.overall == HealthStatus::Healthy
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderHealth> {
        self.providers.get(name)
    }
}

/// Critical Open ⇒ Unhealthy; any other non-healthy provider ⇒ Degraded.
fn aggregate(providers: &BTreeMap<String, ProviderHealth>) -> HealthStatus {
    let mut overall = HealthStatus::Healthy;
    for p in providers.values() {
        if p.critical && p.breaker_state == CircuitState::Open {
            return HealthStatus::Unhealthy;
        }
        if p.status != HealthStatus::Healthy {
            overall = HealthStatus::Degraded;
        }
    }
    overall
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub struct HealthMonitor {
    adapters: Vec<Arc<ServiceAdapter>>,
    probes_enabled: bool,
    latest: ArcSwapOption<HealthReport>,
}

impl HealthMonitor {
    pub fn new(adapters: Vec<Arc<ServiceAdapter>>) -> Self {
        Self {
            adapters,
            probes_enabled: false,
            latest: ArcSwapOption::empty(),
        }
    }

    pub fn with_probes(mut self, enabled: bool) -> Self {
        self.probes_enabled = enabled;
        self
    }

    /// Most recent report produced by [`check`](Self::check).
    pub fn latest(&self) -> Option<Arc<HealthReport>> {
        self.latest.load_full()
    }

    pub async fn check(&self) -> HealthReport {
        let checks = self.adapters.iter().map(|a| self.check_one(a));
        let providers: BTreeMap<String, ProviderHealth> = join_all(checks).await.into_iter().collect();
        let overall = aggregate(&providers);
        let report = HealthReport {
            overall,
            providers,
            checked_at_ms: now_ms(),
        };
        match overall {
            HealthStatus::Healthy => tracing::debug!(overall = %overall, "health check complete"),
            _ => tracing::warn!(overall = %overall, "health check complete"),
        }
        self.latest.store(Some(Arc::new(report.clone())));
        report
    }

    async fn check_one(&self, adapter: &ServiceAdapter) -> (String, ProviderHealth) {
        let breaker_state = adapter.breaker_state();
        let observation = adapter.last_observation();
        let mut health = ProviderHealth {
            status: HealthStatus::Healthy,
            breaker_state,
            critical: adapter.is_critical(),
            probed: false,
            probe_latency_ms: None,
            last_latency_ms: observation.last_latency_ms,
            last_error: observation.last_error,
        };

        match breaker_state {
            CircuitState::Open => {
                health.status = HealthStatus::Unhealthy;
                return (adapter.provider().to_string(), health);
            }
            CircuitState::HalfOpen => health.status = HealthStatus::Degraded,
            CircuitState::Closed => {}
        }

        if self.probes_enabled {
            health.probed = true;
            match adapter.probe().await {
                Ok(latency) => {
                    health.probe_latency_ms = Some(latency.as_millis() as u64);
                    if latency > adapter.latency_threshold() {
                        tracing::warn!(
                            provider = adapter.provider(),
                            latency_ms = latency.as_millis() as u64,
                            "probe latency above threshold"
                        );
                        health.status = HealthStatus::Degraded;
                    }
                }
                Err(e) => {
                    tracing::warn!(provider = adapter.provider(), error = %e, "health probe failed");
                    health.status = HealthStatus::Degraded;
                    health.last_error = Some(e.to_string());
                }
            }
        }
        (adapter.provider().to_string(), health)
    }

    /// Re-run [`check`](Self::check) every `interval` until `shutdown` fires.
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(interval_ms = interval.as_millis() as u64, "health monitor starting");
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.check().await;
                    }
                    _ = shutdown.cancelled() => {
                        tracing::info!("health monitor stopping");
                        break;
                    }
                }
            }
        })
    }
}
