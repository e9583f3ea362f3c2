use crate::transport::CallContext;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Admission state of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding: Closed=0, Open=1, HalfOpen=2.
    pub fn as_gauge(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failure percentage (1..=100) of the rolling window that opens the breaker.
    pub failure_threshold_pct: u32,
    /// Window volume below which the breaker never opens.
    pub minimum_request_volume: u32,
    /// Time spent Open before a trial call is admitted. Fixed, no backoff.
    pub reset_timeout: Duration,
    pub rolling_window: Duration,
    /// Per-call timeout applied to every admitted operation.
    pub call_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold_pct: 50,
            minimum_request_volume: 10,
            reset_timeout: Duration::from_secs(30),
            rolling_window: Duration::from_secs(60),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold_pct(mut self, pct: u32) -> Self {
        self.failure_threshold_pct = pct;
        self
    }

    pub fn with_minimum_request_volume(mut self, volume: u32) -> Self {
        self.minimum_request_volume = volume;
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    pub fn with_rolling_window(mut self, window: Duration) -> Self {
        self.rolling_window = window;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub window_volume: u32,
    pub window_failures: u32,
    pub failure_pct: f64,
    pub failure_threshold_pct: u32,
    pub minimum_request_volume: u32,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
    pub trial_in_flight: bool,
    pub transitions: u64,
}

/// A state change, reported to the breaker's observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Receives breaker transitions after the breaker lock is released.
#[async_trait]
pub trait TransitionObserver: Send + Sync {
    async fn on_transition(&self, breaker: &str, transition: Transition);
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    /// (recorded_at, success)
    window: VecDeque<(Instant, bool)>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    transitions: u64,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            window: VecDeque::new(),
            opened_at: None,
            trial_in_flight: false,
            transitions: 0,
        }
    }

    fn evict(&mut self, now: Instant, window: Duration) {
        while let Some(&(at, _)) = self.window.front() {
            if now.saturating_duration_since(at) > window {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    fn failures(&self) -> u32 {
        self.window.iter().filter(|(_, ok)| !ok).count() as u32
    }

    fn transition(&mut self, to: CircuitState, now: Instant) -> Transition {
        let from = self.state;
        debug_assert!(
            matches!(
                (from, to),
                (CircuitState::Closed, CircuitState::Open)
                    | (CircuitState::Open, CircuitState::HalfOpen)
                    | (CircuitState::HalfOpen, CircuitState::Closed)
                    | (CircuitState::HalfOpen, CircuitState::Open)
            ),
            "invalid breaker transition {:?} -> {:?}",
            from,
            to
        );
        self.state = to;
        self.transitions += 1;
        match to {
            CircuitState::Open => {
                self.opened_at = Some(now);
                self.trial_in_flight = false;
            }
            CircuitState::HalfOpen => {
                self.trial_in_flight = true;
            }
            CircuitState::Closed => {
                self.opened_at = None;
                self.trial_in_flight = false;
                self.window.clear();
            }
        }
        Transition { from, to }
    }
}

enum Admission {
    Normal,
    Trial,
}

/// Per-provider circuit breaker over a rolling failure window.
///
/// - Closed: calls run under `call_timeout`; outcomes land in the window
/// - Open: calls are rejected without running until `reset_timeout` elapses
/// - HalfOpen: exactly one trial call is in flight; its outcome closes or
///   re-opens the breaker
///
/// All state lives behind one mutex per breaker, never held across an await.
pub struct CircuitBreaker {
    name: String,
    cfg: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    observer: Option<Arc<dyn TransitionObserver>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, cfg: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            cfg,
            inner: Mutex::new(BreakerInner::new()),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TransitionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.cfg
    }

    // The critical sections below never panic mid-update, so a poisoned
    // lock still guards consistent state.
    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Current state without triggering the lazy Open→HalfOpen move.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Run `op` through the breaker with no caller deadline.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(CallContext) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_within(&CallContext::unbounded(), op).await
    }

    /// Run `op` through the breaker, bounded by both `call_timeout` and the
    /// caller's context.
    ///
    /// On timeout the attempt's context is cancelled, its future dropped and a
    /// failure recorded. Caller cancellation records nothing, except that a
    /// cancelled trial re-opens the breaker.
    pub async fn execute_within<T, F, Fut>(&self, parent: &CallContext, op: F) -> Result<T>
    where
        F: FnOnce(CallContext) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (admission, opened_trial) = self.admit()?;
        // Armed before the first await: a caller dropping us while the
        // observer runs must not leave the trial slot taken.
        let mut guard = TrialGuard {
            breaker: self,
            armed: matches!(admission, Admission::Trial),
        };
        if let Some(t) = opened_trial {
            self.notify(t).await;
        }

        let ctx = parent.child(self.cfg.call_timeout);
        let budget = ctx.remaining().unwrap_or(self.cfg.call_timeout);
        let timeout_ms = budget.as_millis() as u64;

        let outcome = tokio::select! {
            res = tokio::time::timeout(budget, op(ctx.clone())) => match res {
                Ok(r) => r,
                Err(_) => {
                    ctx.cancel();
                    warn!(breaker = self.name.as_str(), timeout_ms, "call timed out");
                    Err(Error::Timeout { provider: self.name.clone(), timeout_ms })
                }
            },
            _ = parent.cancelled() => {
                ctx.cancel();
                Err(Error::Cancelled { provider: self.name.clone() })
            }
        };

        // Cancelled trials are settled by the guard on drop.
        let success = match &outcome {
            Ok(_) => Some(true),
            Err(Error::Cancelled { .. }) => None,
            Err(e) => Some(!e.counts_as_failure()),
        };

        if let Some(success) = success {
            guard.armed = false;
            let transition = match admission {
                Admission::Trial => self.settle_trial(success),
                Admission::Normal => self.record(success),
            };
            if let Some(t) = transition {
                self.notify(t).await;
            }
        }
        drop(guard);

        outcome
    }

    fn admit(&self) -> Result<(Admission, Option<Transition>)> {
        let now = Instant::now();
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok((Admission::Normal, None)),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.cfg.reset_timeout {
                    let t = inner.transition(CircuitState::HalfOpen, now);
                    Ok((Admission::Trial, Some(t)))
                } else {
                    Err(self.rejected())
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(self.rejected())
                } else {
                    inner.trial_in_flight = true;
                    Ok((Admission::Trial, None))
                }
            }
        }
    }

    fn rejected(&self) -> Error {
        debug!(breaker = self.name.as_str(), "call rejected by open circuit");
        Error::CircuitOpen {
            provider: self.name.clone(),
        }
    }

    /// Record an outcome admitted while Closed; may open the breaker.
    fn record(&self, success: bool) -> Option<Transition> {
        let now = Instant::now();
        let mut inner = self.lock();
        // Outcomes finishing after the breaker left Closed are stale.
        if inner.state != CircuitState::Closed {
            return None;
        }
        inner.window.push_back((now, success));
        inner.evict(now, self.cfg.rolling_window);

        let volume = inner.window.len() as u32;
        if volume < self.cfg.minimum_request_volume {
            return None;
        }
        let failures = inner.failures();
        if failures * 100 >= self.cfg.failure_threshold_pct * volume {
            info!(
                breaker = self.name.as_str(),
                volume,
                failures,
                threshold_pct = self.cfg.failure_threshold_pct,
                "circuit opened"
            );
            return Some(inner.transition(CircuitState::Open, now));
        }
        None
    }

    fn settle_trial(&self, success: bool) -> Option<Transition> {
        let now = Instant::now();
        let mut inner = self.lock();
        // An administrative reset may have closed the breaker under the trial.
        if inner.state != CircuitState::HalfOpen {
            return None;
        }
        let to = if success {
            CircuitState::Closed
        } else {
            CircuitState::Open
        };
        info!(
            breaker = self.name.as_str(),
            success,
            "trial call settled"
        );
        Some(inner.transition(to, now))
    }

    /// Force the breaker Closed with an empty window.
    ///
    /// Administrative override; not counted as a transition and not reported
    /// to the observer.
    pub fn reset(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            info!(breaker = self.name.as_str(), from = %inner.state, "circuit reset");
        }
        inner.state = CircuitState::Closed;
        inner.window.clear();
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }

    async fn notify(&self, transition: Transition) {
        if let Some(observer) = &self.observer {
            observer.on_transition(&self.name, transition).await;
        }
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.evict(now, self.cfg.rolling_window);
        let volume = inner.window.len() as u32;
        let failures = inner.failures();
        let open_remaining_ms = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(at)) => {
                let until = at + self.cfg.reset_timeout;
                if until > now {
                    Some((until - now).as_millis() as u64)
                } else {
                    Some(0)
                }
            }
            _ => None,
        };
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            window_volume: volume,
            window_failures: failures,
            failure_pct: if volume == 0 {
                0.0
            } else {
                failures as f64 * 100.0 / volume as f64
            },
            failure_threshold_pct: self.cfg.failure_threshold_pct,
            minimum_request_volume: self.cfg.minimum_request_volume,
            open_remaining_ms,
            trial_in_flight: inner.trial_in_flight,
            transitions: inner.transitions,
        }
    }
}

/// Re-opens the breaker if a trial ends without an outcome (dropped future,
/// caller cancellation, panic in the operation).
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(
                breaker = self.breaker.name.as_str(),
                "trial call abandoned; re-opening circuit"
            );
            let Some(transition) = self.breaker.settle_trial(false) else {
                return;
            };
            // Drop cannot await; hand the transition to the runtime.
            if let (Some(observer), Ok(handle)) = (
                self.breaker.observer.clone(),
                tokio::runtime::Handle::try_current(),
            ) {
                let name = self.breaker.name.clone();
                handle.spawn(async move {
                    observer.on_transition(&name, transition).await;
                });
            }
        }
    }
}
