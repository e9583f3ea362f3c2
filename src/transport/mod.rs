//! Provider transport contract.
//!
//! The orchestration layer never speaks a provider's wire format. Each provider
//! is reached through a [`Transport`] that performs exactly one request under a
//! [`CallContext`] (deadline plus cancellation token). [`HttpTransport`] covers
//! the common JSON-over-HTTP case; anything else can implement the trait.

mod http;

pub use http::HttpTransport;

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deadline and cancellation signal handed to a transport for one attempt.
///
/// Dropping the attempt's future cancels it; transports that hand work to
/// other tasks should also watch [`CallContext::cancelled`].
#[derive(Debug, Clone)]
pub struct CallContext {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl CallContext {
    /// A context with no deadline that is never cancelled unless asked to.
    pub fn unbounded() -> Self {
        Self {
            deadline: None,
            token: CancellationToken::new(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            token: CancellationToken::new(),
        }
    }

    /// Derive a child context bounded by both the parent deadline and `timeout`.
    ///
    /// Cancelling the parent cancels the child; cancelling the child leaves the
    /// parent untouched.
    pub fn child(&self, timeout: Duration) -> Self {
        let own = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < own => parent,
            _ => own,
        };
        Self {
            deadline: Some(deadline),
            token: self.token.child_token(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the context is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// One provider-agnostic request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// Path relative to the provider base URL (e.g. `/v1/chat/completions`).
    pub endpoint: String,
    /// HTTP-style verb; transports that are not HTTP may ignore it.
    pub method: String,
    /// Opaque request parameters; also the input to the cache fingerprint.
    pub params: serde_json::Value,
    pub headers: BTreeMap<String, String>,
    /// Per-request cache opt-out. `Some(false)` bypasses the response cache
    /// even when the provider is configured as cacheable.
    pub cacheable: Option<bool>,
}

impl ProviderRequest {
    pub fn new(endpoint: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: "POST".to_string(),
            params,
            headers: BTreeMap::new(),
            cacheable: None,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(endpoint, serde_json::Value::Null).with_method("GET")
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().to_uppercase();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = Some(cacheable);
        self
    }
}

/// Successful provider response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Provider that produced the body.
    pub provider: String,
    pub status: u16,
    pub body: serde_json::Value,
    /// True when served from the response cache rather than a live call.
    #[serde(default)]
    pub cached: bool,
}

impl ProviderResponse {
    pub fn new(provider: impl Into<String>, status: u16, body: serde_json::Value) -> Self {
        Self {
            provider: provider.into(),
            status,
            body,
            cached: false,
        }
    }

    pub fn ok(provider: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(provider, 200, body)
    }
}

/// Single-call contract every provider is reached through.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one upstream request. Implementations should stop work once
    /// `ctx` is cancelled and should not outlive its deadline.
    async fn call(&self, request: &ProviderRequest, ctx: CallContext) -> Result<ProviderResponse>;

    /// Lightweight liveness probe used by the health monitor.
    async fn probe(&self, ctx: CallContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    fn name(&self) -> &str;
}
