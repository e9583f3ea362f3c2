//! Scripted transports shared by the integration suites.

#![allow(dead_code)]

use ai_lib_resilience::transport::{CallContext, ProviderRequest, ProviderResponse, Transport};
use ai_lib_resilience::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a scripted call does.
#[derive(Debug, Clone)]
pub enum Outcome {
    Ok(serde_json::Value),
    Status(u16),
    /// Connection-level failure.
    Network,
    /// Never answers; only a timeout or cancellation ends the call.
    Hang,
}

pub struct ScriptedTransport {
    name: String,
    script: Mutex<VecDeque<Outcome>>,
    then: Outcome,
    calls: AtomicUsize,
    probes: AtomicUsize,
    probe_delay: Duration,
    probe_fails: bool,
}

impl ScriptedTransport {
    pub fn always(name: &str, outcome: Outcome) -> Arc<Self> {
        Self::sequence(name, vec![], outcome)
    }

    /// Play `script` in order, then repeat `then` forever.
    pub fn sequence(name: &str, script: Vec<Outcome>, then: Outcome) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            then,
            calls: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            probe_delay: Duration::ZERO,
            probe_fails: false,
        })
    }

    pub fn with_probe(name: &str, delay: Duration, fails: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            then: Outcome::Ok(serde_json::json!({})),
            calls: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            probe_delay: delay,
            probe_fails: fails,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn call(&self, _request: &ProviderRequest, ctx: CallContext) -> Result<ProviderResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.then.clone());
        match outcome {
            Outcome::Ok(body) => Ok(ProviderResponse::ok(self.name.clone(), body)),
            Outcome::Status(status) => Err(Error::upstream(self.name.clone(), status, "scripted")),
            Outcome::Network => Err(Error::transport(self.name.clone(), "connection refused")),
            Outcome::Hang => {
                ctx.cancelled().await;
                Err(Error::Cancelled {
                    provider: self.name.clone(),
                })
            }
        }
    }

    async fn probe(&self, _ctx: CallContext) -> Result<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.probe_delay).await;
        if self.probe_fails {
            Err(Error::transport(self.name.clone(), "probe refused"))
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
