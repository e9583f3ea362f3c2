//! Connectivity report
//!
//! Loads a resilience configuration, builds the registry with HTTP transports
//! for every provider that has a `base_url`, probes them and prints the
//! composite health report as JSON.
//!
//! Usage:
//!   AI_RESILIENCE_CONFIG=resilience.yaml cargo run --example connectivity_report
//! Or with API keys set (env var `{PROVIDER}_API_KEY`):
//!   OPENAI_API_KEY="..." cargo run --example connectivity_report -- resilience.yaml

use ai_lib_resilience::config::ResilienceConfig;
use ai_lib_resilience::health::HealthStatus;
use ai_lib_resilience::registry::ProviderRegistry;
use ai_lib_resilience::telemetry::{NoopMetricsSink, TracingAuditLogger};
use std::collections::HashMap;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = match std::env::args().nth(1) {
        Some(path) => ResilienceConfig::from_path(path)?,
        None => ResilienceConfig::from_env()?,
    };
    config.health.probes = true;

    let registry = ProviderRegistry::from_config(
        config,
        HashMap::new(),
        Arc::new(TracingAuditLogger),
        Arc::new(NoopMetricsSink),
    )?;

    let report = registry.health().await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    println!("\n=== Summary ===");
    for (name, p) in &report.providers {
        let mark = match p.status {
            HealthStatus::Healthy => "ok",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "down",
        };
        let latency = p
            .probe_latency_ms
            .map(|ms| format!("{}ms", ms))
            .unwrap_or_else(|| "-".to_string());
        println!("  {:<16} {:<9} probe={}", name, mark, latency);
        if let Some(err) = &p.last_error {
            println!("    error: {}", err);
        }
    }
    println!("\nOverall: {}", report.overall);

    if report.overall == HealthStatus::Unhealthy {
        std::process::exit(1);
    }
    Ok(())
}
