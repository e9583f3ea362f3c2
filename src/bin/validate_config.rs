//! Validate a resilience configuration file and print what it resolves to.
//!
//! Usage: `validate_config [PATH]`; without PATH the file named by
//! `AI_RESILIENCE_CONFIG` is used. Exits non-zero on any configuration error.

use ai_lib_resilience::config::{ResilienceConfig, CONFIG_ENV};
use anyhow::Context;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let path = match std::env::args().nth(1) {
        Some(p) => p,
        None => std::env::var(CONFIG_ENV)
            .with_context(|| format!("no path given and {} is not set", CONFIG_ENV))?,
    };
    tracing::info!(path = path.as_str(), "validating configuration");

    let config = ResilienceConfig::from_path(&path)
        .with_context(|| format!("invalid configuration in {}", path))?;

    println!("=== Providers ===");
    for (name, p) in &config.providers {
        println!(
            "  {:<16} timeout={}ms threshold={}% volume={} reset={}ms window={}ms{}{}",
            name,
            p.timeout_ms,
            p.failure_threshold_pct,
            p.minimum_request_volume,
            p.reset_timeout_ms,
            p.rolling_window_ms,
            if p.cacheable {
                format!(" cache_ttl={}ms", p.cache_ttl_ms)
            } else {
                String::new()
            },
            if p.critical { " critical" } else { "" },
        );
    }

    println!("\n=== Chains ===");
    for (operation, members) in &config.chains {
        println!("  {:<16} {}", operation, members.join(" -> "));
    }

    println!(
        "\n=== Cache ===\n  enabled={} max_entries={} default_ttl={}ms",
        config.cache.enabled, config.cache.max_entries, config.cache.default_ttl_ms
    );

    let orphans: Vec<_> = config
        .providers
        .keys()
        .filter(|p| !config.chains.values().any(|c| c.contains(p)))
        .collect();
    if !orphans.is_empty() {
        tracing::warn!(?orphans, "providers not referenced by any chain");
    }

    println!("\nConfiguration OK");
    Ok(())
}
