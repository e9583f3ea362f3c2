//! YAML configuration for providers, fallback chains and the shared cache.
//!
//! ```yaml
//! audit_budget_ms: 100
//! health:
//!   probes: true
//!   interval_ms: 15000
//! cache:
//!   max_entries: 5000
//!   default_ttl_ms: 60000
//! providers:
//!   openai:
//!     base_url: https://api.openai.com
//!     critical: true
//!     cacheable: true
//!   local:
//!     base_url: http://127.0.0.1:11434
//!     timeout_ms: 120000
//! chains:
//!   chat: [openai, local]
//! ```

use crate::cache::CacheConfig;
use crate::resilience::CircuitBreakerConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "AI_RESILIENCE_CONFIG";

fn default_timeout_ms() -> u64 {
    30_000
}
fn default_failure_threshold_pct() -> u32 {
    50
}
fn default_minimum_request_volume() -> u32 {
    10
}
fn default_reset_timeout_ms() -> u64 {
    30_000
}
fn default_rolling_window_ms() -> u64 {
    60_000
}
fn default_cache_ttl_ms() -> u64 {
    300_000
}
fn default_latency_threshold_ms() -> u64 {
    2_000
}
fn default_probe_timeout_ms() -> u64 {
    5_000
}
fn default_true() -> bool {
    true
}
fn default_max_entries() -> usize {
    10_000
}
fn default_max_entry_size() -> usize {
    10 * 1024 * 1024
}
fn default_audit_budget_ms() -> u64 {
    100
}
fn default_health_interval_ms() -> u64 {
    30_000
}

/// Per-provider resilience settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Used when the registry builds an [`HttpTransport`](crate::transport::HttpTransport)
    /// itself; ignored when a transport is supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_failure_threshold_pct")]
    pub failure_threshold_pct: u32,
    #[serde(default = "default_minimum_request_volume")]
    pub minimum_request_volume: u32,
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
    #[serde(default = "default_rolling_window_ms")]
    pub rolling_window_ms: u64,
    #[serde(default)]
    pub cacheable: bool,
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    /// An Open breaker on a critical provider makes the whole report unhealthy.
    #[serde(default)]
    pub critical: bool,
    #[serde(default = "default_latency_threshold_ms")]
    pub latency_threshold_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: default_timeout_ms(),
            failure_threshold_pct: default_failure_threshold_pct(),
            minimum_request_volume: default_minimum_request_volume(),
            reset_timeout_ms: default_reset_timeout_ms(),
            rolling_window_ms: default_rolling_window_ms(),
            cacheable: false,
            cache_ttl_ms: default_cache_ttl_ms(),
            critical: false,
            latency_threshold_ms: default_latency_threshold_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl ProviderConfig {
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .with_failure_threshold_pct(self.failure_threshold_pct)
            .with_minimum_request_volume(self.minimum_request_volume)
            .with_reset_timeout(Duration::from_millis(self.reset_timeout_ms))
            .with_rolling_window(Duration::from_millis(self.rolling_window_ms))
            .with_call_timeout(Duration::from_millis(self.timeout_ms))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn latency_threshold(&self) -> Duration {
        Duration::from_millis(self.latency_threshold_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    fn validate(&self, name: &str) -> Result<()> {
        let field = |f: &str| format!("providers.{}.{}", name, f);
        if !(1..=100).contains(&self.failure_threshold_pct) {
            return Err(invalid(
                field("failure_threshold_pct"),
                format!("must be within 1..=100, got {}", self.failure_threshold_pct),
            ));
        }
        if self.minimum_request_volume == 0 {
            return Err(invalid(field("minimum_request_volume"), "must be at least 1"));
        }
        for (f, v) in [
            ("timeout_ms", self.timeout_ms),
            ("reset_timeout_ms", self.reset_timeout_ms),
            ("rolling_window_ms", self.rolling_window_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
        ] {
            if v == 0 {
                return Err(invalid(field(f), "must be greater than zero"));
            }
        }
        if self.cacheable && self.cache_ttl_ms == 0 {
            return Err(invalid(field("cache_ttl_ms"), "cacheable providers need a non-zero ttl"));
        }
        Ok(())
    }
}

/// Shared response cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_cache_ttl_ms")]
    pub default_ttl_ms: u64,
    #[serde(default = "default_max_entry_size")]
    pub max_entry_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_prefix: Option<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: default_max_entries(),
            default_ttl_ms: default_cache_ttl_ms(),
            max_entry_size: default_max_entry_size(),
            key_prefix: None,
        }
    }
}

impl CacheSettings {
    pub fn cache_config(&self) -> CacheConfig {
        let cfg = CacheConfig::new()
            .with_enabled(self.enabled)
            .with_ttl(Duration::from_millis(self.default_ttl_ms))
            .with_max_entry_size(self.max_entry_size);
        match &self.key_prefix {
            Some(p) => cfg.with_key_prefix(p.clone()),
            None => cfg,
        }
    }
}

/// Health monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthSettings {
    /// Probe non-open providers during each check.
    #[serde(default)]
    pub probes: bool,
    #[serde(default = "default_health_interval_ms")]
    pub interval_ms: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            probes: false,
            interval_ms: default_health_interval_ms(),
        }
    }
}

impl HealthSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResilienceConfig {
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    /// Operation name to ordered provider names.
    #[serde(default)]
    pub chains: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub health: HealthSettings,
    #[serde(default = "default_audit_budget_ms")]
    pub audit_budget_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            providers: BTreeMap::new(),
            chains: BTreeMap::new(),
            cache: CacheSettings::default(),
            health: HealthSettings::default(),
            audit_budget_ms: default_audit_budget_ms(),
        }
    }
}

impl ResilienceConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw).map_err(|e| match e {
            Error::Yaml(inner) => Error::configuration_with_context(
                inner.to_string(),
                ErrorContext::new().with_source(path.display().to_string()),
            ),
            other => other,
        })
    }

    /// Load from the file named by `AI_RESILIENCE_CONFIG`.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).map_err(|_| {
            Error::configuration_with_context(
                format!("{} is not set", CONFIG_ENV),
                ErrorContext::new().with_source("environment"),
            )
        })?;
        Self::from_path(path)
    }

    pub fn audit_budget(&self) -> Duration {
        Duration::from_millis(self.audit_budget_ms)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, provider) in &self.providers {
            provider.validate(name)?;
        }
        if self.audit_budget_ms == 0 {
            return Err(invalid("audit_budget_ms", "must be greater than zero"));
        }
        if self.health.interval_ms == 0 {
            return Err(invalid("health.interval_ms", "must be greater than zero"));
        }
        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(invalid("cache.max_entries", "must be at least 1 when caching is enabled"));
        }
        for (operation, members) in &self.chains {
            let field = format!("chains.{}", operation);
            if members.is_empty() {
                return Err(invalid(field, "chain must name at least one provider"));
            }
            let mut seen = HashSet::new();
            for member in members {
                if !self.providers.contains_key(member) {
                    return Err(invalid(field, format!("unknown provider '{}'", member)));
                }
                if !seen.insert(member.as_str()) {
                    return Err(invalid(field, format!("provider '{}' listed twice", member)));
                }
            }
        }
        Ok(())
    }
}

fn invalid(field: impl Into<String>, details: impl Into<String>) -> Error {
    Error::configuration_with_context(
        "invalid resilience configuration",
        ErrorContext::new()
            .with_field_path(field)
            .with_details(details),
    )
}
