//! Registry wiring from YAML and composite health reports.

mod support;

use ai_lib_resilience::config::ResilienceConfig;
use ai_lib_resilience::health::HealthStatus;
use ai_lib_resilience::registry::ProviderRegistry;
use ai_lib_resilience::resilience::CircuitState;
use ai_lib_resilience::telemetry::{
    AuditEventKind, InMemoryAuditLogger, InMemoryMetricsSink, NoopAuditLogger, NoopMetricsSink,
};
use ai_lib_resilience::transport::{ProviderRequest, Transport};
use ai_lib_resilience::Error;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use support::{Outcome, ScriptedTransport};
use tokio_util::sync::CancellationToken;

const CONFIG: &str = r#"
health:
  probes: true
providers:
  primary:
    critical: true
    minimum_request_volume: 2
    failure_threshold_pct: 50
    reset_timeout_ms: 10000
    latency_threshold_ms: 200
  secondary:
    cacheable: true
    cache_ttl_ms: 60000
    latency_threshold_ms: 200
  archive:
    latency_threshold_ms: 200
chains:
  chat: [primary, secondary]
  lookup: [secondary, archive]
"#;

fn transports(entries: Vec<(&str, Arc<ScriptedTransport>)>) -> HashMap<String, Arc<dyn Transport>> {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v as Arc<dyn Transport>))
        .collect()
}

fn build(
    entries: Vec<(&str, Arc<ScriptedTransport>)>,
) -> (ProviderRegistry, Arc<InMemoryAuditLogger>, Arc<InMemoryMetricsSink>) {
    let audit = Arc::new(InMemoryAuditLogger::new(100));
    let metrics = Arc::new(InMemoryMetricsSink::new());
    let registry = ProviderRegistry::from_config(
        ResilienceConfig::from_yaml_str(CONFIG).unwrap(),
        transports(entries),
        audit.clone(),
        metrics.clone(),
    )
    .unwrap();
    (registry, audit, metrics)
}

#[tokio::test]
async fn test_registry_routes_through_configured_chain() {
    let primary = ScriptedTransport::always("primary", Outcome::Status(500));
    let secondary = ScriptedTransport::always("secondary", Outcome::Ok(json!({"ok": true})));
    let archive = ScriptedTransport::always("archive", Outcome::Ok(json!({})));
    let (registry, audit, _) = build(vec![
        ("primary", primary.clone()),
        ("secondary", secondary.clone()),
        ("archive", archive.clone()),
    ]);

    assert_eq!(registry.chain("chat").unwrap().providers(), vec!["primary", "secondary"]);
    let resp = registry.call("chat", &ProviderRequest::new("/v1/chat", json!({}))).await.unwrap();
    assert_eq!(resp.provider, "secondary");
    assert_eq!((primary.calls(), secondary.calls(), archive.calls()), (1, 1, 0));
    assert!(audit
        .events()
        .iter()
        .any(|e| matches!(&e.kind, AuditEventKind::FallbackTriggered { from_provider, .. } if from_provider == "primary")));
}

#[tokio::test]
async fn test_unknown_operation_is_configuration_error() {
    let (registry, _, _) = build(vec![
        ("primary", ScriptedTransport::always("primary", Outcome::Ok(json!({})))),
        ("secondary", ScriptedTransport::always("secondary", Outcome::Ok(json!({})))),
        ("archive", ScriptedTransport::always("archive", Outcome::Ok(json!({})))),
    ]);
    let err = registry
        .call("embed", &ProviderRequest::new("/v1/embed", json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
}

#[test]
fn test_missing_transport_without_base_url_rejected() {
    let err = ProviderRegistry::from_config(
        ResilienceConfig::from_yaml_str(CONFIG).unwrap(),
        transports(vec![("primary", ScriptedTransport::always("primary", Outcome::Network))]),
        Arc::new(NoopAuditLogger),
        Arc::new(NoopMetricsSink),
    )
    .unwrap_err();
    assert!(err.to_string().contains("no transport for provider"));
}

#[tokio::test]
async fn test_base_url_builds_http_transport() {
    let config = ResilienceConfig::from_yaml_str(
        "providers:\n  local:\n    base_url: http://127.0.0.1:11434\nchains:\n  chat: [local]\n",
    )
    .unwrap();
    let registry = ProviderRegistry::from_config(
        config,
        HashMap::new(),
        Arc::new(NoopAuditLogger),
        Arc::new(NoopMetricsSink),
    )
    .unwrap();
    assert!(registry.adapter("local").is_some());
    assert_eq!(registry.cache().backend_name(), "memory");
}

#[tokio::test(start_paused = true)]
async fn test_health_report_aggregates_breakers_and_probes() {
    let primary = ScriptedTransport::always("primary", Outcome::Ok(json!({})));
    let secondary = ScriptedTransport::with_probe("secondary", Duration::from_millis(500), false);
    let archive = ScriptedTransport::with_probe("archive", Duration::ZERO, true);
    let (registry, _, _) = build(vec![
        ("primary", primary.clone()),
        ("secondary", secondary.clone()),
        ("archive", archive.clone()),
    ]);

    let report = registry.health().await;
    assert_eq!(report.overall, HealthStatus::Degraded);
    assert_eq!(report.provider("primary").unwrap().status, HealthStatus::Healthy);

    let slow = report.provider("secondary").unwrap();
    assert_eq!(slow.status, HealthStatus::Degraded);
    assert_eq!(slow.probe_latency_ms, Some(500));

    let failing = report.provider("archive").unwrap();
    assert_eq!(failing.status, HealthStatus::Degraded);
    assert!(failing.last_error.as_deref().unwrap().contains("probe refused"));

    assert_eq!(registry.monitor().latest().unwrap().checked_at_ms, report.checked_at_ms);
    // probes never touch breaker windows
    assert_eq!(registry.adapter("secondary").unwrap().snapshot().window_volume, 0);
}

#[tokio::test(start_paused = true)]
async fn test_critical_open_breaker_makes_report_unhealthy() {
    let primary = ScriptedTransport::always("primary", Outcome::Status(503));
    let secondary = ScriptedTransport::always("secondary", Outcome::Ok(json!({})));
    let archive = ScriptedTransport::always("archive", Outcome::Ok(json!({})));
    let (registry, audit, metrics) = build(vec![
        ("primary", primary.clone()),
        ("secondary", secondary),
        ("archive", archive),
    ]);
    let adapter = registry.adapter("primary").unwrap();
    let req = ProviderRequest::new("/v1/chat", json!({}));
    for _ in 0..2 {
        let _ = adapter.call(&req).await;
    }
    assert_eq!(adapter.breaker_state(), CircuitState::Open);

    let report = registry.health().await;
    assert_eq!(report.overall, HealthStatus::Unhealthy);
    let p = report.provider("primary").unwrap();
    assert_eq!(p.status, HealthStatus::Unhealthy);
    assert!(!p.probed, "open providers are not probed");
    assert_eq!(primary.probes(), 0);

    assert_eq!(metrics.gauge("circuit_breaker_state", &[("provider", "primary")]), Some(1.0));
    assert!(audit.events().iter().any(|e| matches!(
        &e.kind,
        AuditEventKind::BreakerTransition { provider, from: CircuitState::Closed, to: CircuitState::Open }
            if provider == "primary"
    )));
}

#[tokio::test(start_paused = true)]
async fn test_periodic_monitor_refreshes_latest_report() {
    let (registry, _, _) = build(vec![
        ("primary", ScriptedTransport::always("primary", Outcome::Ok(json!({})))),
        ("secondary", ScriptedTransport::always("secondary", Outcome::Ok(json!({})))),
        ("archive", ScriptedTransport::always("archive", Outcome::Ok(json!({})))),
    ]);
    assert!(registry.monitor().latest().is_none());

    let shutdown = CancellationToken::new();
    let handle = registry.spawn_health_monitor(shutdown.clone());
    tokio::time::sleep(Duration::from_millis(10)).await;

    let report = registry.monitor().latest().expect("first tick runs immediately");
    assert_eq!(report.overall, HealthStatus::Healthy);

    shutdown.cancel();
    handle.await.unwrap();
}
