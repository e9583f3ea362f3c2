//! Metrics sink abstraction.
//!
//! # Metrics
//! - `provider_calls_total` (counter): calls by provider and outcome
//! - `provider_call_duration_ms` (histogram): adapter-observed latency
//! - `circuit_breaker_state` (gauge): 0=closed, 1=open, 2=half_open
//! - `fallback_attempts_total` (counter): chain attempts by operation and provider
//!
//! Updates are synchronous and cheap; exporters that need I/O should buffer.

use std::collections::BTreeMap;
use std::sync::Mutex;

pub type Labels<'a> = &'a [(&'a str, &'a str)];

pub trait MetricsSink: Send + Sync {
    fn inc_counter(&self, name: &str, labels: Labels<'_>);
    fn observe_histogram(&self, name: &str, labels: Labels<'_>, value: f64);
    fn set_gauge(&self, name: &str, labels: Labels<'_>, value: f64);
}

pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn inc_counter(&self, _: &str, _: Labels<'_>) {}
    fn observe_histogram(&self, _: &str, _: Labels<'_>, _: f64) {}
    fn set_gauge(&self, _: &str, _: Labels<'_>, _: f64) {}
}

/// Series key: metric name plus `k=v` labels in sorted order.
fn series(name: &str, labels: Labels<'_>) -> String {
    let mut pairs: Vec<_> = labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    pairs.sort();
    if pairs.is_empty() {
        name.to_string()
    } else {
        format!("{}{{{}}}", name, pairs.join(","))
    }
}

#[derive(Default)]
struct Registry {
    counters: BTreeMap<String, u64>,
    histograms: BTreeMap<String, Vec<f64>>,
    gauges: BTreeMap<String, f64>,
}

/// Keeps every series in memory; for tests and local inspection.
///
/// Series are addressed as `name{k=v,...}` with labels sorted by key.
#[derive(Default)]
pub struct InMemoryMetricsSink {
    inner: Mutex<Registry>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str, labels: Labels<'_>) -> u64 {
        self.with(|r| r.counters.get(&series(name, labels)).copied().unwrap_or(0))
    }

    pub fn gauge(&self, name: &str, labels: Labels<'_>) -> Option<f64> {
        self.with(|r| r.gauges.get(&series(name, labels)).copied())
    }

    pub fn observations(&self, name: &str, labels: Labels<'_>) -> Vec<f64> {
        self.with(|r| r.histograms.get(&series(name, labels)).cloned().unwrap_or_default())
    }

    fn with<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut guard)
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn inc_counter(&self, name: &str, labels: Labels<'_>) {
        self.with(|r| *r.counters.entry(series(name, labels)).or_insert(0) += 1);
    }

    fn observe_histogram(&self, name: &str, labels: Labels<'_>, value: f64) {
        self.with(|r| r.histograms.entry(series(name, labels)).or_default().push(value));
    }

    fn set_gauge(&self, name: &str, labels: Labels<'_>, value: f64) {
        self.with(|r| {
            r.gauges.insert(series(name, labels), value);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_ignore_label_order() {
        let sink = InMemoryMetricsSink::new();
        sink.inc_counter("calls", &[("provider", "a"), ("outcome", "ok")]);
        sink.inc_counter("calls", &[("outcome", "ok"), ("provider", "a")]);
        assert_eq!(sink.counter("calls", &[("provider", "a"), ("outcome", "ok")]), 2);
        assert_eq!(sink.counter("calls", &[("provider", "b"), ("outcome", "ok")]), 0);
    }

    #[test]
    fn test_gauge_overwrites_and_histogram_accumulates() {
        let sink = InMemoryMetricsSink::new();
        sink.set_gauge("state", &[("provider", "a")], 1.0);
        sink.set_gauge("state", &[("provider", "a")], 2.0);
        sink.observe_histogram("latency", &[], 3.0);
        sink.observe_histogram("latency", &[], 5.0);
        assert_eq!(sink.gauge("state", &[("provider", "a")]), Some(2.0));
        assert_eq!(sink.observations("latency", &[]), vec![3.0, 5.0]);
    }
}
