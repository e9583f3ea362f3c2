//! Telemetry Module
//!
//! Audit events and metrics emitted by the resilience layer. Both are opt-in:
//! the defaults ([`NoopAuditLogger`], [`NoopMetricsSink`]) collect nothing.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`AuditEvent`] | Breaker transition, fallback hop or exhausted chain |
//! | [`AuditLogger`] | Trait for audit destinations |
//! | [`AuditDispatcher`] | Time-boxed, failure-swallowing front for a logger |
//! | [`InMemoryAuditLogger`] | Bounded in-memory logger for testing |
//! | [`TracingAuditLogger`] | Writes events through `tracing` |
//! | [`CompositeAuditLogger`] | Multi-destination composite logger |
//! | [`MetricsSink`] | Counter / histogram / gauge destination |
//! | [`InMemoryMetricsSink`] | In-memory sink for testing |

mod audit;
mod metrics;

pub use audit::{
    AuditDispatcher, AuditEvent, AuditEventKind, AuditLogger, CompositeAuditLogger,
    InMemoryAuditLogger, NoopAuditLogger, TracingAuditLogger,
};
pub use metrics::{InMemoryMetricsSink, Labels, MetricsSink, NoopMetricsSink};
