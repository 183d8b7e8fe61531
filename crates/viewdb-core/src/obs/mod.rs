//! Observability: runtime telemetry (metrics) and sink abstractions.
//!
//! Core components never touch metrics state directly; every counter update
//! flows through a `MetricsEvent` recorded on a `MetricsSink`. Human-readable
//! diagnostics go through `tracing`.

pub(crate) mod metrics;
pub(crate) mod sink;

pub use metrics::{EntityCounters, EventOps, EventReport};
pub use sink::{
    GlobalMetricsSink, MetricsEvent, MetricsSink, NoopMetricsSink, WriteKind, metrics_report,
    metrics_reset_all,
};
