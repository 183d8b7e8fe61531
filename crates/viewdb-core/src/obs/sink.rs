//! Metrics sink boundary.
//!
//! All instrumentation flows through `MetricsEvent` and `MetricsSink`.
//! Repositories hold an injectable sink; `GlobalMetricsSink` is the default
//! and the only bridge into the global counters.

use crate::obs::metrics::{self, EventReport};
use derive_more::Display;

///
/// WriteKind
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum WriteKind {
    Save,
    Remove,
    Purge,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug)]
pub enum MetricsEvent {
    CacheHit {
        entity_kind: &'static str,
    },
    CacheMiss {
        entity_kind: &'static str,
    },
    CacheEvict {
        entity_kind: &'static str,
        ids: u64,
    },
    StoreRead {
        entity_kind: &'static str,
        ids: u64,
    },
    StoreWrite {
        entity_kind: &'static str,
        kind: WriteKind,
        rows_written: u64,
        conflicts: u64,
    },
    ViewScan {
        rows: u64,
    },
    MergeDedup {
        suppressed: u64,
    },
    DesignWrite {
        conflicted: bool,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent);
}

///
/// NoopMetricsSink
///

pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record(&self, _event: MetricsEvent) {}
}

///
/// GlobalMetricsSink
/// Default process-local sink that writes into global metrics state.
///

pub struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent) {
        metrics::with_state_mut(|m| match event {
            MetricsEvent::CacheHit { entity_kind } => {
                m.ops.cache_hits = m.ops.cache_hits.saturating_add(1);
                let entry = m.entities.entry(entity_kind.to_string()).or_default();
                entry.reads = entry.reads.saturating_add(1);
            }
            MetricsEvent::CacheMiss { .. } => {
                m.ops.cache_misses = m.ops.cache_misses.saturating_add(1);
            }
            MetricsEvent::CacheEvict { ids, .. } => {
                m.ops.cache_evictions = m.ops.cache_evictions.saturating_add(ids);
            }
            MetricsEvent::StoreRead { entity_kind, ids } => {
                m.ops.store_reads = m.ops.store_reads.saturating_add(1);
                let entry = m.entities.entry(entity_kind.to_string()).or_default();
                entry.reads = entry.reads.saturating_add(ids);
            }
            MetricsEvent::StoreWrite {
                entity_kind,
                kind,
                rows_written,
                conflicts,
            } => {
                m.ops.store_writes = m.ops.store_writes.saturating_add(1);
                m.ops.rows_written = m.ops.rows_written.saturating_add(rows_written);
                m.ops.write_conflicts = m.ops.write_conflicts.saturating_add(conflicts);

                let entry = m.entities.entry(entity_kind.to_string()).or_default();
                match kind {
                    WriteKind::Save => entry.saves = entry.saves.saturating_add(rows_written),
                    WriteKind::Remove => {
                        entry.removes = entry.removes.saturating_add(rows_written);
                    }
                    WriteKind::Purge => entry.purges = entry.purges.saturating_add(rows_written),
                }
                entry.conflicts = entry.conflicts.saturating_add(conflicts);
            }
            MetricsEvent::ViewScan { rows } => {
                m.ops.view_scans = m.ops.view_scans.saturating_add(1);
                m.ops.rows_scanned = m.ops.rows_scanned.saturating_add(rows);
            }
            MetricsEvent::MergeDedup { suppressed } => {
                m.ops.rows_deduplicated = m.ops.rows_deduplicated.saturating_add(suppressed);
            }
            MetricsEvent::DesignWrite { conflicted } => {
                if conflicted {
                    m.ops.design_conflicts = m.ops.design_conflicts.saturating_add(1);
                } else {
                    m.ops.design_writes = m.ops.design_writes.saturating_add(1);
                }
            }
        });
    }
}

/// Snapshot the current global metrics state.
#[must_use]
pub fn metrics_report() -> EventReport {
    metrics::report()
}

/// Reset all global metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

///
/// TESTS
///
