use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    sync::{LazyLock, Mutex, PoisonError},
};

///
/// EventState
/// Ephemeral, process-global counters for data-access operations.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct EventState {
    pub(crate) ops: EventOps,
    pub(crate) entities: BTreeMap<String, EntityCounters>,
    pub(crate) since_ms: i64,
}

impl Default for EventState {
    fn default() -> Self {
        Self {
            ops: EventOps::default(),
            entities: BTreeMap::new(),
            since_ms: crate::db::persist::now_millis(),
        }
    }
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventOps {
    // Cache
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_evictions: u64,

    // Store round-trips
    pub store_reads: u64,
    pub store_writes: u64,
    pub view_scans: u64,

    // Rows
    pub rows_scanned: u64,
    pub rows_deduplicated: u64,
    pub rows_written: u64,

    // Failures
    pub write_conflicts: u64,
    pub design_conflicts: u64,
    pub design_writes: u64,
}

///
/// EntityCounters
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EntityCounters {
    pub reads: u64,
    pub saves: u64,
    pub removes: u64,
    pub purges: u64,
    pub conflicts: u64,
}

///
/// EventReport
/// Point-in-time copy of the global counters.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    pub ops: EventOps,
    pub entities: BTreeMap<String, EntityCounters>,
    pub since_ms: i64,
}

static EVENT_STATE: LazyLock<Mutex<EventState>> =
    LazyLock::new(|| Mutex::new(EventState::default()));

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    let mut state = EVENT_STATE.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut state)
}

/// Reset all counters.
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

/// Snapshot the counters.
pub(crate) fn report() -> EventReport {
    with_state_mut(|m| EventReport {
        ops: m.ops.clone(),
        entities: m.entities.clone(),
        since_ms: m.since_ms,
    })
}
