//! Module: db::stream::dedup
//! Responsibility: cross-partition duplicate suppression for the interleave.

use crate::db::row::ViewRow;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

///
/// DedupMode
///
/// None       : emit every row from every partition
/// Id         : drop rows whose entity id was already emitted
/// Value      : drop rows whose value was already emitted
/// IdAndValue : drop rows whose (id, value) pair was already emitted
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
pub enum DedupMode {
    None,
    #[default]
    Id,
    Value,
    IdAndValue,
}

impl DedupMode {
    /// Modes where the winning partition decides which copy survives.
    #[must_use]
    pub const fn needs_priority(self) -> bool {
        matches!(self, Self::Id | Self::IdAndValue)
    }
}

///
/// DedupFilter
///
/// Seen-set state for one merge. Values are fingerprinted by their canonical
/// JSON text.
///

#[derive(Debug)]
pub(super) struct DedupFilter {
    mode: DedupMode,
    seen: HashSet<String>,
    seen_pairs: HashSet<(String, String)>,
    suppressed: u64,
}

impl DedupFilter {
    pub(super) fn new(mode: DedupMode) -> Self {
        Self {
            mode,
            seen: HashSet::new(),
            seen_pairs: HashSet::new(),
            suppressed: 0,
        }
    }

    // Return true when `row` must be emitted, recording it as seen.
    pub(super) fn admit(&mut self, row: &ViewRow) -> bool {
        let admitted = match self.mode {
            DedupMode::None => true,
            DedupMode::Id => self.seen.insert(row.id.clone()),
            DedupMode::Value => self.seen.insert(row.value.to_string()),
            DedupMode::IdAndValue => self
                .seen_pairs
                .insert((row.id.clone(), row.value.to_string())),
        };
        if !admitted {
            self.suppressed = self.suppressed.saturating_add(1);
        }

        admitted
    }

    pub(super) const fn suppressed(&self) -> u64 {
        self.suppressed
    }
}
