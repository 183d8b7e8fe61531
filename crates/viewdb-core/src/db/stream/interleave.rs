//! Module: db::stream::interleave
//! Responsibility: k-way merge of partition row streams into one globally
//! ordered, deduplicated stream.
//! Does not own: partition scans or pagination windows.

use crate::{
    db::{
        row::ViewRow,
        stream::{
            RowStream, RowStreamBox,
            dedup::{DedupFilter, DedupMode},
            order::RowComparator,
        },
    },
    error::InternalError,
    obs::sink::{MetricsEvent, MetricsSink},
};
use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;

///
/// MergeSource
///
/// One partition stream entering the merge. Higher `priority` merges first
/// and wins comparator ties, so its copy of a duplicate is the one emitted.
///

pub struct MergeSource {
    pub label: String,
    pub priority: u16,
    pub stream: RowStreamBox,
}

impl MergeSource {
    #[must_use]
    pub fn new(label: impl Into<String>, priority: u16, stream: RowStreamBox) -> Self {
        Self {
            label: label.into(),
            priority,
            stream,
        }
    }
}

///
/// SourceSlot
///
/// Per-source lookahead state: pending row, exhaustion status and the last
/// row taken, used as the monotonicity witness.
///

struct SourceSlot {
    label: String,
    stream: RowStreamBox,
    pending: Option<ViewRow>,
    done: bool,
    last: Option<ViewRow>,
}

impl SourceSlot {
    // Ensure one lookahead row is available for this source.
    async fn fill(&mut self, comparator: &RowComparator) -> Result<(), InternalError> {
        if self.done || self.pending.is_some() {
            return Ok(());
        }

        match self.stream.next_row().await? {
            Some(row) => {
                self.validate_monotonicity(&row, comparator)?;
                self.pending = Some(row);
            }
            None => self.done = true,
        }

        Ok(())
    }

    fn validate_monotonicity(
        &self,
        current: &ViewRow,
        comparator: &RowComparator,
    ) -> Result<(), InternalError> {
        let Some(previous) = self.last.as_ref() else {
            return Ok(());
        };
        if !comparator.violates_monotonicity(previous, current) {
            return Ok(());
        }

        Err(InternalError::merge_invariant(format!(
            "merge invariant violated: source {} emitted out-of-order row for {} merge (previous: {} {}, current: {} {})",
            self.label,
            comparator.order_label(),
            previous.key,
            previous.id,
            current.key,
            current.id,
        )))
    }

    fn take(&mut self) -> Option<ViewRow> {
        let row = self.pending.take()?;
        self.last = Some(row.clone());

        Some(row)
    }
}

///
/// InterleaveRowStream
///
/// Pull-based k-way merge. Holds at most one pending row per source; the
/// first pull primes every source concurrently, later pulls refill only the
/// source that supplied the previous row.
///

pub struct InterleaveRowStream {
    slots: Vec<SourceSlot>,
    comparator: RowComparator,
    dedup: DedupFilter,
    primed: bool,
    drained: Option<usize>,
    finished: bool,
    sink: Option<Arc<dyn MetricsSink>>,
}

impl InterleaveRowStream {
    /// Build a merge over `sources`.
    ///
    /// Sources are ordered by descending priority (stable for equal
    /// priorities). Id-based dedup over two sources of equal priority has no
    /// defined winner and is rejected.
    pub fn new(
        mut sources: Vec<MergeSource>,
        comparator: RowComparator,
        dedup: DedupMode,
    ) -> Result<Self, InternalError> {
        sources.sort_by(|left, right| right.priority.cmp(&left.priority));

        if dedup.needs_priority()
            && let Some(pair) = sources
                .windows(2)
                .find(|pair| pair[0].priority == pair[1].priority)
        {
            tracing::warn!(
                left = %pair[0].label,
                right = %pair[1].label,
                priority = pair[0].priority,
                dedup = %dedup,
                "ambiguous merge priority"
            );
            return Err(InternalError::merge_invariant(format!(
                "merge priority is ambiguous for {dedup} dedup: sources {} and {} share priority {}",
                pair[0].label, pair[1].label, pair[0].priority
            )));
        }

        let slots = sources
            .into_iter()
            .map(|source| SourceSlot {
                label: source.label,
                stream: source.stream,
                pending: None,
                done: false,
                last: None,
            })
            .collect();

        Ok(Self {
            slots,
            comparator,
            dedup: DedupFilter::new(dedup),
            primed: false,
            drained: None,
            finished: false,
            sink: None,
        })
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Rows dropped by deduplication so far.
    #[must_use]
    pub const fn suppressed(&self) -> u64 {
        self.dedup.suppressed()
    }

    async fn refill(&mut self) -> Result<(), InternalError> {
        let comparator = &self.comparator;
        if !self.primed {
            try_join_all(self.slots.iter_mut().map(|slot| slot.fill(comparator))).await?;
            self.primed = true;
        } else if let Some(idx) = self.drained {
            // cleared only once the refill lands, so a failed fetch is retried
            self.slots[idx].fill(comparator).await?;
            self.drained = None;
        }

        Ok(())
    }

    // Index of the slot holding the smallest pending row; earlier slots win ties.
    fn min_slot(&self) -> Option<usize> {
        let mut best: Option<(usize, &ViewRow)> = None;
        for (idx, slot) in self.slots.iter().enumerate() {
            let Some(row) = slot.pending.as_ref() else {
                continue;
            };
            match best {
                Some((_, current)) if !self.comparator.compare(row, current).is_lt() => {}
                _ => best = Some((idx, row)),
            }
        }

        best.map(|(idx, _)| idx)
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(sink) = self.sink.as_ref() {
            sink.record(MetricsEvent::MergeDedup {
                suppressed: self.dedup.suppressed(),
            });
        }
    }
}

#[async_trait]
impl RowStream for InterleaveRowStream {
    async fn next_row(&mut self) -> Result<Option<ViewRow>, InternalError> {
        loop {
            self.refill().await?;

            let Some(idx) = self.min_slot() else {
                self.finish();
                return Ok(None);
            };
            let Some(row) = self.slots[idx].take() else {
                return Err(InternalError::merge_invariant(
                    "merge invariant violated: selected source has no pending row",
                ));
            };
            self.drained = Some(idx);

            if self.dedup.admit(&row) {
                return Ok(Some(row));
            }
        }
    }
}
