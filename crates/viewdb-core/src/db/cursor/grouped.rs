//! Module: db::cursor::grouped
//! Responsibility: paging over duplicate groups of a count-reduced view.
//! Does not own: the reduce function itself or duplicate resolution.

use crate::{
    db::{
        cursor::{Page, PageRequest, page::page_from_window},
        direction::Direction,
        plan::{KeyRange, QueryPlan, ViewPartition},
        row::{GroupRow, ViewRow},
        store::DocumentStore,
    },
    error::InternalError,
    key::CompositeKey,
    obs::sink::{GlobalMetricsSink, MetricsEvent, MetricsSink},
};
use std::{collections::VecDeque, sync::Arc};

/// Grouped rows requested per round-trip when none is configured.
pub const DEFAULT_GROUP_BATCH_SIZE: usize = 100;

///
/// GroupedDuplicatePager
///
/// Pages the documents of every key whose grouped count exceeds one.
///
/// Group counts are only an estimate of what a page will hold: rows of the
/// first group before `start_doc_id` are skipped, and documents may vanish
/// between the two scans. Each round therefore selects groups until their
/// counts cover the remaining budget, takes one group more, fetches the
/// documents for exactly those keys, and keeps going from the next group
/// until `limit + 1` rows are in hand or the groups run out.
///

#[derive(Clone)]
pub struct GroupedDuplicatePager {
    store: Arc<dyn DocumentStore>,
    group_batch: usize,
    sink: Arc<dyn MetricsSink>,
}

impl GroupedDuplicatePager {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            group_batch: DEFAULT_GROUP_BATCH_SIZE,
            sink: Arc::new(GlobalMetricsSink),
        }
    }

    /// Groups per grouped round-trip. At least two, since every follow-up
    /// fetch re-reads the last group it resumes from.
    #[must_use]
    pub fn with_group_batch(mut self, group_batch: usize) -> Self {
        self.group_batch = group_batch.max(2);
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// One page of duplicate documents from `partition`, a view with a
    /// count reduce, within `range`.
    pub async fn page(
        &self,
        partition: &ViewPartition,
        range: &KeyRange,
        direction: Direction,
        request: &PageRequest,
    ) -> Result<Page<ViewRow>, InternalError> {
        request.validate()?;

        let budget = request.limit.saturating_add(1);
        let mut scan = GroupScan::new(
            QueryPlan::for_partition(partition)
                .with_range(range, direction)
                .grouped(),
            request.start_key.clone(),
            self.group_batch,
        );
        let mut rows: Vec<ViewRow> = Vec::with_capacity(budget);
        let mut first_round = true;

        loop {
            let needed = (budget - rows.len()) as u64;
            let keys = self.select_groups(&mut scan, needed).await?;
            if keys.is_empty() {
                break;
            }

            let mut plan = QueryPlan::for_partition(partition)
                .with_keys(keys, direction)
                .with_docs(true);
            if first_round && let Some(start_key) = request.start_key.clone() {
                plan = plan.start_at(start_key, request.start_doc_id.clone());
            }
            first_round = false;

            let fetched = self.store.execute_view(&plan).await?;
            self.sink.record(MetricsEvent::ViewScan {
                rows: fetched.len() as u64,
            });
            tracing::trace!(
                view = %partition.label(),
                fetched = fetched.len(),
                held = rows.len(),
                "duplicate groups fetched"
            );

            let room = budget - rows.len();
            rows.extend(fetched.into_iter().take(room));
            if rows.len() >= budget {
                break;
            }
        }

        Ok(page_from_window(rows, request))
    }

    // Duplicate groups whose counts cover `needed`, plus the next one.
    async fn select_groups(
        &self,
        scan: &mut GroupScan,
        needed: u64,
    ) -> Result<Vec<CompositeKey>, InternalError> {
        let mut keys = Vec::new();
        let mut counted = 0_u64;

        while let Some(group) = self.next_duplicate(scan).await? {
            counted = counted.saturating_add(group.count());
            keys.push(group.key);

            if counted >= needed {
                if let Some(extra) = self.next_duplicate(scan).await? {
                    keys.push(extra.key);
                }
                break;
            }
        }

        Ok(keys)
    }

    async fn next_duplicate(&self, scan: &mut GroupScan) -> Result<Option<GroupRow>, InternalError> {
        while let Some(group) = scan.next_group(self.store.as_ref(), self.sink.as_ref()).await? {
            if group.count() > 1 {
                return Ok(Some(group));
            }
        }

        Ok(None)
    }
}

///
/// GroupScan
///
/// Batched cursor over grouped rows. Follow-up batches resume at the last
/// key already read and drop that repeated group.
///

struct GroupScan {
    plan: QueryPlan,
    resume_at: Option<CompositeKey>,
    repeated: Option<CompositeKey>,
    batch: usize,
    buffer: VecDeque<GroupRow>,
    exhausted: bool,
}

impl GroupScan {
    fn new(plan: QueryPlan, start_key: Option<CompositeKey>, batch: usize) -> Self {
        Self {
            plan,
            resume_at: start_key,
            repeated: None,
            batch,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    async fn next_group(
        &mut self,
        store: &dyn DocumentStore,
        sink: &dyn MetricsSink,
    ) -> Result<Option<GroupRow>, InternalError> {
        loop {
            if let Some(group) = self.buffer.pop_front() {
                return Ok(Some(group));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch(store, sink).await?;
        }
    }

    async fn fetch(
        &mut self,
        store: &dyn DocumentStore,
        sink: &dyn MetricsSink,
    ) -> Result<(), InternalError> {
        let mut plan = self.plan.clone().with_limit(Some(self.batch));
        if let Some(start) = self.resume_at.clone() {
            plan = plan.start_at(start, None);
        }

        let groups = store.execute_grouped(&plan).await?;
        sink.record(MetricsEvent::ViewScan {
            rows: groups.len() as u64,
        });

        self.exhausted = groups.len() < self.batch;
        let repeated = self.repeated.take();
        if let Some(last) = groups.last() {
            self.resume_at = Some(last.key.clone());
            self.repeated = Some(last.key.clone());
        }
        self.buffer.extend(
            groups
                .into_iter()
                .filter(|group| repeated.as_ref() != Some(&group.key)),
        );

        Ok(())
    }
}
