use crate::{
    db::{
        direction::Direction,
        plan::{KeyRange, KeySelection, ViewPartition},
    },
    key::CompositeKey,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

///
/// QueryPlan
///
/// One store-level view query. `start_key`/`end_key` are in scan order, so a
/// descending plan starts at the high end. `end_key` is inclusive.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct QueryPlan {
    pub design_doc_id: String,
    pub view: String,
    pub partition: Option<String>,
    pub start_key: Option<CompositeKey>,
    pub start_doc_id: Option<String>,
    pub end_key: Option<CompositeKey>,
    pub keys: Option<Vec<CompositeKey>>,
    pub direction: Direction,
    pub limit: Option<usize>,
    pub include_docs: bool,
    pub reduce: bool,
    pub group: bool,
}

impl QueryPlan {
    #[must_use]
    pub fn new(design_doc_id: impl Into<String>, view: impl Into<String>) -> Self {
        Self {
            design_doc_id: design_doc_id.into(),
            view: view.into(),
            partition: None,
            start_key: None,
            start_doc_id: None,
            end_key: None,
            keys: None,
            direction: Direction::Asc,
            limit: None,
            include_docs: false,
            reduce: false,
            group: false,
        }
    }

    #[must_use]
    pub fn for_partition(partition: &ViewPartition) -> Self {
        let mut plan = Self::new(partition.design_doc_id.clone(), partition.view.clone());
        plan.partition.clone_from(&partition.partition);

        plan
    }

    /// Apply a logical range in this plan's direction.
    #[must_use]
    pub fn with_range(mut self, range: &KeyRange, direction: Direction) -> Self {
        self.direction = direction;
        match direction {
            Direction::Asc => {
                self.start_key.clone_from(&range.from);
                self.end_key.clone_from(&range.to);
            }
            Direction::Desc => {
                self.start_key.clone_from(&range.to);
                self.end_key.clone_from(&range.from);
            }
        }

        self
    }

    #[must_use]
    pub fn with_keys(mut self, keys: Vec<CompositeKey>, direction: Direction) -> Self {
        self.direction = direction;
        self.keys = Some(keys);
        self
    }

    /// Resume at `(start_key, start_doc_id)`; `None` id admits every id at the key.
    #[must_use]
    pub fn start_at(mut self, start_key: CompositeKey, start_doc_id: Option<String>) -> Self {
        if let Some(keys) = self.keys.as_mut() {
            let direction = self.direction;
            keys.retain(|key| !is_before(direction, key, &start_key));
        }
        self.start_key = Some(start_key);
        self.start_doc_id = start_doc_id;
        self
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub const fn with_docs(mut self, include_docs: bool) -> Self {
        self.include_docs = include_docs;
        self
    }

    /// Reduce and group by full key.
    #[must_use]
    pub const fn grouped(mut self) -> Self {
        self.reduce = true;
        self.group = true;
        self.include_docs = false;
        self
    }

    /// Whether a row at `(key, id)` falls inside this plan, start condition included.
    #[must_use]
    pub fn admits(&self, key: &CompositeKey, id: &str) -> bool {
        if let Some(keys) = self.keys.as_ref()
            && !keys.contains(key)
        {
            return false;
        }

        if let Some(start) = self.start_key.as_ref() {
            match directed_cmp(self.direction, key, start) {
                Ordering::Less => return false,
                Ordering::Equal => {
                    if let Some(start_id) = self.start_doc_id.as_deref()
                        && directed_cmp(self.direction, id, start_id).is_lt()
                    {
                        return false;
                    }
                }
                Ordering::Greater => {}
            }
        }

        if self.keys.is_none()
            && let Some(end) = self.end_key.as_ref()
            && directed_cmp(self.direction, key, end).is_gt()
        {
            return false;
        }

        true
    }
}

fn directed_cmp<T: Ord + ?Sized>(direction: Direction, left: &T, right: &T) -> Ordering {
    match direction {
        Direction::Asc => left.cmp(right),
        Direction::Desc => right.cmp(left),
    }
}

fn is_before(direction: Direction, key: &CompositeKey, start: &CompositeKey) -> bool {
    directed_cmp(direction, key, start).is_lt()
}

///
/// PartitionPlan
///
/// Query plan for one partition plus its merge priority.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PartitionPlan {
    pub label: String,
    pub priority: u16,
    pub plan: QueryPlan,
}

///
/// PartitionedQuery
///
/// One logical selection fanned out over N partitions. Every plan shares the
/// selection, direction, limit and start condition; nothing is deduplicated
/// here.
///

#[derive(Clone, Debug)]
pub struct PartitionedQuery {
    pub partitions: Vec<ViewPartition>,
    pub selection: KeySelection,
    pub direction: Direction,
    pub limit: Option<usize>,
    pub include_docs: bool,
}

impl PartitionedQuery {
    #[must_use]
    pub fn new(partitions: Vec<ViewPartition>, selection: KeySelection) -> Self {
        Self {
            partitions,
            selection,
            direction: Direction::Asc,
            limit: None,
            include_docs: true,
        }
    }

    #[must_use]
    pub const fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub const fn with_docs(mut self, include_docs: bool) -> Self {
        self.include_docs = include_docs;
        self
    }

    /// One plan per partition, from the start of the selection.
    #[must_use]
    pub fn plans(&self) -> Vec<PartitionPlan> {
        self.plans_from(None, None)
    }

    /// One plan per partition, each resuming at the same start condition.
    #[must_use]
    pub fn plans_from(
        &self,
        start_key: Option<&CompositeKey>,
        start_doc_id: Option<&str>,
    ) -> Vec<PartitionPlan> {
        self.partitions
            .iter()
            .map(|partition| {
                let plan = QueryPlan::for_partition(partition)
                    .with_docs(self.include_docs)
                    .with_limit(self.limit);
                let plan = match &self.selection {
                    KeySelection::Range(range) => plan.with_range(range, self.direction),
                    KeySelection::Keys(keys) => plan.with_keys(keys.clone(), self.direction),
                };
                let plan = match start_key {
                    Some(start_key) => {
                        plan.start_at(start_key.clone(), start_doc_id.map(str::to_string))
                    }
                    None => plan,
                };

                PartitionPlan {
                    label: partition.label(),
                    priority: partition.priority,
                    plan,
                }
            })
            .collect()
    }
}
