use crate::db::{
    direction::Direction,
    plan::{KeyRange, KeySelection},
    stream::{DedupMode, RowComparator},
};
use crate::key::CompositeKey;

///
/// ListQuery
///
/// Caller-facing description of one list/find operation: which logical index,
/// which keys, in which order, and how duplicates across partitions collapse.
/// Partitions are resolved from the entity kind's view table.
///

#[derive(Clone, Debug)]
pub struct ListQuery {
    pub index: String,
    pub selection: KeySelection,
    pub direction: Direction,
    pub comparator: Option<RowComparator>,
    pub dedup: DedupMode,
    pub include_docs: bool,
}

impl ListQuery {
    #[must_use]
    pub fn range(index: impl Into<String>, range: KeyRange) -> Self {
        Self {
            index: index.into(),
            selection: KeySelection::Range(range),
            direction: Direction::Asc,
            comparator: None,
            dedup: DedupMode::Id,
            include_docs: true,
        }
    }

    #[must_use]
    pub fn keys(index: impl Into<String>, keys: Vec<CompositeKey>) -> Self {
        Self {
            selection: KeySelection::Keys(keys),
            ..Self::range(index, KeyRange::all())
        }
    }

    #[must_use]
    pub const fn descending(mut self) -> Self {
        self.direction = Direction::Desc;
        self
    }

    #[must_use]
    pub const fn with_dedup(mut self, dedup: DedupMode) -> Self {
        self.dedup = dedup;
        self
    }

    #[must_use]
    pub fn with_comparator(mut self, comparator: RowComparator) -> Self {
        self.comparator = Some(comparator);
        self
    }

    #[must_use]
    pub const fn without_docs(mut self) -> Self {
        self.include_docs = false;
        self
    }

    /// Effective comparator: explicit, or key-then-id in query direction.
    #[must_use]
    pub fn resolved_comparator(&self) -> RowComparator {
        self.comparator
            .clone()
            .unwrap_or(RowComparator::KeyThenId(self.direction))
    }
}
