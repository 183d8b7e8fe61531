//! Module: db::stream::order
//! Responsibility: comparator policy for ordered row streams.
//! Boundary: centralizes ASC/DESC and tie-break behavior for the interleave
//! and for continuation filtering.

use crate::{
    db::{direction::Direction, row::ViewRow},
    key::CompositeKey,
};
use std::{cmp::Ordering, fmt, sync::Arc};

type CustomCompare = dyn Fn(&ViewRow, &ViewRow) -> Ordering + Send + Sync;

///
/// RowComparator
///
/// Ordering shared by every stream entering one merge.
///
/// `KeyThenId` matches the store's own row order and is the only policy
/// under which continuation cursors resume exactly inside a tied-key group.
/// `Key` leaves tied keys to merge priority. `Custom` must be consistent with
/// the order each partition scan produces.
///

#[derive(Clone)]
pub enum RowComparator {
    KeyThenId(Direction),
    Key(Direction),
    Custom(Arc<CustomCompare>),
}

impl RowComparator {
    #[must_use]
    pub fn custom<F>(compare: F) -> Self
    where
        F: Fn(&ViewRow, &ViewRow) -> Ordering + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(compare))
    }

    /// Compare two rows under this policy.
    #[must_use]
    pub fn compare(&self, left: &ViewRow, right: &ViewRow) -> Ordering {
        match self {
            Self::KeyThenId(direction) => {
                directed(*direction, left.key.cmp(&right.key).then_with(|| left.id.cmp(&right.id)))
            }
            Self::Key(direction) => directed(*direction, left.key.cmp(&right.key)),
            Self::Custom(compare) => compare(left, right),
        }
    }

    /// Whether a `(key, id)` continuation point splits this order exactly,
    /// so pages resumed from it neither skip nor repeat rows.
    #[must_use]
    pub const fn resumes_exactly(&self) -> bool {
        matches!(self, Self::KeyThenId(_))
    }

    /// Position of `row` relative to a continuation point `(key, id)`.
    ///
    /// `None` when this policy cannot locate rows against a cursor.
    #[must_use]
    pub fn cmp_to_cursor(
        &self,
        row: &ViewRow,
        key: &CompositeKey,
        id: Option<&str>,
    ) -> Option<Ordering> {
        match self {
            Self::KeyThenId(direction) => {
                let by_key = row.key.cmp(key);
                let ordering = match id {
                    Some(id) => by_key.then_with(|| row.id.as_str().cmp(id)),
                    None => by_key,
                };
                Some(directed(*direction, ordering))
            }
            Self::Key(direction) => Some(directed(*direction, row.key.cmp(key))),
            Self::Custom(_) => None,
        }
    }

    // Return whether `current` violates stream monotonicity after `previous`.
    pub(super) fn violates_monotonicity(&self, previous: &ViewRow, current: &ViewRow) -> bool {
        self.compare(previous, current).is_gt()
    }

    // Human-readable direction label for invariant diagnostics.
    pub(super) const fn order_label(&self) -> &'static str {
        match self {
            Self::KeyThenId(Direction::Asc) | Self::Key(Direction::Asc) => "ASC",
            Self::KeyThenId(Direction::Desc) | Self::Key(Direction::Desc) => "DESC",
            Self::Custom(_) => "CUSTOM",
        }
    }
}

impl Default for RowComparator {
    fn default() -> Self {
        Self::KeyThenId(Direction::Asc)
    }
}

impl fmt::Debug for RowComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyThenId(direction) => f.debug_tuple("KeyThenId").field(direction).finish(),
            Self::Key(direction) => f.debug_tuple("Key").field(direction).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

const fn directed(direction: Direction, ordering: Ordering) -> Ordering {
    match direction {
        Direction::Asc => ordering,
        Direction::Desc => ordering.reverse(),
    }
}
