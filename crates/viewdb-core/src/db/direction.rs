use derive_more::Display;
use serde::{Deserialize, Serialize};

///
/// Direction
///
/// Traversal direction shared by query plans, stream comparators and
/// continuation cursors.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    #[must_use]
    pub const fn is_descending(self) -> bool {
        matches!(self, Self::Desc)
    }
}
