use crate::key::{CompositeKey, KeyComponent};
use serde::{Deserialize, Serialize};

///
/// KeyRange
///
/// Logical, ascending, inclusive key range. `None` leaves that side open.
/// Plans translate it into scan order for descending traversal.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct KeyRange {
    pub from: Option<CompositeKey>,
    pub to: Option<CompositeKey>,
}

impl KeyRange {
    #[must_use]
    pub const fn new(from: Option<CompositeKey>, to: Option<CompositeKey>) -> Self {
        Self { from, to }
    }

    #[must_use]
    pub const fn all() -> Self {
        Self {
            from: None,
            to: None,
        }
    }

    #[must_use]
    pub const fn between(from: CompositeKey, to: CompositeKey) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    /// Every key of `arity` starting with `prefix`.
    #[must_use]
    pub fn prefix(prefix: &[KeyComponent], arity: usize) -> Self {
        Self {
            from: Some(CompositeKey::new(prefix.to_vec())),
            to: Some(CompositeKey::upper_bound(prefix, arity)),
        }
    }

    /// Keys starting with `prefix` whose next component lies in `[from, to]`.
    ///
    /// An open upper bound becomes the `Max` sentinel padded to `arity`.
    #[must_use]
    pub fn prefix_between(
        prefix: &[KeyComponent],
        from: Option<KeyComponent>,
        to: Option<KeyComponent>,
        arity: usize,
    ) -> Self {
        let mut start = prefix.to_vec();
        if let Some(from) = from {
            start.push(from);
        }

        let mut end = prefix.to_vec();
        end.push(to.unwrap_or(KeyComponent::Max));

        Self {
            from: Some(CompositeKey::new(start)),
            to: Some(CompositeKey::upper_bound(&end, arity)),
        }
    }

    #[must_use]
    pub fn contains(&self, key: &CompositeKey) -> bool {
        self.from.as_ref().is_none_or(|from| key >= from)
            && self.to.as_ref().is_none_or(|to| key <= to)
    }
}

///
/// KeySelection
///
/// Either a contiguous range or an exact key set.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum KeySelection {
    Range(KeyRange),
    Keys(Vec<CompositeKey>),
}

impl Default for KeySelection {
    fn default() -> Self {
        Self::Range(KeyRange::all())
    }
}

impl From<KeyRange> for KeySelection {
    fn from(range: KeyRange) -> Self {
        Self::Range(range)
    }
}
