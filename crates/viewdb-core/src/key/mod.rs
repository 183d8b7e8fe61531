//! Module: key
//! Responsibility: heterogeneous composite ordering keys shared by view rows,
//! range boundaries and continuation cursors.
//! Does not own: view collation on the store side.
//! Boundary: every ordering decision above the store goes through `CompositeKey::cmp`.

mod compare;
mod json;

pub use compare::canonical_rank;

use derive_more::{Deref, IntoIterator};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt};

///
/// KeyComponent
///
/// One scalar position of a composite key.
/// `Null` is minimal and `Max` is maximal at every position.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(into = "serde_json::Value", try_from = "serde_json::Value")]
pub enum KeyComponent {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Max,
}

impl KeyComponent {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[must_use]
    pub const fn is_max(&self) -> bool {
        matches!(self, Self::Max)
    }
}

impl Ord for KeyComponent {
    fn cmp(&self, other: &Self) -> Ordering {
        compare::canonical_cmp(self, other)
    }
}

impl PartialOrd for KeyComponent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for KeyComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value:?}"),
            Self::Max => write!(f, "{{}}"),
        }
    }
}

impl From<&str> for KeyComponent {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for KeyComponent {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for KeyComponent {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for KeyComponent {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for KeyComponent {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T> From<Option<T>> for KeyComponent
where
    T: Into<Self>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

///
/// CompositeKey
///
/// Ordered tuple of key components, compared left to right.
/// A strict prefix sorts before every key it prefixes.
///

#[derive(
    Clone, Debug, Default, Deref, Deserialize, Eq, Hash, IntoIterator, PartialEq, Serialize,
)]
#[serde(transparent)]
pub struct CompositeKey(#[into_iterator(owned, ref)] Vec<KeyComponent>);

impl CompositeKey {
    #[must_use]
    pub const fn new(components: Vec<KeyComponent>) -> Self {
        Self(components)
    }

    /// Single-component key.
    #[must_use]
    pub fn single(component: impl Into<KeyComponent>) -> Self {
        Self(vec![component.into()])
    }

    #[must_use]
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn components(&self) -> &[KeyComponent] {
        &self.0
    }

    /// Append one component, returning the extended key.
    #[must_use]
    pub fn push(mut self, component: impl Into<KeyComponent>) -> Self {
        self.0.push(component.into());
        self
    }

    /// Lowest key of `arity` that starts with `prefix`.
    #[must_use]
    pub fn lower_bound(prefix: &[KeyComponent], arity: usize) -> Self {
        Self::padded(prefix, arity, KeyComponent::Null)
    }

    /// Highest key of `arity` that starts with `prefix`.
    ///
    /// Unspecified trailing positions use `Max`, never omission: an omitted
    /// position would sort before every longer key sharing the prefix.
    #[must_use]
    pub fn upper_bound(prefix: &[KeyComponent], arity: usize) -> Self {
        Self::padded(prefix, arity, KeyComponent::Max)
    }

    fn padded(prefix: &[KeyComponent], arity: usize, fill: KeyComponent) -> Self {
        let mut components = prefix.to_vec();
        while components.len() < arity {
            components.push(fill.clone());
        }

        Self(components)
    }

    /// True when `self` starts with every component of `prefix`.
    #[must_use]
    pub fn starts_with(&self, prefix: &[KeyComponent]) -> bool {
        self.0.starts_with(prefix)
    }
}

impl Ord for CompositeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare::cmp_components(&self.0, &other.0)
    }
}

impl PartialOrd for CompositeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, component) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ",")?;
            }
            write!(f, "{component}")?;
        }
        write!(f, "]")
    }
}

impl From<Vec<KeyComponent>> for CompositeKey {
    fn from(components: Vec<KeyComponent>) -> Self {
        Self(components)
    }
}

impl FromIterator<KeyComponent> for CompositeKey {
    fn from_iter<I: IntoIterator<Item = KeyComponent>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Build a [`CompositeKey`] from heterogeneous component expressions.
#[macro_export]
macro_rules! key {
    () => {
        $crate::key::CompositeKey::default()
    };
    ($($component:expr),+ $(,)?) => {
        $crate::key::CompositeKey::new(vec![$($crate::key::KeyComponent::from($component)),+])
    };
}
