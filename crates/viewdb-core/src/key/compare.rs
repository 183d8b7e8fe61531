use crate::key::KeyComponent;
use std::cmp::Ordering;

///
/// Canonical Component Rank
///
/// Stable rank used for cross-variant ordering at one key position.
/// Mirrors the store collation: null, booleans, numbers, strings, then the
/// greater-than-all marker.
///
#[must_use]
pub const fn canonical_rank(component: &KeyComponent) -> u8 {
    match component {
        KeyComponent::Null => 0,
        KeyComponent::Bool(_) => 1,
        KeyComponent::Int(_) => 2,
        KeyComponent::Text(_) => 3,
        KeyComponent::Max => 4,
    }
}

/// Total comparator for one key position: rank first, then natural order.
pub(super) fn canonical_cmp(left: &KeyComponent, right: &KeyComponent) -> Ordering {
    let rank = canonical_rank(left).cmp(&canonical_rank(right));
    if rank != Ordering::Equal {
        return rank;
    }

    match (left, right) {
        (KeyComponent::Bool(a), KeyComponent::Bool(b)) => a.cmp(b),
        (KeyComponent::Int(a), KeyComponent::Int(b)) => a.cmp(b),
        (KeyComponent::Text(a), KeyComponent::Text(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

// Left-to-right comparison; the first differing position decides.
pub(super) fn cmp_components(left: &[KeyComponent], right: &[KeyComponent]) -> Ordering {
    for (left, right) in left.iter().zip(right.iter()) {
        let cmp = canonical_cmp(left, right);
        if cmp != Ordering::Equal {
            return cmp;
        }
    }

    left.len().cmp(&right.len())
}
