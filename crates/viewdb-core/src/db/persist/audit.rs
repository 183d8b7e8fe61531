use crate::db::persist::{AuditedEntity, EntityRepository};
use std::ops::Deref;

/// Stamp `created` (only when unset) and `modified` with `now`.
pub fn stamp_audit<E: AuditedEntity>(entity: &mut E, now: i64) {
    if entity.created().is_none() {
        entity.set_created(Some(now));
    }
    entity.set_modified(Some(now));
}

///
/// AuditedRepository
///
/// Decorates an [`EntityRepository`] so every write it issues (single,
/// bulk, removal and restore) stamps audit timestamps from the repository
/// clock. Reads, purges and listings are untouched.
///

pub struct AuditedRepository<E: AuditedEntity> {
    inner: EntityRepository<E>,
}

impl<E: AuditedEntity> AuditedRepository<E> {
    #[must_use]
    pub fn new(inner: EntityRepository<E>) -> Self {
        Self {
            inner: inner.with_stamp(stamp_audit::<E>),
        }
    }

    /// The decorated repository; writes through it keep stamping.
    #[must_use]
    pub fn into_inner(self) -> EntityRepository<E> {
        self.inner
    }
}

impl<E: AuditedEntity> Deref for AuditedRepository<E> {
    type Target = EntityRepository<E>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
