//! Module: db::persist::repository
//! Responsibility: cache-coherent reads and writes for one entity kind.

use crate::{
    db::{
        cache::{CacheChain, CacheKey, EntityCache},
        cursor::{GroupedDuplicatePager, Page, PageRequest, Paginator},
        direction::Direction,
        persist::{
            Clock, StoredEntity, SystemClock,
            entity::{decode_document, encode_document},
        },
        plan::{KeyRange, ListQuery, PartitionedQuery, ViewTable},
        row::ViewRow,
        store::{DocumentStore, WriteError, WriteErrorKind, WriteRequest, WriteResult},
        stream::{DEFAULT_SCAN_BATCH_SIZE, InterleaveRowStream, RowStream},
    },
    error::{BulkFailure, InternalError},
    obs::sink::{GlobalMetricsSink, MetricsEvent, MetricsSink, WriteKind},
};
use std::{marker::PhantomData, sync::Arc};

/// Write hook applied to every entity before it is written, with the clock
/// reading of that write.
pub(super) type WriteStamp<E> = fn(&mut E, i64);

///
/// BulkItemOutcome
///
/// Per-item result of a partial-success bulk write.
///

#[derive(Clone, Debug, PartialEq)]
pub enum BulkItemOutcome<E> {
    Saved(E),
    Failed { id: String, error: WriteError },
}

impl<E> BulkItemOutcome<E> {
    #[must_use]
    pub const fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(_))
    }

    #[must_use]
    pub fn saved(self) -> Option<E> {
        match self {
            Self::Saved(entity) => Some(entity),
            Self::Failed { .. } => None,
        }
    }
}

///
/// EntityRepository
///
/// Persistence core for entity kind `E`.
///
/// Every write evicts the touched ids before the store call. Only a
/// successful write repopulates the cache, with the post-write entity, so
/// a failed write never leaves a stale hit behind.
///

pub struct EntityRepository<E: StoredEntity> {
    store: Arc<dyn DocumentStore>,
    views: Arc<ViewTable>,
    cache: CacheChain<E>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn MetricsSink>,
    scan_batch_size: usize,
    stamp: Option<WriteStamp<E>>,
}

impl<E: StoredEntity> EntityRepository<E> {
    // ======================================================================
    // Construction & configuration
    // ======================================================================

    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, views: Arc<ViewTable>) -> Self {
        Self {
            store,
            views,
            cache: CacheChain::new(),
            clock: Arc::new(SystemClock),
            sink: Arc::new(GlobalMetricsSink),
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
            stamp: None,
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: CacheChain<E>) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn with_scan_batch_size(mut self, scan_batch_size: usize) -> Self {
        self.scan_batch_size = scan_batch_size.max(1);
        self
    }

    // Installed by the audit decorator only.
    pub(super) fn with_stamp(mut self, stamp: WriteStamp<E>) -> Self {
        self.stamp = Some(stamp);
        self
    }

    /// Whether writes stamp audit timestamps.
    #[must_use]
    pub const fn is_audited(&self) -> bool {
        self.stamp.is_some()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    #[must_use]
    pub fn views(&self) -> &ViewTable {
        &self.views
    }

    #[must_use]
    pub const fn cache(&self) -> &CacheChain<E> {
        &self.cache
    }

    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn cache_key(id: &str) -> CacheKey {
        CacheKey::new(E::KIND, id)
    }

    fn stamped(&self, mut entity: E, now: i64) -> E {
        if let Some(stamp) = self.stamp {
            stamp(&mut entity, now);
        }
        entity
    }

    fn stamped_all(&self, entities: Vec<E>) -> Vec<E> {
        if self.stamp.is_none() {
            return entities;
        }
        let now = self.clock.now_millis();

        entities
            .into_iter()
            .map(|entity| self.stamped(entity, now))
            .collect()
    }

    // ======================================================================
    // Reads
    // ======================================================================

    /// Entity by id, read through the cache. A missing entity is `None`.
    pub async fn get(&self, id: &str) -> Result<Option<E>, InternalError> {
        let key = Self::cache_key(id);
        if let Some(entity) = self.cache.get(&key) {
            self.sink.record(MetricsEvent::CacheHit {
                entity_kind: E::KIND,
            });
            return Ok(Some(entity));
        }
        self.sink.record(MetricsEvent::CacheMiss {
            entity_kind: E::KIND,
        });

        let fetched = match self.store.get_by_ids(&[id.to_string()]).await {
            Ok(mut docs) => docs.pop().flatten(),
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err),
        };
        self.sink.record(MetricsEvent::StoreRead {
            entity_kind: E::KIND,
            ids: 1,
        });

        let Some(body) = fetched else {
            return Ok(None);
        };
        let entity: E = decode_document(body)?;
        self.cache.put(key, entity.clone());

        Ok(Some(entity))
    }

    /// Entities by id, in request order; missing ids are skipped.
    /// Cache misses are fetched in a single store call.
    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<E>, InternalError> {
        let keys = ids.iter().map(|id| Self::cache_key(id)).collect::<Vec<_>>();
        let split = self.cache.split(&keys);
        for _ in &split.hits {
            self.sink.record(MetricsEvent::CacheHit {
                entity_kind: E::KIND,
            });
        }

        let mut found: Vec<Option<E>> = vec![None; ids.len()];
        for (idx, entity) in split.hits {
            found[idx] = Some(entity);
        }

        if !split.misses.is_empty() {
            for _ in &split.misses {
                self.sink.record(MetricsEvent::CacheMiss {
                    entity_kind: E::KIND,
                });
            }
            let missing = split
                .misses
                .iter()
                .map(|&idx| ids[idx].clone())
                .collect::<Vec<_>>();
            let docs = self.store.get_by_ids(&missing).await?;
            self.sink.record(MetricsEvent::StoreRead {
                entity_kind: E::KIND,
                ids: missing.len() as u64,
            });
            if docs.len() != missing.len() {
                return Err(InternalError::persist_invariant(format!(
                    "store returned {} documents for {} ids",
                    docs.len(),
                    missing.len()
                )));
            }

            for (&idx, doc) in split.misses.iter().zip(docs) {
                let Some(body) = doc else {
                    continue;
                };
                let entity: E = decode_document(body)?;
                self.cache.put(keys[idx].clone(), entity.clone());
                found[idx] = Some(entity);
            }
        }

        Ok(found.into_iter().flatten().collect())
    }

    // ======================================================================
    // Single-entity writes
    // ======================================================================

    /// Insert `entity` regardless of the revision it carries.
    pub async fn create(&self, entity: E) -> Result<E, InternalError> {
        let entity = self.stamped(entity, self.clock.now_millis());
        self.write_one(entity, None, WriteKind::Save).await
    }

    /// Insert when `entity` was never written, otherwise update against its
    /// revision. A stale revision fails with a conflict.
    pub async fn save(&self, entity: E) -> Result<E, InternalError> {
        let entity = self.stamped(entity, self.clock.now_millis());
        let rev = entity.rev().map(str::to_string);
        self.write_one(entity, rev, WriteKind::Save).await
    }

    /// Soft delete: stamp the deletion time and write.
    pub async fn remove(&self, mut entity: E) -> Result<E, InternalError> {
        let now = self.clock.now_millis();
        entity.set_deleted(Some(now));
        let entity = self.stamped(entity, now);
        let rev = entity.rev().map(str::to_string);
        self.write_one(entity, rev, WriteKind::Remove).await
    }

    /// Clear the soft-delete marker and write.
    pub async fn un_remove(&self, mut entity: E) -> Result<E, InternalError> {
        entity.set_deleted(None);
        let entity = self.stamped(entity, self.clock.now_millis());
        let rev = entity.rev().map(str::to_string);
        self.write_one(entity, rev, WriteKind::Save).await
    }

    /// Delete the stored document permanently.
    pub async fn purge(&self, entity: &E) -> Result<(), InternalError> {
        let id = entity.id().to_string();
        let rev = entity.rev().map(str::to_string);
        self.evict(std::slice::from_ref(&id));

        let mut results = self
            .store
            .bulk_write(vec![WriteRequest::purge(id.clone(), rev.clone())])
            .await?;
        let result = Self::single_result(&id, &mut results)?;

        match result {
            WriteResult::Ok { .. } => {
                self.record_write(WriteKind::Purge, 1, 0);
                tracing::debug!(kind = E::KIND, %id, "entity purged");
                Ok(())
            }
            WriteResult::Err { error, .. } => {
                self.record_write(WriteKind::Purge, 0, 1);
                Err(self.write_failure(&id, rev.as_deref(), &error))
            }
        }
    }

    async fn write_one(
        &self,
        mut entity: E,
        rev: Option<String>,
        kind: WriteKind,
    ) -> Result<E, InternalError> {
        let id = entity.id().to_string();
        self.evict(std::slice::from_ref(&id));

        let body = encode_document(&entity)?;
        let mut results = self
            .store
            .bulk_write(vec![WriteRequest::put(id.clone(), rev.clone(), body)])
            .await?;
        let result = Self::single_result(&id, &mut results)?;

        match result {
            WriteResult::Ok { rev: new_rev, .. } => {
                entity.set_rev(new_rev);
                self.cache.put(Self::cache_key(&id), entity.clone());
                self.record_write(kind, 1, 0);
                tracing::debug!(kind = E::KIND, %id, rev = ?entity.rev(), "entity written");

                Ok(entity)
            }
            WriteResult::Err { error, .. } => {
                self.record_write(kind, 0, 1);
                Err(self.write_failure(&id, rev.as_deref(), &error))
            }
        }
    }

    fn single_result(
        id: &str,
        results: &mut Vec<WriteResult>,
    ) -> Result<WriteResult, InternalError> {
        match (results.pop(), results.is_empty()) {
            (Some(result), true) if result.id() == id => Ok(result),
            _ => Err(InternalError::persist_invariant(format!(
                "store returned an unexpected write result for '{id}'"
            ))),
        }
    }

    fn write_failure(&self, id: &str, rev: Option<&str>, error: &WriteError) -> InternalError {
        match error.kind {
            WriteErrorKind::Conflict => {
                tracing::warn!(
                    kind = E::KIND,
                    %id,
                    rev = ?rev,
                    reason = %error.reason,
                    "revision conflict, cache entry left evicted"
                );
                InternalError::revision_conflict(id, rev)
            }
            WriteErrorKind::NotFound => InternalError::store_not_found(id),
            WriteErrorKind::Forbidden | WriteErrorKind::Other => {
                tracing::warn!(kind = E::KIND, %id, error = %error.kind, reason = %error.reason, "write rejected");
                InternalError::store_internal(format!(
                    "write of '{id}' rejected ({}): {}",
                    error.kind, error.reason
                ))
            }
        }
    }

    // ======================================================================
    // Bulk writes
    // ======================================================================

    /// All-or-nothing bulk save. Any rejected item fails the whole call with
    /// one aggregate conflict listing every rejected item; no entity of the
    /// batch is cached afterwards.
    pub async fn save_bulk(&self, entities: Vec<E>) -> Result<Vec<E>, InternalError> {
        let entities = self.stamped_all(entities);
        let results = self.write_bulk(&entities).await?;

        let failures = entities
            .iter()
            .zip(&results)
            .filter_map(|(entity, result)| match result {
                WriteResult::Err { id, error } => Some(BulkFailure {
                    id: id.clone(),
                    rev: entity.rev().map(str::to_string),
                    reason: format!("{}: {}", error.kind, error.reason),
                }),
                WriteResult::Ok { .. } => None,
            })
            .collect::<Vec<_>>();
        self.record_write(
            WriteKind::Save,
            (results.len() - failures.len()) as u64,
            failures.len() as u64,
        );

        if !failures.is_empty() {
            tracing::warn!(
                kind = E::KIND,
                failed = failures.len(),
                batch = entities.len(),
                "bulk save rejected"
            );
            return Err(InternalError::bulk_conflict(failures));
        }

        let saved = entities
            .into_iter()
            .zip(results)
            .map(|(mut entity, result)| {
                if let WriteResult::Ok { rev, .. } = result {
                    entity.set_rev(rev);
                }
                entity
            })
            .collect::<Vec<_>>();
        for entity in &saved {
            self.cache.put(Self::cache_key(entity.id()), entity.clone());
        }

        Ok(saved)
    }

    /// Partial-success bulk save: one outcome per entity, in order; only
    /// saved entities are cached.
    pub async fn save_bulk_partial(
        &self,
        entities: Vec<E>,
    ) -> Result<Vec<BulkItemOutcome<E>>, InternalError> {
        self.write_bulk_partial(self.stamped_all(entities), WriteKind::Save)
            .await
    }

    /// Partial-success bulk soft delete.
    pub async fn remove_many(
        &self,
        entities: Vec<E>,
    ) -> Result<Vec<BulkItemOutcome<E>>, InternalError> {
        let now = self.clock.now_millis();
        let entities = entities
            .into_iter()
            .map(|mut entity| {
                entity.set_deleted(Some(now));
                self.stamped(entity, now)
            })
            .collect();

        self.write_bulk_partial(entities, WriteKind::Remove).await
    }

    async fn write_bulk_partial(
        &self,
        entities: Vec<E>,
        kind: WriteKind,
    ) -> Result<Vec<BulkItemOutcome<E>>, InternalError> {
        let results = self.write_bulk(&entities).await?;

        let mut outcomes = Vec::with_capacity(entities.len());
        for (mut entity, result) in entities.into_iter().zip(results) {
            match result {
                WriteResult::Ok { rev, .. } => {
                    entity.set_rev(rev);
                    self.cache.put(Self::cache_key(entity.id()), entity.clone());
                    outcomes.push(BulkItemOutcome::Saved(entity));
                }
                WriteResult::Err { id, error } => {
                    tracing::debug!(kind = E::KIND, %id, error = %error.kind, "bulk item rejected");
                    outcomes.push(BulkItemOutcome::Failed { id, error });
                }
            }
        }
        let saved = outcomes.iter().filter(|outcome| outcome.is_saved()).count();
        self.record_write(kind, saved as u64, (outcomes.len() - saved) as u64);

        Ok(outcomes)
    }

    // Evict the whole batch, then issue one bulk request.
    async fn write_bulk(&self, entities: &[E]) -> Result<Vec<WriteResult>, InternalError> {
        let ids = entities
            .iter()
            .map(|entity| entity.id().to_string())
            .collect::<Vec<_>>();
        self.evict(&ids);

        let writes = entities
            .iter()
            .map(|entity| {
                Ok::<_, InternalError>(WriteRequest::put(
                    entity.id(),
                    entity.rev().map(str::to_string),
                    encode_document(entity)?,
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let results = self.store.bulk_write(writes).await?;

        let aligned = results.len() == ids.len()
            && results.iter().zip(&ids).all(|(result, id)| result.id() == id);
        if !aligned {
            return Err(InternalError::persist_invariant(format!(
                "store returned {} results for a bulk write of {} {} entities",
                results.len(),
                ids.len(),
                E::KIND
            )));
        }

        Ok(results)
    }

    // ======================================================================
    // Listings
    // ======================================================================

    fn partitioned(
        &self,
        query: &ListQuery,
        include_docs: bool,
    ) -> Result<PartitionedQuery, InternalError> {
        let partitions = self.views.partitions(E::KIND, &query.index)?;

        Ok(PartitionedQuery::new(partitions, query.selection.clone())
            .with_direction(query.direction)
            .with_docs(include_docs))
    }

    fn paginator(&self) -> Paginator {
        Paginator::new(Arc::clone(&self.store))
            .with_batch_size(self.scan_batch_size)
            .with_sink(Arc::clone(&self.sink))
    }

    /// Merged view rows of `query` across every partition of its index.
    pub fn list_rows(&self, query: &ListQuery) -> Result<InterleaveRowStream, InternalError> {
        let partitioned = self.partitioned(query, query.include_docs)?;

        self.paginator()
            .stream(&partitioned, query.resolved_comparator(), query.dedup, None)
    }

    /// Lazy entity listing of `query`.
    pub fn list(&self, query: &ListQuery) -> Result<EntityStream<E>, InternalError> {
        let partitioned = self.partitioned(query, true)?;
        let rows = self
            .paginator()
            .stream(&partitioned, query.resolved_comparator(), query.dedup, None)?;

        Ok(EntityStream::new(rows))
    }

    /// One page of `query`, with the cursor of the next one.
    pub async fn list_page(
        &self,
        query: &ListQuery,
        request: &PageRequest,
    ) -> Result<Page<E>, InternalError> {
        let partitioned = self.partitioned(query, true)?;
        let page = self
            .paginator()
            .page(&partitioned, query.resolved_comparator(), query.dedup, request)
            .await?;

        page.try_map(row_entity)
    }

    /// One page of entities sharing a key of the count-reduced `index`.
    pub async fn find_duplicates(
        &self,
        index: &str,
        range: &KeyRange,
        request: &PageRequest,
    ) -> Result<Page<E>, InternalError> {
        let mut partitions = self.views.partitions(E::KIND, index)?;
        if partitions.len() != 1 {
            return Err(InternalError::query_unsupported(format!(
                "duplicate detection on {}/{index} needs exactly one partition, found {}",
                E::KIND,
                partitions.len()
            )));
        }
        let partition = partitions.remove(0);

        let page = GroupedDuplicatePager::new(Arc::clone(&self.store))
            .with_sink(Arc::clone(&self.sink))
            .page(&partition, range, Direction::Asc, request)
            .await?;

        page.try_map(row_entity)
    }

    // ======================================================================
    // Instrumentation
    // ======================================================================

    fn evict(&self, ids: &[String]) {
        for id in ids {
            self.cache.evict(&Self::cache_key(id));
        }
        self.sink.record(MetricsEvent::CacheEvict {
            entity_kind: E::KIND,
            ids: ids.len() as u64,
        });
    }

    fn record_write(&self, kind: WriteKind, rows_written: u64, conflicts: u64) {
        self.sink.record(MetricsEvent::StoreWrite {
            entity_kind: E::KIND,
            kind,
            rows_written,
            conflicts,
        });
    }
}

fn row_entity<E: StoredEntity>(row: ViewRow) -> Result<E, InternalError> {
    let Some(doc) = row.doc else {
        return Err(InternalError::persist_invariant(format!(
            "{} view row '{}' carries no document",
            E::KIND,
            row.id
        )));
    };

    decode_document(doc)
}

///
/// EntityStream
///
/// Lazy stream of decoded entities over a merged view listing.
///

pub struct EntityStream<E> {
    rows: InterleaveRowStream,
    _marker: PhantomData<fn() -> E>,
}

impl<E: StoredEntity> EntityStream<E> {
    const fn new(rows: InterleaveRowStream) -> Self {
        Self {
            rows,
            _marker: PhantomData,
        }
    }

    pub async fn next_entity(&mut self) -> Result<Option<E>, InternalError> {
        match self.rows.next_row().await? {
            Some(row) => row_entity(row).map(Some),
            None => Ok(None),
        }
    }

    /// Drain the stream.
    pub async fn try_collect(mut self) -> Result<Vec<E>, InternalError> {
        let mut out = Vec::new();
        while let Some(entity) = self.next_entity().await? {
            out.push(entity);
        }

        Ok(out)
    }

    /// Rows dropped as cross-partition duplicates so far.
    #[must_use]
    pub const fn suppressed(&self) -> u64 {
        self.rows.suppressed()
    }
}
