//! Module: dao
//! Responsibility: per-entity-kind data access assembled from configuration.
//! Does not own: merge, paging or persistence semantics (core repository).
//! Boundary: converts core errors into the public `Error` taxonomy.

use crate::{Error, config::ViewDbConfig};
use std::sync::Arc;
use viewdb_core::{
    db::{
        cache::{CacheChain, MemoryEntityCache},
        cursor::{ContinuationCursor, Page, PageRequest},
        design::{DesignSynchronizer, SyncOptions, SyncReport},
        persist::{
            AuditedEntity, AuditedRepository, BulkItemOutcome, Clock, EntityRepository,
            EntityStream, StoredEntity,
        },
        plan::{KeyRange, ListQuery, ViewTable},
        store::DocumentStore,
    },
    error::InternalError,
    obs::{GlobalMetricsSink, MetricsSink},
};

///
/// EntityPage
///
/// One page of entities plus the opaque token of the next page.
///

#[derive(Clone, Debug, PartialEq)]
pub struct EntityPage<E> {
    pub entities: Vec<E>,
    pub next_token: Option<String>,
}

impl<E> EntityPage<E> {
    fn from_page(page: Page<E>) -> Result<Self, InternalError> {
        let next_token = page.next.as_ref().map(ContinuationCursor::encode).transpose()?;

        Ok(Self {
            entities: page.rows,
            next_token,
        })
    }

    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.next_token.is_some()
    }
}

///
/// EntityDao
///
/// Data access for one entity kind. Audited kinds opt in with
/// [`EntityDao::audited`]; every write then stamps `created`/`modified`.
///

pub struct EntityDao<E: StoredEntity> {
    repository: EntityRepository<E>,
    sink: Arc<dyn MetricsSink>,
    config: ViewDbConfig,
}

impl<E: StoredEntity> EntityDao<E> {
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        views: Arc<ViewTable>,
        config: &ViewDbConfig,
    ) -> Self {
        let mut repository = EntityRepository::new(store, views)
            .with_scan_batch_size(config.query.scan_batch_size);
        if config.cache.enabled {
            repository = repository.with_cache(CacheChain::single(Arc::new(
                MemoryEntityCache::new(config.cache.capacity),
            )));
        }

        Self {
            repository,
            sink: Arc::new(GlobalMetricsSink),
            config: config.clone(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.repository = self.repository.with_clock(clock);
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.repository = self.repository.with_sink(Arc::clone(&sink));
        self.sink = sink;
        self
    }

    /// Replace the configured cache chain.
    #[must_use]
    pub fn with_cache(mut self, cache: CacheChain<E>) -> Self {
        self.repository = self.repository.with_cache(cache);
        self
    }

    #[must_use]
    pub const fn repository(&self) -> &EntityRepository<E> {
        &self.repository
    }

    #[must_use]
    pub const fn config(&self) -> &ViewDbConfig {
        &self.config
    }

    // ======================================================================
    // Reads
    // ======================================================================

    pub async fn get(&self, id: &str) -> Result<Option<E>, Error> {
        Ok(self.repository.get(id).await?)
    }

    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<E>, Error> {
        Ok(self.repository.get_many(ids).await?)
    }

    // ======================================================================
    // Writes
    // ======================================================================

    pub async fn create(&self, entity: E) -> Result<E, Error> {
        Ok(self.repository.create(entity).await?)
    }

    pub async fn save(&self, entity: E) -> Result<E, Error> {
        Ok(self.repository.save(entity).await?)
    }

    /// All-or-nothing: any rejected item fails the call with a conflict.
    pub async fn save_bulk(&self, entities: Vec<E>) -> Result<Vec<E>, Error> {
        Ok(self.repository.save_bulk(entities).await?)
    }

    pub async fn save_bulk_partial(
        &self,
        entities: Vec<E>,
    ) -> Result<Vec<BulkItemOutcome<E>>, Error> {
        Ok(self.repository.save_bulk_partial(entities).await?)
    }

    pub async fn remove(&self, entity: E) -> Result<E, Error> {
        Ok(self.repository.remove(entity).await?)
    }

    pub async fn remove_many(&self, entities: Vec<E>) -> Result<Vec<BulkItemOutcome<E>>, Error> {
        Ok(self.repository.remove_many(entities).await?)
    }

    pub async fn un_remove(&self, entity: E) -> Result<E, Error> {
        Ok(self.repository.un_remove(entity).await?)
    }

    pub async fn purge(&self, entity: &E) -> Result<(), Error> {
        Ok(self.repository.purge(entity).await?)
    }

    // ======================================================================
    // Listings
    // ======================================================================

    pub fn list(&self, query: &ListQuery) -> Result<EntityStream<E>, Error> {
        Ok(self.repository.list(query)?)
    }

    /// One page of `query`. `token` is the `next_token` of the previous page;
    /// `limit` defaults to the configured page size.
    pub async fn list_page(
        &self,
        query: &ListQuery,
        token: Option<&str>,
        limit: Option<usize>,
    ) -> Result<EntityPage<E>, Error> {
        let request = self.page_request(token, limit)?;
        let page = self.repository.list_page(query, &request).await?;

        Ok(EntityPage::from_page(page)?)
    }

    /// One page of entities sharing a key of the count-reduced `index`.
    pub async fn find_duplicates(
        &self,
        index: &str,
        range: &KeyRange,
        token: Option<&str>,
        limit: Option<usize>,
    ) -> Result<EntityPage<E>, Error> {
        let request = self.page_request(token, limit)?;
        let page = self
            .repository
            .find_duplicates(index, range, &request)
            .await?;

        Ok(EntityPage::from_page(page)?)
    }

    fn page_request(&self, token: Option<&str>, limit: Option<usize>) -> Result<PageRequest, Error> {
        let cursor = token.map(ContinuationCursor::decode).transpose()?;
        let limit = limit.unwrap_or(self.config.query.default_page_size);

        Ok(PageRequest::resume(cursor.as_ref(), limit))
    }

    // ======================================================================
    // Design documents
    // ======================================================================

    /// Create or merge the design documents this kind's views need.
    pub async fn init_design_documents(&self) -> Result<SyncReport, Error> {
        let report = self
            .sync_design_documents(self.config.design.sync_options())
            .await?;
        tracing::info!(
            kind = E::KIND,
            written = report.applied().len(),
            documents = report.outcomes.len(),
            "design documents synchronized"
        );

        Ok(report)
    }

    /// Design documents `init_design_documents` would write, without writing.
    pub async fn preview_design_documents(&self) -> Result<SyncReport, Error> {
        self.sync_design_documents(self.config.design.sync_options().dry_run())
            .await
    }

    async fn sync_design_documents(&self, options: SyncOptions) -> Result<SyncReport, Error> {
        let desired = self.repository.views().design_documents(E::KIND);
        let report = DesignSynchronizer::new(Arc::clone(self.repository.store()))
            .with_max_attempts(self.config.design.max_attempts)
            .with_sink(Arc::clone(&self.sink))
            .sync(&desired, options)
            .await?;

        Ok(report)
    }
}

impl<E: AuditedEntity> EntityDao<E> {
    /// Stamp audit timestamps on every write.
    #[must_use]
    pub fn audited(mut self) -> Self {
        self.repository = AuditedRepository::new(self.repository).into_inner();
        self
    }
}
