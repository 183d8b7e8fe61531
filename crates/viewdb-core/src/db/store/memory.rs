//! Module: db::store::memory
//! Responsibility: complete in-process `DocumentStore` with store-style
//! revisions, closure-backed views, request counters and fault injection.

use crate::{
    db::{
        design::DesignDocument,
        direction::Direction,
        plan::QueryPlan,
        row::{GroupRow, ViewRow},
        store::{DocumentStore, WriteError, WriteOp, WriteRequest, WriteResult},
    },
    error::{ErrorClass, ErrorOrigin, InternalError},
    key::CompositeKey,
};
use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::{
    collections::BTreeMap,
    fmt::Write as _,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
};

/// View map function: document body -> emitted `(key, value)` pairs.
pub type MapFn = Arc<dyn Fn(&JsonValue) -> Vec<(CompositeKey, JsonValue)> + Send + Sync>;

///
/// MemoryReduce
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MemoryReduce {
    Count,
}

struct MemoryView {
    map: MapFn,
    reduce: Option<MemoryReduce>,
}

struct StoredDoc {
    generation: u64,
    rev: String,
    body: JsonValue,
}

///
/// MemoryStoreStats
/// Round-trip counters, one per `DocumentStore` method.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MemoryStoreStats {
    pub view_requests: u64,
    pub grouped_requests: u64,
    pub read_requests: u64,
    pub write_requests: u64,
    pub design_reads: u64,
    pub design_writes: u64,
}

#[derive(Default)]
struct Counters {
    view_requests: AtomicU64,
    grouped_requests: AtomicU64,
    read_requests: AtomicU64,
    write_requests: AtomicU64,
    design_reads: AtomicU64,
    design_writes: AtomicU64,
}

#[derive(Default)]
struct Faults {
    unavailable_views: AtomicU32,
    unavailable_reads: AtomicU32,
    unavailable_writes: AtomicU32,
    design_races: Mutex<Vec<DesignDocument>>,
}

///
/// MemoryDocumentStore
///

#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: DashMap<String, StoredDoc>,
    views: DashMap<(String, String), MemoryView>,
    designs: DashMap<String, DesignDocument>,
    counters: Counters,
    faults: Faults,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a view under `design_doc_id`.
    pub fn register_view<F>(
        &self,
        design_doc_id: &str,
        view: &str,
        reduce: Option<MemoryReduce>,
        map: F,
    ) where
        F: Fn(&JsonValue) -> Vec<(CompositeKey, JsonValue)> + Send + Sync + 'static,
    {
        self.views.insert(
            (design_doc_id.to_string(), view.to_string()),
            MemoryView {
                map: Arc::new(map),
                reduce,
            },
        );
    }

    /// Write a document unconditionally, as another client would.
    pub fn put_raw(&self, id: &str, body: JsonValue) -> String {
        let generation = self.docs.get(id).map_or(0, |doc| doc.generation) + 1;
        let stored = stored_doc(id, generation, body);
        let rev = stored.rev.clone();
        self.docs.insert(id.to_string(), stored);

        rev
    }

    /// Current stored body, `_id`/`_rev` included.
    #[must_use]
    pub fn document(&self, id: &str) -> Option<JsonValue> {
        self.docs.get(id).map(|doc| doc.body.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> MemoryStoreStats {
        let c = &self.counters;
        MemoryStoreStats {
            view_requests: c.view_requests.load(Ordering::Relaxed),
            grouped_requests: c.grouped_requests.load(Ordering::Relaxed),
            read_requests: c.read_requests.load(Ordering::Relaxed),
            write_requests: c.write_requests.load(Ordering::Relaxed),
            design_reads: c.design_reads.load(Ordering::Relaxed),
            design_writes: c.design_writes.load(Ordering::Relaxed),
        }
    }

    /// Fail the next `count` view requests as unavailable.
    pub fn fail_next_views(&self, count: u32) {
        self.faults.unavailable_views.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` id reads as unavailable.
    pub fn fail_next_reads(&self, count: u32) {
        self.faults.unavailable_reads.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` bulk writes as unavailable.
    pub fn fail_next_writes(&self, count: u32) {
        self.faults.unavailable_writes.store(count, Ordering::SeqCst);
    }

    /// Let a competing initializer store `competitor` just before the next
    /// put of the same design document id, so that put conflicts.
    pub fn race_next_design_put(&self, competitor: DesignDocument) {
        self.faults
            .design_races
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(competitor);
    }

    fn take_fault(counter: &AtomicU32, what: &str) -> Result<(), InternalError> {
        let armed = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            return Err(InternalError::store_unavailable(format!(
                "store unavailable during {what}"
            )));
        }

        Ok(())
    }

    fn take_design_race(&self, id: &str) -> Option<DesignDocument> {
        let mut races = self
            .faults
            .design_races
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let idx = races.iter().position(|doc| doc.id == id)?;

        Some(races.remove(idx))
    }

    fn view_rows(&self, plan: &QueryPlan) -> Result<Vec<ViewRow>, InternalError> {
        let view = self
            .views
            .get(&(plan.design_doc_id.clone(), plan.view.clone()))
            .ok_or_else(|| missing_view(plan))?;
        let map = Arc::clone(&view.map);
        drop(view);

        let mut rows = Vec::new();
        for doc in &self.docs {
            for (key, value) in map(&doc.body) {
                if !plan.admits(&key, doc.key()) {
                    continue;
                }
                let row = ViewRow::new(key, doc.key().clone()).with_value(value);
                rows.push(if plan.include_docs {
                    row.with_doc(doc.body.clone())
                } else {
                    row
                });
            }
        }

        rows.sort_by(|left, right| left.key.cmp(&right.key).then_with(|| left.id.cmp(&right.id)));
        if plan.direction == Direction::Desc {
            rows.reverse();
        }
        if let Some(limit) = plan.limit {
            rows.truncate(limit);
        }

        Ok(rows)
    }

    fn apply_write(&self, write: WriteRequest) -> WriteResult {
        let WriteRequest { id, rev, op } = write;
        let entry = self.docs.entry(id.clone());

        match (entry, op) {
            (Entry::Vacant(vacant), WriteOp::Put(body)) => {
                if rev.is_some() {
                    return WriteResult::Err {
                        id,
                        error: WriteError::conflict("document does not exist"),
                    };
                }
                let stored = stored_doc(&id, 1, body);
                let rev = stored.rev.clone();
                vacant.insert(stored);

                WriteResult::Ok { id, rev: Some(rev) }
            }
            (Entry::Vacant(_), WriteOp::Purge) => WriteResult::Err {
                id,
                error: WriteError::not_found("document does not exist"),
            },
            (Entry::Occupied(mut occupied), op) => {
                if rev.as_deref() != Some(occupied.get().rev.as_str()) {
                    return WriteResult::Err {
                        id,
                        error: WriteError::conflict("document update conflict"),
                    };
                }
                match op {
                    WriteOp::Put(body) => {
                        let stored = stored_doc(&id, occupied.get().generation + 1, body);
                        let rev = stored.rev.clone();
                        occupied.insert(stored);

                        WriteResult::Ok { id, rev: Some(rev) }
                    }
                    WriteOp::Purge => {
                        occupied.remove();

                        WriteResult::Ok { id, rev: None }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn execute_view(&self, plan: &QueryPlan) -> Result<Vec<ViewRow>, InternalError> {
        self.counters.view_requests.fetch_add(1, Ordering::Relaxed);
        Self::take_fault(&self.faults.unavailable_views, "view scan")?;
        if plan.reduce {
            return Err(InternalError::query_unsupported(
                "reduced plans must go through execute_grouped",
            ));
        }

        self.view_rows(plan)
    }

    async fn execute_grouped(&self, plan: &QueryPlan) -> Result<Vec<GroupRow>, InternalError> {
        self.counters.grouped_requests.fetch_add(1, Ordering::Relaxed);
        Self::take_fault(&self.faults.unavailable_views, "grouped scan")?;

        let reduce = self
            .views
            .get(&(plan.design_doc_id.clone(), plan.view.clone()))
            .ok_or_else(|| missing_view(plan))?
            .reduce;
        if reduce.is_none() {
            return Err(InternalError::query_unsupported(format!(
                "view {}/{} has no reduce function",
                plan.design_doc_id, plan.view
            )));
        }

        // groups are keyed, so the doc-id part of the start condition is moot
        let mut scan = plan.clone();
        scan.reduce = false;
        scan.include_docs = false;
        scan.start_doc_id = None;
        scan.limit = None;
        let rows = self.view_rows(&scan)?;

        if !plan.group {
            return Ok(vec![GroupRow {
                key: CompositeKey::default(),
                value: JsonValue::from(rows.len()),
            }]);
        }

        let mut counts: BTreeMap<CompositeKey, u64> = BTreeMap::new();
        for row in rows {
            *counts.entry(row.key).or_default() += 1;
        }
        let mut groups = counts
            .into_iter()
            .map(|(key, count)| GroupRow {
                key,
                value: JsonValue::from(count),
            })
            .collect::<Vec<_>>();
        if plan.direction == Direction::Desc {
            groups.reverse();
        }
        if let Some(limit) = plan.limit {
            groups.truncate(limit);
        }

        Ok(groups)
    }

    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Option<JsonValue>>, InternalError> {
        self.counters.read_requests.fetch_add(1, Ordering::Relaxed);
        Self::take_fault(&self.faults.unavailable_reads, "document read")?;

        Ok(ids
            .iter()
            .map(|id| self.docs.get(id).map(|doc| doc.body.clone()))
            .collect())
    }

    async fn bulk_write(
        &self,
        writes: Vec<WriteRequest>,
    ) -> Result<Vec<WriteResult>, InternalError> {
        self.counters.write_requests.fetch_add(1, Ordering::Relaxed);
        Self::take_fault(&self.faults.unavailable_writes, "bulk write")?;

        Ok(writes
            .into_iter()
            .map(|write| self.apply_write(write))
            .collect())
    }

    async fn get_design_document(
        &self,
        id: &str,
    ) -> Result<Option<DesignDocument>, InternalError> {
        self.counters.design_reads.fetch_add(1, Ordering::Relaxed);

        Ok(self.designs.get(id).map(|doc| doc.clone()))
    }

    async fn put_design_document(&self, doc: &DesignDocument) -> Result<String, InternalError> {
        self.counters.design_writes.fetch_add(1, Ordering::Relaxed);

        if let Some(mut competitor) = self.take_design_race(&doc.id) {
            let generation = self
                .designs
                .get(&doc.id)
                .and_then(|stored| stored.rev.as_deref().map(rev_generation))
                .unwrap_or(0)
                + 1;
            competitor.rev = Some(design_rev(generation, &competitor));
            self.designs.insert(doc.id.clone(), competitor);
        }

        match self.designs.entry(doc.id.clone()) {
            Entry::Vacant(vacant) => {
                if doc.rev.is_some() {
                    return Err(InternalError::design_conflict(&doc.id));
                }
                let mut stored = doc.clone();
                let rev = design_rev(1, &stored);
                stored.rev = Some(rev.clone());
                vacant.insert(stored);

                Ok(rev)
            }
            Entry::Occupied(mut occupied) => {
                if occupied.get().rev != doc.rev {
                    return Err(InternalError::design_conflict(&doc.id));
                }
                let generation = doc.rev.as_deref().map_or(0, rev_generation) + 1;
                let mut stored = doc.clone();
                let rev = design_rev(generation, &stored);
                stored.rev = Some(rev.clone());
                occupied.insert(stored);

                Ok(rev)
            }
        }
    }
}

fn missing_view(plan: &QueryPlan) -> InternalError {
    InternalError::new(
        ErrorClass::NotFound,
        ErrorOrigin::Store,
        format!("view not found: {}/{}", plan.design_doc_id, plan.view),
    )
}

// Stamp `_id`/`_rev` into the body and derive the revision from its content.
fn stored_doc(id: &str, generation: u64, mut body: JsonValue) -> StoredDoc {
    if let Some(object) = body.as_object_mut() {
        object.remove("_rev");
        object.insert("_id".to_string(), JsonValue::from(id));
    }
    let rev = format!("{generation}-{}", content_hash(generation, &body.to_string()));
    if let Some(object) = body.as_object_mut() {
        object.insert("_rev".to_string(), JsonValue::from(rev.clone()));
    }

    StoredDoc {
        generation,
        rev,
        body,
    }
}

fn design_rev(generation: u64, doc: &DesignDocument) -> String {
    let mut unrevised = doc.clone();
    unrevised.rev = None;
    let text = serde_json::to_string(&unrevised).unwrap_or_default();

    format!("{generation}-{}", content_hash(generation, &text))
}

fn rev_generation(rev: &str) -> u64 {
    rev.split_once('-')
        .and_then(|(generation, _)| generation.parse().ok())
        .unwrap_or(0)
}

fn content_hash(generation: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(generation.to_be_bytes());
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(32);
    for byte in &digest[..16] {
        let _ = write!(out, "{byte:02x}");
    }

    out
}
