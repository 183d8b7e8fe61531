//! Module: db::cursor::page
//! Responsibility: one page window over the partition merge, plus the
//! continuation cursor of the next page.

use crate::{
    db::{
        cursor::ContinuationCursor,
        plan::PartitionedQuery,
        row::ViewRow,
        store::DocumentStore,
        stream::{
            BudgetedRowStream, DEFAULT_SCAN_BATCH_SIZE, DedupMode, InterleaveRowStream,
            MergeSource, RowComparator, RowStream, ViewScanStream, collect_rows,
        },
    },
    error::InternalError,
    key::CompositeKey,
    obs::sink::{GlobalMetricsSink, MetricsSink},
};
use async_trait::async_trait;
use std::{cmp::Ordering, sync::Arc};

///
/// PageRequest
///
/// `(start_key, start_doc_id, limit)`. A request without a start key reads
/// from the beginning of the selection. `skip` drops that many rows sitting
/// exactly at `(start_key, start_doc_id)`.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PageRequest {
    pub start_key: Option<CompositeKey>,
    pub start_doc_id: Option<String>,
    pub skip: usize,
    pub limit: usize,
}

impl PageRequest {
    #[must_use]
    pub const fn first(limit: usize) -> Self {
        Self {
            start_key: None,
            start_doc_id: None,
            skip: 0,
            limit,
        }
    }

    #[must_use]
    pub fn starting_at(
        start_key: CompositeKey,
        start_doc_id: Option<String>,
        limit: usize,
    ) -> Self {
        Self {
            start_key: Some(start_key),
            start_doc_id,
            skip: 0,
            limit,
        }
    }

    /// Resume from a cursor; `None` reads the first page.
    #[must_use]
    pub fn resume(cursor: Option<&ContinuationCursor>, limit: usize) -> Self {
        match cursor {
            Some(cursor) => Self {
                skip: cursor.skip,
                ..Self::starting_at(cursor.start_key.clone(), cursor.start_doc_id.clone(), limit)
            },
            None => Self::first(limit),
        }
    }

    pub(super) fn validate(&self) -> Result<(), InternalError> {
        if self.limit == 0 {
            return Err(InternalError::query_unsupported(
                "page limit must be greater than zero",
            ));
        }
        if self.start_key.is_none() && self.start_doc_id.is_some() {
            return Err(InternalError::cursor_invariant(
                "start_doc_id requires a start_key",
            ));
        }
        if self.start_doc_id.is_none() && self.skip > 0 {
            return Err(InternalError::cursor_invariant("skip requires a start_doc_id"));
        }

        Ok(())
    }
}

///
/// Page
///
/// At most `limit` rows plus the cursor of the next page (`None` once the
/// selection is exhausted).
///

#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub next: Option<ContinuationCursor>,
}

impl<T> Page<T> {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            rows: Vec::new(),
            next: None,
        }
    }

    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.next.is_some()
    }

    /// Convert every row, keeping the cursor.
    pub fn try_map<U, F>(self, f: F) -> Result<Page<U>, InternalError>
    where
        F: FnMut(T) -> Result<U, InternalError>,
    {
        Ok(Page {
            rows: self.rows.into_iter().map(f).collect::<Result<_, _>>()?,
            next: self.next,
        })
    }
}

// Split `limit + 1` fetched rows into a page and the next cursor.
pub(super) fn page_from_window(
    mut rows: Vec<ViewRow>,
    request: &PageRequest,
) -> Page<ViewRow> {
    let limit = request.limit;
    let next = if rows.len() > limit {
        rows.truncate(limit + 1);
        rows.pop().map(|extra| {
            let returned = rows
                .iter()
                .filter(|row| row.key == extra.key && row.id == extra.id)
                .count();
            let carried = if request.start_key.as_ref() == Some(&extra.key)
                && request.start_doc_id.as_deref() == Some(extra.id.as_str())
            {
                request.skip
            } else {
                0
            };

            ContinuationCursor::new(extra.key, Some(extra.id)).with_skip(carried + returned)
        })
    } else {
        None
    };

    Page { rows, next }
}

///
/// CursorFloor
///
/// Drops merged rows that sort before the continuation point, for stores
/// that resume coarser than `(key, id)`, and the `skip` copies at the point
/// itself that earlier pages already returned.
///

struct CursorFloor<S> {
    inner: S,
    comparator: RowComparator,
    start: Option<(CompositeKey, Option<String>)>,
    skip: usize,
}

#[async_trait]
impl<S> RowStream for CursorFloor<S>
where
    S: RowStream,
{
    async fn next_row(&mut self) -> Result<Option<ViewRow>, InternalError> {
        while let Some(row) = self.inner.next_row().await? {
            if let Some((key, id)) = self.start.as_ref() {
                match self.comparator.cmp_to_cursor(&row, key, id.as_deref()) {
                    Some(Ordering::Less) => {
                        tracing::debug!(key = %row.key, id = %row.id, "dropping row before cursor");
                        continue;
                    }
                    Some(Ordering::Equal) if id.is_some() && self.skip > 0 => {
                        self.skip -= 1;
                        continue;
                    }
                    _ => {}
                }
            }

            return Ok(Some(row));
        }

        Ok(None)
    }
}

///
/// Paginator
///
/// Builds partition scans, merges them and cuts page windows.
///

#[derive(Clone)]
pub struct Paginator {
    store: Arc<dyn DocumentStore>,
    batch_size: usize,
    sink: Arc<dyn MetricsSink>,
}

impl Paginator {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            batch_size: DEFAULT_SCAN_BATCH_SIZE,
            sink: Arc::new(GlobalMetricsSink),
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Lazy merged stream over every partition of `query`, each partition
    /// resuming at the same start condition.
    pub fn stream(
        &self,
        query: &PartitionedQuery,
        comparator: RowComparator,
        dedup: DedupMode,
        start: Option<(&CompositeKey, Option<&str>)>,
    ) -> Result<InterleaveRowStream, InternalError> {
        self.stream_with_batch(query, comparator, dedup, start, self.batch_size)
    }

    fn stream_with_batch(
        &self,
        query: &PartitionedQuery,
        comparator: RowComparator,
        dedup: DedupMode,
        start: Option<(&CompositeKey, Option<&str>)>,
        batch_size: usize,
    ) -> Result<InterleaveRowStream, InternalError> {
        let (start_key, start_doc_id) = start.map_or((None, None), |(key, id)| (Some(key), id));
        let sources = query
            .plans_from(start_key, start_doc_id)
            .into_iter()
            .map(|partition| {
                let scan = ViewScanStream::new(Arc::clone(&self.store), partition.plan, batch_size)
                    .with_sink(Arc::clone(&self.sink));
                MergeSource::new(partition.label, partition.priority, Box::new(scan))
            })
            .collect();

        Ok(InterleaveRowStream::new(sources, comparator, dedup)?.with_sink(Arc::clone(&self.sink)))
    }

    /// Fetch one page: `limit + 1` merged rows, the extra one becoming the
    /// next cursor.
    ///
    /// Only `KeyThenId` orders rows by the `(key, id)` a cursor resumes at,
    /// so any other comparator is rejected.
    pub async fn page(
        &self,
        query: &PartitionedQuery,
        comparator: RowComparator,
        dedup: DedupMode,
        request: &PageRequest,
    ) -> Result<Page<ViewRow>, InternalError> {
        request.validate()?;
        if !comparator.resumes_exactly() {
            return Err(InternalError::query_unsupported(format!(
                "paging requires a key-then-id comparator, got {comparator:?}"
            )));
        }

        let window = request.limit.saturating_add(1);
        let start = request
            .start_key
            .as_ref()
            .map(|key| (key, request.start_doc_id.as_deref()));
        let merged = self.stream_with_batch(
            query,
            comparator.clone(),
            dedup,
            start,
            window.min(self.batch_size),
        )?;

        let floor = CursorFloor {
            inner: merged,
            comparator,
            start: request
                .start_key
                .clone()
                .map(|key| (key, request.start_doc_id.clone())),
            skip: request.skip,
        };
        let rows = collect_rows(&mut BudgetedRowStream::new(floor, window)).await?;

        Ok(page_from_window(rows, request))
    }
}
