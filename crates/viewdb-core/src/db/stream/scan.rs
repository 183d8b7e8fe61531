//! Module: db::stream::scan
//! Responsibility: lazy paging over one store query plan.

use crate::{
    db::{
        plan::QueryPlan,
        row::ViewRow,
        store::DocumentStore,
        stream::RowStream,
    },
    error::InternalError,
    obs::sink::{MetricsEvent, MetricsSink},
};
use async_trait::async_trait;
use std::{collections::VecDeque, sync::Arc};

/// Rows requested per store round-trip when no batch size is configured.
pub const DEFAULT_SCAN_BATCH_SIZE: usize = 1000;

///
/// ViewScanStream
///
/// Turns single-page `execute_view` calls into a lazy row sequence.
/// Each page asks for one row more than it emits; that row becomes the next
/// page's `(start_key, start_doc_id)`. No fetch happens until a row is pulled.
///

pub struct ViewScanStream {
    store: Arc<dyn DocumentStore>,
    plan: QueryPlan,
    batch_size: usize,
    buffer: VecDeque<ViewRow>,
    remaining: Option<usize>,
    exhausted: bool,
    sink: Option<Arc<dyn MetricsSink>>,
}

impl ViewScanStream {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, plan: QueryPlan, batch_size: usize) -> Self {
        let remaining = plan.limit;

        Self {
            store,
            plan,
            batch_size: batch_size.max(1),
            buffer: VecDeque::new(),
            remaining,
            exhausted: false,
            sink: None,
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    async fn fetch_page(&mut self) -> Result<(), InternalError> {
        // exact key sets are answered in one round-trip
        if self.plan.keys.is_some() {
            let rows = self.store.execute_view(&self.plan).await?;
            self.record(rows.len());
            self.buffer.extend(rows);
            self.exhausted = true;
            return Ok(());
        }

        let page = self
            .remaining
            .map_or(self.batch_size, |remaining| remaining.min(self.batch_size));
        let request = self.plan.clone().with_limit(Some(page.saturating_add(1)));
        let mut rows = self.store.execute_view(&request).await?;
        self.record(rows.len());

        if rows.len() > page {
            if let Some(next) = rows.pop() {
                self.plan.start_key = Some(next.key);
                self.plan.start_doc_id = Some(next.id);
            }
        } else {
            self.exhausted = true;
        }
        self.buffer.extend(rows);

        Ok(())
    }

    fn record(&self, rows: usize) {
        if let Some(sink) = self.sink.as_ref() {
            sink.record(MetricsEvent::ViewScan { rows: rows as u64 });
        }
    }
}

#[async_trait]
impl RowStream for ViewScanStream {
    async fn next_row(&mut self) -> Result<Option<ViewRow>, InternalError> {
        if self.remaining == Some(0) {
            return Ok(None);
        }
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_page().await?;
        }

        let Some(row) = self.buffer.pop_front() else {
            return Ok(None);
        };
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }

        Ok(Some(row))
    }
}
