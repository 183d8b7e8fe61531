use super::*;
use crate::{
    db::{
        design::DesignDocument,
        direction::Direction,
        plan::{KeyRange, KeySelection, PartitionedQuery, QueryPlan, ViewPartition},
        row::{GroupRow, ViewRow},
        store::{DocumentStore, MemoryDocumentStore, MemoryReduce, WriteRequest, WriteResult},
        stream::{DedupMode, RowComparator, RowStream, collect_rows},
    },
    error::{ErrorClass, InternalError},
    key,
    obs::sink::NoopMetricsSink,
};
use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;

const KIND: &str = "Contact";

// legacy view: every doc flagged `legacy`; migrated view: every doc flagged `v2`
fn contact_store(docs: &[(&str, &str, bool, bool)]) -> Arc<MemoryDocumentStore> {
    let store = MemoryDocumentStore::new();
    for (partition, flag) in [(None, "legacy"), (Some("v2"), "v2")] {
        let design = crate::db::plan::design_doc_id(KIND, partition);
        store.register_view(&design, "by_party", None, move |doc| {
            if doc.get(flag).and_then(JsonValue::as_bool) == Some(true) {
                let party = doc.get("party").and_then(JsonValue::as_str).unwrap_or_default();
                vec![(key![party.to_string()], JsonValue::Null)]
            } else {
                Vec::new()
            }
        });
    }
    for (id, party, legacy, v2) in docs {
        store.put_raw(id, json!({ "party": party, "legacy": legacy, "v2": v2 }));
    }

    Arc::new(store)
}

fn contact_query() -> PartitionedQuery {
    PartitionedQuery::new(
        vec![
            ViewPartition::new(KIND, "by_party", None, 0),
            ViewPartition::new(KIND, "by_party", Some("v2"), 10),
        ],
        KeySelection::Range(KeyRange::all()),
    )
}

fn sample_docs() -> Vec<(&'static str, &'static str, bool, bool)> {
    vec![
        ("c-1", "alpha", true, false),
        ("c-2", "alpha", true, true),
        ("c-3", "alpha", false, true),
        ("c-4", "beta", true, true),
        ("c-5", "beta", true, false),
        ("c-6", "beta", false, true),
        ("c-7", "gamma", true, false),
    ]
}

fn ids(rows: &[ViewRow]) -> Vec<String> {
    rows.iter().map(|row| row.id.clone()).collect()
}

fn paginator(store: Arc<MemoryDocumentStore>) -> Paginator {
    Paginator::new(store).with_sink(Arc::new(NoopMetricsSink))
}

async fn drain_pages(paginator: &Paginator, query: &PartitionedQuery, limit: usize) -> Vec<ViewRow> {
    let mut out = Vec::new();
    let mut cursor: Option<ContinuationCursor> = None;
    loop {
        let request = PageRequest::resume(cursor.as_ref(), limit);
        let page = paginator
            .page(query, RowComparator::default(), DedupMode::Id, &request)
            .await
            .expect("page");
        assert!(page.rows.len() <= limit);
        out.extend(page.rows);
        match page.next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    out
}

#[tokio::test]
async fn concatenated_pages_reproduce_the_full_merge() {
    let store = contact_store(&sample_docs());
    let paginator = paginator(store);
    let query = contact_query();

    let mut full = paginator
        .stream(&query, RowComparator::default(), DedupMode::Id, None)
        .expect("stream");
    let full = collect_rows(&mut full).await.expect("full merge");
    assert_eq!(ids(&full), vec!["c-1", "c-2", "c-3", "c-4", "c-5", "c-6", "c-7"]);

    for limit in 1..=4 {
        let paged = drain_pages(&paginator, &query, limit).await;
        assert_eq!(ids(&paged), ids(&full), "limit {limit}");
    }
}

#[tokio::test]
async fn page_cursor_points_inside_a_tied_key_group() {
    let store = contact_store(&sample_docs());
    let paginator = paginator(store);

    let page = paginator
        .page(
            &contact_query(),
            RowComparator::default(),
            DedupMode::Id,
            &PageRequest::first(2),
        )
        .await
        .expect("page");

    assert_eq!(ids(&page.rows), vec!["c-1", "c-2"]);
    assert_eq!(
        page.next,
        Some(ContinuationCursor::new(key!["alpha"], Some("c-3".to_string())))
    );
}

#[tokio::test]
async fn missing_start_doc_id_includes_every_id_at_the_key() {
    let store = contact_store(&sample_docs());
    let paginator = paginator(store);

    let page = paginator
        .page(
            &contact_query(),
            RowComparator::default(),
            DedupMode::Id,
            &PageRequest::starting_at(key!["beta"], None, 10),
        )
        .await
        .expect("page");

    assert_eq!(ids(&page.rows), vec!["c-4", "c-5", "c-6", "c-7"]);
    assert!(page.next.is_none());
}

#[tokio::test]
async fn descending_pages_walk_backwards() {
    let store = contact_store(&sample_docs());
    let paginator = paginator(store);
    let query = contact_query().with_direction(Direction::Desc);

    let first = paginator
        .page(
            &query,
            RowComparator::KeyThenId(Direction::Desc),
            DedupMode::Id,
            &PageRequest::first(3),
        )
        .await
        .expect("page");
    assert_eq!(ids(&first.rows), vec!["c-7", "c-6", "c-5"]);

    let second = paginator
        .page(
            &query,
            RowComparator::KeyThenId(Direction::Desc),
            DedupMode::Id,
            &PageRequest::resume(first.next.as_ref(), 3),
        )
        .await
        .expect("page");
    assert_eq!(ids(&second.rows), vec!["c-4", "c-3", "c-2"]);
}

#[tokio::test]
async fn zero_limit_is_rejected() {
    let store = contact_store(&sample_docs());
    let err = paginator(store)
        .page(
            &contact_query(),
            RowComparator::default(),
            DedupMode::Id,
            &PageRequest::first(0),
        )
        .await
        .expect_err("zero limit");

    assert_eq!(err.class, ErrorClass::Unsupported);
}

#[tokio::test]
async fn paging_rejects_comparators_without_an_exact_resume_point() {
    let store = contact_store(&sample_docs());
    let paginator = paginator(store);

    for comparator in [
        RowComparator::Key(Direction::Asc),
        RowComparator::custom(|left, right| left.key.cmp(&right.key)),
    ] {
        let err = paginator
            .page(
                &contact_query(),
                comparator.clone(),
                DedupMode::None,
                &PageRequest::first(1),
            )
            .await
            .expect_err("comparator cannot resume");

        assert_eq!(err.class, ErrorClass::Unsupported, "{comparator:?}");
    }
}

#[tokio::test]
async fn undeduplicated_pages_keep_every_partition_row() {
    let store = contact_store(&sample_docs());
    let paginator = paginator(store);
    let query = contact_query();

    let mut full = paginator
        .stream(&query, RowComparator::default(), DedupMode::None, None)
        .expect("stream");
    let full = collect_rows(&mut full).await.expect("full merge");
    assert_eq!(full.len(), 9);

    let mut paged = Vec::new();
    let mut cursor: Option<ContinuationCursor> = None;
    loop {
        let page = paginator
            .page(
                &query,
                RowComparator::default(),
                DedupMode::None,
                &PageRequest::resume(cursor.as_ref(), 1),
            )
            .await
            .expect("page");
        paged.extend(page.rows);
        match page.next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(ids(&paged), ids(&full));
}

#[tokio::test]
async fn cursor_counts_copies_already_returned_at_its_position() {
    let store = contact_store(&sample_docs());
    let paginator = paginator(store);
    let query = contact_query();

    let first = paginator
        .page(&query, RowComparator::default(), DedupMode::None, &PageRequest::first(1))
        .await
        .expect("first page");
    assert_eq!(ids(&first.rows), vec!["c-1"]);
    assert_eq!(
        first.next,
        Some(ContinuationCursor::new(key!["alpha"], Some("c-2".to_string())))
    );

    let second = paginator
        .page(
            &query,
            RowComparator::default(),
            DedupMode::None,
            &PageRequest::resume(first.next.as_ref(), 1),
        )
        .await
        .expect("second page");
    assert_eq!(ids(&second.rows), vec!["c-2"]);
    assert_eq!(
        second.next,
        Some(ContinuationCursor::new(key!["alpha"], Some("c-2".to_string())).with_skip(1))
    );

    let token = second.next.as_ref().expect("cursor").encode().expect("encode");
    let third = paginator
        .page(
            &query,
            RowComparator::default(),
            DedupMode::None,
            &PageRequest::resume(Some(&ContinuationCursor::decode(&token).expect("decode")), 1),
        )
        .await
        .expect("third page");
    assert_eq!(ids(&third.rows), vec!["c-2"]);
    assert_eq!(
        third.next,
        Some(ContinuationCursor::new(key!["alpha"], Some("c-3".to_string())))
    );
}

///
/// CoarseStartStore
/// Store that honours start keys but ignores start document ids.
///

struct CoarseStartStore(Arc<MemoryDocumentStore>);

#[async_trait]
impl DocumentStore for CoarseStartStore {
    async fn execute_view(&self, plan: &QueryPlan) -> Result<Vec<ViewRow>, InternalError> {
        let mut coarse = plan.clone();
        coarse.start_doc_id = None;
        self.0.execute_view(&coarse).await
    }

    async fn execute_grouped(&self, plan: &QueryPlan) -> Result<Vec<GroupRow>, InternalError> {
        self.0.execute_grouped(plan).await
    }

    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Option<JsonValue>>, InternalError> {
        self.0.get_by_ids(ids).await
    }

    async fn bulk_write(
        &self,
        writes: Vec<WriteRequest>,
    ) -> Result<Vec<WriteResult>, InternalError> {
        self.0.bulk_write(writes).await
    }

    async fn get_design_document(
        &self,
        id: &str,
    ) -> Result<Option<DesignDocument>, InternalError> {
        self.0.get_design_document(id).await
    }

    async fn put_design_document(&self, doc: &DesignDocument) -> Result<String, InternalError> {
        self.0.put_design_document(doc).await
    }
}

#[tokio::test]
async fn rows_before_the_cursor_are_dropped() {
    let store = contact_store(&sample_docs());
    let paginator = Paginator::new(Arc::new(CoarseStartStore(store)))
        .with_sink(Arc::new(NoopMetricsSink));

    let page = paginator
        .page(
            &contact_query(),
            RowComparator::default(),
            DedupMode::Id,
            &PageRequest::starting_at(key!["alpha"], Some("c-3".to_string()), 2),
        )
        .await
        .expect("page");

    assert_eq!(ids(&page.rows), vec!["c-3", "c-4"]);
}

#[tokio::test]
async fn stream_stops_fetching_when_consumer_stops() {
    let store = MemoryDocumentStore::new();
    store.register_view(&crate::db::plan::design_doc_id(KIND, None), "by_party", None, |doc| {
        vec![(key!["p"], doc.get("n").cloned().unwrap_or_default())]
    });
    for n in 0..50 {
        store.put_raw(&format!("c-{n:02}"), json!({ "n": n }));
    }
    let store = Arc::new(store);
    let query = PartitionedQuery::new(
        vec![ViewPartition::new(KIND, "by_party", None, 0)],
        KeySelection::Range(KeyRange::all()),
    );

    let mut stream = Paginator::new(Arc::clone(&store) as Arc<dyn DocumentStore>)
        .with_batch_size(5)
        .with_sink(Arc::new(NoopMetricsSink))
        .stream(&query, RowComparator::default(), DedupMode::None, None)
        .expect("stream");
    for _ in 0..3 {
        stream.next_row().await.expect("row").expect("present");
    }

    assert_eq!(store.stats().view_requests, 1);
}

#[test]
fn cursor_token_round_trips() {
    let cursor = ContinuationCursor::new(key!["alpha", 3, true], Some("c-3".to_string()));
    let token = cursor.encode().expect("encode");

    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(ContinuationCursor::decode(&token).expect("decode"), cursor);
}

#[test]
fn malformed_cursor_token_is_rejected() {
    let err = ContinuationCursor::decode("zz").expect_err("not hex");
    assert_eq!(err.class, ErrorClass::InvariantViolation);

    let err = ContinuationCursor::decode(&encode_token(b"[1,2]")).expect_err("not a cursor");
    assert_eq!(err.class, ErrorClass::InvariantViolation);
}

#[test]
fn malformed_tokens_report_what_is_wrong() {
    assert_eq!(decode_token(" \n"), Err(TokenError::Blank));
    assert_eq!(decode_token("abc"), Err(TokenError::OddLength { len: 3 }));
    assert_eq!(
        decode_token("0x"),
        Err(TokenError::NotHex {
            offset: 1,
            found: 'x'
        })
    );
    assert_eq!(decode_token(" 0aFf "), Ok(vec![0x0a, 0xff]));
    assert_eq!(encode_token(&[0x0a, 0xff, 0x00]), "0aff00");

    let oversized = "aa".repeat(MAX_TOKEN_LEN / 2 + 1);
    assert!(matches!(
        decode_token(&oversized),
        Err(TokenError::Oversized { .. })
    ));
}

//
// grouped duplicates
//

fn duplicate_store(names: &[(&str, usize)]) -> Arc<MemoryDocumentStore> {
    let store = MemoryDocumentStore::new();
    store.register_view(
        &crate::db::plan::design_doc_id("Patient", None),
        "by_name",
        Some(MemoryReduce::Count),
        |doc| match doc.get("name").and_then(JsonValue::as_str) {
            Some(name) => vec![(key![name.to_string()], JsonValue::Null)],
            None => Vec::new(),
        },
    );
    for (name, count) in names {
        for n in 1..=*count {
            store.put_raw(&format!("{name}-{n}"), json!({ "name": name }));
        }
    }

    Arc::new(store)
}

fn name_partition() -> ViewPartition {
    ViewPartition::new("Patient", "by_name", None, 0)
}

async fn duplicate_page(
    pager: &GroupedDuplicatePager,
    request: &PageRequest,
) -> Page<ViewRow> {
    pager
        .page(&name_partition(), &KeyRange::all(), Direction::Asc, request)
        .await
        .expect("duplicate page")
}

#[tokio::test]
async fn duplicate_pages_cover_every_duplicate_exactly_once() {
    let store = duplicate_store(&[("ann", 3), ("bob", 1), ("cat", 2), ("dan", 2), ("eve", 1)]);

    for group_batch in [2, 3, 100] {
        let pager = GroupedDuplicatePager::new(Arc::clone(&store) as Arc<dyn DocumentStore>)
            .with_group_batch(group_batch)
            .with_sink(Arc::new(NoopMetricsSink));
        let mut seen = Vec::new();
        let mut cursor: Option<ContinuationCursor> = None;
        loop {
            let page = duplicate_page(&pager, &PageRequest::resume(cursor.as_ref(), 2)).await;
            seen.extend(ids(&page.rows));
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        assert_eq!(
            seen,
            vec!["ann-1", "ann-2", "ann-3", "cat-1", "cat-2", "dan-1", "dan-2"],
            "group batch {group_batch}"
        );
    }
}

#[tokio::test]
async fn duplicate_page_keeps_going_when_the_first_group_was_overcounted() {
    let store = duplicate_store(&[("ann", 5), ("cat", 2), ("dan", 2), ("fay", 2)]);
    let pager = GroupedDuplicatePager::new(Arc::clone(&store) as Arc<dyn DocumentStore>)
        .with_sink(Arc::new(NoopMetricsSink));

    let page = duplicate_page(
        &pager,
        &PageRequest::starting_at(key!["ann"], Some("ann-5".to_string()), 3),
    )
    .await;

    assert_eq!(ids(&page.rows), vec!["ann-5", "cat-1", "cat-2"]);
    assert_eq!(
        page.next,
        Some(ContinuationCursor::new(key!["dan"], Some("dan-1".to_string())))
    );
    // one fetch for ann+cat, a second one after the overcount
    assert_eq!(store.stats().view_requests, 2);
}

#[tokio::test]
async fn duplicate_page_without_duplicates_is_empty() {
    let store = duplicate_store(&[("ann", 1), ("bob", 1)]);
    let pager = GroupedDuplicatePager::new(store).with_sink(Arc::new(NoopMetricsSink));

    let page = duplicate_page(&pager, &PageRequest::first(5)).await;

    assert!(page.rows.is_empty());
    assert!(!page.has_more());
}
