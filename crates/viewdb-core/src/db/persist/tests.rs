use super::*;
use crate::{
    db::{
        cache::{CacheChain, CacheKey, EntityCache, MemoryEntityCache},
        cursor::PageRequest,
        plan::{KeyRange, ListQuery, ViewSpec, ViewTable, design_doc_id},
        store::{DocumentStore, MemoryDocumentStore, MemoryReduce, WriteErrorKind},
    },
    error::ErrorClass,
    key,
    obs::sink::NoopMetricsSink,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;

///
/// Patient
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
struct Patient {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    rev: Option<String>,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deleted: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    modified: Option<i64>,
}

impl Patient {
    fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            rev: None,
            name: name.to_string(),
            deleted: None,
            created: None,
            modified: None,
        }
    }
}

impl StoredEntity for Patient {
    const KIND: &'static str = "Patient";

    fn id(&self) -> &str {
        &self.id
    }

    fn rev(&self) -> Option<&str> {
        self.rev.as_deref()
    }

    fn set_rev(&mut self, rev: Option<String>) {
        self.rev = rev;
    }

    fn deleted(&self) -> Option<i64> {
        self.deleted
    }

    fn set_deleted(&mut self, deleted: Option<i64>) {
        self.deleted = deleted;
    }
}

impl AuditedEntity for Patient {
    fn created(&self) -> Option<i64> {
        self.created
    }

    fn set_created(&mut self, created: Option<i64>) {
        self.created = created;
    }

    fn modified(&self) -> Option<i64> {
        self.modified
    }

    fn set_modified(&mut self, modified: Option<i64>) {
        self.modified = modified;
    }
}

struct Fixture {
    store: Arc<MemoryDocumentStore>,
    layer: Arc<MemoryEntityCache<Patient>>,
    clock: Arc<FixedClock>,
    repo: EntityRepository<Patient>,
}

fn name_map(doc: &JsonValue) -> Vec<(crate::key::CompositeKey, JsonValue)> {
    match doc.get("name").and_then(JsonValue::as_str) {
        Some(name) if doc.get("deleted").is_none() => {
            vec![(key![name.to_string()], JsonValue::Null)]
        }
        _ => Vec::new(),
    }
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryDocumentStore::new());
    store.register_view(
        &design_doc_id("Patient", None),
        "by_name",
        Some(MemoryReduce::Count),
        name_map,
    );

    let views = ViewTable::new().with_view(
        "Patient",
        ViewSpec::new("by_name", "function (doc) { emit(doc.name, null) }").with_reduce("_count"),
    );
    let layer = Arc::new(MemoryEntityCache::<Patient>::new(64));
    let clock = Arc::new(FixedClock::new(1_000));
    let repo = EntityRepository::new(
        Arc::clone(&store) as Arc<dyn DocumentStore>,
        Arc::new(views),
    )
    .with_cache(CacheChain::single(
        Arc::clone(&layer) as Arc<dyn EntityCache<Patient>>
    ))
    .with_clock(Arc::clone(&clock) as Arc<dyn Clock>)
    .with_sink(Arc::new(NoopMetricsSink));

    Fixture {
        store,
        layer,
        clock,
        repo,
    }
}

fn cache_key(id: &str) -> CacheKey {
    CacheKey::new("Patient", id)
}

#[tokio::test]
async fn saved_entity_is_served_from_cache() {
    let fx = fixture();
    let saved = fx.repo.create(Patient::new("p-1", "ann")).await.expect("create");
    assert!(saved.rev.as_deref().is_some_and(|rev| rev.starts_with("1-")));

    let got = fx.repo.get("p-1").await.expect("get").expect("present");

    assert_eq!(got, saved);
    assert_eq!(fx.store.stats().read_requests, 0);
}

#[tokio::test]
async fn get_reads_through_once() {
    let fx = fixture();
    fx.store.put_raw("p-1", json!({ "name": "ann" }));

    let first = fx.repo.get("p-1").await.expect("get").expect("present");
    let second = fx.repo.get("p-1").await.expect("get").expect("present");

    assert_eq!(first, second);
    assert_eq!(first.name, "ann");
    assert_eq!(fx.store.stats().read_requests, 1);
}

#[tokio::test]
async fn missing_entity_is_none() {
    let fx = fixture();

    assert_eq!(fx.repo.get("nobody").await.expect("get"), None);
}

#[tokio::test]
async fn update_uses_the_current_revision() {
    let fx = fixture();
    let mut saved = fx.repo.save(Patient::new("p-1", "ann")).await.expect("insert");
    saved.name = "anna".to_string();

    let updated = fx.repo.save(saved).await.expect("update");

    assert!(updated.rev.as_deref().is_some_and(|rev| rev.starts_with("2-")));
    assert_eq!(fx.store.document("p-1").expect("stored")["name"], "anna");
}

#[tokio::test]
async fn stale_save_conflicts_and_leaves_cache_evicted() {
    let fx = fixture();
    let mut saved = fx.repo.create(Patient::new("p-1", "ann")).await.expect("create");
    fx.store.put_raw("p-1", json!({ "name": "changed underneath" }));

    saved.name = "mine".to_string();
    let err = fx.repo.save(saved).await.expect_err("stale revision");

    assert!(err.is_conflict());
    assert!(!fx.layer.contains(&cache_key("p-1")));
    let got = fx.repo.get("p-1").await.expect("get").expect("present");
    assert_eq!(got.name, "changed underneath");
}

#[tokio::test]
async fn create_over_an_existing_id_conflicts() {
    let fx = fixture();
    fx.repo.create(Patient::new("p-1", "ann")).await.expect("create");

    let err = fx
        .repo
        .create(Patient::new("p-1", "bea"))
        .await
        .expect_err("duplicate id");

    assert_eq!(err.class, ErrorClass::Conflict);
}

#[tokio::test]
async fn transport_failure_propagates_and_evicts() {
    let fx = fixture();
    let saved = fx.repo.create(Patient::new("p-1", "ann")).await.expect("create");
    fx.store.fail_next_writes(1);

    let err = fx.repo.save(saved).await.expect_err("unavailable");

    assert_eq!(err.class, ErrorClass::Unavailable);
    assert!(!fx.layer.contains(&cache_key("p-1")));
}

async fn five_saved(fx: &Fixture) -> Vec<Patient> {
    let batch = (1..=5)
        .map(|n| Patient::new(&format!("p-{n}"), &format!("name-{n}")))
        .collect();
    fx.repo.save_bulk(batch).await.expect("initial bulk")
}

#[tokio::test]
async fn all_or_nothing_bulk_reports_every_failure_and_caches_nothing() {
    let fx = fixture();
    let saved = five_saved(&fx).await;
    fx.store.put_raw("p-3", json!({ "name": "concurrent edit" }));

    let err = fx.repo.save_bulk(saved).await.expect_err("item 3 is stale");

    assert!(err.is_conflict());
    let failures = err.bulk_failures().expect("aggregate detail");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].id, "p-3");
    for n in 1..=5 {
        assert!(!fx.layer.contains(&cache_key(&format!("p-{n}"))));
    }
}

#[tokio::test]
async fn partial_bulk_caches_only_successes() {
    let fx = fixture();
    let saved = five_saved(&fx).await;
    fx.store.put_raw("p-3", json!({ "name": "concurrent edit" }));

    let outcomes = fx.repo.save_bulk_partial(saved).await.expect("partial bulk");

    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_saved()).count(), 4);
    assert!(matches!(
        &outcomes[2],
        BulkItemOutcome::Failed { id, error } if id == "p-3" && error.kind == WriteErrorKind::Conflict
    ));
    for n in [1, 2, 4, 5] {
        assert!(fx.layer.contains(&cache_key(&format!("p-{n}"))));
    }
    assert!(!fx.layer.contains(&cache_key("p-3")));
}

#[tokio::test]
async fn get_many_fetches_misses_in_one_call() {
    let fx = fixture();
    fx.repo.create(Patient::new("p-1", "ann")).await.expect("create");
    fx.store.put_raw("p-2", json!({ "name": "bob" }));
    fx.store.put_raw("p-3", json!({ "name": "cat" }));

    let ids = ["p-3", "nobody", "p-1", "p-2"].map(str::to_string);
    let found = fx.repo.get_many(&ids).await.expect("get_many");

    let names = found.iter().map(|p| p.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["cat", "ann", "bob"]);
    assert_eq!(fx.store.stats().read_requests, 1);
    assert!(fx.layer.contains(&cache_key("p-2")));
    assert!(fx.layer.contains(&cache_key("p-3")));
}

#[tokio::test]
async fn remove_and_un_remove_toggle_the_deletion_marker() {
    let fx = fixture();
    let saved = fx.repo.create(Patient::new("p-1", "ann")).await.expect("create");
    fx.clock.set(5_000);

    let removed = fx.repo.remove(saved).await.expect("remove");
    assert_eq!(removed.deleted, Some(5_000));
    assert_eq!(fx.store.document("p-1").expect("kept")["deleted"], 5_000);

    let restored = fx.repo.un_remove(removed).await.expect("un_remove");
    assert!(!restored.is_deleted());
    assert_eq!(fx.repo.get("p-1").await.expect("get"), Some(restored));
}

#[tokio::test]
async fn remove_many_reports_each_item() {
    let fx = fixture();
    let mut saved = five_saved(&fx).await;
    saved.truncate(2);
    saved[1].rev = Some("9-stale".to_string());

    let outcomes = fx.repo.remove_many(saved).await.expect("remove_many");

    assert!(outcomes[0].is_saved());
    assert!(!outcomes[1].is_saved());
}

#[tokio::test]
async fn purge_deletes_only_the_target() {
    let fx = fixture();
    let first = fx.repo.create(Patient::new("p-1", "ann")).await.expect("create");
    fx.repo.create(Patient::new("p-2", "bob")).await.expect("create");

    fx.repo.purge(&first).await.expect("purge");

    assert!(fx.store.document("p-1").is_none());
    assert!(!fx.layer.contains(&cache_key("p-1")));
    assert!(fx.layer.contains(&cache_key("p-2")));
    assert_eq!(fx.repo.get("p-1").await.expect("get"), None);
}

#[tokio::test]
async fn purge_with_stale_revision_conflicts() {
    let fx = fixture();
    let mut first = fx.repo.create(Patient::new("p-1", "ann")).await.expect("create");
    first.rev = Some("1-stale".to_string());

    let err = fx.repo.purge(&first).await.expect_err("stale purge");

    assert!(err.is_conflict());
    assert!(fx.store.document("p-1").is_some());
}

#[tokio::test]
async fn audited_saves_stamp_created_once_and_modified_always() {
    let fx = fixture();
    let clock = Arc::clone(&fx.clock);
    let repo = AuditedRepository::new(fx.repo);

    let created = repo.create(Patient::new("p-1", "ann")).await.expect("create");
    assert_eq!((created.created, created.modified), (Some(1_000), Some(1_000)));

    clock.advance(500);
    let updated = repo.save(created).await.expect("save");
    assert_eq!((updated.created, updated.modified), (Some(1_000), Some(1_500)));

    // reads go through the wrapped repository
    assert_eq!(repo.get("p-1").await.expect("get"), Some(updated));
}

#[tokio::test]
async fn audited_bulk_and_removal_writes_stamp_modified() {
    let fx = fixture();
    let clock = Arc::clone(&fx.clock);
    let repo = AuditedRepository::new(fx.repo);
    assert!(repo.is_audited());

    let saved = repo
        .save_bulk(vec![Patient::new("p-1", "ann"), Patient::new("p-2", "bob")])
        .await
        .expect("bulk save");
    assert!(saved.iter().all(|p| p.modified == Some(1_000)));

    clock.advance(250);
    let removed = repo
        .remove_many(saved)
        .await
        .expect("remove_many")
        .into_iter()
        .map(|outcome| outcome.saved().expect("removed"))
        .collect::<Vec<_>>();
    for patient in &removed {
        assert_eq!(patient.deleted, Some(1_250));
        assert_eq!((patient.created, patient.modified), (Some(1_000), Some(1_250)));
    }

    clock.advance(250);
    let restored = repo
        .un_remove(removed[0].clone())
        .await
        .expect("un_remove");
    assert_eq!((restored.deleted, restored.modified), (None, Some(1_500)));
}

#[tokio::test]
async fn undecorated_repository_leaves_audit_fields_alone() {
    let fx = fixture();
    assert!(!fx.repo.is_audited());

    let saved = fx
        .repo
        .save_bulk(vec![Patient::new("p-1", "ann")])
        .await
        .expect("bulk save");

    assert_eq!((saved[0].created, saved[0].modified), (None, None));
}

#[test]
fn stamp_audit_keeps_an_existing_creation_time() {
    let mut patient = Patient::new("p-1", "ann");
    patient.created = Some(10);

    stamp_audit(&mut patient, 20);

    assert_eq!((patient.created, patient.modified), (Some(10), Some(20)));
}

#[test]
fn encoded_documents_carry_the_id_but_not_the_revision() {
    let mut patient = Patient::new("p-1", "ann");
    patient.rev = Some("3-abc".to_string());

    let body = encode_document(&patient).expect("encode");

    assert_eq!(body["_id"], "p-1");
    assert!(body.get("_rev").is_none());
    assert_eq!(decode_document::<Patient>(body).expect("decode").name, "ann");
}

#[tokio::test]
async fn list_skips_soft_deleted_rows_of_the_view() {
    let fx = fixture();
    let saved = five_saved(&fx).await;
    fx.repo.remove(saved[1].clone()).await.expect("remove");

    let listed = fx
        .repo
        .list(&ListQuery::range("by_name", KeyRange::all()))
        .expect("list")
        .try_collect()
        .await
        .expect("collect");

    let ids = listed.iter().map(|p| p.id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["p-1", "p-3", "p-4", "p-5"]);
}

#[tokio::test]
async fn list_page_walks_the_index() {
    let fx = fixture();
    five_saved(&fx).await;
    let query = ListQuery::range("by_name", KeyRange::all()).descending();

    let first = fx
        .repo
        .list_page(&query, &PageRequest::first(3))
        .await
        .expect("page");
    let second = fx
        .repo
        .list_page(&query, &PageRequest::resume(first.next.as_ref(), 3))
        .await
        .expect("page");

    let names = first
        .rows
        .iter()
        .chain(&second.rows)
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["name-5", "name-4", "name-3", "name-2", "name-1"]);
    assert!(second.next.is_none());
}

#[test]
fn unknown_index_is_unsupported() {
    let fx = fixture();

    let err = fx
        .repo
        .list(&ListQuery::range("by_ssin", KeyRange::all()))
        .err()
        .expect("no such index");

    assert_eq!(err.class, ErrorClass::Unsupported);
}

#[tokio::test]
async fn find_duplicates_returns_entities_sharing_a_key() {
    let fx = fixture();
    let batch = [("p-1", "ann"), ("p-2", "bob"), ("p-3", "ann"), ("p-4", "cat"), ("p-5", "cat")]
        .map(|(id, name)| Patient::new(id, name))
        .to_vec();
    fx.repo.save_bulk(batch).await.expect("bulk");

    let page = fx
        .repo
        .find_duplicates("by_name", &KeyRange::all(), &PageRequest::first(10))
        .await
        .expect("duplicates");

    let ids = page.rows.iter().map(|p| p.id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["p-1", "p-3", "p-4", "p-5"]);
    assert!(page.next.is_none());
}
