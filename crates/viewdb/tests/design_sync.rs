mod common;

use common::{KIND, fixture, fixture_with};
use futures::future::join_all;
use viewdb::config::ViewDbConfig;
use viewdb_core::db::{
    design::{DesignDocument, SyncAction, ViewDefinition},
    plan::design_doc_id,
    store::DocumentStore,
};

fn actions(report: &viewdb_core::db::design::SyncReport) -> Vec<SyncAction> {
    report.outcomes.iter().map(|outcome| outcome.action).collect()
}

#[tokio::test]
async fn init_creates_each_partition_document_once() {
    let fx = fixture();

    let first = fx.dao.init_design_documents().await.expect("first init");
    assert_eq!(actions(&first), vec![SyncAction::Created, SyncAction::Created]);

    let second = fx.dao.init_design_documents().await.expect("second init");
    assert!(second.is_noop());
    assert_eq!(
        actions(&second),
        vec![SyncAction::Unchanged, SyncAction::Unchanged]
    );

    let legacy = fx
        .store
        .get_design_document(&design_doc_id(KIND, None))
        .await
        .expect("read")
        .expect("legacy design doc");
    assert!(legacy.views.contains_key("by_party"));
    assert!(legacy.views.contains_key("party_count"));
}

#[tokio::test]
async fn preview_writes_nothing() {
    let fx = fixture();

    let report = fx.dao.preview_design_documents().await.expect("preview");

    assert_eq!(report.applied().len(), 2);
    assert_eq!(fx.store.stats().design_writes, 0);
}

async fn store_with_extra_view(fx: &common::Fixture) {
    let existing = DesignDocument::new(design_doc_id(KIND, None))
        .with_view("by_region", ViewDefinition::map("function (doc) { emit(doc.region) }"));
    fx.store
        .put_design_document(&existing)
        .await
        .expect("seed design doc");
}

#[tokio::test]
async fn existing_views_survive_unless_pruning() {
    let fx = fixture();
    store_with_extra_view(&fx).await;

    let report = fx.dao.init_design_documents().await.expect("init");
    assert_eq!(report.outcomes[0].action, SyncAction::Updated);
    let merged = fx
        .store
        .get_design_document(&design_doc_id(KIND, None))
        .await
        .expect("read")
        .expect("design doc");
    assert!(merged.views.contains_key("by_region"));
    assert!(merged.views.contains_key("by_party"));

    let pruning = fixture_with(&ViewDbConfig::from_toml_str("[design]\nprune = true").expect("config"));
    store_with_extra_view(&pruning).await;
    pruning.dao.init_design_documents().await.expect("init");
    let pruned = pruning
        .store
        .get_design_document(&design_doc_id(KIND, None))
        .await
        .expect("read")
        .expect("design doc");
    assert!(!pruned.views.contains_key("by_region"));
}

#[tokio::test]
async fn existing_documents_are_skipped_without_update_if_exists() {
    let fx = fixture_with(
        &ViewDbConfig::from_toml_str("[design]\nupdate_if_exists = false").expect("config"),
    );
    store_with_extra_view(&fx).await;

    let report = fx.dao.init_design_documents().await.expect("init");

    assert_eq!(actions(&report), vec![SyncAction::Skipped, SyncAction::Created]);
}

#[tokio::test]
async fn racing_initializer_is_merged_on_retry() {
    let fx = fixture();
    fx.store.race_next_design_put(
        DesignDocument::new(design_doc_id(KIND, None))
            .with_view("by_region", ViewDefinition::map("function (doc) { emit(doc.region) }")),
    );

    let report = fx.dao.init_design_documents().await.expect("init");

    assert_eq!(report.outcomes[0].attempts, 2);
    assert_eq!(report.outcomes[0].action, SyncAction::Updated);
    let merged = fx
        .store
        .get_design_document(&design_doc_id(KIND, None))
        .await
        .expect("read")
        .expect("design doc");
    assert!(merged.views.contains_key("by_region"));
    assert!(merged.views.contains_key("party_count"));
}

#[tokio::test]
async fn concurrent_initializers_converge() {
    let fx = fixture();

    let reports = join_all((0..3).map(|_| fx.dao.init_design_documents())).await;

    assert!(reports.iter().all(Result::is_ok));
    let second = fx.dao.init_design_documents().await.expect("init");
    assert!(second.is_noop());
}
