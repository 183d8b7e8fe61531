#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use viewdb::{config::ViewDbConfig, dao::EntityDao};
use viewdb_core::{
    db::{
        persist::{AuditedEntity, Clock, FixedClock, StoredEntity},
        plan::{ViewSpec, ViewTable, design_doc_id},
        store::{DocumentStore, MemoryDocumentStore, MemoryReduce},
    },
    key,
    key::CompositeKey,
    obs::NoopMetricsSink,
};

pub const KIND: &str = "Contact";

///
/// Contact
///
/// `legacy` docs are indexed by the original view, `migrated` docs by the
/// replacement view; a doc carrying both flags shows up in both.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Contact {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub party: String,
    #[serde(default)]
    pub legacy: bool,
    #[serde(default)]
    pub migrated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<i64>,
}

impl Contact {
    pub fn new(id: &str, party: &str, legacy: bool, migrated: bool) -> Self {
        Self {
            id: id.to_string(),
            rev: None,
            party: party.to_string(),
            legacy,
            migrated,
            deleted: None,
            created: None,
            modified: None,
        }
    }
}

impl StoredEntity for Contact {
    const KIND: &'static str = KIND;

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

impl AuditedEntity for Contact {
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

pub struct Fixture {
    pub store: Arc<MemoryDocumentStore>,
    pub clock: Arc<FixedClock>,
    pub dao: EntityDao<Contact>,
}

pub fn views() -> ViewTable {
    ViewTable::new()
        .with_view(
            KIND,
            ViewSpec::new("by_party", "function (doc) { if (doc.legacy) emit(doc.party, 'legacy') }"),
        )
        .with_view(
            KIND,
            ViewSpec::new("by_party", "function (doc) { if (doc.migrated) emit(doc.party, 'v2') }")
                .in_partition("v2", 10),
        )
        .with_view(
            KIND,
            ViewSpec::new("party_count", "function (doc) { emit(doc.party, null) }")
                .with_reduce("_count"),
        )
}

type Emitted = Vec<(CompositeKey, JsonValue)>;

// Emits `(party, value)` for live docs carrying `flag`.
fn flagged_map(
    flag: &'static str,
    value: &'static str,
) -> impl Fn(&JsonValue) -> Emitted + Send + Sync + 'static {
    move |doc: &JsonValue| {
        let live = doc.get("deleted").is_none_or(JsonValue::is_null);
        match doc.get("party").and_then(JsonValue::as_str) {
            Some(party) if live && doc.get(flag).and_then(JsonValue::as_bool) == Some(true) => {
                vec![(key![party.to_string()], json!(value))]
            }
            _ => Vec::new(),
        }
    }
}

pub fn store() -> Arc<MemoryDocumentStore> {
    let store = MemoryDocumentStore::new();
    store.register_view(
        &design_doc_id(KIND, None),
        "by_party",
        None,
        flagged_map("legacy", "legacy"),
    );
    store.register_view(
        &design_doc_id(KIND, Some("v2")),
        "by_party",
        None,
        flagged_map("migrated", "v2"),
    );
    store.register_view(
        &design_doc_id(KIND, None),
        "party_count",
        Some(MemoryReduce::Count),
        |doc| match doc.get("party").and_then(JsonValue::as_str) {
            Some(party) if doc.get("deleted").is_none_or(JsonValue::is_null) => {
                vec![(key![party.to_string()], JsonValue::Null)]
            }
            _ => Vec::new(),
        },
    );

    Arc::new(store)
}

pub fn fixture_with(config: &ViewDbConfig) -> Fixture {
    let store = store();
    let clock = Arc::new(FixedClock::new(5_000));
    let dao = EntityDao::new(
        Arc::clone(&store) as Arc<dyn DocumentStore>,
        Arc::new(views()),
        config,
    )
    .with_clock(Arc::clone(&clock) as Arc<dyn Clock>)
    .with_sink(Arc::new(NoopMetricsSink));

    Fixture { store, clock, dao }
}

pub fn fixture() -> Fixture {
    fixture_with(&ViewDbConfig::default())
}

/// Seed contacts directly into the store, bypassing the cache.
pub fn seed(store: &MemoryDocumentStore, contacts: &[Contact]) {
    for contact in contacts {
        let mut body = serde_json::to_value(contact).expect("contact json");
        if let Some(object) = body.as_object_mut() {
            object.remove("_rev");
        }
        store.put_raw(&contact.id, body);
    }
}

pub fn ids(contacts: &[Contact]) -> Vec<&str> {
    contacts.iter().map(|contact| contact.id.as_str()).collect()
}
