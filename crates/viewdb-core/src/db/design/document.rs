use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// ViewDefinition
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ViewDefinition {
    pub map: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<String>,
}

impl ViewDefinition {
    #[must_use]
    pub fn map(map: impl Into<String>) -> Self {
        Self {
            map: map.into(),
            reduce: None,
        }
    }
}

///
/// DesignDocument
///
/// Stored definition of the views one kind/partition requires.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DesignDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub language: String,
    pub views: BTreeMap<String, ViewDefinition>,
}

impl DesignDocument {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rev: None,
            language: "javascript".to_string(),
            views: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_view(mut self, name: impl Into<String>, view: ViewDefinition) -> Self {
        self.views.insert(name.into(), view);
        self
    }
}

/// Merge `desired` into `current`, returning the merged document and whether
/// anything changed.
///
/// The merge is additive: views present only in `current` survive unless
/// `prune` is set. The merged document keeps the current revision so the
/// write is revision-checked.
#[must_use]
pub fn merge_design_document(
    current: Option<&DesignDocument>,
    desired: &DesignDocument,
    prune: bool,
) -> (DesignDocument, bool) {
    let Some(current) = current else {
        let mut created = desired.clone();
        created.rev = None;
        return (created, true);
    };

    let mut merged = current.clone();
    let mut changed = false;

    if merged.language != desired.language {
        merged.language.clone_from(&desired.language);
        changed = true;
    }

    for (name, view) in &desired.views {
        if merged.views.get(name) != Some(view) {
            merged.views.insert(name.clone(), view.clone());
            changed = true;
        }
    }

    if prune {
        let before = merged.views.len();
        merged.views.retain(|name, _| desired.views.contains_key(name));
        changed |= merged.views.len() != before;
    }

    (merged, changed)
}
