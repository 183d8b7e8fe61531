use crate::{
    db::design::{DesignDocument, ViewDefinition},
    error::InternalError,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Design document id holding the views of one kind/partition pair.
#[must_use]
pub fn design_doc_id(kind: &str, partition: Option<&str>) -> String {
    match partition {
        Some(partition) => format!("_design/{kind}_{partition}"),
        None => format!("_design/{kind}"),
    }
}

///
/// ViewSpec
///
/// One configured view of an entity kind.
///
/// `index` groups views that together answer one logical query: a legacy
/// view and the views that replaced it after a migration share an index.
/// `priority` decides which partition wins when the merge collapses
/// duplicates; migrated partitions must outrank the legacy view.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ViewSpec {
    pub index: String,
    pub view: String,
    pub partition: Option<String>,
    pub priority: u16,
    pub map: String,
    pub reduce: Option<String>,
}

impl ViewSpec {
    #[must_use]
    pub fn new(view: impl Into<String>, map: impl Into<String>) -> Self {
        let view = view.into();

        Self {
            index: view.clone(),
            view,
            partition: None,
            priority: 0,
            map: map.into(),
            reduce: None,
        }
    }

    #[must_use]
    pub fn for_index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    #[must_use]
    pub fn in_partition(mut self, partition: impl Into<String>, priority: u16) -> Self {
        self.partition = Some(partition.into());
        self.priority = priority;
        self
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: u16) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_reduce(mut self, reduce: impl Into<String>) -> Self {
        self.reduce = Some(reduce.into());
        self
    }
}

///
/// ViewPartition
///
/// Resolved `(view, partition)` pair a partitioned query scans.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ViewPartition {
    pub design_doc_id: String,
    pub view: String,
    pub partition: Option<String>,
    pub priority: u16,
}

impl ViewPartition {
    #[must_use]
    pub fn new(kind: &str, view: impl Into<String>, partition: Option<&str>, priority: u16) -> Self {
        Self {
            design_doc_id: design_doc_id(kind, partition),
            view: view.into(),
            partition: partition.map(str::to_string),
            priority,
        }
    }

    /// Label used in diagnostics.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}/{}", self.design_doc_id, self.view)
    }
}

///
/// ViewTable
///
/// Entity kind -> configured views. Built once and handed to repositories
/// and the design synchronizer.
///

#[derive(Clone, Debug, Default)]
pub struct ViewTable {
    kinds: BTreeMap<String, Vec<ViewSpec>>,
}

impl ViewTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_view(mut self, kind: &str, spec: ViewSpec) -> Self {
        self.register(kind, spec);
        self
    }

    pub fn register(&mut self, kind: &str, spec: ViewSpec) {
        self.kinds.entry(kind.to_string()).or_default().push(spec);
    }

    #[must_use]
    pub fn views(&self, kind: &str) -> &[ViewSpec] {
        self.kinds.get(kind).map_or(&[], Vec::as_slice)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    /// Every partition answering `index` for `kind`.
    pub fn partitions(&self, kind: &str, index: &str) -> Result<Vec<ViewPartition>, InternalError> {
        let partitions = self
            .views(kind)
            .iter()
            .filter(|spec| spec.index == index)
            .map(|spec| {
                ViewPartition::new(kind, &spec.view, spec.partition.as_deref(), spec.priority)
            })
            .collect::<Vec<_>>();

        if partitions.is_empty() {
            return Err(InternalError::query_unsupported(format!(
                "no view configured for index '{index}' of kind '{kind}'"
            )));
        }

        Ok(partitions)
    }

    /// Desired design documents for `kind`, one per partition.
    #[must_use]
    pub fn design_documents(&self, kind: &str) -> Vec<DesignDocument> {
        let mut docs: BTreeMap<String, DesignDocument> = BTreeMap::new();
        for spec in self.views(kind) {
            let id = design_doc_id(kind, spec.partition.as_deref());
            docs.entry(id.clone())
                .or_insert_with(|| DesignDocument::new(id))
                .views
                .insert(
                    spec.view.clone(),
                    ViewDefinition {
                        map: spec.map.clone(),
                        reduce: spec.reduce.clone(),
                    },
                );
        }

        docs.into_values().collect()
    }
}
