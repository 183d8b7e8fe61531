use crate::key::CompositeKey;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

///
/// ViewRow
///
/// One row produced by a single partition scan.
/// `value` is `Null` when the view emits no value; `doc` is present only
/// when the plan asked for documents.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ViewRow {
    pub key: CompositeKey,
    pub id: String,
    #[serde(default)]
    pub value: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<JsonValue>,
}

impl ViewRow {
    #[must_use]
    pub fn new(key: CompositeKey, id: impl Into<String>) -> Self {
        Self {
            key,
            id: id.into(),
            value: JsonValue::Null,
            doc: None,
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: JsonValue) -> Self {
        self.value = value;
        self
    }

    #[must_use]
    pub fn with_doc(mut self, doc: JsonValue) -> Self {
        self.doc = Some(doc);
        self
    }
}

///
/// GroupRow
///
/// One reduced row of a grouped scan: the group key and its reduced value.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GroupRow {
    pub key: CompositeKey,
    pub value: JsonValue,
}

impl GroupRow {
    /// Reduced value read as a row count; non-numeric values count as zero.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.value.as_u64().unwrap_or(0)
    }
}
