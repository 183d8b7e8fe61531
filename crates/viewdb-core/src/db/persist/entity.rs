use crate::error::InternalError;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;

///
/// StoredEntity
///
/// One entity kind persisted as a JSON document.
///
/// `rev` is the store's opaque concurrency token, `None` until the first
/// successful write. `deleted` is the soft-delete timestamp in milliseconds.
/// The serialized form must round-trip the id and revision under the
/// store's `_id`/`_rev` fields.
///

pub trait StoredEntity: Clone + DeserializeOwned + Send + Serialize + Sync + 'static {
    /// Entity kind; names design documents and scopes cache keys.
    const KIND: &'static str;

    fn id(&self) -> &str;

    fn rev(&self) -> Option<&str>;

    fn set_rev(&mut self, rev: Option<String>);

    fn deleted(&self) -> Option<i64>;

    fn set_deleted(&mut self, deleted: Option<i64>);

    fn is_deleted(&self) -> bool {
        self.deleted().is_some()
    }
}

///
/// AuditedEntity
/// Entity kinds carrying creation and modification timestamps.
///

pub trait AuditedEntity: StoredEntity {
    fn created(&self) -> Option<i64>;

    fn set_created(&mut self, created: Option<i64>);

    fn modified(&self) -> Option<i64>;

    fn set_modified(&mut self, modified: Option<i64>);
}

/// Document body for a write; the revision travels on the write request.
pub fn encode_document<E: StoredEntity>(entity: &E) -> Result<JsonValue, InternalError> {
    let mut body = serde_json::to_value(entity)
        .map_err(|err| InternalError::serialize_internal(err.to_string()))?;
    let Some(object) = body.as_object_mut() else {
        return Err(InternalError::serialize_internal(format!(
            "{} must serialize to a JSON object",
            E::KIND
        )));
    };
    object.remove("_rev");
    object.insert("_id".to_string(), JsonValue::from(entity.id()));

    Ok(body)
}

/// Entity from a stored document body.
pub fn decode_document<E: StoredEntity>(body: JsonValue) -> Result<E, InternalError> {
    serde_json::from_value(body).map_err(|err| {
        InternalError::serialize_corruption(format!("cannot decode {}: {err}", E::KIND))
    })
}
