use crate::{
    error::{ErrorClass, ErrorOrigin, InternalError},
    key::{CompositeKey, KeyComponent},
};
use serde_json::Value as JsonValue;

impl From<KeyComponent> for JsonValue {
    fn from(component: KeyComponent) -> Self {
        match component {
            KeyComponent::Null => Self::Null,
            KeyComponent::Bool(value) => Self::Bool(value),
            KeyComponent::Int(value) => Self::from(value),
            KeyComponent::Text(value) => Self::String(value),
            // the store collates objects after every scalar
            KeyComponent::Max => Self::Object(serde_json::Map::new()),
        }
    }
}

impl TryFrom<JsonValue> for KeyComponent {
    type Error = InternalError;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        match value {
            JsonValue::Null => Ok(Self::Null),
            JsonValue::Bool(value) => Ok(Self::Bool(value)),
            JsonValue::Number(number) => number.as_i64().map(Self::Int).ok_or_else(|| {
                InternalError::new(
                    ErrorClass::Unsupported,
                    ErrorOrigin::Serialize,
                    format!("key component must be an integer, found {number}"),
                )
            }),
            JsonValue::String(value) => Ok(Self::Text(value)),
            JsonValue::Object(map) if map.is_empty() => Ok(Self::Max),
            other => Err(InternalError::new(
                ErrorClass::Unsupported,
                ErrorOrigin::Serialize,
                format!("unsupported key component: {other}"),
            )),
        }
    }
}

impl From<CompositeKey> for JsonValue {
    fn from(key: CompositeKey) -> Self {
        Self::Array(key.into_iter().map(Into::into).collect())
    }
}

impl TryFrom<JsonValue> for CompositeKey {
    type Error = InternalError;

    // Scalars are accepted as single-component keys.
    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        match value {
            JsonValue::Array(items) => items
                .into_iter()
                .map(KeyComponent::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::new),
            scalar => KeyComponent::try_from(scalar).map(|component| Self::new(vec![component])),
        }
    }
}
