//! Inbound trigger envelopes and tolerant field extraction.
//!
//! Agents are invoked with a batch of `{ "payload": { "value": { ... } } }`
//! envelopes. The values are partially trusted: fields may be missing, null, or
//! carry a different JSON type than expected, so every accessor here is
//! null-tolerant and never panics.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sentinel used when an upstream event carries no identifier.
pub const UNKNOWN: &str = "unknown";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub payload: EventPayload,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventBatch(pub Vec<InboundEvent>);

impl EventBatch {
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self(
            values
                .into_iter()
                .map(|value| InboundEvent { payload: EventPayload { value } })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InboundEvent> {
        self.0.iter()
    }
}

impl InboundEvent {
    pub fn fields(&self) -> Option<EventFields<'_>> {
        self.payload.value.as_object().map(EventFields)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EventFields<'a>(pub &'a Map<String, Value>);

impl<'a> EventFields<'a> {
    pub fn raw(&self, key: &str) -> Option<&'a Value> {
        self.0.get(key).filter(|value| !value.is_null())
    }

    /// String field. Numbers and booleans are rendered, empty strings are absent.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.raw(key)? {
            Value::String(value) if value.trim().is_empty() => None,
            Value::String(value) => Some(value.clone()),
            Value::Number(value) => Some(value.to_string()),
            Value::Bool(value) => Some(value.to_string()),
            _ => None,
        }
    }

    pub fn text_or(&self, key: &str, default: &str) -> String {
        self.text(key).unwrap_or_else(|| default.to_string())
    }

    /// Epoch milliseconds from an integer or a numeric string.
    pub fn epoch_millis(&self, key: &str) -> Option<i64> {
        match self.raw(key)? {
            Value::Number(value) => value.as_i64(),
            Value::String(value) => value.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// A list of strings, accepting either a JSON array or a comma separated string.
    pub fn string_list(&self, key: &str) -> Vec<String> {
        match self.raw(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(value) => Some(value.trim().to_string()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .filter(|value| !value.is_empty())
                .collect(),
            Some(Value::String(value)) => value
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// A numeric vector. `None` unless the field is a non-empty array of numbers.
    pub fn float_vector(&self, key: &str) -> Option<Vec<f32>> {
        let Value::Array(items) = self.raw(key)? else {
            return None;
        };
        if items.is_empty() {
            return None;
        }
        items.iter().map(|item| item.as_f64().map(|value| value as f32)).collect()
    }
}
