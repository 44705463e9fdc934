//! Attribute payloads
//!
//! Raw entity data crosses every tether boundary as an `Attrs` map: the
//! shape of a fetched record, the input to entity construction, and the
//! comparison view during reconciliation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::KeyValue;

/// An ordered map of attribute name to JSON value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Attrs(Map<String, Value>);

impl Attrs {
    pub fn new() -> Self {
        Attrs::default()
    }

    /// Build from a JSON value; anything but an object is rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Attrs(map)),
            _ => None,
        }
    }

    #[inline]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Set a field, returning the previous value if any.
    pub fn set(&mut self, field: &str, value: Value) -> Option<Value> {
        self.0.insert(field.to_owned(), value)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// The primary key carried by this payload, if the given field holds a
    /// usable key value.
    pub fn key(&self, primary_field: &str) -> Option<KeyValue> {
        self.0.get(primary_field).and_then(KeyValue::from_json)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Attrs {
    fn from(map: Map<String, Value>) -> Self {
        Attrs(map)
    }
}

impl FromIterator<(String, Value)> for Attrs {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Attrs(iter.into_iter().collect())
    }
}
