//! Key types for tether
//!
//! A collection's parent entity carries one key slot per member, in member
//! order. A slot holds either the member's persisted primary key or a
//! synthetic placeholder issued while the member is still unsaved.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A persisted primary-key value: integer or text.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    Int(i64),
    Text(String),
}

impl KeyValue {
    /// Extract a key from a JSON value. Floats, booleans, empty strings and
    /// compound values never qualify as keys.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(KeyValue::Int),
            Value::String(s) if !s.is_empty() => Some(KeyValue::Text(s.clone())),
            _ => None,
        }
    }

    /// The JSON representation stored in the parent's serialized key array.
    pub fn to_json(&self) -> Value {
        match self {
            KeyValue::Int(n) => Value::from(*n),
            KeyValue::Text(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(n) => write!(f, "{n}"),
            KeyValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(n: i64) -> Self {
        KeyValue::Int(n)
    }
}

impl From<&str> for KeyValue {
    fn from(s: &str) -> Self {
        KeyValue::Text(s.to_owned())
    }
}

impl From<String> for KeyValue {
    fn from(s: String) -> Self {
        KeyValue::Text(s)
    }
}

/// Synthetic key for a not-yet-persisted entity.
///
/// Unique at generation time within one process: millisecond timestamp plus
/// a random suffix, hex-encoded with a separator so the result never parses
/// as a number and cannot collide with an integer primary key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlaceholderKey(String);

impl PlaceholderKey {
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let suffix: u32 = rand::random();
        PlaceholderKey(format!("{millis:x}-{suffix:08x}"))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaceholderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One slot of the parent's key array.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlotKey {
    /// The member's persisted primary key.
    Primary(KeyValue),
    /// A placeholder standing in until the member is first saved.
    Placeholder(PlaceholderKey),
}

impl SlotKey {
    #[inline]
    pub fn is_placeholder(&self) -> bool {
        matches!(self, SlotKey::Placeholder(_))
    }

    /// Serialized form: primary keys keep their JSON type, placeholders
    /// appear as strings.
    pub fn to_json(&self) -> Value {
        match self {
            SlotKey::Primary(key) => key.to_json(),
            SlotKey::Placeholder(p) => Value::from(p.as_str()),
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKey::Primary(key) => write!(f, "{key}"),
            SlotKey::Placeholder(p) => write!(f, "{p}"),
        }
    }
}

/// Identity tag carried by emitter subscriptions.
///
/// Several collections may observe the same entity; each tags its
/// subscriptions with its own `OwnerTag` so detaching one collection leaves
/// the others' listeners in place.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerTag(u64);

impl OwnerTag {
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        OwnerTag(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for OwnerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Owner({})", self.0)
    }
}
