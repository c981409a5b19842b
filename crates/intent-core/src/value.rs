//! Semi-structured context values.
//!
//! Requests carry a bag of loosely typed values produced by the chat UI or the NLU
//! step. Instead of casting at use sites, every value is one of a closed set of
//! variants and callers go through the lenient accessors in [`crate::semantics`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Key → value bag attached to requests, previews and semantics.
pub type ContextBag = BTreeMap<String, ContextValue>;

/// A single context value. Serialized untagged so plain JSON maps onto it directly.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<ContextValue>),
    Map(BTreeMap<String, ContextValue>),
}

impl ContextValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ContextValue::Null)
    }

    /// True for null and for strings that are empty after trimming.
    pub fn is_blank(&self) -> bool {
        match self {
            ContextValue::Null => true,
            ContextValue::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ContextValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ContextValue]> {
        match self {
            ContextValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Short variant name used in coercion warnings.
    pub fn kind(&self) -> &'static str {
        match self {
            ContextValue::Null => "null",
            ContextValue::Bool(_) => "bool",
            ContextValue::Integer(_) => "integer",
            ContextValue::Float(_) => "float",
            ContextValue::String(_) => "string",
            ContextValue::List(_) => "list",
            ContextValue::Map(_) => "map",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ContextValue::Null => serde_json::Value::Null,
            ContextValue::Bool(b) => serde_json::Value::Bool(*b),
            ContextValue::Integer(i) => serde_json::Value::from(*i),
            ContextValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ContextValue::String(s) => serde_json::Value::String(s.clone()),
            ContextValue::List(items) => {
                serde_json::Value::Array(items.iter().map(ContextValue::to_json).collect())
            }
            ContextValue::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for ContextValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ContextValue::Null,
            serde_json::Value::Bool(b) => ContextValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => ContextValue::Integer(i),
                None => n.as_f64().map(ContextValue::Float).unwrap_or(ContextValue::Null),
            },
            serde_json::Value::String(s) => ContextValue::String(s),
            serde_json::Value::Array(items) => {
                ContextValue::List(items.into_iter().map(ContextValue::from).collect())
            }
            serde_json::Value::Object(map) => ContextValue::Map(
                map.into_iter().map(|(k, v)| (k, ContextValue::from(v))).collect(),
            ),
        }
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        ContextValue::String(s.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        ContextValue::String(s)
    }
}

impl From<i64> for ContextValue {
    fn from(i: i64) -> Self {
        ContextValue::Integer(i)
    }
}

impl From<i32> for ContextValue {
    fn from(i: i32) -> Self {
        ContextValue::Integer(i64::from(i))
    }
}

impl From<f64> for ContextValue {
    fn from(f: f64) -> Self {
        ContextValue::Float(f)
    }
}

impl From<bool> for ContextValue {
    fn from(b: bool) -> Self {
        ContextValue::Bool(b)
    }
}

impl<T: Into<ContextValue>> From<Vec<T>> for ContextValue {
    fn from(items: Vec<T>) -> Self {
        ContextValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::String(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

/// Converts a JSON object into a context bag. Non-object values yield an empty bag.
pub fn bag_from_json(value: serde_json::Value) -> ContextBag {
    match ContextValue::from(value) {
        ContextValue::Map(map) => map,
        _ => ContextBag::new(),
    }
}

/// JSON object view of a context bag.
pub fn bag_to_json(bag: &ContextBag) -> serde_json::Value {
    serde_json::Value::Object(bag.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}
