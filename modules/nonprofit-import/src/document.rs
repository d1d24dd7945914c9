//! Sanitizer: turns arbitrary nested record data into something the
//! persistence layer accepts.
//!
//! `Document` is a JSON-like tree with one extra variant, `Absent`, for a
//! value that was never provided (an omitted optional field). Storage rejects
//! `Absent` at any depth, so everything headed for a `PersistenceGateway`
//! goes through [`sanitize`], which rewrites every `Absent` into an explicit
//! `Null` and hands back a [`SanitizedRecord`].

use std::collections::BTreeMap;

use serde_json::{Number, Value};

use crate::error::{ImportError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Absent,
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Document>),
    Object(BTreeMap<String, Document>),
}

impl Document {
    pub fn object<const N: usize>(fields: [(&str, Document); N]) -> Self {
        Document::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    /// Field lookup on an object; `None` for missing keys and non-objects.
    pub fn get(&self, key: &str) -> Option<&Document> {
        match self {
            Document::Object(map) => map.get(key),
            _ => None,
        }
    }

    pub fn contains_absent(&self) -> bool {
        match self {
            Document::Absent => true,
            Document::Array(items) => items.iter().any(Document::contains_absent),
            Document::Object(map) => map.values().any(Document::contains_absent),
            _ => false,
        }
    }
}

/// Replace every `Absent` with `Null`, at any depth. Array order and object
/// key sets are preserved; every other value passes through untouched.
pub fn normalize(value: Document) -> Document {
    match value {
        Document::Absent => Document::Null,
        Document::Array(items) => Document::Array(items.into_iter().map(normalize).collect()),
        Document::Object(map) => {
            Document::Object(map.into_iter().map(|(k, v)| (k, normalize(v))).collect())
        }
        other => other,
    }
}

/// A record that has been through [`sanitize`]. Only this module can build one,
/// so a gateway taking `SanitizedRecord` never sees unsanitized input.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedRecord(Value);

impl SanitizedRecord {
    pub fn as_json(&self) -> &Value {
        &self.0
    }

    pub fn into_json(self) -> Value {
        self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// Normalize and convert to JSON for persistence.
pub fn sanitize(value: Document) -> Result<SanitizedRecord> {
    Ok(SanitizedRecord(Value::try_from(normalize(value))?))
}

impl TryFrom<Document> for Value {
    type Error = ImportError;

    fn try_from(doc: Document) -> Result<Value> {
        Ok(match doc {
            Document::Absent => {
                return Err(ImportError::Validation(
                    "absent value cannot be persisted".to_string(),
                ))
            }
            Document::Null => Value::Null,
            Document::Bool(b) => Value::Bool(b),
            Document::Number(n) => Value::Number(n),
            Document::String(s) => Value::String(s),
            Document::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Document::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| Value::try_from(v).map(|v| (k, v)))
                    .collect::<Result<serde_json::Map<_, _>>>()?,
            ),
        })
    }
}

// --- Conversions into Document ---

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Document::Null,
            Value::Bool(b) => Document::Bool(b),
            Value::Number(n) => Document::Number(n),
            Value::String(s) => Document::String(s),
            Value::Array(items) => Document::Array(items.into_iter().map(Document::from).collect()),
            Value::Object(map) => {
                Document::Object(map.into_iter().map(|(k, v)| (k, Document::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Document {
    fn from(s: &str) -> Self {
        Document::String(s.to_string())
    }
}

impl From<String> for Document {
    fn from(s: String) -> Self {
        Document::String(s)
    }
}

impl From<bool> for Document {
    fn from(b: bool) -> Self {
        Document::Bool(b)
    }
}

impl From<i32> for Document {
    fn from(n: i32) -> Self {
        Document::Number(n.into())
    }
}

impl From<i64> for Document {
    fn from(n: i64) -> Self {
        Document::Number(n.into())
    }
}

impl From<u64> for Document {
    fn from(n: u64) -> Self {
        Document::Number(n.into())
    }
}

impl From<f64> for Document {
    /// NaN and infinities have no JSON form and become `Null`.
    fn from(n: f64) -> Self {
        Number::from_f64(n)
            .map(Document::Number)
            .unwrap_or(Document::Null)
    }
}

impl<T: Into<Document>> From<Option<T>> for Document {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Document::Absent,
        }
    }
}

impl<T: Into<Document>> From<Vec<T>> for Document {
    fn from(items: Vec<T>) -> Self {
        Document::Array(items.into_iter().map(Into::into).collect())
    }
}
