//! Subject record model: the evolving data object completed across wizard steps

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Map from field name to value, used for records and sub-records
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Value of a single wizard field.
///
/// Untagged so records round-trip from plain JSON as produced by the
/// backoffice API. A file upload is represented by its metadata only
/// (`file_name`, `mime_type`, `size_bytes`); the bytes live elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Explicit null (also what an absent field reads as)
    Null,
    /// True/false flag (`false` is a valid, satisfied value)
    Bool(bool),
    /// Numeric value
    Number(f64),
    /// Single- or multi-line text
    Text(String),
    /// Uploaded file reference
    File(FileRef),
    /// List of values
    List(Vec<FieldValue>),
    /// Shallow sub-record (e.g. "bankAccount", "freelancerLicense")
    Record(FieldMap),
}

/// Metadata for an uploaded file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileRef {
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

impl FieldValue {
    /// Whether this value counts as unsatisfied for completeness purposes.
    ///
    /// Null, the empty string, empty lists, and empty sub-records are empty;
    /// booleans (including `false`), numbers, and file references are not.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Bool(_) | FieldValue::Number(_) | FieldValue::File(_) => false,
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Record(fields) => fields.is_empty(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileRef> {
        match self {
            FieldValue::File(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&FieldMap> {
        match self {
            FieldValue::Record(fields) => Some(fields),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

/// The entity being progressively completed: a customer profile or a
/// store-creation draft. Grows monotonically as steps are submitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectRecord {
    fields: FieldMap,
}

impl SubjectRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a record from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Look up a field by name or dotted path into a sub-record
    /// (e.g. `"bankAccount.iban"`). Only one level of nesting is supported,
    /// matching the shallow record shape.
    pub fn get(&self, path: &str) -> Option<&FieldValue> {
        match path.split_once('.') {
            None => self.fields.get(path),
            Some((head, rest)) => self
                .fields
                .get(head)
                .and_then(FieldValue::as_record)
                .and_then(|sub| sub.get(rest)),
        }
    }

    /// Whether a field resolves to a non-empty value
    pub fn is_satisfied(&self, path: &str) -> bool {
        self.get(path).map(|v| !v.is_empty()).unwrap_or(false)
    }

    /// Read a boolean flag; absent or non-boolean fields read as `None`
    pub fn bool_flag(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(FieldValue::as_bool)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    /// Merge a step payload into this record: every top-level field of
    /// `payload` replaces the existing one wholesale. Used by stores to
    /// apply submissions all-or-nothing; the engine itself never merges
    /// partially.
    pub fn merge(&mut self, payload: SubjectRecord) {
        for (name, value) in payload.fields {
            self.fields.insert(name, value);
        }
    }

    /// Iterate over top-level fields
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    /// Names of top-level fields currently holding a non-empty value
    pub fn non_empty_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
