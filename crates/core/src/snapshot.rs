//! Snapshot data model.
//!
//! A [`Snapshot`] maps every monitored [`RecordId`] to a flat
//! [`RecordSnapshot`]. Field values are either numbers or text; list-fields
//! are kept in their original comma-delimited form and only split into items
//! when compared or rendered.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::RecordId;

/// Separator between items of a list-field.
pub const LIST_DELIMITER: char = ',';

/// Full point-in-time state of all monitored records.
pub type Snapshot = BTreeMap<RecordId, RecordSnapshot>;

// ---------------------------------------------------------------------------
// FieldValue
// ---------------------------------------------------------------------------

/// A single field value.
///
/// Serialized untagged so the persisted document keeps numbers as JSON
/// numbers and text (including list-fields) as JSON strings. A JSON `null`
/// loads as the empty default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged, from = "StoredValue")]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Shapes accepted when loading a persisted value.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredValue {
    Int(i64),
    Float(f64),
    Text(String),
    Null(()),
}

impl From<StoredValue> for FieldValue {
    fn from(raw: StoredValue) -> Self {
        match raw {
            StoredValue::Int(v) => Self::Int(v),
            StoredValue::Float(v) => Self::from(v),
            StoredValue::Text(s) => Self::Text(s),
            StoredValue::Null(()) => Self::empty(),
        }
    }
}

impl FieldValue {
    /// The normalized stand-in for an absent source value.
    pub fn empty() -> Self {
        Self::Text(String::new())
    }

    /// Whether this is the empty default.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(s) if s.is_empty())
    }

    /// Split the value into list items, keeping source order and duplicates.
    pub fn items(&self) -> Vec<String> {
        match self {
            Self::Text(raw) => split_items(raw),
            other => split_items(&other.to_string()),
        }
    }

    /// Distinct list items of the value.
    pub fn item_set(&self) -> BTreeSet<String> {
        self.items().into_iter().collect()
    }
}

impl Default for FieldValue {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            // Whole decimals keep one fractional digit: 1.0, not 1.
            Self::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{v:.1}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

/// Non-finite values (`NaN`, infinities) have no JSON number form and are
/// kept as their text.
impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        if v.is_finite() {
            Self::Float(v)
        } else {
            Self::Text(v.to_string())
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

// ---------------------------------------------------------------------------
// RecordSnapshot
// ---------------------------------------------------------------------------

/// One record's field values at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordSnapshot {
    fields: BTreeMap<String, FieldValue>,
}

impl RecordSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a field, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Field names in lexicographic order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// List items of `key`; a missing field yields no items.
    pub fn items(&self, key: &str) -> Vec<String> {
        self.get(key).map(FieldValue::items).unwrap_or_default()
    }

    /// Distinct list items of `key`.
    pub fn item_set(&self, key: &str) -> BTreeSet<String> {
        self.get(key).map(FieldValue::item_set).unwrap_or_default()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for RecordSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

// ---------------------------------------------------------------------------
// List helpers
// ---------------------------------------------------------------------------

/// Split a delimited list-field into trimmed, non-empty items.
///
/// Source order and duplicates are preserved.
pub fn split_items(raw: &str) -> Vec<String> {
    raw.split(LIST_DELIMITER)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_items_trims_and_drops_blanks() {
        assert_eq!(
            split_items(" DIPIRONA 1G ,, OMEPRAZOL 40MG,  "),
            vec!["DIPIRONA 1G", "OMEPRAZOL 40MG"]
        );
        assert!(split_items("").is_empty());
        assert!(split_items(" , ").is_empty());
    }

    #[test]
    fn split_items_keeps_duplicates_in_order() {
        assert_eq!(split_items("B, A, B"), vec!["B", "A", "B"]);
    }

    #[test]
    fn item_set_collapses_duplicates() {
        let value = FieldValue::from("B, A, B");
        let set: Vec<_> = value.item_set().into_iter().collect();
        assert_eq!(set, vec!["A", "B"]);
    }

    #[test]
    fn empty_default_is_empty_text() {
        assert_eq!(FieldValue::default(), FieldValue::Text(String::new()));
        assert!(FieldValue::empty().is_empty());
        assert!(!FieldValue::Int(0).is_empty());
    }

    #[test]
    fn display_renders_plain_values() {
        assert_eq!(FieldValue::Int(5).to_string(), "5");
        assert_eq!(FieldValue::Float(1.25).to_string(), "1.25");
        assert_eq!(FieldValue::Float(1.0).to_string(), "1.0");
        assert_eq!(FieldValue::Float(-3.0).to_string(), "-3.0");
        assert_eq!(FieldValue::from("abc").to_string(), "abc");
    }

    #[test]
    fn persisted_form_keeps_numbers_and_raw_lists() {
        let record = RecordSnapshot::new()
            .with("score", 5)
            .with("creatinine", 1.5)
            .with("meds", "A, B");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"creatinine": 1.5, "meds": "A, B", "score": 5})
        );
    }

    #[test]
    fn deserializes_numbers_by_shape() {
        let record: RecordSnapshot =
            serde_json::from_str(r#"{"a": 3, "b": 2.5, "c": "x", "d": ""}"#).unwrap();
        assert_eq!(record.get("a"), Some(&FieldValue::Int(3)));
        assert_eq!(record.get("b"), Some(&FieldValue::Float(2.5)));
        assert_eq!(record.get("c"), Some(&FieldValue::from("x")));
        assert!(record.get("d").unwrap().is_empty());
    }

    #[test]
    fn missing_list_field_has_no_items() {
        let record = RecordSnapshot::new();
        assert!(record.items("meds").is_empty());
        assert!(record.item_set("meds").is_empty());
    }

    #[test]
    fn non_finite_floats_become_text() {
        assert_eq!(FieldValue::from(f64::NAN), FieldValue::from("NaN"));
        assert_eq!(FieldValue::from(f64::INFINITY), FieldValue::from("inf"));
        assert_eq!(FieldValue::from(2.5), FieldValue::Float(2.5));
    }

    #[test]
    fn nan_equals_itself() {
        assert_eq!(FieldValue::Float(f64::NAN), FieldValue::Float(f64::NAN));
        assert_ne!(FieldValue::Float(1.0), FieldValue::Int(1));
    }

    #[test]
    fn null_loads_as_empty_default() {
        let record: RecordSnapshot = serde_json::from_str(r#"{"creatinina": null}"#).unwrap();
        assert!(record.get("creatinina").unwrap().is_empty());
    }

    #[test]
    fn non_finite_value_survives_persistence() {
        let record = RecordSnapshot::new().with("creatinina", f64::NAN);
        let json = serde_json::to_string(&record).unwrap();
        let loaded: RecordSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, record);
    }
}
