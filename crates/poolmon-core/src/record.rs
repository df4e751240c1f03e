//! Attribute records: the raw input to classification.
//!
//! A pool query returns one record per slot, job, or instance. Records are
//! semi-structured: most attributes are optional and their types are not
//! guaranteed (a scheduler may report `Cpus` as an integer on one node and a
//! float on another). [`AttrRecord`] models this as a closed scalar type with
//! typed accessors that take an explicit default, so classifiers never deal
//! with open-ended reflection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A typed scalar attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// A boolean attribute.
    Bool(bool),
    /// An integer attribute.
    Int(i64),
    /// A floating-point attribute.
    Float(f64),
    /// A string attribute.
    Str(String),
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// One polled resource or job at a point in time.
///
/// Immutable once obtained; classifiers only read it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttrRecord {
    attrs: HashMap<String, AttrValue>,
}

impl AttrRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute and returns self for chaining.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Returns true if the attribute is present.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    /// Returns the attribute as a string, if present and a string.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.attrs.get(name) {
            Some(AttrValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns the attribute as a string, or the default.
    #[must_use]
    pub fn str_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get_str(name).unwrap_or(default)
    }

    /// Returns the attribute as a float, coercing integers.
    #[must_use]
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.attrs.get(name) {
            Some(AttrValue::Float(v)) => Some(*v),
            Some(AttrValue::Int(v)) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns the attribute as a float, or the default.
    #[must_use]
    pub fn f64_or(&self, name: &str, default: f64) -> f64 {
        self.get_f64(name).unwrap_or(default)
    }

    /// Returns the attribute as an integer, truncating floats.
    #[must_use]
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.attrs.get(name) {
            Some(AttrValue::Int(v)) => Some(*v),
            Some(AttrValue::Float(v)) => Some(*v as i64),
            _ => None,
        }
    }

    /// Returns the attribute as an integer, or the default.
    #[must_use]
    pub fn i64_or(&self, name: &str, default: i64) -> i64 {
        self.get_i64(name).unwrap_or(default)
    }

    /// Iterates all attributes, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.attrs.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Returns the attribute as a boolean, or the default.
    #[must_use]
    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        match self.attrs.get(name) {
            Some(AttrValue::Bool(v)) => *v,
            _ => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors_with_defaults() {
        let rec = AttrRecord::new()
            .with("Cpus", 4)
            .with("LoadAvg", 0.75)
            .with("State", "Claimed")
            .with("IsGlidein", true);

        assert_eq!(rec.i64_or("Cpus", 0), 4);
        assert!((rec.f64_or("LoadAvg", 0.0) - 0.75).abs() < f64::EPSILON);
        assert_eq!(rec.str_or("State", "Unknown"), "Claimed");
        assert!(rec.bool_or("IsGlidein", false));

        assert_eq!(rec.i64_or("Memory", 512), 512);
        assert_eq!(rec.str_or("SlotType", "Static"), "Static");
        assert!(!rec.has("Memory"));
    }

    #[test]
    fn numeric_coercion_between_int_and_float() {
        let rec = AttrRecord::new().with("Memory", 2048).with("Weight", 1.5);
        assert!((rec.f64_or("Memory", 0.0) - 2048.0).abs() < f64::EPSILON);
        assert_eq!(rec.i64_or("Weight", 0), 1);
    }

    #[test]
    fn wrong_type_falls_back_to_default() {
        let rec = AttrRecord::new().with("State", "Claimed");
        assert_eq!(rec.i64_or("State", 7), 7);
        assert_eq!(rec.get_f64("State"), None);
    }

    #[test]
    fn deserializes_from_plain_json_object() {
        let rec: AttrRecord = serde_json::from_str(
            r#"{"SlotType": "Partitionable", "Cpus": 0, "LoadAvg": 0.1, "Busy": false}"#,
        )
        .expect("valid record json");
        assert_eq!(rec.str_or("SlotType", ""), "Partitionable");
        assert_eq!(rec.i64_or("Cpus", -1), 0);
        assert!(!rec.bool_or("Busy", true));
    }
}
