//! Feature values and single-sample observations.
//!
//! An [`Observation`] is one sample flowing through a pipeline: a mapping from
//! feature name to a scalar [`Value`]. Nodes never mutate the observation they
//! receive; each transforming node produces a fresh copy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

/// A scalar feature value, prediction or label.
///
/// Deserialization is untagged: JSON booleans and numbers map to `Bool` and
/// `Number`, RFC 3339 strings to `Timestamp`, any other string to `Text`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl Value {
    /// Numeric view of the value. Booleans count as 1.0 / 0.0.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Timestamp(_) | Value::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(t),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Timestamp(_) => "timestamp",
            Value::Text(_) => "text",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => match f.precision() {
                Some(p) => write!(f, "{:.*}", p, n),
                None => write!(f, "{}", n),
            },
            Value::Bool(b) => write!(f, "{}", b),
            Value::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v as f64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

/// One sample: feature name to value.
///
/// Iteration is in key order so that traces and renderings are stable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Observation {
    features: BTreeMap<String, Value>,
}

impl Observation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.features.get(key)
    }

    /// Numeric view of a feature, if present and numeric.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.features.get(key).and_then(Value::as_f64)
    }

    /// Insert a feature, returning the previous value under that key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.features.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.features.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.features.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.features.iter()
    }

    /// Numeric features only, in key order.
    pub fn numeric(&self) -> impl Iterator<Item = (&str, f64)> {
        self.features
            .iter()
            .filter_map(|(k, v)| v.as_f64().map(|x| (k.as_str(), x)))
    }

    /// Write every field of `other` over `self`.
    ///
    /// Keys absent from `other` are left untouched.
    pub fn overlay(&mut self, other: Observation) {
        self.features.extend(other.features);
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Observation {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            features: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl IntoIterator for Observation {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

impl<'a> IntoIterator for &'a Observation {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let precision = f.precision().unwrap_or(4);
        f.write_str("{")?;
        for (i, (k, v)) in self.features.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {:.*}", k, precision, v)?;
        }
        f.write_str("}")
    }
}
