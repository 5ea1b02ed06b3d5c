//! Core table data types.
//!
//! This module contains the value model shared by every operator:
//! - [`ColumnType`] - the closed set of primitive column types
//! - [`ColMeta`] - a column's label and type
//! - [`FieldValue`] - one value of a [`ColumnType`]
//! - [`Time`] - nanosecond timestamps used for values, watermarks and processing time
//! - [`DatasetId`] - identifies the producer a signal came from

use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifier of an upstream producer (a parent dataset)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetId(pub u64);

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dataset#{}", self.0)
    }
}

/// Nanoseconds since the Unix epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Time(pub i64);

impl Time {
    pub const MIN: Time = Time(i64::MIN);
    pub const MAX: Time = Time(i64::MAX);

    /// Parse an RFC 3339 timestamp
    pub fn parse_rfc3339(s: &str) -> Option<Time> {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .and_then(|dt| dt.timestamp_nanos_opt())
            .map(Time)
    }

    pub fn nanos(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dt = DateTime::from_timestamp_nanos(self.0);
        write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

/// Primitive column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Bool,
    Int,
    UInt,
    Float,
    String,
    Time,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Bool => "bool",
            ColumnType::Int => "int",
            ColumnType::UInt => "uint",
            ColumnType::Float => "float",
            ColumnType::String => "string",
            ColumnType::Time => "time",
        };
        f.write_str(name)
    }
}

/// Column metadata: a label and its type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColMeta {
    pub label: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColMeta {
    pub fn new(label: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            label: label.into(),
            column_type,
        }
    }
}

impl fmt::Display for ColMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.label, self.column_type)
    }
}

/// A single column value
///
/// Equality is exact. Floats compare by bit pattern for equality and hashing and
/// by `total_cmp` for ordering, with `-0.0` folded into `0.0`, so `FieldValue`
/// is usable as a map key. `NaN` equals itself here but never joins, see
/// [`FieldValue::join_eq`].
#[derive(Debug, Clone)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Time(Time),
}

impl FieldValue {
    pub fn column_type(&self) -> ColumnType {
        match self {
            FieldValue::Bool(_) => ColumnType::Bool,
            FieldValue::Int(_) => ColumnType::Int,
            FieldValue::UInt(_) => ColumnType::UInt,
            FieldValue::Float(_) => ColumnType::Float,
            FieldValue::String(_) => ColumnType::String,
            FieldValue::Time(_) => ColumnType::Time,
        }
    }

    pub fn as_time(&self) -> Option<Time> {
        match self {
            FieldValue::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, FieldValue::Float(v) if v.is_nan())
    }

    /// Equality used when matching join columns: `NaN` matches nothing
    pub fn join_eq(&self, other: &Self) -> bool {
        !self.is_nan() && self == other
    }

    /// Convert to a JSON value for display and output files
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Int(i) => serde_json::Value::from(*i),
            FieldValue::UInt(u) => serde_json::Value::from(*u),
            FieldValue::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::String(s) => serde_json::Value::String(s.clone()),
            FieldValue::Time(t) => serde_json::Value::String(t.to_string()),
        }
    }
}

/// `-0.0` and `0.0` are the same value
fn fold_zero(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a == b,
            (FieldValue::Int(a), FieldValue::Int(b)) => a == b,
            (FieldValue::UInt(a), FieldValue::UInt(b)) => a == b,
            (FieldValue::Float(a), FieldValue::Float(b)) => {
                fold_zero(*a).to_bits() == fold_zero(*b).to_bits()
            }
            (FieldValue::String(a), FieldValue::String(b)) => a == b,
            (FieldValue::Time(a), FieldValue::Time(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for FieldValue {}

impl Hash for FieldValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            FieldValue::Bool(b) => b.hash(state),
            FieldValue::Int(i) => i.hash(state),
            FieldValue::UInt(u) => u.hash(state),
            FieldValue::Float(v) => fold_zero(*v).to_bits().hash(state),
            FieldValue::String(s) => s.hash(state),
            FieldValue::Time(t) => t.hash(state),
        }
    }
}

impl Ord for FieldValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
            (FieldValue::Int(a), FieldValue::Int(b)) => a.cmp(b),
            (FieldValue::UInt(a), FieldValue::UInt(b)) => a.cmp(b),
            (FieldValue::Float(a), FieldValue::Float(b)) => fold_zero(*a).total_cmp(&fold_zero(*b)),
            (FieldValue::String(a), FieldValue::String(b)) => a.cmp(b),
            (FieldValue::Time(a), FieldValue::Time(b)) => a.cmp(b),
            // Mixed types order by type tag
            _ => self.column_type().cmp(&other.column_type()),
        }
    }
}

impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::UInt(u) => write!(f, "{}", u),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Time(t) => write!(f, "{}", t),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::UInt(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<Time> for FieldValue {
    fn from(v: Time) -> Self {
        FieldValue::Time(v)
    }
}
