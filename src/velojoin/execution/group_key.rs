//! Group Keys
//!
//! A [`GroupKey`] identifies the partition a table belongs to: an ordered list of
//! `(ColMeta, FieldValue)` pairs sorted by label. Keys are immutable values with
//! derived equality and hashing so they can be used directly as map keys by the
//! stream buffers, the key registry and the output cache.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use crate::velojoin::error::{JoinError, JoinResult};
use crate::velojoin::execution::types::{ColMeta, FieldValue};

/// Immutable, label-sorted group key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct GroupKey {
    cols: Vec<ColMeta>,
    values: Vec<FieldValue>,
}

impl GroupKey {
    /// Build a key from parallel column and value lists.
    ///
    /// Columns are sorted by label. Duplicate labels, mismatched lengths or a
    /// value whose type disagrees with its column are schema errors.
    pub fn new(cols: Vec<ColMeta>, values: Vec<FieldValue>) -> JoinResult<Self> {
        if cols.len() != values.len() {
            return Err(JoinError::schema(
                format!(
                    "group key has {} columns but {} values",
                    cols.len(),
                    values.len()
                ),
                None,
            ));
        }

        let mut pairs: Vec<(ColMeta, FieldValue)> = cols.into_iter().zip(values).collect();
        for (col, value) in &pairs {
            if value.column_type() != col.column_type {
                return Err(JoinError::schema(
                    format!(
                        "group key value has type {}, expected {}",
                        value.column_type(),
                        col.column_type
                    ),
                    Some(&col.label),
                ));
            }
        }
        pairs.sort_by(|a, b| a.0.label.cmp(&b.0.label));

        let mut seen = HashSet::with_capacity(pairs.len());
        for (col, _) in &pairs {
            if !seen.insert(col.label.as_str()) {
                return Err(JoinError::schema("duplicate group key column", Some(&col.label)));
            }
        }

        Ok(Self::from_sorted_pairs(pairs))
    }

    /// Build from pairs already sorted by label with unique labels
    pub(crate) fn from_sorted_pairs(pairs: Vec<(ColMeta, FieldValue)>) -> Self {
        let (cols, values) = pairs.into_iter().unzip();
        Self { cols, values }
    }

    /// The empty key (a single, ungrouped partition)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn cols(&self) -> &[ColMeta] {
        &self.cols
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.cols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cols.is_empty()
    }

    /// Value at position `i` (positions follow label order)
    pub fn value(&self, i: usize) -> Option<&FieldValue> {
        self.values.get(i)
    }

    pub fn has_col(&self, label: &str) -> bool {
        self.col_index(label).is_some()
    }

    pub fn col_index(&self, label: &str) -> Option<usize> {
        self.cols
            .binary_search_by(|c| c.label.as_str().cmp(label))
            .ok()
    }

    /// Value of the column with the given label
    pub fn value_at(&self, label: &str) -> Option<&FieldValue> {
        self.col_index(label).map(|i| &self.values[i])
    }

    /// Iterate `(column, value)` pairs in label order
    pub fn iter(&self) -> impl Iterator<Item = (&ColMeta, &FieldValue)> {
        self.cols.iter().zip(self.values.iter())
    }

    /// Whether two keys agree on every `on` label present in both
    pub fn join_compatible<S: AsRef<str>>(&self, other: &GroupKey, on: &[S]) -> bool {
        on.iter().all(|label| {
            match (self.value_at(label.as_ref()), other.value_at(label.as_ref())) {
                (Some(a), Some(b)) => a.join_eq(b),
                _ => true,
            }
        })
    }

    /// Canonical `label:type:value` encoding, stable across runs
    pub fn canonical(&self) -> String {
        self.iter()
            .map(|(c, v)| format!("{}:{}:{}", c.label, c.column_type, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Ord for GroupKey {
    /// Labels decide first, independent of values; a label list that is a
    /// prefix of the other sorts first; identical label lists compare values.
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.cols.iter().zip(other.cols.iter()) {
            match a.label.cmp(&b.label) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        match self.cols.len().cmp(&other.cols.len()) {
            Ordering::Equal => {}
            ord => return ord,
        }
        for (a, b) in self.values.iter().zip(other.values.iter()) {
            match a.cmp(b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (c, v)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}={}", c.label, v)?;
        }
        write!(f, "}}")
    }
}
