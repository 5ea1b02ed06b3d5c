//! Join Schema Unification
//!
//! Merges the column lists of both streams into one deterministic output
//! schema. A label present on both sides that is not a join column appears
//! twice, suffixed with its stream name (`_value_left`, `_value_right`); join
//! columns and labels unique to one side keep their name. Output columns are
//! sorted by label.

use std::collections::{BTreeSet, HashMap};

use log::info;

use crate::velojoin::error::{JoinError, JoinResult};
use crate::velojoin::execution::types::ColMeta;

/// Unified output schema of a join
#[derive(Debug, Clone, Default)]
pub struct JoinSchema {
    built: bool,

    /// Resolved join columns, sorted
    on: Vec<String>,

    /// Output columns, sorted by label
    columns: Vec<ColMeta>,

    /// (stream name, input label) -> output column
    mapping: HashMap<(String, String), ColMeta>,

    /// Output label -> position in `columns`
    index: HashMap<String, usize>,
}

impl JoinSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Build the schema from the first table's columns of each stream.
    ///
    /// When `explicit_on` is false the join columns default to every label
    /// shared by both inputs. Calling `build` on a built schema does nothing.
    pub fn build(
        &mut self,
        left_name: &str,
        left_cols: &[ColMeta],
        right_name: &str,
        right_cols: &[ColMeta],
        on: &[String],
        explicit_on: bool,
    ) -> JoinResult<()> {
        if self.built {
            return Ok(());
        }

        let left_types: HashMap<&str, &ColMeta> =
            left_cols.iter().map(|c| (c.label.as_str(), c)).collect();
        let right_types: HashMap<&str, &ColMeta> =
            right_cols.iter().map(|c| (c.label.as_str(), c)).collect();

        let shared: BTreeSet<&str> = left_types
            .keys()
            .filter(|label| right_types.contains_key(*label))
            .copied()
            .collect();

        let resolved_on: BTreeSet<String> = if explicit_on {
            on.iter().cloned().collect()
        } else {
            shared.iter().map(|l| l.to_string()).collect()
        };

        for label in &resolved_on {
            let (left, right) = match (
                left_types.get(label.as_str()),
                right_types.get(label.as_str()),
            ) {
                (Some(l), Some(r)) => (l, r),
                (None, _) => {
                    return Err(JoinError::schema(
                        format!("join column missing from stream '{}'", left_name),
                        Some(label),
                    ))
                }
                (_, None) => {
                    return Err(JoinError::schema(
                        format!("join column missing from stream '{}'", right_name),
                        Some(label),
                    ))
                }
            };
            if left.column_type != right.column_type {
                return Err(JoinError::schema(
                    format!(
                        "join column has type {} in '{}' but {} in '{}'",
                        left.column_type, left_name, right.column_type, right_name
                    ),
                    Some(label),
                ));
            }
        }

        let mut columns: Vec<ColMeta> = Vec::with_capacity(left_cols.len() + right_cols.len());
        let mut mapping = HashMap::with_capacity(left_cols.len() + right_cols.len());

        for (stream, cols) in [(left_name, left_cols), (right_name, right_cols)] {
            for col in cols {
                let label = if shared.contains(col.label.as_str())
                    && !resolved_on.contains(&col.label)
                {
                    format!("{}_{}", col.label, stream)
                } else {
                    col.label.clone()
                };
                let out = ColMeta::new(label, col.column_type);
                mapping.insert((stream.to_string(), col.label.clone()), out.clone());

                // first occurrence of an output label wins
                if !columns.iter().any(|c| c.label == out.label) {
                    columns.push(out);
                }
            }
        }
        columns.sort_by(|a, b| a.label.cmp(&b.label));

        self.index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.label.clone(), i))
            .collect();
        self.columns = columns;
        self.mapping = mapping;
        self.on = resolved_on.into_iter().collect();
        self.built = true;

        info!(
            "Built join schema for '{}' and '{}': {} output columns, on {:?}",
            left_name,
            right_name,
            self.columns.len(),
            self.on
        );
        Ok(())
    }

    /// Resolved join columns (empty until built unless supplied explicitly)
    pub fn on(&self) -> &[String] {
        &self.on
    }

    pub fn columns(&self) -> &[ColMeta] {
        &self.columns
    }

    /// Output column for an input column of the given stream
    pub fn output_col(&self, stream: &str, label: &str) -> Option<&ColMeta> {
        self.mapping.get(&(stream.to_string(), label.to_string()))
    }

    /// Position of an output column
    pub fn col_index(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    pub fn is_on(&self, label: &str) -> bool {
        self.on.iter().any(|l| l == label)
    }
}
