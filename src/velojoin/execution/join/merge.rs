//! Sort-Merge Joiner
//!
//! Joins two buffered partitions on the join columns. Both sides are sorted
//! by the join columns, then walked with one cursor each: runs of rows with
//! equal join values are matched and emitted as a full cross product. Runs
//! whose join values contain `NaN` never match.

use std::cmp::Ordering;

use crate::velojoin::error::{JoinError, JoinResult};
use crate::velojoin::execution::group_key::GroupKey;
use crate::velojoin::execution::join::schema::JoinSchema;
use crate::velojoin::execution::table::{ColListTable, ColListTableBuilder};
use crate::velojoin::execution::types::FieldValue;

/// A maximal run of rows sharing the same join values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub start: usize,
    pub end: usize,
    /// Join values of the run, over the join columns the table has
    pub key: GroupKey,
}

impl Run {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Stateless sort-merge join over two [`ColListTableBuilder`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct SortMergeJoiner;

impl SortMergeJoiner {
    /// Join `left` and `right` into one table keyed by `output_key`.
    ///
    /// Both builders are sorted in place by the join columns.
    pub fn join(
        left: &mut ColListTableBuilder,
        right: &mut ColListTableBuilder,
        schema: &JoinSchema,
        left_name: &str,
        right_name: &str,
        output_key: GroupKey,
    ) -> JoinResult<ColListTable> {
        let on = schema.on();
        left.sort(on, false);
        right.sort(on, false);

        let left_slots = output_slots(left, schema, left_name, false)?;
        let right_slots = output_slots(right, schema, right_name, true)?;

        let mut output = ColListTableBuilder::new(output_key);
        for col in schema.columns() {
            output.add_col(col.clone())?;
        }

        let mut left_run = Self::advance(0, left, on);
        let mut right_run = Self::advance(0, right, on);

        while !left_run.is_empty() && !right_run.is_empty() {
            match left_run.key.cmp(&right_run.key) {
                Ordering::Equal if left_run.key.values().iter().any(FieldValue::is_nan) => {
                    left_run = Self::advance(left_run.end, left, on);
                    right_run = Self::advance(right_run.end, right, on);
                }
                Ordering::Equal => {
                    for i in left_run.start..left_run.end {
                        for k in right_run.start..right_run.end {
                            let row = merge_row(
                                left,
                                i,
                                &left_slots,
                                right,
                                k,
                                &right_slots,
                                schema,
                            )?;
                            output.append_row(row)?;
                        }
                    }
                    left_run = Self::advance(left_run.end, left, on);
                    right_run = Self::advance(right_run.end, right, on);
                }
                Ordering::Less => left_run = Self::advance(left_run.end, left, on),
                Ordering::Greater => right_run = Self::advance(right_run.end, right, on),
            }
        }

        output.finalize()
    }

    /// Next run of rows starting at `offset` that agree on every join column
    pub fn advance(offset: usize, builder: &ColListTableBuilder, on: &[String]) -> Run {
        let nrows = builder.nrows();
        if offset >= nrows {
            return Run {
                start: nrows,
                end: nrows,
                key: GroupKey::empty(),
            };
        }

        let positions: Vec<usize> = on
            .iter()
            .filter_map(|label| builder.col_index(label))
            .collect();

        let same_as_first = |i: usize| {
            positions
                .iter()
                .all(|&j| builder.value(j, i) == builder.value(j, offset))
        };
        let mut end = offset + 1;
        while end < nrows && same_as_first(end) {
            end += 1;
        }

        let mut pairs: Vec<_> = positions
            .iter()
            .filter_map(|&j| {
                builder
                    .value(j, offset)
                    .map(|v| (builder.cols()[j].clone(), v.clone()))
            })
            .collect();
        pairs.sort_by(|a, b| a.0.label.cmp(&b.0.label));

        Run {
            start: offset,
            end,
            key: GroupKey::from_sorted_pairs(pairs),
        }
    }
}

/// Output position for every input column, `None` for skipped columns
fn output_slots(
    builder: &ColListTableBuilder,
    schema: &JoinSchema,
    stream: &str,
    skip_on: bool,
) -> JoinResult<Vec<Option<usize>>> {
    builder
        .cols()
        .iter()
        .map(|col| {
            let out = schema.output_col(stream, &col.label).ok_or_else(|| {
                JoinError::schema(
                    format!("column not present in join schema for stream '{}'", stream),
                    Some(&col.label),
                )
            })?;
            if skip_on && schema.is_on(&out.label) {
                return Ok(None);
            }
            schema.col_index(&out.label).map(Some).ok_or_else(|| {
                JoinError::schema("output column has no position", Some(&out.label))
            })
        })
        .collect()
}

fn merge_row(
    left: &ColListTableBuilder,
    i: usize,
    left_slots: &[Option<usize>],
    right: &ColListTableBuilder,
    k: usize,
    right_slots: &[Option<usize>],
    schema: &JoinSchema,
) -> JoinResult<Vec<FieldValue>> {
    let mut row: Vec<Option<FieldValue>> = vec![None; schema.columns().len()];

    for (j, slot) in left_slots.iter().enumerate() {
        if let Some(pos) = slot {
            row[*pos] = left.value(j, i).cloned();
        }
    }
    for (j, slot) in right_slots.iter().enumerate() {
        if let Some(pos) = slot {
            row[*pos] = right.value(j, k).cloned();
        }
    }

    row.into_iter()
        .zip(schema.columns())
        .map(|(value, col)| {
            value.ok_or_else(|| {
                JoinError::schema("joined row has no value for column", Some(&col.label))
            })
        })
        .collect()
}
