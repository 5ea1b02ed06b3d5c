//! Tables and Table Builders
//!
//! [`Table`] is the read-only capability every operator consumes: a group key,
//! an ordered column list and push-style row iteration. Operators never mutate a
//! received table; they copy its rows into a [`ColListTableBuilder`], a mutable
//! column-list accumulator that can be sorted in place and finalized into an
//! immutable [`ColListTable`].

use std::cmp::Ordering;

use crate::velojoin::error::{JoinError, JoinResult};
use crate::velojoin::execution::group_key::GroupKey;
use crate::velojoin::execution::types::{ColMeta, FieldValue};

/// Read-only table capability
pub trait Table: Send + Sync {
    /// Group key shared by every row
    fn key(&self) -> &GroupKey;

    /// Ordered column list
    fn cols(&self) -> &[ColMeta];

    /// Number of rows
    fn nrows(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.nrows() == 0
    }

    /// Push every row, in order, to `f`. Row values follow `cols()` order.
    fn do_rows(&self, f: &mut dyn FnMut(&[FieldValue]) -> JoinResult<()>) -> JoinResult<()>;
}

/// Immutable column-major table
#[derive(Debug, Clone, PartialEq)]
pub struct ColListTable {
    key: GroupKey,
    cols: Vec<ColMeta>,
    columns: Vec<Vec<FieldValue>>,
    nrows: usize,
}

impl ColListTable {
    /// Build a table from rows, validating row width and value types
    pub fn from_rows(
        key: GroupKey,
        cols: Vec<ColMeta>,
        rows: Vec<Vec<FieldValue>>,
    ) -> JoinResult<Self> {
        let mut builder = ColListTableBuilder::new(key);
        for col in cols {
            builder.add_col(col)?;
        }
        for row in rows {
            builder.append_row(row)?;
        }
        builder.finalize()
    }

    /// Column values by position
    pub fn column(&self, j: usize) -> Option<&[FieldValue]> {
        self.columns.get(j).map(Vec::as_slice)
    }

    pub fn col_index(&self, label: &str) -> Option<usize> {
        self.cols.iter().position(|c| c.label == label)
    }

    pub fn get_row(&self, i: usize) -> Option<Vec<FieldValue>> {
        if i >= self.nrows {
            return None;
        }
        Some(self.columns.iter().map(|c| c[i].clone()).collect())
    }

    /// All rows in order
    pub fn rows(&self) -> Vec<Vec<FieldValue>> {
        (0..self.nrows).filter_map(|i| self.get_row(i)).collect()
    }

    /// `{ "key": {..}, "columns": [..], "rows": [[..]] }`
    pub fn to_json(&self) -> serde_json::Value {
        let key: serde_json::Map<String, serde_json::Value> = self
            .key
            .iter()
            .map(|(c, v)| (c.label.clone(), v.to_json()))
            .collect();
        let rows: Vec<serde_json::Value> = self
            .rows()
            .iter()
            .map(|row| row.iter().map(FieldValue::to_json).collect())
            .collect();
        serde_json::json!({
            "key": key,
            "columns": self.cols,
            "rows": rows,
        })
    }
}

impl Table for ColListTable {
    fn key(&self) -> &GroupKey {
        &self.key
    }

    fn cols(&self) -> &[ColMeta] {
        &self.cols
    }

    fn nrows(&self) -> usize {
        self.nrows
    }

    fn do_rows(&self, f: &mut dyn FnMut(&[FieldValue]) -> JoinResult<()>) -> JoinResult<()> {
        let mut row = Vec::with_capacity(self.cols.len());
        for i in 0..self.nrows {
            row.clear();
            row.extend(self.columns.iter().map(|c| c[i].clone()));
            f(&row)?;
        }
        Ok(())
    }
}

/// Mutable column-list accumulator
#[derive(Debug, Clone)]
pub struct ColListTableBuilder {
    key: GroupKey,
    cols: Vec<ColMeta>,
    columns: Vec<Vec<FieldValue>>,
}

impl ColListTableBuilder {
    pub fn new(key: GroupKey) -> Self {
        Self {
            key,
            cols: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Builder with the same key and columns as `table`, no rows
    pub fn with_table_cols(table: &dyn Table) -> JoinResult<Self> {
        let mut builder = Self::new(table.key().clone());
        for col in table.cols() {
            builder.add_col(col.clone())?;
        }
        Ok(builder)
    }

    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    pub fn cols(&self) -> &[ColMeta] {
        &self.cols
    }

    pub fn col_index(&self, label: &str) -> Option<usize> {
        self.cols.iter().position(|c| c.label == label)
    }

    /// Add a column, returning its position
    pub fn add_col(&mut self, col: ColMeta) -> JoinResult<usize> {
        if self.col_index(&col.label).is_some() {
            return Err(JoinError::schema(
                "table builder already has column",
                Some(&col.label),
            ));
        }
        // Back-fill is impossible without nulls, so columns may only be added to an empty builder
        if self.nrows() > 0 {
            return Err(JoinError::schema(
                "cannot add a column to a builder that already has rows",
                Some(&col.label),
            ));
        }
        self.cols.push(col);
        self.columns.push(Vec::new());
        Ok(self.cols.len() - 1)
    }

    /// Append one value to column `j`
    pub fn append_value(&mut self, j: usize, value: FieldValue) -> JoinResult<()> {
        let col = self
            .cols
            .get(j)
            .ok_or_else(|| JoinError::execution(format!("column index {} out of range", j)))?;
        if col.column_type != value.column_type() {
            return Err(JoinError::schema(
                format!(
                    "cannot append {} value to {} column",
                    value.column_type(),
                    col.column_type
                ),
                Some(&col.label),
            ));
        }
        self.columns[j].push(value);
        Ok(())
    }

    /// Append a full row in column order
    pub fn append_row(&mut self, row: Vec<FieldValue>) -> JoinResult<()> {
        if row.len() != self.cols.len() {
            return Err(JoinError::schema(
                format!(
                    "row has {} values but table has {} columns",
                    row.len(),
                    self.cols.len()
                ),
                None,
            ));
        }
        for (col, value) in self.cols.iter().zip(row.iter()) {
            if col.column_type != value.column_type() {
                return Err(JoinError::schema(
                    format!(
                        "cannot append {} value to {} column",
                        value.column_type(),
                        col.column_type
                    ),
                    Some(&col.label),
                ));
            }
        }
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.push(value);
        }
        Ok(())
    }

    /// Copy every row of `table`. Its columns must match this builder's columns.
    pub fn append_table(&mut self, table: &dyn Table) -> JoinResult<()> {
        if table.cols() != self.cols.as_slice() {
            return Err(JoinError::schema(
                format!(
                    "table columns {:?} do not match buffered columns {:?}",
                    labels(table.cols()),
                    labels(&self.cols)
                ),
                None,
            ));
        }
        table.do_rows(&mut |row| self.append_row(row.to_vec()))
    }

    pub fn nrows(&self) -> usize {
        self.columns.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.nrows() == 0
    }

    /// Value of column `j` at row `i`
    pub fn value(&self, j: usize, i: usize) -> Option<&FieldValue> {
        self.columns.get(j).and_then(|c| c.get(i))
    }

    pub fn get_row(&self, i: usize) -> Option<Vec<FieldValue>> {
        self.columns.iter().map(|c| c.get(i).cloned()).collect()
    }

    /// Stable sort of all rows by the named columns. Labels the builder does not
    /// have are ignored.
    pub fn sort<S: AsRef<str>>(&mut self, labels: &[S], descending: bool) {
        let sort_cols: Vec<usize> = labels
            .iter()
            .filter_map(|l| self.col_index(l.as_ref()))
            .collect();
        if sort_cols.is_empty() {
            return;
        }

        let mut order: Vec<usize> = (0..self.nrows()).collect();
        order.sort_by(|&x, &y| {
            let ord = sort_cols
                .iter()
                .map(|&j| self.columns[j][x].cmp(&self.columns[j][y]))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });

        for column in self.columns.iter_mut() {
            let sorted: Vec<FieldValue> = order.iter().map(|&i| column[i].clone()).collect();
            *column = sorted;
        }
    }

    /// Drop all rows, keeping columns
    pub fn clear_data(&mut self) {
        for column in self.columns.iter_mut() {
            column.clear();
            column.shrink_to_fit();
        }
    }

    /// Materialize an immutable table from the current contents
    pub fn finalize(&self) -> JoinResult<ColListTable> {
        let nrows = self.nrows();
        if let Some(j) = self.columns.iter().position(|c| c.len() != nrows) {
            return Err(JoinError::execution(format!(
                "column '{}' has {} rows, expected {}",
                self.cols[j].label,
                self.columns[j].len(),
                nrows
            )));
        }
        Ok(ColListTable {
            key: self.key.clone(),
            cols: self.cols.clone(),
            columns: self.columns.clone(),
            nrows,
        })
    }
}

fn labels(cols: &[ColMeta]) -> Vec<&str> {
    cols.iter().map(|c| c.label.as_str()).collect()
}
