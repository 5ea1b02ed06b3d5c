//! Table Collector
//!
//! A terminal operator that records everything it receives. Used by the CLI to
//! print join output and by tests to observe the operator protocol.

use std::sync::{Mutex, MutexGuard};

use crate::velojoin::error::{JoinError, JoinResult};
use crate::velojoin::execution::dataset::Transformation;
use crate::velojoin::execution::group_key::GroupKey;
use crate::velojoin::execution::table::{ColListTable, ColListTableBuilder, Table};
use crate::velojoin::execution::types::{DatasetId, Time};

/// Everything a [`TableCollector`] has observed
#[derive(Debug, Default, Clone)]
pub struct CollectedOutput {
    pub tables: Vec<ColListTable>,
    pub retracted: Vec<GroupKey>,
    pub watermarks: Vec<Time>,
    pub processing_times: Vec<Time>,
    /// `Some(outcome)` once finished
    pub finished: Option<Result<(), JoinError>>,
    pub finish_count: usize,
}

impl CollectedOutput {
    /// Tables sorted by key, for order-independent comparisons
    pub fn sorted_tables(&self) -> Vec<ColListTable> {
        let mut tables = self.tables.clone();
        tables.sort_by(|a, b| a.key().cmp(b.key()));
        tables
    }

    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.nrows()).sum()
    }
}

#[derive(Debug, Default)]
pub struct TableCollector {
    output: Mutex<CollectedOutput>,
}

impl TableCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything collected so far
    pub fn output(&self) -> CollectedOutput {
        match self.output.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn lock(&self) -> JoinResult<MutexGuard<'_, CollectedOutput>> {
        self.output
            .lock()
            .map_err(|_| JoinError::execution("table collector lock poisoned"))
    }
}

impl Transformation for TableCollector {
    fn process(&self, _id: DatasetId, table: &dyn Table) -> JoinResult<()> {
        let mut builder = ColListTableBuilder::with_table_cols(table)?;
        builder.append_table(table)?;
        let copy = builder.finalize()?;
        self.lock()?.tables.push(copy);
        Ok(())
    }

    fn retract_table(&self, _id: DatasetId, key: &GroupKey) -> JoinResult<()> {
        let mut output = self.lock()?;
        output.tables.retain(|t| t.key() != key);
        output.retracted.push(key.clone());
        Ok(())
    }

    fn update_watermark(&self, _id: DatasetId, mark: Time) -> JoinResult<()> {
        self.lock()?.watermarks.push(mark);
        Ok(())
    }

    fn update_processing_time(&self, _id: DatasetId, pt: Time) -> JoinResult<()> {
        self.lock()?.processing_times.push(pt);
        Ok(())
    }

    fn finish(&self, _id: DatasetId, err: Option<JoinError>) {
        if let Ok(mut output) = self.lock() {
            output.finish_count += 1;
            output.finished = Some(match err {
                Some(e) => Err(e),
                None => Ok(()),
            });
        }
    }
}
