//! # velojoin
//!
//! A push-based, two-stream sort-merge join engine for dataflow query
//! execution over columnar, time-partitioned tables.
//!
//! Tables (column batches sharing a group key) arrive independently from two
//! parent operators. The join buffers each stream by group key, discovers
//! which partitions of the two streams can ever match, unifies both column
//! schemas into one deterministic output schema and, when the downstream
//! trigger fires, sort-merge joins the matching partitions.
//!
//! ## Features
//!
//! - **Incremental key discovery**: output keys are registered as tables arrive
//! - **Deterministic schemas**: shared non-join columns are suffixed with their stream name
//! - **Cross products per run**: duplicate join values yield every pairing
//! - **Bounded buffering**: delivered partitions are evicted once both streams moved past them
//! - **Two concurrency fronts**: a lock-guarded operator, or a task fed over channels
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use velojoin::velojoin::config::MergeJoinProcedureSpec;
//! use velojoin::velojoin::execution::join::MergeJoinTransformation;
//! use velojoin::velojoin::execution::{
//!     ColListTable, ColMeta, ColumnType, DatasetId, GroupKey, TableCollector, Transformation,
//!     Trigger,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (left, right) = (DatasetId(1), DatasetId(2));
//! let spec = MergeJoinProcedureSpec::inner(["a", "b"], vec!["x".to_string()]);
//! let join = MergeJoinTransformation::new(DatasetId(0), &spec, &[left, right], Trigger::default())?;
//! let output = Arc::new(TableCollector::new());
//! join.add_child(output.clone())?;
//!
//! let cols = vec![
//!     ColMeta::new("x", ColumnType::String),
//!     ColMeta::new("v", ColumnType::Int),
//! ];
//! let a = ColListTable::from_rows(GroupKey::empty(), cols.clone(), vec![vec!["k".into(), 1i64.into()]])?;
//! let b = ColListTable::from_rows(GroupKey::empty(), cols, vec![vec!["k".into(), 2i64.into()]])?;
//! join.process(left, &a)?;
//! join.process(right, &b)?;
//! join.finish(left, None);
//! join.finish(right, None);
//!
//! assert_eq!(output.output().total_rows(), 1);
//! # Ok(())
//! # }
//! ```

pub mod velojoin;

pub use velojoin::config::{JobConfig, JoinMethod, JoinOpSpec, MergeJoinProcedureSpec};
pub use velojoin::error::{JoinError, JoinResult};
pub use velojoin::execution::join::{spawn_join_driver, JoinEvent, MergeJoinTransformation};
pub use velojoin::execution::{
    ColListTable, ColListTableBuilder, ColMeta, ColumnType, DatasetId, FieldValue, GroupKey,
    Table, TableCollector, Transformation, Trigger, TriggerSpec,
};
