//! Operator execution layer.
//!
//! Tables flow from parent operators into [`Transformation`]s; each operator
//! publishes results through a [`Dataset`] that decides, via its [`Trigger`],
//! when cached output tables are delivered to the next operators.

pub mod collector;
pub mod dataset;
pub mod group_key;
pub mod join;
pub mod table;
pub mod trigger;
pub mod types;

pub use collector::{CollectedOutput, TableCollector};
pub use dataset::{DataCache, Dataset, Transformation, TriggeredDataset};
pub use group_key::GroupKey;
pub use table::{ColListTable, ColListTableBuilder, Table};
pub use trigger::{TableContext, Trigger, TriggerContext, TriggerSpec};
pub use types::{ColMeta, ColumnType, DatasetId, FieldValue, Time};
