//! Join Job Files
//!
//! A job file describes a complete join run: the join spec, the delivery
//! trigger and the tables each stream produces. YAML (`.yaml`/`.yml`) and
//! JSON (`.json`) are accepted.
//!
//! ```yaml
//! join:
//!   tables: { cpu: from-cpu, mem: from-mem }
//!   on: [_time, host]
//! streams:
//!   cpu:
//!     - key: [host]
//!       columns:
//!         - { label: _time, type: time }
//!         - { label: host, type: string }
//!         - { label: _value, type: float }
//!       rows:
//!         - ["2018-05-22T19:53:26Z", "a", 1.0]
//! ```
//!
//! Time values are RFC 3339 strings or integer nanoseconds.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::velojoin::config::JoinOpSpec;
use crate::velojoin::error::{JoinError, JoinResult};
use crate::velojoin::execution::collector::{CollectedOutput, TableCollector};
use crate::velojoin::execution::dataset::Transformation;
use crate::velojoin::execution::group_key::GroupKey;
use crate::velojoin::execution::join::{spawn_join_driver, JoinEvent, MergeJoinTransformation};
use crate::velojoin::execution::table::ColListTable;
use crate::velojoin::execution::trigger::{Trigger, TriggerSpec};
use crate::velojoin::execution::types::{ColMeta, ColumnType, DatasetId, FieldValue, Time};

const JOIN_DATASET_ID: DatasetId = DatasetId(0);

/// One table produced by a stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Labels of the group key columns; values are taken from the rows
    #[serde(default)]
    pub key: Vec<String>,
    pub columns: Vec<ColMeta>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl TableSpec {
    /// Build the table, parsing every value against its column type
    pub fn to_table(&self) -> JoinResult<ColListTable> {
        let rows = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| self.parse_row(i, row))
            .collect::<JoinResult<Vec<_>>>()?;
        let key = self.group_key(&rows)?;
        ColListTable::from_rows(key, self.columns.clone(), rows)
    }

    fn parse_row(&self, i: usize, row: &[serde_json::Value]) -> JoinResult<Vec<FieldValue>> {
        if row.len() != self.columns.len() {
            return Err(JoinError::schema(
                format!(
                    "row {} has {} values but the table has {} columns",
                    i,
                    row.len(),
                    self.columns.len()
                ),
                None,
            ));
        }
        self.columns
            .iter()
            .zip(row)
            .map(|(col, raw)| parse_value(col, raw))
            .collect()
    }

    fn group_key(&self, rows: &[Vec<FieldValue>]) -> JoinResult<GroupKey> {
        if self.key.is_empty() {
            return Ok(GroupKey::empty());
        }
        let first = rows.first().ok_or_else(|| {
            JoinError::schema("a keyed table needs at least one row", None)
        })?;

        let mut cols = Vec::with_capacity(self.key.len());
        let mut values = Vec::with_capacity(self.key.len());
        for label in &self.key {
            let j = self
                .columns
                .iter()
                .position(|c| c.label == *label)
                .ok_or_else(|| JoinError::schema("group key label is not a column", Some(label)))?;
            if let Some(row) = rows.iter().find(|row| row[j] != first[j]) {
                return Err(JoinError::schema(
                    format!("rows disagree on key value ({} vs {})", first[j], row[j]),
                    Some(label),
                ));
            }
            cols.push(self.columns[j].clone());
            values.push(first[j].clone());
        }
        GroupKey::new(cols, values)
    }
}

fn parse_value(col: &ColMeta, raw: &serde_json::Value) -> JoinResult<FieldValue> {
    let value = match col.column_type {
        ColumnType::Bool => raw.as_bool().map(FieldValue::Bool),
        ColumnType::Int => raw.as_i64().map(FieldValue::Int),
        ColumnType::UInt => raw.as_u64().map(FieldValue::UInt),
        ColumnType::Float => raw.as_f64().map(FieldValue::Float),
        ColumnType::String => raw.as_str().map(FieldValue::from),
        ColumnType::Time => match raw {
            serde_json::Value::String(s) => Time::parse_rfc3339(s).map(FieldValue::Time),
            other => other.as_i64().map(|ns| FieldValue::Time(Time(ns))),
        },
    };
    value.ok_or_else(|| {
        JoinError::schema(
            format!("cannot read {} as {}", raw, col.column_type),
            Some(&col.label),
        )
    })
}

/// A complete join run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub join: JoinOpSpec,

    #[serde(default)]
    pub trigger: TriggerSpec,

    /// Stream name -> tables in delivery order
    #[serde(default)]
    pub streams: BTreeMap<String, Vec<TableSpec>>,
}

impl JobConfig {
    /// Load a job file, choosing the format by extension (YAML by default)
    pub fn from_file<P: AsRef<Path>>(path: P) -> JoinResult<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|e| JoinError::Io {
            path: display.clone(),
            message: e.to_string(),
        })?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        };
        parsed.map_err(|message| JoinError::Parse {
            path: display,
            message,
        })
    }

    pub fn from_yaml_str(content: &str) -> JoinResult<Self> {
        serde_yaml::from_str(content).map_err(|e| JoinError::Parse {
            path: "<yaml>".to_string(),
            message: e.to_string(),
        })
    }

    pub fn from_json_str(content: &str) -> JoinResult<Self> {
        serde_json::from_str(content).map_err(|e| JoinError::Parse {
            path: "<json>".to_string(),
            message: e.to_string(),
        })
    }

    /// Parent ids in stream-name order, and each parent's stream name
    fn parents(&self) -> JoinResult<Vec<(DatasetId, &str)>> {
        if let Some(unknown) = self.streams.keys().find(|s| !self.join.tables.contains_key(*s)) {
            return Err(JoinError::config(format!(
                "stream '{}' is not one of the joined tables",
                unknown
            )));
        }
        Ok(self
            .join
            .tables
            .keys()
            .enumerate()
            .map(|(i, name)| (DatasetId(i as u64 + 1), name.as_str()))
            .collect())
    }

    fn build_join(&self) -> JoinResult<(Arc<MergeJoinTransformation>, Arc<TableCollector>, Vec<DatasetId>)> {
        let procedure = self.join.procedure_spec()?;
        let parents: Vec<DatasetId> = self.parents()?.into_iter().map(|(id, _)| id).collect();
        let join = Arc::new(MergeJoinTransformation::new(
            JOIN_DATASET_ID,
            &procedure,
            &parents,
            Trigger::new(self.trigger.clone()),
        )?);
        let collector = Arc::new(TableCollector::new());
        join.add_child(collector.clone())?;
        Ok((join, collector, parents))
    }

    /// Tables of every stream, interleaved round-robin in stream-name order
    fn interleaved(&self) -> JoinResult<Vec<(DatasetId, &TableSpec)>> {
        let parents = self.parents()?;
        let longest = self.streams.values().map(Vec::len).max().unwrap_or(0);
        let mut order = Vec::new();
        for i in 0..longest {
            for (id, name) in &parents {
                if let Some(spec) = self.streams.get(*name).and_then(|tables| tables.get(i)) {
                    order.push((*id, spec));
                }
            }
        }
        Ok(order)
    }

    /// Run the join synchronously and collect its output
    pub fn run(&self) -> JoinResult<CollectedOutput> {
        let (join, collector, parents) = self.build_join()?;

        for (parent, spec) in self.interleaved()? {
            let table = match spec.to_table() {
                Ok(table) => table,
                Err(e) => {
                    let err = JoinError::parent(parent, e.to_string());
                    error!("{}", err);
                    join.finish(parent, Some(err.clone()));
                    return Err(err);
                }
            };
            if let Err(e) = join.process(parent, &table) {
                join.finish(parent, Some(e.clone()));
                return Err(e);
            }
        }
        for parent in parents {
            join.finish(parent, None);
        }

        let output = collector.output();
        info!(
            "Join produced {} tables ({} rows)",
            output.tables.len(),
            output.total_rows()
        );
        Ok(output)
    }

    /// Run the join through the event driver
    pub async fn run_with_driver(&self, buffer_size: usize) -> JoinResult<CollectedOutput> {
        let (join, collector, parents) = self.build_join()?;
        let (tx, handle) = spawn_join_driver(join, buffer_size);

        let mut events = Vec::new();
        for (parent, spec) in self.interleaved()? {
            match spec.to_table() {
                Ok(table) => events.push(JoinEvent::Process { parent, table }),
                Err(e) => {
                    events.push(JoinEvent::Finish {
                        parent,
                        err: Some(JoinError::parent(parent, e.to_string())),
                    });
                    break;
                }
            }
        }
        events.extend(parents.into_iter().map(|parent| JoinEvent::Finish { parent, err: None }));

        for event in events {
            if tx.send(event).await.is_err() {
                // driver already stopped; its result carries the reason
                break;
            }
        }
        drop(tx);

        let stats = handle
            .await
            .map_err(|e| JoinError::execution(format!("join driver task failed: {}", e)))??;
        info!("Join driver applied {:?}", stats);

        let output = collector.output();
        if let Some(Err(e)) = &output.finished {
            return Err(e.clone());
        }
        Ok(output)
    }
}
