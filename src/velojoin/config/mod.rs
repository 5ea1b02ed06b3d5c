//! Join Configuration
//!
//! [`JoinOpSpec`] is the user-facing description of a join: which upstream
//! operations feed it (by stream name), the join columns and the method.
//! Validation turns it into a [`MergeJoinProcedureSpec`], the only thing the
//! engine needs at construction time.
//!
//! ```yaml
//! tables:
//!   cpu: "from-cpu"
//!   mem: "from-mem"
//! on: [_time, host]
//! method: inner
//! ```

pub mod job;

pub use job::{JobConfig, TableSpec};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::velojoin::error::{JoinError, JoinResult};

/// Join method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinMethod {
    /// Rows match when every join column is equal
    #[default]
    Inner,
    /// Every left row pairs with every right row
    Cross,
}

impl FromStr for JoinMethod {
    type Err = JoinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inner" => Ok(JoinMethod::Inner),
            "cross" => Ok(JoinMethod::Cross),
            other => Err(JoinError::config(format!(
                "unsupported join method '{}' (expected 'inner' or 'cross')",
                other
            ))),
        }
    }
}

impl fmt::Display for JoinMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinMethod::Inner => f.write_str("inner"),
            JoinMethod::Cross => f.write_str("cross"),
        }
    }
}

/// User-facing join specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinOpSpec {
    /// Stream name -> upstream operation id
    pub tables: BTreeMap<String, String>,

    /// Join columns; defaults to every column both streams share
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<Vec<String>>,

    #[serde(default)]
    pub method: JoinMethod,
}

impl JoinOpSpec {
    pub fn new(tables: BTreeMap<String, String>, on: Option<Vec<String>>, method: JoinMethod) -> Self {
        Self { tables, on, method }
    }

    pub fn validate(&self) -> JoinResult<()> {
        if self.tables.len() != 2 {
            return Err(JoinError::config(format!(
                "join requires exactly two tables, got {}",
                self.tables.len()
            )));
        }
        if let Some(name) = self.tables.keys().find(|name| name.trim().is_empty()) {
            return Err(JoinError::config(format!("invalid stream name '{}'", name)));
        }
        if self.method == JoinMethod::Cross && self.on.as_ref().is_some_and(|on| !on.is_empty()) {
            return Err(JoinError::config(
                "cross product and 'on' are mutually exclusive",
            ));
        }
        Ok(())
    }

    /// Upstream operation ids in stream-name order
    pub fn parent_ops(&self) -> Vec<&str> {
        self.tables.values().map(String::as_str).collect()
    }

    pub fn procedure_spec(&self) -> JoinResult<MergeJoinProcedureSpec> {
        self.validate()?;
        let table_names: Vec<String> = self.tables.keys().cloned().collect();
        Ok(match self.method {
            JoinMethod::Cross => MergeJoinProcedureSpec::new(table_names, Vec::new(), true),
            JoinMethod::Inner => {
                let on = self.on.clone().unwrap_or_default();
                let explicit_on = !on.is_empty();
                MergeJoinProcedureSpec::new(table_names, on, explicit_on)
            }
        })
    }
}

/// Construction-time configuration of a merge join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeJoinProcedureSpec {
    /// Stream names, sorted; parent `i` feeds `table_names[i]`
    pub table_names: Vec<String>,
    /// Join columns, sorted and unique
    pub on: Vec<String>,
    /// Whether `on` was supplied (an empty explicit list is a cross product)
    pub explicit_on: bool,
}

impl MergeJoinProcedureSpec {
    pub fn new(mut table_names: Vec<String>, mut on: Vec<String>, explicit_on: bool) -> Self {
        table_names.sort();
        on.sort();
        on.dedup();
        Self {
            table_names,
            on,
            explicit_on,
        }
    }

    /// Inner join on the given columns, defaulting to the shared columns when empty
    pub fn inner<S: Into<String>>(table_names: [S; 2], on: Vec<String>) -> Self {
        let explicit_on = !on.is_empty();
        Self::new(table_names.map(Into::into).to_vec(), on, explicit_on)
    }

    pub fn cross<S: Into<String>>(table_names: [S; 2]) -> Self {
        Self::new(table_names.map(Into::into).to_vec(), Vec::new(), true)
    }
}
