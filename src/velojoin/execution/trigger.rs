//! Delivery Triggers
//!
//! A trigger decides when a materialized table is handed to downstream
//! operators. Every trigger fires once its dataset is finished.

use serde::{Deserialize, Serialize};

use crate::velojoin::execution::group_key::GroupKey;
use crate::velojoin::execution::types::Time;

/// Default label of the window-stop column consulted by [`TriggerSpec::AfterWatermark`]
pub const DEFAULT_STOP_LABEL: &str = "_stop";

/// What a cache reports about a table pending delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableContext {
    pub key: GroupKey,
    /// Rows backing the table (left rows + right rows for a join)
    pub count: usize,
}

/// Inputs to a trigger decision
#[derive(Debug, Clone)]
pub struct TriggerContext<'a> {
    pub table: &'a TableContext,
    pub watermark: Time,
    pub current_processing_time: Time,
    pub finished: bool,
}

/// Declarative trigger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerSpec {
    /// Fire when the key's stop-time column is at or below the watermark
    AfterWatermark {
        #[serde(default = "default_stop_label")]
        stop_label: String,
    },
    /// Fire when at least `count` rows back the table
    AfterAtLeastCount { count: usize },
    /// Fire when any of the nested triggers fires
    Narrowest { triggers: Vec<TriggerSpec> },
}

fn default_stop_label() -> String {
    DEFAULT_STOP_LABEL.to_string()
}

impl Default for TriggerSpec {
    fn default() -> Self {
        TriggerSpec::AfterWatermark {
            stop_label: default_stop_label(),
        }
    }
}

/// Evaluates a [`TriggerSpec`]
#[derive(Debug, Clone)]
pub struct Trigger {
    spec: TriggerSpec,
}

impl Trigger {
    pub fn new(spec: TriggerSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &TriggerSpec {
        &self.spec
    }

    pub fn triggered(&self, ctx: &TriggerContext<'_>) -> bool {
        ctx.finished || Self::evaluate(&self.spec, ctx)
    }

    fn evaluate(spec: &TriggerSpec, ctx: &TriggerContext<'_>) -> bool {
        match spec {
            TriggerSpec::AfterWatermark { stop_label } => ctx
                .table
                .key
                .value_at(stop_label)
                .and_then(|v| v.as_time())
                .is_some_and(|stop| stop <= ctx.watermark),
            TriggerSpec::AfterAtLeastCount { count } => ctx.table.count >= *count,
            TriggerSpec::Narrowest { triggers } => {
                triggers.iter().any(|t| Self::evaluate(t, ctx))
            }
        }
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new(TriggerSpec::default())
    }
}
