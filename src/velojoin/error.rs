//! Join Error Types
//!
//! Every failure raised by the join engine is fatal to the running query:
//! there is no partial-result recovery and no retry inside the engine.
//!
//! ## Error Categories
//!
//! - **Config**: wrong parent count, conflicting `on` / cross-product request,
//!   unknown join method. Raised at construction, before any table flows.
//! - **Schema**: a shared `on` column has mismatched types across streams, an
//!   `on` column is missing from one side, or a table disagrees with the
//!   columns already buffered for its key. Raised during `process`.
//! - **DuplicateKey**: a table for an output key was delivered twice in one
//!   trigger pass (invariant violation).
//! - **Unsupported**: `retract_table` and other deliberately unimplemented paths.
//! - **Parent**: a failure reported by an upstream producer through `finish`.

use crate::velojoin::execution::group_key::GroupKey;
use crate::velojoin::execution::types::DatasetId;

/// Errors raised by the join engine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JoinError {
    /// Invalid construction-time configuration
    #[error("Join configuration error: {message}")]
    Config { message: String },

    /// Column schema could not be unified or validated
    #[error("Join schema error{}: {message}", .column.as_ref().map(|c| format!(" for column '{}'", c)).unwrap_or_default())]
    Schema {
        message: String,
        column: Option<String>,
    },

    /// A table for this output key was already emitted in the current pass
    #[error("Duplicate table for group key {key}")]
    DuplicateKey { key: GroupKey },

    /// No table has been registered for this output key
    #[error("No table exists with group key {key}")]
    TableNotFound { key: GroupKey },

    /// The operation is not implemented by this operator
    #[error("Operation '{operation}' is not supported by {operator}")]
    Unsupported {
        operation: String,
        operator: String,
    },

    /// Runtime failure inside the operator
    #[error("Join execution error: {message}")]
    Execution { message: String },

    /// Failure propagated from an upstream producer
    #[error("Parent {parent} failed: {message}")]
    Parent { parent: DatasetId, message: String },

    /// Job file could not be read
    #[error("IO error reading {path}: {message}")]
    Io { path: String, message: String },

    /// Job file could not be parsed
    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },
}

impl JoinError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn schema(message: impl Into<String>, column: Option<&str>) -> Self {
        Self::Schema {
            message: message.into(),
            column: column.map(str::to_string),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    pub fn unsupported(operation: impl Into<String>, operator: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            operator: operator.into(),
        }
    }

    pub fn parent(parent: DatasetId, message: impl Into<String>) -> Self {
        Self::Parent {
            parent,
            message: message.into(),
        }
    }

    /// Whether this error was raised before any data was processed
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, JoinError::Config { .. })
    }
}

/// Result alias used throughout the join engine
pub type JoinResult<T> = Result<T, JoinError>;
