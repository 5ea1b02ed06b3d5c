//! Sort-Merge Join
//!
//! Two-stream inner join over group-keyed tables.
//!
//! ## Architecture Overview
//!
//! - **StreamBuffer**: per-parent table storage indexed by pre-join key
//! - **JoinSchema**: unified output columns, built once both streams have data
//! - **KeyRegistry**: incrementally discovered output keys and their pre-join pairs
//! - **SortMergeJoiner**: sorts both partitions and emits run-wise cross products
//! - **MergeJoinCache**: owns the above and serves the downstream dataset
//! - **MergeJoinTransformation**: the operator, serializing both parents under one lock
//! - **spawn_join_driver**: a task that owns the operator and applies parent events in order

pub mod cache;
pub mod driver;
pub mod merge;
pub mod registry;
pub mod schema;
pub mod stream_buffer;
pub mod transformation;
pub mod watermark;

pub use cache::{JoinCacheStats, MergeJoinCache};
pub use driver::{spawn_join_driver, DriverStats, JoinEvent, JoinEventSender};
pub use merge::SortMergeJoiner;
pub use registry::{KeyPair, KeyRegistry};
pub use schema::JoinSchema;
pub use stream_buffer::{StreamBuffer, StreamBufferStats};
pub use transformation::MergeJoinTransformation;
pub use watermark::{JoinProgressTracker, ParentState};

/// Which parent of the join a table or signal came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinSide {
    /// First stream in sorted stream-name order
    Left,
    /// Second stream in sorted stream-name order
    Right,
}

impl JoinSide {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            JoinSide::Left => JoinSide::Right,
            JoinSide::Right => JoinSide::Left,
        }
    }
}
