//! Join Event Driver
//!
//! Message-passing front end for a join operator. One task owns the operator
//! and applies events from both parents in arrival order, so producers never
//! contend on the operator lock and can run on independent tasks.
//!
//! ```text
//!   parent A ──┐
//!              ├──► mpsc::channel ──► driver task ──► operator ──► children
//!   parent B ──┘
//! ```

use std::sync::Arc;

use log::{debug, error};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::velojoin::error::{JoinError, JoinResult};
use crate::velojoin::execution::dataset::Transformation;
use crate::velojoin::execution::table::ColListTable;
use crate::velojoin::execution::types::{DatasetId, Time};

/// One operator-protocol call, sent by a parent
#[derive(Debug, Clone)]
pub enum JoinEvent {
    Process {
        parent: DatasetId,
        table: ColListTable,
    },
    UpdateWatermark {
        parent: DatasetId,
        mark: Time,
    },
    UpdateProcessingTime {
        parent: DatasetId,
        pt: Time,
    },
    Finish {
        parent: DatasetId,
        err: Option<JoinError>,
    },
}

impl JoinEvent {
    pub fn parent(&self) -> DatasetId {
        match self {
            JoinEvent::Process { parent, .. }
            | JoinEvent::UpdateWatermark { parent, .. }
            | JoinEvent::UpdateProcessingTime { parent, .. }
            | JoinEvent::Finish { parent, .. } => *parent,
        }
    }
}

pub type JoinEventSender = mpsc::Sender<JoinEvent>;

/// Counters reported when the driver task ends
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DriverStats {
    pub tables: u64,
    pub watermarks: u64,
    pub processing_times: u64,
    pub finishes: u64,
}

/// Spawn a task that owns `operator` and applies events until every sender is
/// dropped. The first failing event finishes the operator with that error,
/// stops the task and is returned from the handle.
pub fn spawn_join_driver(
    operator: Arc<dyn Transformation>,
    buffer_size: usize,
) -> (JoinEventSender, JoinHandle<JoinResult<DriverStats>>) {
    let (tx, mut rx) = mpsc::channel::<JoinEvent>(buffer_size.max(1));

    let handle = tokio::spawn(async move {
        let mut stats = DriverStats::default();

        while let Some(event) = rx.recv().await {
            let parent = event.parent();
            let result = match event {
                JoinEvent::Process { parent, table } => {
                    stats.tables += 1;
                    operator.process(parent, &table)
                }
                JoinEvent::UpdateWatermark { parent, mark } => {
                    stats.watermarks += 1;
                    operator.update_watermark(parent, mark)
                }
                JoinEvent::UpdateProcessingTime { parent, pt } => {
                    stats.processing_times += 1;
                    operator.update_processing_time(parent, pt)
                }
                JoinEvent::Finish { parent, err } => {
                    stats.finishes += 1;
                    operator.finish(parent, err);
                    Ok(())
                }
            };

            if let Err(e) = result {
                error!("Join driver stopping after event from {} failed: {}", parent, e);
                operator.finish(parent, Some(e.clone()));
                return Err(e);
            }
        }

        debug!("Join driver drained: {:?}", stats);
        Ok(stats)
    });

    (tx, handle)
}
