//! Merge Join Operator
//!
//! Implements the push-based operator protocol for a two-parent inner join.
//! Both parents may call in concurrently; every entry point takes the
//! operator lock for the whole call, so the buffers, schema and registry have a
//! single writer and trigger evaluation never observes a half-applied update.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, error, info};

use crate::velojoin::config::MergeJoinProcedureSpec;
use crate::velojoin::error::{JoinError, JoinResult};
use crate::velojoin::execution::dataset::{Dataset, Transformation, TriggeredDataset};
use crate::velojoin::execution::group_key::GroupKey;
use crate::velojoin::execution::join::cache::MergeJoinCache;
use crate::velojoin::execution::join::watermark::JoinProgressTracker;
use crate::velojoin::execution::table::Table;
use crate::velojoin::execution::trigger::Trigger;
use crate::velojoin::execution::types::{DatasetId, Time};

const OPERATOR_NAME: &str = "merge join";

struct JoinState {
    dataset: TriggeredDataset<MergeJoinCache>,
    progress: JoinProgressTracker,
}

/// Two-stream sort-merge join operator
pub struct MergeJoinTransformation {
    id: DatasetId,
    state: Mutex<JoinState>,
}

impl MergeJoinTransformation {
    /// Create the operator for `spec`.
    ///
    /// `parents[i]` feeds the stream named `spec.table_names[i]`. Exactly two
    /// distinct parents are required.
    pub fn new(
        id: DatasetId,
        spec: &MergeJoinProcedureSpec,
        parents: &[DatasetId],
        trigger: Trigger,
    ) -> JoinResult<Self> {
        if parents.len() != 2 {
            return Err(JoinError::config(format!(
                "merge join requires exactly two parents, got {}",
                parents.len()
            )));
        }
        if spec.table_names.len() != 2 {
            return Err(JoinError::config(format!(
                "merge join requires exactly two table names, got {}",
                spec.table_names.len()
            )));
        }
        if parents[0] == parents[1] {
            return Err(JoinError::config(format!(
                "merge join parents must be distinct, got {} twice",
                parents[0]
            )));
        }

        let cache = MergeJoinCache::new(
            (parents[0], spec.table_names[0].clone()),
            (parents[1], spec.table_names[1].clone()),
            spec.on.clone(),
            spec.explicit_on,
        );
        info!(
            "Created merge join {} of '{}' ({}) and '{}' ({}) on {:?}",
            id, spec.table_names[0], parents[0], spec.table_names[1], parents[1], spec.on
        );

        Ok(Self {
            id,
            state: Mutex::new(JoinState {
                dataset: TriggeredDataset::new(id, cache, trigger),
                progress: JoinProgressTracker::new(),
            }),
        })
    }

    pub fn id(&self) -> DatasetId {
        self.id
    }

    /// Attach a downstream operator
    pub fn add_child(&self, child: Arc<dyn Transformation>) -> JoinResult<()> {
        self.lock()?.dataset.add_child(child);
        Ok(())
    }

    /// Inspect the join state under the operator lock
    pub fn with_cache<R>(&self, f: impl FnOnce(&MergeJoinCache) -> R) -> JoinResult<R> {
        let state = self.lock()?;
        Ok(f(state.dataset.cache()))
    }

    pub fn is_finished(&self) -> JoinResult<bool> {
        Ok(self.lock()?.dataset.is_finished())
    }

    fn lock(&self) -> JoinResult<MutexGuard<'_, JoinState>> {
        self.state
            .lock()
            .map_err(|_| JoinError::execution(format!("{} lock poisoned", self.id)))
    }
}

impl Transformation for MergeJoinTransformation {
    fn process(&self, id: DatasetId, table: &dyn Table) -> JoinResult<()> {
        let mut state = self.lock()?;
        if state.dataset.is_finished() {
            debug!("{} ignoring table {} from {} after finish", self.id, table.key(), id);
            return Ok(());
        }

        let cache = state.dataset.cache_mut();
        cache.insert_into_buffer(id, table)?;
        cache.register_key(id, table.key())
    }

    fn retract_table(&self, id: DatasetId, key: &GroupKey) -> JoinResult<()> {
        error!("{} received retraction of {} from {}", self.id, key, id);
        Err(JoinError::unsupported("retract_table", OPERATOR_NAME))
    }

    fn update_watermark(&self, id: DatasetId, mark: Time) -> JoinResult<()> {
        let mut state = self.lock()?;
        if state.dataset.is_finished() {
            return Ok(());
        }

        let side = state.dataset.cache().side_of(id)?;
        match state.progress.update_watermark(side, mark) {
            Some(combined) => state.dataset.update_watermark(combined),
            None => Ok(()),
        }
    }

    fn update_processing_time(&self, id: DatasetId, pt: Time) -> JoinResult<()> {
        let mut state = self.lock()?;
        if state.dataset.is_finished() {
            return Ok(());
        }

        let side = state.dataset.cache().side_of(id)?;
        match state.progress.update_processing_time(side, pt) {
            Some(combined) => state.dataset.update_processing_time(combined),
            None => Ok(()),
        }
    }

    fn finish(&self, id: DatasetId, err: Option<JoinError>) {
        let mut state = match self.lock() {
            Ok(state) => state,
            Err(e) => {
                error!("{} cannot finish: {}", self.id, e);
                return;
            }
        };
        if state.dataset.is_finished() {
            debug!("{} already finished, ignoring finish from {}", self.id, id);
            return;
        }

        let side = match state.dataset.cache().side_of(id) {
            Ok(side) => side,
            Err(e) => {
                error!("{} finished by unknown parent: {}", self.id, e);
                state.dataset.finish(Some(e));
                return;
            }
        };

        match err {
            Some(e) => {
                error!("{} parent {} failed, finishing with error: {}", self.id, id, e);
                state.progress.mark_finished(side);
                state.dataset.finish(Some(e));
            }
            None => {
                if state.progress.mark_finished(side) {
                    info!("{} both parents finished", self.id);
                    state.dataset.finish(None);
                } else {
                    debug!("{} parent {} finished, waiting for the other", self.id, id);
                }
            }
        }
    }
}
