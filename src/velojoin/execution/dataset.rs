//! Operator Protocol and Datasets
//!
//! Every operator implements [`Transformation`]: it receives tables, retractions,
//! watermarks, processing-time updates and completion from its parents. An
//! operator publishes its results through a [`Dataset`], which owns the
//! operator's [`DataCache`], evaluates the delivery [`Trigger`] whenever time
//! advances, pulls fired tables from the cache, hands them to the child
//! operators and finally expires them from the cache. An output key reaches
//! the children at most once; a cache that offers it again is a
//! [`JoinError::DuplicateKey`] unless the key was retracted in between.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, warn};

use crate::velojoin::error::{JoinError, JoinResult};
use crate::velojoin::execution::group_key::GroupKey;
use crate::velojoin::execution::table::{ColListTable, Table};
use crate::velojoin::execution::trigger::{TableContext, Trigger, TriggerContext};
use crate::velojoin::execution::types::{DatasetId, Time};

/// Push-based operator protocol
///
/// Parents may call these concurrently, so implementations take `&self` and
/// serialize internally.
pub trait Transformation: Send + Sync {
    fn process(&self, id: DatasetId, table: &dyn Table) -> JoinResult<()>;

    fn retract_table(&self, id: DatasetId, key: &GroupKey) -> JoinResult<()>;

    fn update_watermark(&self, id: DatasetId, mark: Time) -> JoinResult<()>;

    fn update_processing_time(&self, id: DatasetId, pt: Time) -> JoinResult<()>;

    fn finish(&self, id: DatasetId, err: Option<JoinError>);
}

/// Output storage an operator exposes to its dataset
pub trait DataCache: Send {
    /// Snapshot of the output keys currently pending delivery, in key order
    fn keys(&self) -> Vec<GroupKey>;

    /// Materialize (if needed) and return the table for `key`.
    ///
    /// `Ok(None)` means the key was discarded because it produced no rows.
    fn deliver(&mut self, key: &GroupKey) -> JoinResult<Option<&ColListTable>>;

    /// Size information used by count-based triggers
    fn table_context(&self, key: &GroupKey) -> Option<TableContext>;

    /// Drop a materialized table without forgetting the key
    fn discard_table(&mut self, key: &GroupKey);

    /// Forget a key after its table was delivered
    fn expire_table(&mut self, key: &GroupKey);
}

/// Downstream side of an operator
pub trait Dataset: Send {
    fn id(&self) -> DatasetId;

    fn retract_table(&mut self, key: &GroupKey) -> JoinResult<()>;

    fn update_watermark(&mut self, mark: Time) -> JoinResult<()>;

    fn update_processing_time(&mut self, pt: Time) -> JoinResult<()>;

    fn finish(&mut self, err: Option<JoinError>);
}

/// Dataset that delivers cached tables to child operators as triggers fire
pub struct TriggeredDataset<C: DataCache> {
    id: DatasetId,
    cache: C,
    trigger: Trigger,
    children: Vec<Arc<dyn Transformation>>,
    watermark: Time,
    processing_time: Time,
    finished: bool,
    /// Keys already handed to the children; a key is delivered at most once
    delivered: HashSet<GroupKey>,
}

impl<C: DataCache> TriggeredDataset<C> {
    pub fn new(id: DatasetId, cache: C, trigger: Trigger) -> Self {
        Self {
            id,
            cache,
            trigger,
            children: Vec::new(),
            watermark: Time::MIN,
            processing_time: Time::MIN,
            finished: false,
            delivered: HashSet::new(),
        }
    }

    pub fn add_child(&mut self, child: Arc<dyn Transformation>) {
        self.children.push(child);
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut C {
        &mut self.cache
    }

    pub fn watermark(&self) -> Time {
        self.watermark
    }

    pub fn processing_time(&self) -> Time {
        self.processing_time
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Deliver every cached table whose trigger fires
    fn evaluate_triggers(&mut self) -> JoinResult<()> {
        for key in self.cache.keys() {
            let context = match self.cache.table_context(&key) {
                Some(context) => context,
                None => continue,
            };
            let fired = self.trigger.triggered(&TriggerContext {
                table: &context,
                watermark: self.watermark,
                current_processing_time: self.processing_time,
                finished: self.finished,
            });
            if !fired {
                continue;
            }

            let table = match self.cache.deliver(&key)? {
                Some(table) => table,
                None => continue,
            };
            if !self.delivered.insert(key.clone()) {
                return Err(JoinError::DuplicateKey { key });
            }

            debug!(
                "{} delivering table {} ({} rows) to {} children",
                self.id,
                key,
                table.nrows(),
                self.children.len()
            );
            for child in &self.children {
                child.process(self.id, table)?;
            }
            self.cache.expire_table(&key);
        }
        Ok(())
    }
}

impl<C: DataCache> Dataset for TriggeredDataset<C> {
    fn id(&self) -> DatasetId {
        self.id
    }

    fn retract_table(&mut self, key: &GroupKey) -> JoinResult<()> {
        self.cache.discard_table(key);
        self.delivered.remove(key);
        for child in &self.children {
            child.retract_table(self.id, key)?;
        }
        Ok(())
    }

    fn update_watermark(&mut self, mark: Time) -> JoinResult<()> {
        self.watermark = mark;
        self.evaluate_triggers()?;
        for child in &self.children {
            child.update_watermark(self.id, mark)?;
        }
        Ok(())
    }

    fn update_processing_time(&mut self, pt: Time) -> JoinResult<()> {
        self.processing_time = pt;
        self.evaluate_triggers()?;
        for child in &self.children {
            child.update_processing_time(self.id, pt)?;
        }
        Ok(())
    }

    fn finish(&mut self, mut err: Option<JoinError>) {
        if self.finished {
            warn!("{} already finished, ignoring finish signal", self.id);
            return;
        }
        self.finished = true;

        if err.is_none() {
            if let Err(e) = self.evaluate_triggers() {
                err = Some(e);
            }
        }
        for child in &self.children {
            child.finish(self.id, err.clone());
        }
    }
}
