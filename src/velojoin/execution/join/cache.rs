//! Merge Join Cache
//!
//! Owns everything a merge join accumulates: one [`StreamBuffer`] per parent,
//! the unified [`JoinSchema`], the [`KeyRegistry`] of discovered output keys and
//! the materialized output tables. Producers push into it through
//! [`MergeJoinCache::insert_into_buffer`] and [`MergeJoinCache::register_key`];
//! the downstream dataset pulls through the [`DataCache`] contract.
//!
//! ## Eviction
//!
//! Buffered partitions are released only when both streams are keyed by the
//! same leading column and that column is a join column. A delivered
//! partition is removed once every output key built from it has been
//! delivered or discarded, the opposite stream has moved past its leading
//! value, and the opposite stream holds no undelivered partitions for it.

use std::collections::HashMap;

use log::{debug, warn};

use crate::velojoin::error::{JoinError, JoinResult};
use crate::velojoin::execution::dataset::DataCache;
use crate::velojoin::execution::group_key::GroupKey;
use crate::velojoin::execution::join::merge::SortMergeJoiner;
use crate::velojoin::execution::join::registry::KeyRegistry;
use crate::velojoin::execution::join::schema::JoinSchema;
use crate::velojoin::execution::join::stream_buffer::StreamBuffer;
use crate::velojoin::execution::join::JoinSide;
use crate::velojoin::execution::table::{ColListTable, Table};
use crate::velojoin::execution::trigger::TableContext;
use crate::velojoin::execution::types::{ColMeta, DatasetId};

/// Columns of the first table a stream delivered
#[derive(Debug, Clone)]
struct StreamSchema {
    key: Vec<ColMeta>,
    columns: Vec<ColMeta>,
}

/// One parent of the join
#[derive(Debug)]
struct JoinInput {
    id: DatasetId,
    name: String,
    buffer: StreamBuffer,
    schema: Option<StreamSchema>,
}

impl JoinInput {
    fn new(id: DatasetId, name: String) -> Self {
        Self {
            id,
            name,
            buffer: StreamBuffer::new(),
            schema: None,
        }
    }
}

/// Lifetime counters for a join cache
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JoinCacheStats {
    pub tables_joined: u64,
    pub rows_emitted: u64,
    pub empty_joins_discarded: u64,
    pub failed_joins: u64,
    pub keys_evicted: u64,
}

/// State shared by both sides of a merge join
#[derive(Debug)]
pub struct MergeJoinCache {
    left: JoinInput,
    right: JoinInput,

    /// Join columns as configured; replaced by the resolved list once the schema is built
    on: Vec<String>,
    explicit_on: bool,

    schema: JoinSchema,
    registry: KeyRegistry,

    /// Materialized output tables awaiting delivery
    tables: HashMap<GroupKey, ColListTable>,

    stats: JoinCacheStats,
}

impl MergeJoinCache {
    pub fn new(
        left: (DatasetId, impl Into<String>),
        right: (DatasetId, impl Into<String>),
        on: Vec<String>,
        explicit_on: bool,
    ) -> Self {
        Self {
            left: JoinInput::new(left.0, left.1.into()),
            right: JoinInput::new(right.0, right.1.into()),
            on,
            explicit_on,
            schema: JoinSchema::new(),
            registry: KeyRegistry::new(),
            tables: HashMap::new(),
            stats: JoinCacheStats::default(),
        }
    }

    /// Which side a parent feeds
    pub fn side_of(&self, id: DatasetId) -> JoinResult<JoinSide> {
        if id == self.left.id {
            Ok(JoinSide::Left)
        } else if id == self.right.id {
            Ok(JoinSide::Right)
        } else {
            Err(JoinError::config(format!(
                "{} is not a parent of this join (parents are {} and {})",
                id, self.left.id, self.right.id
            )))
        }
    }

    fn input(&self, side: JoinSide) -> &JoinInput {
        match side {
            JoinSide::Left => &self.left,
            JoinSide::Right => &self.right,
        }
    }

    fn input_mut(&mut self, side: JoinSide) -> &mut JoinInput {
        match side {
            JoinSide::Left => &mut self.left,
            JoinSide::Right => &mut self.right,
        }
    }

    pub fn stream_name(&self, side: JoinSide) -> &str {
        &self.input(side).name
    }

    pub fn buffer(&self, side: JoinSide) -> &StreamBuffer {
        &self.input(side).buffer
    }

    pub fn schema(&self) -> &JoinSchema {
        &self.schema
    }

    pub fn registry(&self) -> &KeyRegistry {
        &self.registry
    }

    /// Join columns: the configured list until the schema is built, the resolved list after
    pub fn on(&self) -> &[String] {
        &self.on
    }

    pub fn stats(&self) -> &JoinCacheStats {
        &self.stats
    }

    /// Copy an incoming table into its parent's buffer
    pub fn insert_into_buffer(&mut self, id: DatasetId, table: &dyn Table) -> JoinResult<JoinSide> {
        let side = self.side_of(id)?;
        let input = self.input_mut(side);
        if input.schema.is_none() {
            input.schema = Some(StreamSchema {
                key: table.key().cols().to_vec(),
                columns: table.cols().to_vec(),
            });
        }
        input.buffer.insert(table)?;
        debug!(
            "Buffered {} rows for {} on stream '{}' ({} keys resident)",
            table.nrows(),
            table.key(),
            input.name,
            input.buffer.len()
        );
        Ok(side)
    }

    /// Build the schema once both streams have data, then pair `key` with
    /// every compatible key of the opposite stream.
    pub fn register_key(&mut self, id: DatasetId, key: &GroupKey) -> JoinResult<()> {
        let side = self.side_of(id)?;

        if !self.schema.is_built() {
            if self.left.buffer.is_empty() || self.right.buffer.is_empty() {
                return Ok(());
            }
            self.build_schema()?;
        }

        let opposite = match side.opposite() {
            JoinSide::Left => &self.left.buffer,
            JoinSide::Right => &self.right.buffer,
        };
        let registered = self.registry.register_key(
            side,
            key,
            opposite,
            &self.schema,
            &self.left.name,
            &self.right.name,
        )?;

        // new rows make any materialized table for these keys stale
        for output in &registered {
            self.tables.remove(output);
        }
        Ok(())
    }

    fn build_schema(&mut self) -> JoinResult<()> {
        let (left, right) = match (&self.left.schema, &self.right.schema) {
            (Some(l), Some(r)) => (l, r),
            _ => {
                return Err(JoinError::execution(
                    "join schema requested before both streams delivered a table",
                ))
            }
        };
        self.schema.build(
            &self.left.name,
            &left.columns,
            &self.right.name,
            &right.columns,
            &self.on,
            self.explicit_on,
        )?;
        self.on = self.schema.on().to_vec();
        Ok(())
    }

    /// Both streams are keyed by the same leading column and it is a join column
    pub fn can_evict_tables(&self) -> bool {
        let (left, right) = match (&self.left.schema, &self.right.schema) {
            (Some(l), Some(r)) => (l, r),
            _ => return false,
        };
        match (left.key.first(), right.key.first()) {
            (Some(l), Some(r)) => l.label == r.label && self.on.iter().any(|c| *c == l.label),
            _ => false,
        }
    }

    /// Drop an output key and release its pre-join partitions
    fn release(&mut self, key: &GroupKey) {
        self.tables.remove(key);
        let pair = match self.registry.remove(key) {
            Some(pair) => pair,
            None => return,
        };

        // a pre-join partition stays live while any output key built from it is undelivered
        if self.registry.pending(JoinSide::Left, &pair.left) == 0 {
            self.left.buffer.expire(&pair.left);
        }
        if self.registry.pending(JoinSide::Right, &pair.right) == 0 {
            self.right.buffer.expire(&pair.right);
        }

        if self.can_evict_tables() {
            let (left, right) = (&mut self.left.buffer, &mut self.right.buffer);
            let evicted = clear_consumed(left, right) + clear_consumed(right, left);
            if evicted > 0 {
                self.stats.keys_evicted += evicted as u64;
                debug!(
                    "Evicted {} buffered partitions ({} left / {} right resident)",
                    evicted,
                    self.left.buffer.len(),
                    self.right.buffer.len()
                );
            }
        }
    }
}

/// Remove stale partitions of `buffer` whose leading value `other` has moved past and fully consumed
fn clear_consumed(buffer: &mut StreamBuffer, other: &StreamBuffer) -> usize {
    buffer.clear(|key| match key.value(0) {
        Some(leading) => other.is_ready(leading) && other.consumed(leading) == 0,
        None => false,
    })
}

impl DataCache for MergeJoinCache {
    fn keys(&self) -> Vec<GroupKey> {
        self.registry.keys()
    }

    fn deliver(&mut self, key: &GroupKey) -> JoinResult<Option<&ColListTable>> {
        if !self.registry.contains(key) {
            return Err(JoinError::TableNotFound { key: key.clone() });
        }
        if self.tables.contains_key(key) {
            return Ok(self.tables.get(key));
        }

        let pair = match self.registry.lookup(key) {
            Some(pair) => pair.clone(),
            None => return Err(JoinError::TableNotFound { key: key.clone() }),
        };

        let joined = match (
            self.left.buffer.table_mut(&pair.left),
            self.right.buffer.table_mut(&pair.right),
        ) {
            (Some(left), Some(right)) => SortMergeJoiner::join(
                left,
                right,
                &self.schema,
                &self.left.name,
                &self.right.name,
                key.clone(),
            ),
            _ => Err(JoinError::execution(format!(
                "buffered partition missing for {} x {}",
                pair.left, pair.right
            ))),
        };

        match joined {
            Ok(table) if !table.is_empty() => {
                self.stats.tables_joined += 1;
                self.stats.rows_emitted += table.nrows() as u64;
                self.tables.insert(key.clone(), table);
                Ok(self.tables.get(key))
            }
            Ok(_) => {
                debug!("Join for {} produced no rows, discarding key", key);
                self.stats.empty_joins_discarded += 1;
                self.release(key);
                Ok(None)
            }
            Err(e) => {
                warn!("Join for {} failed, discarding key: {}", key, e);
                self.stats.failed_joins += 1;
                self.release(key);
                Ok(None)
            }
        }
    }

    fn table_context(&self, key: &GroupKey) -> Option<TableContext> {
        let pair = self.registry.lookup(key)?;
        let rows = |buffer: &StreamBuffer, k: &GroupKey| buffer.table(k).map_or(0, |t| t.nrows());
        Some(TableContext {
            key: key.clone(),
            count: rows(&self.left.buffer, &pair.left) + rows(&self.right.buffer, &pair.right),
        })
    }

    fn discard_table(&mut self, key: &GroupKey) {
        self.tables.remove(key);
    }

    fn expire_table(&mut self, key: &GroupKey) {
        self.release(key);
    }
}
