//! Join Stream Buffer
//!
//! Buffers every table one side of a join has delivered, indexed by its
//! pre-join group key. Tables for the same key accumulate into one
//! [`ColListTableBuilder`].
//!
//! ## Consumption Tracking
//!
//! Upstream delivery is time-ordered on the leading key column (the first
//! column of the group key in label order). The buffer counts, per leading
//! value, how many resident keys still await delivery (`consumed`), and marks a
//! leading value `ready` once a different leading value has been observed after
//! it. Delivered keys are only marked stale by [`StreamBuffer::expire`]; the
//! owning cache decides when stale keys are physically removed via
//! [`StreamBuffer::clear`].

use std::collections::{HashMap, HashSet};

use crate::velojoin::error::JoinResult;
use crate::velojoin::execution::group_key::GroupKey;
use crate::velojoin::execution::table::{ColListTableBuilder, Table};
use crate::velojoin::execution::types::FieldValue;

/// Statistics for monitoring buffer growth and eviction
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamBufferStats {
    /// Tables inserted (lifetime)
    pub tables_inserted: u64,
    /// Rows copied into the buffer (lifetime)
    pub rows_buffered: u64,
    /// Keys physically evicted (lifetime)
    pub keys_evicted: u64,
    /// Rows released by eviction (lifetime)
    pub rows_evicted: u64,
    /// Peak number of resident keys
    pub peak_keys: usize,
}

/// Per-stream table buffer
#[derive(Debug, Default)]
pub struct StreamBuffer {
    /// Accumulated rows per pre-join key
    data: HashMap<GroupKey, ColListTableBuilder>,

    /// Resident keys per leading value that have not been expired yet
    consumed: HashMap<FieldValue, i64>,

    /// Leading values the stream has moved past
    ready: HashSet<FieldValue>,

    /// Keys delivered downstream and waiting for physical removal
    stale: HashSet<GroupKey>,

    /// Leading value of the most recently inserted key
    last: Option<FieldValue>,

    stats: StreamBufferStats,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the rows of `table` into the accumulator for its key
    pub fn insert(&mut self, table: &dyn Table) -> JoinResult<()> {
        let key = table.key();
        let mut newly_resident = false;

        if let Some(builder) = self.data.get_mut(key) {
            builder.append_table(table)?;
            // A delivered key that receives more rows is live again
            if self.stale.remove(key) {
                newly_resident = true;
            }
        } else {
            let mut builder = ColListTableBuilder::with_table_cols(table)?;
            builder.append_table(table)?;
            self.data.insert(key.clone(), builder);
            newly_resident = true;
        }

        if newly_resident {
            if let Some(leading) = key.value(0) {
                *self.consumed.entry(leading.clone()).or_insert(0) += 1;

                match &self.last {
                    Some(last) if last != leading => {
                        self.ready.insert(last.clone());
                        self.last = Some(leading.clone());
                    }
                    Some(_) => {}
                    None => self.last = Some(leading.clone()),
                }
            }
        }

        self.stats.tables_inserted += 1;
        self.stats.rows_buffered += table.nrows() as u64;
        self.stats.peak_keys = self.stats.peak_keys.max(self.data.len());
        Ok(())
    }

    /// Mark a key as delivered. Its data stays resident until [`clear`](Self::clear).
    pub fn expire(&mut self, key: &GroupKey) {
        if self.stale.contains(key) || !self.data.contains_key(key) {
            return;
        }
        if let Some(leading) = key.value(0) {
            if let Some(count) = self.consumed.get_mut(leading) {
                *count -= 1;
            }
            self.stale.insert(key.clone());
        }
    }

    /// Physically remove every stale key accepted by `predicate`, returning how many were removed
    pub fn clear<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&GroupKey) -> bool,
    {
        let evictable: Vec<GroupKey> = self
            .stale
            .iter()
            .filter(|key| predicate(key))
            .cloned()
            .collect();

        for key in &evictable {
            self.evict(key);
            self.stale.remove(key);
        }
        evictable.len()
    }

    fn evict(&mut self, key: &GroupKey) {
        if let Some(mut builder) = self.data.remove(key) {
            self.stats.keys_evicted += 1;
            self.stats.rows_evicted += builder.nrows() as u64;
            builder.clear_data();
        }
    }

    /// Visit every resident key
    pub fn iterate<F>(&self, mut f: F)
    where
        F: FnMut(&GroupKey),
    {
        for key in self.data.keys() {
            f(key);
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &GroupKey> {
        self.data.keys()
    }

    pub fn table(&self, key: &GroupKey) -> Option<&ColListTableBuilder> {
        self.data.get(key)
    }

    pub fn table_mut(&mut self, key: &GroupKey) -> Option<&mut ColListTableBuilder> {
        self.data.get_mut(key)
    }

    pub fn contains(&self, key: &GroupKey) -> bool {
        self.data.contains_key(key)
    }

    /// Whether the stream has moved past this leading value
    pub fn is_ready(&self, leading: &FieldValue) -> bool {
        self.ready.contains(leading)
    }

    /// Resident, not yet delivered keys sharing this leading value
    pub fn consumed(&self, leading: &FieldValue) -> i64 {
        self.consumed.get(leading).copied().unwrap_or(0)
    }

    pub fn is_stale(&self, key: &GroupKey) -> bool {
        self.stale.contains(key)
    }

    /// Number of resident keys
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Total buffered rows across all keys
    pub fn row_count(&self) -> usize {
        self.data.values().map(ColListTableBuilder::nrows).sum()
    }

    pub fn stats(&self) -> &StreamBufferStats {
        &self.stats
    }
}
