//! Post-Join Key Registry
//!
//! Discovers output group keys incrementally. Each time a table arrives, its
//! pre-join key is probed against every key resident in the opposite stream's
//! buffer; every join-compatible pair yields an output key, remembered together
//! with the pre-join pair that produced it. Each pre-join key also carries a
//! count of the registered output keys still derived from it.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::velojoin::error::{JoinError, JoinResult};
use crate::velojoin::execution::group_key::GroupKey;
use crate::velojoin::execution::join::schema::JoinSchema;
use crate::velojoin::execution::join::stream_buffer::StreamBuffer;
use crate::velojoin::execution::join::JoinSide;
use crate::velojoin::execution::types::{ColMeta, FieldValue};

/// Pre-join keys an output key was derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub left: GroupKey,
    pub right: GroupKey,
}

/// Ordered set of output keys plus the reverse mapping to their pre-join pair
#[derive(Debug, Default)]
pub struct KeyRegistry {
    keys: BTreeSet<GroupKey>,
    reverse: BTreeMap<GroupKey, KeyPair>,
    /// Registered output keys per pre-join key; absent means zero
    left_refs: BTreeMap<GroupKey, usize>,
    right_refs: BTreeMap<GroupKey, usize>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every output key formed by `key` (arriving on `side`) and the
    /// keys resident in `opposite`. Returns the output keys touched by this call.
    pub fn register_key(
        &mut self,
        side: JoinSide,
        key: &GroupKey,
        opposite: &StreamBuffer,
        schema: &JoinSchema,
        left_name: &str,
        right_name: &str,
    ) -> JoinResult<Vec<GroupKey>> {
        let on = schema.on();
        let mut registered = Vec::new();

        for candidate in opposite.keys() {
            if !key.join_compatible(candidate, on) {
                continue;
            }
            let (left, right) = match side {
                JoinSide::Left => (key, candidate),
                JoinSide::Right => (candidate, key),
            };
            let output = post_join_key(left, right, schema, left_name, right_name)?;

            if self.keys.insert(output.clone()) {
                *self.left_refs.entry(left.clone()).or_insert(0) += 1;
                *self.right_refs.entry(right.clone()).or_insert(0) += 1;
                debug!("Registered join key {} from {} x {}", output, left, right);
            }
            self.reverse.insert(
                output.clone(),
                KeyPair {
                    left: left.clone(),
                    right: right.clone(),
                },
            );
            registered.push(output);
        }
        Ok(registered)
    }

    pub fn contains(&self, key: &GroupKey) -> bool {
        self.keys.contains(key)
    }

    pub fn lookup(&self, key: &GroupKey) -> Option<&KeyPair> {
        self.reverse.get(key)
    }

    /// Forget an output key, returning its pre-join pair
    pub fn remove(&mut self, key: &GroupKey) -> Option<KeyPair> {
        self.keys.remove(key);
        let pair = self.reverse.remove(key)?;
        release_ref(&mut self.left_refs, &pair.left);
        release_ref(&mut self.right_refs, &pair.right);
        Some(pair)
    }

    /// Registered output keys still derived from the pre-join `key` of `side`
    pub fn pending(&self, side: JoinSide, key: &GroupKey) -> usize {
        let refs = match side {
            JoinSide::Left => &self.left_refs,
            JoinSide::Right => &self.right_refs,
        };
        refs.get(key).copied().unwrap_or(0)
    }

    /// Snapshot of the registered output keys in key order
    pub fn keys(&self) -> Vec<GroupKey> {
        self.keys.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn release_ref(refs: &mut BTreeMap<GroupKey, usize>, key: &GroupKey) {
    if let Some(count) = refs.get_mut(key) {
        *count -= 1;
        if *count == 0 {
            refs.remove(key);
        }
    }
}

/// Output key for a pre-join pair: both keys' columns remapped through the
/// schema, left first, each output label taken once, sorted by label.
pub fn post_join_key(
    left: &GroupKey,
    right: &GroupKey,
    schema: &JoinSchema,
    left_name: &str,
    right_name: &str,
) -> JoinResult<GroupKey> {
    let mut cols: Vec<ColMeta> = Vec::with_capacity(left.len() + right.len());
    let mut values: Vec<FieldValue> = Vec::with_capacity(left.len() + right.len());

    for (stream, key) in [(left_name, left), (right_name, right)] {
        for (col, value) in key.iter() {
            let out = schema.output_col(stream, &col.label).ok_or_else(|| {
                JoinError::schema(
                    format!("group key column is not a column of stream '{}'", stream),
                    Some(&col.label),
                )
            })?;
            if cols.iter().any(|c| c.label == out.label) {
                continue;
            }
            cols.push(out.clone());
            values.push(value.clone());
        }
    }
    GroupKey::new(cols, values)
}
