/*!
# Tests for TriggeredDataset

Trigger-driven delivery from a scripted cache: firing, duplicate detection,
discarded keys, retraction and completion.
*/

use std::collections::BTreeMap;
use std::sync::Arc;

use velojoin::velojoin::error::{JoinError, JoinResult};
use velojoin::velojoin::execution::{
    ColListTable, ColMeta, ColumnType, DataCache, Dataset, DatasetId, GroupKey, Table,
    TableCollector, TableContext, Time, Trigger, TriggerSpec, TriggeredDataset,
};

use super::join::test_helpers::{f, key, t, table};

const OUTPUT: DatasetId = DatasetId(5);

/// Cache whose key list is fixed up front; expiring a key removes it
#[derive(Default)]
struct ScriptedCache {
    keys: Vec<GroupKey>,
    tables: BTreeMap<GroupKey, ColListTable>,
    expired: Vec<GroupKey>,
    discarded: Vec<GroupKey>,
}

impl ScriptedCache {
    fn with_table(mut self, table: ColListTable) -> Self {
        self.keys.push(table.key().clone());
        self.tables.insert(table.key().clone(), table);
        self
    }

    /// List a key without adding a table for it
    fn with_key(mut self, key: GroupKey) -> Self {
        self.keys.push(key);
        self
    }
}

impl DataCache for ScriptedCache {
    fn keys(&self) -> Vec<GroupKey> {
        self.keys.clone()
    }

    fn deliver(&mut self, key: &GroupKey) -> JoinResult<Option<&ColListTable>> {
        Ok(self.tables.get(key))
    }

    fn table_context(&self, key: &GroupKey) -> Option<TableContext> {
        Some(TableContext {
            key: key.clone(),
            count: self.tables.get(key).map_or(0, |t| t.nrows()),
        })
    }

    fn discard_table(&mut self, key: &GroupKey) {
        self.discarded.push(key.clone());
    }

    fn expire_table(&mut self, key: &GroupKey) {
        self.keys.retain(|k| k != key);
        self.expired.push(key.clone());
    }
}

fn window(stop: i64) -> ColListTable {
    table(
        &["_stop"],
        vec![
            ColMeta::new("_stop", ColumnType::Time),
            ColMeta::new("_value", ColumnType::Float),
        ],
        vec![vec![t(stop), f(stop as f64)]],
    )
}

fn wire(
    cache: ScriptedCache,
    trigger: Trigger,
) -> (TriggeredDataset<ScriptedCache>, Arc<TableCollector>) {
    let mut dataset = TriggeredDataset::new(OUTPUT, cache, trigger);
    let collector = Arc::new(TableCollector::new());
    dataset.add_child(collector.clone());
    (dataset, collector)
}

#[test]
fn test_watermark_fires_windows_that_have_closed() {
    let cache = ScriptedCache::default()
        .with_table(window(10))
        .with_table(window(20));
    let (mut dataset, output) = wire(cache, Trigger::default());

    dataset.update_watermark(Time(9)).unwrap();
    assert!(output.output().tables.is_empty());

    dataset.update_watermark(Time(10)).unwrap();
    let out = output.output();
    assert_eq!(out.tables.len(), 1);
    assert_eq!(out.tables[0].key(), window(10).key());
    assert_eq!(out.watermarks, vec![Time(9), Time(10)]);
    assert_eq!(dataset.cache().expired, vec![window(10).key().clone()]);
    assert_eq!(dataset.watermark(), Time(10));
}

#[test]
fn test_count_trigger_fires_on_processing_time() {
    let cache = ScriptedCache::default().with_table(window(10));
    let trigger = Trigger::new(TriggerSpec::AfterAtLeastCount { count: 1 });
    let (mut dataset, output) = wire(cache, trigger);

    dataset.update_processing_time(Time(1)).unwrap();
    let out = output.output();
    assert_eq!(out.tables.len(), 1);
    assert_eq!(out.processing_times, vec![Time(1)]);
    assert_eq!(dataset.processing_time(), Time(1));
}

#[test]
fn test_duplicate_delivery_is_an_error() {
    let doubled = window(10);
    let cache = ScriptedCache::default()
        .with_table(doubled.clone())
        .with_key(doubled.key().clone());
    let (mut dataset, output) = wire(cache, Trigger::default());

    dataset.finish(None);

    let out = output.output();
    assert_eq!(out.tables.len(), 1);
    match out.finished {
        Some(Err(JoinError::DuplicateKey { key })) => assert_eq!(&key, doubled.key()),
        other => panic!("expected duplicate key error, got {:?}", other),
    }
}

#[test]
fn test_keys_without_a_table_are_skipped() {
    let missing = key(&[("_stop", t(1))]);
    let cache = ScriptedCache::default()
        .with_key(missing.clone())
        .with_table(window(2));
    let (mut dataset, output) = wire(cache, Trigger::default());

    dataset.update_watermark(Time(5)).unwrap();
    assert_eq!(output.output().tables.len(), 1);
    assert!(!dataset.cache().expired.contains(&missing));
}

#[test]
fn test_finish_delivers_everything_once() {
    let cache = ScriptedCache::default()
        .with_table(window(10))
        .with_table(window(20));
    let (mut dataset, output) = wire(cache, Trigger::default());

    dataset.finish(None);
    dataset.finish(None);

    let out = output.output();
    assert_eq!(out.tables.len(), 2);
    assert_eq!(out.finish_count, 1);
    assert_eq!(out.finished, Some(Ok(())));
    assert!(dataset.is_finished());
}

#[test]
fn test_error_finish_delivers_nothing() {
    let cache = ScriptedCache::default().with_table(window(10));
    let (mut dataset, output) = wire(cache, Trigger::default());

    let err = JoinError::execution("upstream failed");
    dataset.finish(Some(err.clone()));

    let out = output.output();
    assert!(out.tables.is_empty());
    assert_eq!(out.finished, Some(Err(err)));
}

#[test]
fn test_retract_discards_and_forwards() {
    let cache = ScriptedCache::default().with_table(window(10));
    let (mut dataset, output) = wire(cache, Trigger::default());
    let retracted = window(10).key().clone();

    dataset.retract_table(&retracted).unwrap();

    assert_eq!(dataset.cache().discarded, vec![retracted.clone()]);
    assert_eq!(output.output().retracted, vec![retracted]);
    assert_eq!(dataset.id(), OUTPUT);
}

#[test]
fn test_key_offered_again_later_is_a_duplicate() {
    let cache = ScriptedCache::default().with_table(window(10));
    let (mut dataset, output) = wire(cache, Trigger::default());
    let delivered = window(10).key().clone();

    dataset.update_watermark(Time(10)).unwrap();
    assert_eq!(output.output().tables.len(), 1);

    // the cache lists the delivered key again on a later evaluation
    dataset.cache_mut().keys.push(delivered.clone());
    match dataset.update_watermark(Time(11)) {
        Err(JoinError::DuplicateKey { key }) => assert_eq!(key, delivered),
        other => panic!("expected duplicate key error, got {:?}", other),
    }
    assert_eq!(output.output().total_rows(), 1);
}

#[test]
fn test_retracted_key_may_be_delivered_again() {
    let cache = ScriptedCache::default().with_table(window(10));
    let (mut dataset, output) = wire(cache, Trigger::default());
    let retracted = window(10).key().clone();

    dataset.update_watermark(Time(10)).unwrap();
    dataset.retract_table(&retracted).unwrap();

    dataset.cache_mut().keys.push(retracted.clone());
    dataset.update_watermark(Time(11)).unwrap();

    let out = output.output();
    assert_eq!(out.tables.len(), 2);
    assert_eq!(out.retracted, vec![retracted]);
}
