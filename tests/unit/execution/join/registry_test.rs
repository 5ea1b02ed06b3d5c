/*!
# Tests for KeyRegistry

Output key discovery against the opposite stream's resident keys.
*/

use velojoin::velojoin::execution::join::{JoinSchema, JoinSide, KeyRegistry, StreamBuffer};
use velojoin::velojoin::execution::Table;

use super::test_helpers::{cols, f, key, s, t, table};

fn schema(on: &[&str]) -> JoinSchema {
    let mut schema = JoinSchema::new();
    let on: Vec<String> = on.iter().map(|l| l.to_string()).collect();
    schema
        .build("a", &cols(&["t1", "t2"]), "b", &cols(&["t1", "t2"]), &on, true)
        .unwrap();
    schema
}

fn tagged(key_labels: &[&str], t1: &str, t2: &str) -> velojoin::ColListTable {
    table(key_labels, cols(&["t1", "t2"]), vec![vec![t(1), f(1.0), s(t1), s(t2)]])
}

#[test]
fn test_registers_only_join_compatible_pairs() {
    let schema = schema(&["_time", "t2"]);
    let mut right = StreamBuffer::new();
    right.insert(&tagged(&["t2"], "a", "x")).unwrap();
    right.insert(&tagged(&["t2"], "a", "y")).unwrap();

    let incoming = key(&[("t1", s("a")), ("t2", s("x"))]);
    let mut registry = KeyRegistry::new();
    let registered = registry
        .register_key(JoinSide::Left, &incoming, &right, &schema, "a", "b")
        .unwrap();

    let expected = key(&[("t1_a", s("a")), ("t2", s("x"))]);
    assert_eq!(registered, vec![expected.clone()]);
    assert_eq!(registry.len(), 1);

    let pair = registry.lookup(&expected).unwrap();
    assert_eq!(pair.left, incoming);
    assert_eq!(pair.right, key(&[("t2", s("x"))]));
}

#[test]
fn test_output_key_takes_each_label_once() {
    let schema = schema(&["_time", "t2"]);
    let mut left = StreamBuffer::new();
    let left_table = tagged(&["t1", "t2"], "a", "x");
    left.insert(&left_table).unwrap();

    let incoming = key(&[("t1", s("a"))]);
    let mut registry = KeyRegistry::new();
    let registered = registry
        .register_key(JoinSide::Right, &incoming, &left, &schema, "a", "b")
        .unwrap();

    // the right key arrived but the pair is still recorded left-first
    let output = key(&[("t1_a", s("a")), ("t1_b", s("a")), ("t2", s("x"))]);
    assert_eq!(registered, vec![output.clone()]);
    let pair = registry.lookup(&output).unwrap();
    assert_eq!(&pair.left, left_table.key());
    assert_eq!(pair.right, incoming);
}

#[test]
fn test_registering_twice_is_idempotent() {
    let schema = schema(&["_time", "t2"]);
    let mut right = StreamBuffer::new();
    right.insert(&tagged(&["t2"], "a", "x")).unwrap();
    let incoming = key(&[("t2", s("x"))]);

    let mut registry = KeyRegistry::new();
    for _ in 0..2 {
        registry
            .register_key(JoinSide::Left, &incoming, &right, &schema, "a", "b")
            .unwrap();
    }
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.keys(), vec![key(&[("t2", s("x"))])]);
}

#[test]
fn test_no_compatible_keys_registers_nothing() {
    let schema = schema(&["_time", "t2"]);
    let mut right = StreamBuffer::new();
    right.insert(&tagged(&["t2"], "a", "y")).unwrap();

    let mut registry = KeyRegistry::new();
    let registered = registry
        .register_key(JoinSide::Left, &key(&[("t2", s("x"))]), &right, &schema, "a", "b")
        .unwrap();
    assert!(registered.is_empty());
    assert!(registry.is_empty());
}

#[test]
fn test_remove_forgets_key_and_pair() {
    let schema = schema(&["_time"]);
    let mut right = StreamBuffer::new();
    right.insert(&tagged(&["t1"], "a", "x")).unwrap();

    let mut registry = KeyRegistry::new();
    let registered = registry
        .register_key(JoinSide::Left, &key(&[("t1", s("a"))]), &right, &schema, "a", "b")
        .unwrap();
    let output = &registered[0];
    assert_eq!(output, &key(&[("t1_a", s("a")), ("t1_b", s("a"))]));

    assert!(registry.remove(output).is_some());
    assert!(!registry.contains(output));
    assert!(registry.lookup(output).is_none());
    assert!(registry.remove(output).is_none());
}

#[test]
fn test_pending_counts_follow_registered_keys() {
    let schema = schema(&["_time"]);
    let mut right = StreamBuffer::new();
    right.insert(&tagged(&["t2"], "a", "x")).unwrap();
    right.insert(&tagged(&["t2"], "a", "y")).unwrap();

    let incoming = key(&[("t1", s("a"))]);
    let right_x = key(&[("t2", s("x"))]);
    let mut registry = KeyRegistry::new();
    for _ in 0..2 {
        registry
            .register_key(JoinSide::Left, &incoming, &right, &schema, "a", "b")
            .unwrap();
    }
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.pending(JoinSide::Left, &incoming), 2);
    assert_eq!(registry.pending(JoinSide::Right, &right_x), 1);
    // counts are per side
    assert_eq!(registry.pending(JoinSide::Right, &incoming), 0);

    let output = key(&[("t1_a", s("a")), ("t2_b", s("x"))]);
    assert!(registry.remove(&output).is_some());
    assert_eq!(registry.pending(JoinSide::Left, &incoming), 1);
    assert_eq!(registry.pending(JoinSide::Right, &right_x), 0);

    registry.remove(&output);
    assert_eq!(registry.pending(JoinSide::Left, &incoming), 1);
}
