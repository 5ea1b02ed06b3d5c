/*!
# Tests for SortMergeJoiner

Run detection, cross products within matching runs and output layout.
*/

use velojoin::velojoin::execution::join::{JoinSchema, SortMergeJoiner};
use velojoin::velojoin::execution::{ColListTable, ColMeta, ColumnType, FieldValue, GroupKey, Table};

use super::test_helpers::{builder, cols, f, i, labels, s, t, table};

fn built_schema(left: &ColListTable, right: &ColListTable, on: &[&str]) -> JoinSchema {
    let on: Vec<String> = on.iter().map(|l| l.to_string()).collect();
    let mut schema = JoinSchema::new();
    schema
        .build("a", left.cols(), "b", right.cols(), &on, true)
        .unwrap();
    schema
}

fn join(left: &ColListTable, right: &ColListTable, on: &[&str]) -> ColListTable {
    let schema = built_schema(left, right, on);
    SortMergeJoiner::join(
        &mut builder(left),
        &mut builder(right),
        &schema,
        "a",
        "b",
        GroupKey::empty(),
    )
    .unwrap()
}

fn x_cols() -> Vec<ColMeta> {
    vec![
        ColMeta::new("_time", ColumnType::Time),
        ColMeta::new("x", ColumnType::String),
        ColMeta::new("_value", ColumnType::Float),
    ]
}

#[test]
fn test_single_row_match_combines_both_sides() {
    let left = table(&[], x_cols(), vec![vec![t(1), s("x"), f(1.0)]]);
    let right = table(&[], x_cols(), vec![vec![t(1), s("x"), f(2.0)]]);

    let out = join(&left, &right, &["x"]);
    assert_eq!(labels(&out), vec!["_time_a", "_time_b", "_value_a", "_value_b", "x"]);
    assert_eq!(out.rows(), vec![vec![t(1), t(1), f(1.0), f(2.0), s("x")]]);
}

#[test]
fn test_duplicate_join_values_yield_cross_product() {
    let left = table(
        &[],
        x_cols(),
        vec![vec![t(1), s("k"), f(1.0)], vec![t(2), s("k"), f(2.0)]],
    );
    let right = table(
        &[],
        x_cols(),
        vec![
            vec![t(1), s("k"), f(10.0)],
            vec![t(2), s("k"), f(20.0)],
            vec![t(3), s("k"), f(30.0)],
        ],
    );

    let out = join(&left, &right, &["x"]);
    assert_eq!(out.nrows(), 6);

    let pairs: Vec<(FieldValue, FieldValue)> = out
        .rows()
        .into_iter()
        .map(|row| (row[2].clone(), row[3].clone()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            (f(1.0), f(10.0)),
            (f(1.0), f(20.0)),
            (f(1.0), f(30.0)),
            (f(2.0), f(10.0)),
            (f(2.0), f(20.0)),
            (f(2.0), f(30.0)),
        ]
    );
}

#[test]
fn test_one_to_many_and_many_to_many_per_run() {
    let left = table(
        &[],
        cols(&["tag"]),
        vec![
            vec![t(1), f(1.0), s("a")],
            vec![t(2), f(2.0), s("a")],
            vec![t(2), f(2.5), s("a")],
        ],
    );
    let right = table(
        &[],
        cols(&["tag"]),
        vec![
            vec![t(1), f(10.0), s("a")],
            vec![t(1), f(11.0), s("a")],
            vec![t(1), f(12.0), s("a")],
            vec![t(2), f(20.0), s("a")],
            vec![t(2), f(21.0), s("a")],
        ],
    );

    // run t=1: 1 x 3, run t=2: 2 x 2
    let out = join(&left, &right, &["_time", "tag"]);
    assert_eq!(out.nrows(), 3 + 4);
}

#[test]
fn test_no_equal_join_values_yields_empty_table() {
    let left = table(&[], x_cols(), vec![vec![t(1), s("p"), f(1.0)]]);
    let right = table(&[], x_cols(), vec![vec![t(1), s("q"), f(1.0)]]);

    let out = join(&left, &right, &["x"]);
    assert!(out.is_empty());
    assert_eq!(out.cols().len(), 5);
}

#[test]
fn test_unsorted_inputs_are_sorted_before_merging() {
    let left = table(
        &[],
        cols(&[]),
        vec![vec![t(3), f(3.0)], vec![t(1), f(1.0)], vec![t(2), f(2.0)]],
    );
    let right = table(
        &[],
        cols(&[]),
        vec![vec![t(2), f(20.0)], vec![t(3), f(30.0)], vec![t(1), f(10.0)]],
    );

    let out = join(&left, &right, &["_time"]);
    assert_eq!(
        out.rows(),
        vec![
            vec![t(1), f(1.0), f(10.0)],
            vec![t(2), f(2.0), f(20.0)],
            vec![t(3), f(3.0), f(30.0)],
        ]
    );
}

#[test]
fn test_float_join_values_match_exactly() {
    let cols = vec![ColMeta::new("v", ColumnType::Float)];
    let left = table(&[], cols.clone(), vec![vec![f(0.1 + 0.2)]]);
    let right = table(&[], cols, vec![vec![f(0.3)]]);

    assert!(join(&left, &right, &["v"]).is_empty());
}

#[test]
fn test_signed_zeros_join_as_one_value() {
    let cols = vec![
        ColMeta::new("v", ColumnType::Float),
        ColMeta::new("_value", ColumnType::Int),
    ];
    let left = table(
        &[],
        cols.clone(),
        vec![vec![f(0.0), i(1)], vec![f(-0.0), i(2)]],
    );
    let right = table(&[], cols, vec![vec![f(-0.0), i(10)]]);

    // both left rows form one run
    let out = join(&left, &right, &["v"]);
    assert_eq!(out.nrows(), 2);
}

#[test]
fn test_nan_join_values_never_match() {
    let cols = vec![
        ColMeta::new("v", ColumnType::Float),
        ColMeta::new("_value", ColumnType::Int),
    ];
    let left = table(
        &[],
        cols.clone(),
        vec![vec![f(f64::NAN), i(1)], vec![f(1.0), i(2)]],
    );
    let right = table(
        &[],
        cols,
        vec![vec![f(f64::NAN), i(10)], vec![f(1.0), i(20)]],
    );

    let out = join(&left, &right, &["v"]);
    assert_eq!(out.nrows(), 1);
    assert_eq!(out.rows()[0][0], i(2));
}

#[test]
fn test_every_column_type_can_be_joined_on() {
    let cols = vec![
        ColMeta::new("b", ColumnType::Bool),
        ColMeta::new("n", ColumnType::Int),
        ColMeta::new("u", ColumnType::UInt),
        ColMeta::new("_time", ColumnType::Time),
        ColMeta::new("l", ColumnType::Int),
    ];
    let row = |l: i64| vec![true.into(), i(-4), 7u64.into(), t(9), i(l)];
    let left = table(&[], cols.clone(), vec![row(1)]);
    let right = table(&[], cols, vec![row(2)]);

    let out = join(&left, &right, &["b", "n", "u", "_time"]);
    assert_eq!(labels(&out), vec!["_time", "b", "l_a", "l_b", "n", "u"]);
    assert_eq!(out.rows(), vec![vec![t(9), true.into(), i(1), i(2), i(-4), 7u64.into()]]);
}

#[test]
fn test_empty_on_joins_every_row_with_every_row() {
    let left = table(&[], cols(&[]), vec![vec![t(1), f(1.0)], vec![t(2), f(2.0)]]);
    let right = table(&[], cols(&[]), vec![vec![t(5), f(5.0)], vec![t(6), f(6.0)]]);

    let out = join(&left, &right, &[]);
    assert_eq!(out.nrows(), 4);
    assert_eq!(labels(&out), vec!["_time_a", "_time_b", "_value_a", "_value_b"]);
}

#[test]
fn test_advance_returns_maximal_runs() {
    let source = table(
        &[],
        cols(&["tag"]),
        vec![
            vec![t(1), f(1.0), s("a")],
            vec![t(1), f(2.0), s("a")],
            vec![t(1), f(3.0), s("b")],
        ],
    );
    let b = builder(&source);
    let on = vec!["_time".to_string(), "tag".to_string()];

    let first = SortMergeJoiner::advance(0, &b, &on);
    assert_eq!((first.start, first.end), (0, 2));
    assert_eq!(first.len(), 2);
    assert_eq!(first.key.value_at("tag"), Some(&s("a")));

    let second = SortMergeJoiner::advance(first.end, &b, &on);
    assert_eq!((second.start, second.end), (2, 3));

    assert!(SortMergeJoiner::advance(second.end, &b, &on).is_empty());
}

#[test]
fn test_output_uses_supplied_key() {
    let left = table(&["tag"], cols(&["tag"]), vec![vec![t(1), f(1.0), s("a")]]);
    let right = table(&["tag"], cols(&["tag"]), vec![vec![t(1), f(2.0), s("a")]]);
    let schema = built_schema(&left, &right, &["_time", "tag"]);
    let output_key = left.key().clone();

    let out = SortMergeJoiner::join(
        &mut builder(&left),
        &mut builder(&right),
        &schema,
        "a",
        "b",
        output_key.clone(),
    )
    .unwrap();
    assert_eq!(out.key(), &output_key);
    assert_eq!(out.rows(), vec![vec![t(1), f(1.0), f(2.0), s("a")]]);
}
