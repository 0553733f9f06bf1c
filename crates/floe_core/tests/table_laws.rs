//! End to end behavior of the eager table api.

use std::collections::BTreeSet;

use floe_core::prelude::*;
use floe_core::testutil::{assert_columns_eq, assert_tables_eq};
use floe_error::ErrorKind;

fn ints(table: &Table, name: &str) -> Vec<Option<i64>> {
    table.column(name).unwrap().native_values::<i64>().unwrap()
}

#[test]
fn construction_checks_lengths() {
    logutil::init_test();

    let err = Table::try_new(vec![
        Column::from_slice("a", &[1i64, 2, 3]),
        Column::from_slice("b", &[1i64, 2]),
    ])
    .unwrap_err();
    assert_eq!(ErrorKind::Shape, err.kind());

    let err = Table::from_mapping([
        ("a", vec![ScalarValue::Int64(1)]),
        ("b", vec![ScalarValue::Int64(1), ScalarValue::Int64(2)]),
    ])
    .unwrap_err();
    assert_eq!(ErrorKind::Shape, err.kind());

    let err = Table::try_new(vec![Column::from_slice("a", &[1i64]), Column::from_slice("a", &[2i64])]).unwrap_err();
    assert_eq!(ErrorKind::Duplicate, err.kind());
}

#[test]
fn groupby_head_then_sum() {
    logutil::init_test();

    let table = Table::try_new(vec![
        Column::from_slice("a", &[1i64, 1, 1, 2, 2, 3, 3, 3, 3]),
        Column::from_slice("b", &[1i64, 2, 3, 4, 5, 6, 7, 8, 9]),
    ])
    .unwrap();

    let out = table
        .groupby(&["a"])
        .unwrap()
        .agg(&[col("b").head(3).sum()])
        .unwrap()
        .sort(&["a"], &[false], false)
        .unwrap();

    assert_eq!(vec![Some(1), Some(2), Some(3)], ints(&out, "a"));
    assert_eq!(vec![Some(6), Some(9), Some(21)], ints(&out, "b"));
}

#[test]
fn groupby_stable_keeps_first_seen_order() {
    logutil::init_test();

    let table = Table::try_new(vec![
        Column::from_strs("k", &["c", "a", "c", "b", "a"]),
        Column::from_slice("v", &[1i64, 2, 3, 4, 5]),
    ])
    .unwrap();

    let out = table
        .clone()
        .lazy()
        .groupby_stable([col("k")])
        .agg([col("v").sum()])
        .collect()
        .unwrap();

    assert_columns_eq(&Column::from_strs("k", &["c", "a", "b"]), out.column("k").unwrap());
    assert_eq!(vec![Some(4), Some(7), Some(4)], ints(&out, "v"));

    // Listed values keep their order within each group.
    let out = table
        .groupby(&["k"])
        .unwrap()
        .agg_list()
        .unwrap()
        .sort(&["k"], &[false], false)
        .unwrap();
    assert_eq!(
        vec![
            ScalarValue::List(vec![ScalarValue::Int64(2), ScalarValue::Int64(5)]),
            ScalarValue::List(vec![ScalarValue::Int64(4)]),
            ScalarValue::List(vec![ScalarValue::Int64(1), ScalarValue::Int64(3)]),
        ],
        out.column("v").unwrap().to_scalars()
    );
}

#[test]
fn asof_backward_by_group() {
    logutil::init_test();

    let left = Table::try_new(vec![
        Column::from_slice("a", &[-20i64, -19, 8, 12, 14]),
        Column::from_slice("by", &[1i64, 1, 2, 2, 2]),
    ])
    .unwrap();
    let right = Table::try_new(vec![
        Column::from_slice("a", &[-19i64, -15, 3, 5, 13]),
        Column::from_slice("by", &[1i64, 1, 2, 2, 2]),
        Column::from_slice("v", &[10i64, 20, 30, 40, 50]),
    ])
    .unwrap();

    let out = left
        .join_asof(&right, "a", "a", AsofOptions::new(AsofStrategy::Backward).by(&["by"]))
        .unwrap();

    assert_columns_eq(left.column("a").unwrap(), out.column("a").unwrap());
    assert_columns_eq(left.column("by").unwrap(), out.column("by").unwrap());
    assert_eq!(vec![None, Some(10), Some(40), Some(40), Some(50)], ints(&out, "v"));
}

#[test]
fn join_membership() {
    logutil::init_test();

    let left = Table::try_new(vec![
        Column::from_slice("k", &[1i64, 2, 2, 3]),
        Column::from_slice("l", &[10i64, 20, 21, 30]),
    ])
    .unwrap();
    let right = Table::try_new(vec![
        Column::from_slice("k", &[2i64, 3, 3, 4]),
        Column::from_slice("r", &[200i64, 300, 301, 400]),
    ])
    .unwrap();

    let key_set = |t: &Table| -> BTreeSet<i64> { ints(t, "k").into_iter().flatten().collect() };

    // Inner joins only produce keys found on both sides, once per matching pair.
    let inner = left.join(&right, &["k"], &["k"], JoinType::Inner).unwrap();
    assert_eq!(BTreeSet::from([2, 3]), key_set(&inner));
    assert_eq!(4, inner.height());

    // Left joins keep every left row, padding with nulls.
    let left_out = left.join(&right, &["k"], &["k"], JoinType::Left).unwrap();
    assert_eq!(5, left_out.height());
    assert_eq!(key_set(&left), key_set(&left_out));
    assert_eq!(1, left_out.column("r").unwrap().null_count());

    // Outer joins cover the union of keys.
    let outer = left.join(&right, &["k"], &["k"], JoinType::Outer).unwrap();
    assert_eq!(6, outer.height());
    assert_eq!(BTreeSet::from([1, 2, 3, 4]), key_set(&outer));

    // Unique right keys leave the left height unchanged.
    let unique_right = right.distinct(Some(&["k"][..]), UniqueKeep::First, true).unwrap();
    let out = left.join(&unique_right, &["k"], &["k"], JoinType::Left).unwrap();
    assert_eq!(left.height(), out.height());

    let cross = left.cross_join(&right).unwrap();
    assert_eq!(left.height() * right.height(), cross.height());
}

#[test]
fn concat_rechunk_and_sort() {
    logutil::init_test();

    let a = Table::try_new(vec![Column::from_slice("x", &[3i64, 1])]).unwrap();
    let b = Table::try_new(vec![Column::from_slice("x", &[2i64, 5])]).unwrap();

    let chunked = concat(&[a.clone(), b.clone()], ConcatMethod::Vertical, false).unwrap();
    assert_eq!(2, chunked.n_chunks());
    let rechunked = concat(&[a, b], ConcatMethod::Vertical, true).unwrap();
    assert_eq!(1, rechunked.n_chunks());
    assert_tables_eq(&chunked, &rechunked);

    let doubled = concat(&[rechunked.clone(), rechunked.clone()], ConcatMethod::Vertical, true).unwrap();
    assert_eq!(1, doubled.n_chunks());
    assert_eq!(2 * rechunked.height(), doubled.height());

    let sorted = chunked.sort(&["x"], &[false], false).unwrap();
    assert_eq!(vec![Some(1), Some(2), Some(3), Some(5)], ints(&sorted, "x"));
    let twice = sorted.sort(&["x"], &[false], false).unwrap();
    assert_tables_eq(&sorted, &twice);
}

#[test]
fn head_tail_bounds() {
    logutil::init_test();

    let table = Table::try_new(vec![Column::from_slice("x", &[1i64, 2, 3])]).unwrap();
    assert_eq!(3, table.head(10).height());
    assert_eq!(0, table.head(0).height());
    assert_eq!(vec![Some(2), Some(3)], ints(&table.tail(2), "x"));
    assert_eq!(0, table.tail(0).height());

    let empty = table.head(0);
    assert_eq!((0, 1), empty.head(5).shape());
    assert_eq!((0, 1), empty.tail(5).shape());

    for data in [TableData::Empty, TableData::Rows(Vec::new()), TableData::Mapping(Default::default())] {
        let table = Table::try_from_data(data, TableOptions::default()).unwrap();
        assert_eq!((0, 0), table.shape());
    }
}

#[test]
fn explode_and_melt() {
    logutil::init_test();

    let lists = Column::from_scalars(
        "l",
        &DataType::list(DataType::Int64),
        &[
            ScalarValue::List(vec![ScalarValue::Int64(1), ScalarValue::Int64(2)]),
            ScalarValue::List(Vec::new()),
            ScalarValue::Null,
        ],
    )
    .unwrap();
    let table = Table::try_new(vec![Column::from_strs("id", &["a", "b", "c"]), lists]).unwrap();

    let out = table.explode(&["l"]).unwrap();
    assert_eq!(vec![Some(1), Some(2), None, None], ints(&out, "l"));
    assert_columns_eq(&Column::from_strs("id", &["a", "a", "b", "c"]), out.column("id").unwrap());

    let wide = Table::try_new(vec![
        Column::from_strs("id", &["x", "y"]),
        Column::from_slice("p", &[1i64, 2]),
        Column::from_slice("q", &[3i64, 4]),
    ])
    .unwrap();
    let long = wide.melt(&["id"], &["p", "q"]).unwrap();
    assert_eq!(vec!["id", "variable", "value"], long.column_names());
    assert_columns_eq(
        &Column::from_strs("variable", &["p", "p", "q", "q"]),
        long.column("variable").unwrap(),
    );
    assert_eq!(vec![Some(1), Some(2), Some(3), Some(4)], ints(&long, "value"));
}
