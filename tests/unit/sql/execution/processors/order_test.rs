//! Order Operator Tests

use crate::common::{init_logging, make_record, string};
use edgerule::edgerule::sql::ast::{Expr, OrderByExpr};
use edgerule::edgerule::sql::execution::collection::WindowBatch;
use edgerule::edgerule::sql::execution::processors::{
    AggregateOperator, Operator, OrderOperator, ProcessorContext,
};
use edgerule::edgerule::sql::execution::{FieldValue, Row, StreamData, StreamRecord};
use edgerule::edgerule::sql::SqlError;
use proptest::prelude::*;

fn reading(device: &str, temp: FieldValue, seq: i64) -> StreamRecord {
    make_record(
        "sensors",
        vec![("device", string(device)), ("temp", temp), ("seq", FieldValue::Integer(seq))],
    )
}

fn sequence(data: Option<StreamData>) -> Vec<i64> {
    let Some(StreamData::Window(batch)) = data else {
        panic!("expected a window batch");
    };
    batch
        .rows
        .iter()
        .map(|r| match &r.fields["seq"] {
            FieldValue::Integer(i) => *i,
            other => panic!("unexpected seq {}", other),
        })
        .collect()
}

#[test]
fn test_multi_key_sort_is_stable() {
    init_logging();
    let rows = vec![
        reading("b", FieldValue::Integer(20), 0),
        reading("a", FieldValue::Integer(20), 1),
        reading("b", FieldValue::Integer(10), 2),
        reading("a", FieldValue::Integer(20), 3),
        reading("a", FieldValue::Float(15.5), 4),
    ];
    let order = OrderOperator::new(vec![
        OrderByExpr::asc(Expr::column("device")),
        OrderByExpr::desc(Expr::column("temp")),
    ]);
    let mut context = ProcessorContext::new("order_rule");
    let output = order.apply(&mut context, StreamData::Window(WindowBatch::new(rows, None)));
    assert_eq!(sequence(output), vec![1, 3, 4, 0, 2]);
}

#[test]
fn test_missing_keys_sort_last() {
    let rows = vec![
        reading("a", FieldValue::Null, 0),
        reading("a", FieldValue::Integer(3), 1),
        make_record("sensors", vec![("seq", FieldValue::Integer(2))]),
        reading("a", FieldValue::Integer(1), 3),
    ];
    let order = OrderOperator::new(vec![OrderByExpr::desc(Expr::column("temp"))]);
    let mut context = ProcessorContext::new("order_rule");
    let output = order.apply(&mut context, StreamData::Window(WindowBatch::new(rows, None)));
    assert_eq!(sequence(output), vec![1, 3, 0, 2]);
}

#[test]
fn test_incompatible_keys_fail_without_reordering() {
    let rows = vec![
        reading("a", FieldValue::Integer(3), 0),
        reading("a", string("warm"), 1),
    ];
    let order = OrderOperator::new(vec![OrderByExpr::asc(Expr::column("temp"))]);
    let mut context = ProcessorContext::new("order_rule");
    let output = order.apply(&mut context, StreamData::Window(WindowBatch::new(rows, None)));
    let Some(StreamData::Error(SqlError::TypeError { expected, actual, value })) = output else {
        panic!("expected a type error");
    };
    assert_eq!(expected, "BIGINT");
    assert_eq!(actual, "STRING");
    assert_eq!(value.as_deref(), Some("warm"));
}

#[test]
fn test_groups_sorted_by_aggregate() {
    let rows = vec![
        reading("a", FieldValue::Integer(1), 0),
        reading("b", FieldValue::Integer(1), 1),
        reading("b", FieldValue::Integer(1), 2),
        reading("c", FieldValue::Integer(1), 3),
        reading("c", FieldValue::Integer(1), 4),
        reading("c", FieldValue::Integer(1), 5),
    ];
    let mut context = ProcessorContext::new("order_rule");
    let grouped = AggregateOperator::new(vec![Expr::column("device")])
        .apply(&mut context, StreamData::Window(WindowBatch::new(rows, None)))
        .expect("grouped output");

    let order = OrderOperator::new(vec![OrderByExpr::desc(Expr::function(
        "count",
        vec![Expr::column("seq")],
    ))]);
    let Some(StreamData::Grouped(set)) = order.apply(&mut context, grouped) else {
        panic!("expected grouped output");
    };
    let devices: Vec<FieldValue> = set
        .groups
        .iter()
        .map(|g| match &g.rows[0] {
            Row::Record(r) => r.fields["device"].clone(),
            Row::Join(_) => panic!("unexpected join tuple"),
        })
        .collect();
    assert_eq!(devices, vec![string("c"), string("b"), string("a")]);
}

#[test]
fn test_single_record_passes_through() {
    let order = OrderOperator::new(vec![OrderByExpr::asc(Expr::column("temp"))]);
    let mut context = ProcessorContext::new("order_rule");
    let record = reading("a", FieldValue::Integer(1), 0);
    let output = order.apply(&mut context, StreamData::Record(record.clone()));
    assert_eq!(output, Some(StreamData::Record(record)));
}

fn keyed_batch(keys: &[i64]) -> WindowBatch {
    WindowBatch::new(
        keys.iter()
            .enumerate()
            .map(|(seq, k)| {
                make_record(
                    "sensors",
                    vec![("k", FieldValue::Integer(*k)), ("seq", FieldValue::Integer(seq as i64))],
                )
            })
            .collect(),
        None,
    )
}

proptest! {
    #[test]
    fn prop_order_is_stable_and_idempotent(keys in prop::collection::vec(0i64..4, 1..16)) {
        let op = OrderOperator::new(vec![OrderByExpr::asc(Expr::column("k"))]);
        let mut context = ProcessorContext::new("prop");

        let sorted = op
            .process(&mut context, StreamData::Window(keyed_batch(&keys)))
            .expect("sort succeeds");
        let once = sequence(sorted.clone());
        let again = sequence(op.process(&mut context, sorted.expect("sorted batch")).expect("sort succeeds"));
        prop_assert_eq!(&once, &again);

        for pair in once.windows(2) {
            let (a, b) = (keys[pair[0] as usize], keys[pair[1] as usize]);
            prop_assert!(a < b || (a == b && pair[0] < pair[1]));
        }
    }
}
