//! Aggregate (GROUP BY) Operator Tests

use crate::common::{init_logging, make_record, string};
use edgerule::edgerule::sql::ast::{BinaryOperator, Expr, JoinClause, JoinType};
use edgerule::edgerule::sql::execution::collection::{WindowBatch, WindowRange};
use edgerule::edgerule::sql::execution::processors::{
    AggregateOperator, JoinOperator, Operator, ProcessorContext,
};
use edgerule::edgerule::sql::execution::{FieldValue, Row, StreamData};

#[test]
fn test_group_by_join_result() {
    init_logging();
    let batch = WindowBatch::new(
        vec![
            make_record("orders", vec![("id", FieldValue::Integer(1)), ("region", string("eu"))]),
            make_record("orders", vec![("id", FieldValue::Integer(2)), ("region", string("us"))]),
            make_record("orders", vec![("id", FieldValue::Integer(3)), ("region", string("eu"))]),
            make_record("payments", vec![("order_id", FieldValue::Integer(1))]),
            make_record("payments", vec![("order_id", FieldValue::Integer(3))]),
        ],
        Some(WindowRange::new(0, 60_000)),
    );
    let mut context = ProcessorContext::new("agg_rule");

    let join = JoinOperator::new(
        "orders",
        vec![JoinClause::new(
            JoinType::Left,
            "payments",
            Some(Expr::binary(
                Expr::column("orders.id"),
                BinaryOperator::Equal,
                Expr::column("payments.order_id"),
            )),
        )],
    );
    let joined = join.apply(&mut context, StreamData::Window(batch)).expect("join output");

    let aggregate = AggregateOperator::new(vec![Expr::column("orders.region")]);
    let Some(StreamData::Grouped(set)) = aggregate.apply(&mut context, joined) else {
        panic!("expected grouped output");
    };
    assert_eq!(set.groups.len(), 2);
    assert_eq!(set.groups[0].rows.len(), 2);
    assert!(set.groups[0].rows.iter().all(|r| matches!(r, Row::Join(_))));
    assert_eq!(set.groups[1].rows.len(), 1);
    assert_eq!(set.window_range, Some(WindowRange::new(0, 60_000)));
}

#[test]
fn test_window_bounds_as_dimension() {
    let rows = (0..4)
        .map(|i| make_record("demo", vec![("v", FieldValue::Integer(i))]))
        .collect();
    let mut context = ProcessorContext::new("agg_rule");
    let aggregate = AggregateOperator::new(vec![Expr::function("window_start", vec![])]);
    let Some(StreamData::Grouped(set)) = aggregate.apply(
        &mut context,
        StreamData::Window(WindowBatch::new(rows, Some(WindowRange::new(10, 20)))),
    ) else {
        panic!("expected grouped output");
    };
    assert_eq!(set.groups.len(), 1);
    assert_eq!(set.groups[0].rows.len(), 4);
}

#[test]
fn test_empty_window_emits_nothing() {
    let mut context = ProcessorContext::new("agg_rule");
    let aggregate = AggregateOperator::new(vec![Expr::column("v")]);
    let output = aggregate.apply(&mut context, StreamData::Window(WindowBatch::new(vec![], None)));
    assert!(output.is_none());
}

#[test]
fn test_record_input_is_an_error() {
    let mut context = ProcessorContext::new("agg_rule");
    let aggregate = AggregateOperator::new(vec![Expr::column("v")]);
    let output = aggregate.apply(
        &mut context,
        StreamData::Record(make_record("demo", vec![("v", FieldValue::Integer(1))])),
    );
    assert!(matches!(output, Some(StreamData::Error(_))));
}
