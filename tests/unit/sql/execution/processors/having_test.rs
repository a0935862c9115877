//! Having Operator Tests

use crate::common::{init_logging, make_record, string};
use edgerule::edgerule::sql::ast::{AnalyticCall, BinaryOperator, Expr};
use edgerule::edgerule::sql::execution::collection::WindowBatch;
use edgerule::edgerule::sql::execution::processors::{
    AggregateOperator, AnalyticFuncsOperator, HavingOperator, Operator, ProcessorContext,
};
use edgerule::edgerule::sql::execution::{FieldValue, Row, StreamData};

fn sum_id1(op: BinaryOperator) -> Expr {
    Expr::binary(
        Expr::function("sum", vec![Expr::column("id1")]),
        op,
        Expr::integer(1),
    )
}

fn single_row_window() -> WindowBatch {
    WindowBatch::new(
        vec![make_record("src1", vec![("id1", FieldValue::Integer(1)), ("f1", string("v1"))])],
        None,
    )
}

#[test]
fn test_failing_window_emits_nothing() {
    init_logging();
    let having = HavingOperator::new(sum_id1(BinaryOperator::GreaterThan));
    let mut context = ProcessorContext::new("having_rule");
    let output = having.apply(&mut context, StreamData::Window(single_row_window()));
    assert!(output.is_none());
}

#[test]
fn test_passing_window_is_returned_whole() {
    init_logging();
    let having = HavingOperator::new(sum_id1(BinaryOperator::Equal));
    let mut context = ProcessorContext::new("having_rule");
    let input = StreamData::Window(single_row_window());
    let output = having.apply(&mut context, input.clone());
    assert_eq!(output, Some(input));
}

#[test]
fn test_groups_filtered_after_group_by() {
    let rows = [("red", 5), ("blue", 1), ("red", 7), ("green", 2), ("green", 3)]
        .into_iter()
        .map(|(color, size)| {
            make_record("demo", vec![("color", string(color)), ("size", FieldValue::Integer(size))])
        })
        .collect();
    let mut context = ProcessorContext::new("having_rule");

    let grouped = AggregateOperator::new(vec![Expr::column("color")])
        .apply(&mut context, StreamData::Window(WindowBatch::new(rows, None)))
        .expect("grouped output");
    let having = HavingOperator::new(Expr::binary(
        Expr::function("sum", vec![Expr::column("size")]),
        BinaryOperator::GreaterThanOrEqual,
        Expr::integer(5),
    ));
    let Some(StreamData::Grouped(set)) = having.apply(&mut context, grouped) else {
        panic!("expected grouped output");
    };
    let colors: Vec<FieldValue> = set
        .groups
        .iter()
        .map(|g| match &g.rows[0] {
            Row::Record(r) => r.fields["color"].clone(),
            other => panic!("unexpected row {:?}", other),
        })
        .collect();
    assert_eq!(colors, vec![string("red"), string("green")]);
}

#[test]
fn test_incremental_mode_filters_rows() {
    let having = HavingOperator::new(Expr::binary(
        Expr::column("id1"),
        BinaryOperator::GreaterThan,
        Expr::integer(1),
    ))
    .incremental(true);
    let rows = (1..=3)
        .map(|i| make_record("src1", vec![("id1", FieldValue::Integer(i))]))
        .collect();
    let mut context = ProcessorContext::new("having_rule");
    let Some(StreamData::Window(out)) =
        having.apply(&mut context, StreamData::Window(WindowBatch::new(rows, None)))
    else {
        panic!("expected a window batch");
    };
    assert_eq!(out.rows.len(), 2);
}

#[test]
fn test_incremental_mode_tests_running_aggregate() {
    init_logging();
    let running_sum = AnalyticCall::new(1, "inc_sum", vec![Expr::column("amount")]);
    let analytic = AnalyticFuncsOperator::new(vec![], vec![running_sum.clone()]);
    let having = HavingOperator::new(Expr::binary(
        Expr::Analytic(running_sum),
        BinaryOperator::GreaterThan,
        Expr::integer(8),
    ))
    .incremental(true);
    let rows = [4, 5, 3]
        .into_iter()
        .enumerate()
        .map(|(seq, amount)| {
            make_record(
                "src1",
                vec![
                    ("seq", FieldValue::Integer(seq as i64)),
                    ("amount", FieldValue::Integer(amount)),
                ],
            )
        })
        .collect();
    let mut context = ProcessorContext::new("having_rule");

    let calculated = analytic
        .apply(&mut context, StreamData::Window(WindowBatch::new(rows, None)))
        .expect("analytic output");
    let Some(StreamData::Window(out)) = having.apply(&mut context, calculated) else {
        panic!("expected a window batch");
    };
    let seqs: Vec<&FieldValue> = out.rows.iter().map(|r| &r.fields["seq"]).collect();
    assert_eq!(seqs, vec![&FieldValue::Integer(1), &FieldValue::Integer(2)]);
}

#[test]
fn test_single_record_having() {
    let having = HavingOperator::new(Expr::binary(
        Expr::column("id1"),
        BinaryOperator::Equal,
        Expr::integer(1),
    ));
    let mut context = ProcessorContext::new("having_rule");
    let record = make_record("src1", vec![("id1", FieldValue::Integer(2))]);
    assert!(having.apply(&mut context, StreamData::Record(record)).is_none());
}
