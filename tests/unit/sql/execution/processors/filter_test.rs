//! Filter Operator Tests
//!
//! WHERE evaluation over single records and window batches.

use crate::common::{init_logging, make_record};
use edgerule::edgerule::sql::ast::{BinaryOperator, Expr};
use edgerule::edgerule::sql::execution::collection::{WindowBatch, WindowRange};
use edgerule::edgerule::sql::execution::processors::{FilterOperator, Operator, ProcessorContext};
use edgerule::edgerule::sql::execution::{FieldValue, StreamData};
use edgerule::edgerule::sql::SqlError;

/// `abc*2+3 > 12 AND abc < 20`
fn abc_condition() -> Expr {
    Expr::binary(
        Expr::binary(
            Expr::binary(
                Expr::binary(Expr::column("abc"), BinaryOperator::Multiply, Expr::integer(2)),
                BinaryOperator::Add,
                Expr::integer(3),
            ),
            BinaryOperator::GreaterThan,
            Expr::integer(12),
        ),
        BinaryOperator::And,
        Expr::binary(Expr::column("abc"), BinaryOperator::LessThan, Expr::integer(20)),
    )
}

#[test]
fn test_missing_column_filters_record_out() {
    init_logging();
    let filter = FilterOperator::new(abc_condition());
    let mut context = ProcessorContext::new("filter_rule");

    let record = make_record("demo", vec![("a", FieldValue::Integer(6))]);
    let output = filter.apply(&mut context, StreamData::Record(record));
    assert!(output.is_none());
}

#[test]
fn test_matching_record_passes_unchanged() {
    init_logging();
    let filter = FilterOperator::new(abc_condition());
    let mut context = ProcessorContext::new("filter_rule");

    let record = make_record("demo", vec![("abc", FieldValue::Integer(6))]);
    let output = filter.apply(&mut context, StreamData::Record(record.clone()));
    assert_eq!(output, Some(StreamData::Record(record)));
}

#[test]
fn test_window_filter_keeps_order_and_range() {
    init_logging();
    let filter = FilterOperator::new(abc_condition());
    let mut context = ProcessorContext::new("filter_rule");

    let rows = [6, 1, 15, 25, 7]
        .into_iter()
        .map(|abc| make_record("demo", vec![("abc", FieldValue::Integer(abc))]))
        .collect();
    let range = WindowRange::new(1_000, 2_000);
    let batch = WindowBatch::new(rows, Some(range));

    let Some(StreamData::Window(out)) = filter.apply(&mut context, StreamData::Window(batch)) else {
        panic!("expected a window batch");
    };
    let kept: Vec<&FieldValue> = out.rows.iter().map(|r| &r.fields["abc"]).collect();
    assert_eq!(
        kept,
        vec![&FieldValue::Integer(6), &FieldValue::Integer(15), &FieldValue::Integer(7)]
    );
    assert_eq!(out.window_range, Some(range));
}

#[test]
fn test_empty_window_result_is_still_emitted() {
    let filter = FilterOperator::new(abc_condition());
    let mut context = ProcessorContext::new("filter_rule");

    let batch = WindowBatch::new(
        vec![make_record("demo", vec![("abc", FieldValue::Integer(1))])],
        None,
    );
    let Some(StreamData::Window(out)) = filter.apply(&mut context, StreamData::Window(batch)) else {
        panic!("expected a window batch");
    };
    assert!(out.rows.is_empty());
}

#[test]
fn test_upstream_error_is_forwarded() {
    let filter = FilterOperator::new(abc_condition());
    let mut context = ProcessorContext::new("filter_rule");

    let upstream = SqlError::execution("source disconnected");
    let output = filter.apply(&mut context, StreamData::Error(upstream.clone()));
    assert_eq!(output, Some(StreamData::Error(upstream)));
}
