//! Join Operator Tests
//!
//! Joins over a window batch holding rows of several source streams.

use crate::common::{init_logging, make_record, string};
use edgerule::edgerule::sql::ast::{BinaryOperator, Expr, JoinClause, JoinType};
use edgerule::edgerule::sql::execution::collection::{JoinResult, WindowBatch, WindowRange};
use edgerule::edgerule::sql::execution::processors::{JoinOperator, Operator, ProcessorContext};
use edgerule::edgerule::sql::execution::{FieldValue, StreamData, StreamRecord};
use edgerule::edgerule::sql::SqlError;

fn src1(id: i64, f1: &str) -> StreamRecord {
    make_record("src1", vec![("id1", FieldValue::Integer(id)), ("f1", string(f1))])
}

fn src2(id: i64, f2: &str) -> StreamRecord {
    make_record("src2", vec![("id2", FieldValue::Integer(id)), ("f2", string(f2))])
}

fn src3(id: i64, f3: &str) -> StreamRecord {
    make_record("src3", vec![("id3", FieldValue::Integer(id)), ("f3", string(f3))])
}

fn on(left: &str, right: &str) -> Option<Expr> {
    Some(Expr::binary(
        Expr::column(left),
        BinaryOperator::Equal,
        Expr::column(right),
    ))
}

fn window() -> WindowBatch {
    WindowBatch::new(
        vec![
            src1(1, "v1"),
            src1(2, "v2"),
            src1(3, "v3"),
            src2(1, "w1"),
            src2(2, "w2"),
            src2(4, "w3"),
        ],
        Some(WindowRange::new(0, 10_000)),
    )
}

fn run_join(op: &JoinOperator, batch: WindowBatch) -> JoinResult {
    let mut context = ProcessorContext::new("join_rule");
    match op.apply(&mut context, StreamData::Window(batch)) {
        Some(StreamData::Join(result)) => result,
        other => panic!("expected a join result, got {:?}", other),
    }
}

/// Emitters of each tuple, in constituent order
fn shapes(result: &JoinResult) -> Vec<Vec<&str>> {
    result
        .tuples
        .iter()
        .map(|t| t.rows.iter().map(|r| r.emitter.as_str()).collect())
        .collect()
}

#[test]
fn test_left_join_pairs_matches_and_keeps_unmatched_left() {
    init_logging();
    let op = JoinOperator::new(
        "src1",
        vec![JoinClause::new(JoinType::Left, "src2", on("src1.id1", "src2.id2"))],
    );
    let result = run_join(&op, window());

    assert_eq!(result.tuples.len(), 3);
    assert_eq!(
        shapes(&result),
        vec![vec!["src1", "src2"], vec!["src1", "src2"], vec!["src1"]]
    );
    let first = &result.tuples[0];
    assert_eq!(first.rows[0].fields["f1"], string("v1"));
    assert_eq!(first.rows[1].fields["f2"], string("w1"));
    assert_eq!(result.tuples[2].rows[0].fields["id1"], FieldValue::Integer(3));
    assert_eq!(result.window_range, Some(WindowRange::new(0, 10_000)));
}

#[test]
fn test_inner_join_drops_unmatched() {
    let op = JoinOperator::new(
        "src1",
        vec![JoinClause::new(JoinType::Inner, "src2", on("src1.id1", "src2.id2"))],
    );
    let result = run_join(&op, window());
    assert_eq!(shapes(&result), vec![vec!["src1", "src2"], vec!["src1", "src2"]]);
}

#[test]
fn test_right_join_keeps_unmatched_right() {
    let op = JoinOperator::new(
        "src1",
        vec![JoinClause::new(JoinType::Right, "src2", on("src1.id1", "src2.id2"))],
    );
    let result = run_join(&op, window());
    assert_eq!(
        shapes(&result),
        vec![vec!["src2", "src1"], vec!["src2", "src1"], vec!["src2"]]
    );
    assert_eq!(result.tuples[2].rows[0].fields["f2"], string("w3"));
}

#[test]
fn test_full_join_emits_both_unmatched_sides() {
    let op = JoinOperator::new(
        "src1",
        vec![JoinClause::new(JoinType::FullOuter, "src2", on("src1.id1", "src2.id2"))],
    );
    let result = run_join(&op, window());
    assert_eq!(
        shapes(&result),
        vec![
            vec!["src1", "src2"],
            vec!["src1", "src2"],
            vec!["src1"],
            vec!["src2"]
        ]
    );
}

#[test]
fn test_cross_join_ignores_condition() {
    let op = JoinOperator::new(
        "src1",
        vec![JoinClause::new(JoinType::Cross, "src2", on("src1.id1", "src2.id2"))],
    );
    let result = run_join(&op, window());
    assert_eq!(result.tuples.len(), 9);
}

#[test]
fn test_three_way_join_uses_accumulated_tuples() {
    let mut batch = window();
    batch.rows.push(src3(2, "x2"));
    batch.rows.push(src3(3, "x3"));

    let op = JoinOperator::new(
        "src1",
        vec![
            JoinClause::new(JoinType::Left, "src2", on("src1.id1", "src2.id2")),
            JoinClause::new(JoinType::Inner, "src3", on("src1.id1", "src3.id3")),
        ],
    );
    let result = run_join(&op, batch);
    assert_eq!(
        shapes(&result),
        vec![vec!["src1", "src2", "src3"], vec!["src1", "src3"]]
    );
}

#[test]
fn test_no_tuples_emits_nothing() {
    let op = JoinOperator::new(
        "src1",
        vec![JoinClause::new(JoinType::Inner, "src2", on("src1.id1", "src2.id2"))],
    );
    let batch = WindowBatch::new(vec![src1(1, "v1")], None);
    let mut context = ProcessorContext::new("join_rule");
    assert!(op.apply(&mut context, StreamData::Window(batch)).is_none());
}

#[test]
fn test_join_of_single_record_is_structural_error() {
    let op = JoinOperator::new(
        "src1",
        vec![JoinClause::new(JoinType::Inner, "src2", on("src1.id1", "src2.id2"))],
    );
    let mut context = ProcessorContext::new("join_rule");
    let output = op.apply(&mut context, StreamData::Record(src1(1, "v1")));
    assert!(matches!(
        output,
        Some(StreamData::Error(SqlError::StructuralError { .. }))
    ));
}
