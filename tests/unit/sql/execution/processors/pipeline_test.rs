//! Rule Pipeline Tests
//!
//! Whole rules assembled from operators, end to end.

use crate::common::{init_logging, make_record, string};
use edgerule::edgerule::config::{RuleOptions, StreamDefinition};
use edgerule::edgerule::sql::ast::{
    AnalyticCall, BinaryOperator, Expr, JoinClause, JoinType, OrderByExpr, SelectField,
    WindowRankCall,
};
use edgerule::edgerule::sql::execution::collection::{WindowBatch, WindowRange};
use edgerule::edgerule::sql::execution::processors::{
    AggregateOperator, AnalyticFuncsOperator, FilterOperator, HavingOperator, JoinOperator,
    OrderOperator, PreprocessOperator, ProcessorContext, ProjectOperator, RulePipeline,
    WindowRankOperator,
};
use edgerule::edgerule::sql::execution::{FieldValue, StreamData};
use edgerule::edgerule::sql::SqlError;
use serial_test::serial;
use std::collections::HashMap;

fn row(pairs: Vec<(&str, FieldValue)>) -> HashMap<String, FieldValue> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// SELECT temperature * 2 AS double FROM demo WHERE temperature > 20
fn record_rule() -> RulePipeline {
    let stream = StreamDefinition::from_yaml_str(
        "name: demo\nfields:\n  - name: temperature\n    type: bigint\n",
    )
    .expect("valid stream");
    RulePipeline::new()
        .with_operator(PreprocessOperator::new(stream, &RuleOptions::default()).expect("preprocessor"))
        .with_operator(FilterOperator::new(Expr::binary(
            Expr::column("temperature"),
            BinaryOperator::GreaterThan,
            Expr::integer(20),
        )))
        .with_operator(ProjectOperator::from_fields(vec![SelectField::Expression {
            expr: Expr::binary(Expr::column("temperature"), BinaryOperator::Multiply, Expr::integer(2)),
            alias: Some("double".to_string()),
        }]))
}

#[test]
#[serial]
fn test_record_rule_end_to_end() {
    init_logging();
    let pipeline = record_rule();
    assert_eq!(pipeline.operator_names(), vec!["preprocess", "filter", "project"]);
    let mut context = ProcessorContext::new("record_rule");

    let hot = make_record("", vec![("temperature", string("25"))]);
    let output = pipeline.run(&mut context, StreamData::Record(hot)).expect("output");
    assert_eq!(
        output.into_sink_output().unwrap(),
        vec![row(vec![("double", FieldValue::Integer(50))])]
    );

    let cold = make_record("", vec![("temperature", FieldValue::Integer(10))]);
    assert!(pipeline.run(&mut context, StreamData::Record(cold)).is_none());
}

#[test]
#[serial]
fn test_errors_flow_to_the_sink() {
    let pipeline = record_rule();
    let mut context = ProcessorContext::new("record_rule");
    let bad = make_record("", vec![("temperature", string("warm"))]);
    let output = pipeline.run(&mut context, StreamData::Record(bad)).expect("output");
    let err = output.into_sink_output().unwrap_err();
    assert!(matches!(err, SqlError::SchemaError { .. }));
}

/// SELECT src1.region, count(src2.amount) AS paid
/// FROM src1 LEFT JOIN src2 ON src1.id = src2.order_id
/// GROUP BY src1.region HAVING count(src1.id) > 1 ORDER BY paid DESC
#[test]
#[serial]
fn test_windowed_join_aggregate_rule() {
    init_logging();
    let pipeline = RulePipeline::new()
        .with_operator(JoinOperator::new(
            "src1",
            vec![JoinClause::new(
                JoinType::Left,
                "src2",
                Some(Expr::binary(
                    Expr::column("src1.id"),
                    BinaryOperator::Equal,
                    Expr::column("src2.order_id"),
                )),
            )],
        ))
        .with_operator(AggregateOperator::new(vec![Expr::column("src1.region")]))
        .with_operator(HavingOperator::new(Expr::binary(
            Expr::function("count", vec![Expr::column("src1.id")]),
            BinaryOperator::GreaterThan,
            Expr::integer(1),
        )))
        .with_operator(OrderOperator::new(vec![OrderByExpr::desc(Expr::function(
            "count",
            vec![Expr::column("src2.amount")],
        ))]))
        .with_operator(ProjectOperator::from_fields(vec![
            SelectField::Column("src1.region".to_string()),
            SelectField::Expression {
                expr: Expr::function("count", vec![Expr::column("src2.amount")]),
                alias: Some("paid".to_string()),
            },
        ]));

    let order = |id: i64, region: &str| {
        make_record("src1", vec![("id", FieldValue::Integer(id)), ("region", string(region))])
    };
    let payment = |order_id: i64| {
        make_record(
            "src2",
            vec![("order_id", FieldValue::Integer(order_id)), ("amount", FieldValue::Float(9.5))],
        )
    };
    let batch = WindowBatch::new(
        vec![
            order(1, "eu"),
            order(2, "us"),
            order(3, "us"),
            order(4, "eu"),
            order(5, "apac"),
            order(6, "us"),
            payment(2),
            payment(3),
            payment(6),
            payment(4),
        ],
        Some(WindowRange::new(0, 60_000)),
    );
    let mut context = ProcessorContext::new("window_rule");
    let output = pipeline
        .run(&mut context, StreamData::Window(batch))
        .expect("output")
        .into_sink_output()
        .unwrap();
    assert_eq!(
        output,
        vec![
            row(vec![("region", string("us")), ("paid", FieldValue::Integer(3))]),
            row(vec![("region", string("eu")), ("paid", FieldValue::Integer(1))]),
        ]
    );
}

/// SELECT device, lag(temp) OVER (PARTITION BY device) AS prev, row_number() AS rn
#[test]
#[serial]
fn test_analytic_state_survives_across_windows() {
    let lag = AnalyticCall::new(1, "lag", vec![Expr::column("temp")])
        .with_partition(vec![Expr::column("device")]);
    let pipeline = RulePipeline::new()
        .with_operator(AnalyticFuncsOperator::new(vec![lag.clone()], vec![]))
        .with_operator(
            WindowRankOperator::new(vec![WindowRankCall {
                name: "row_number".to_string(),
                partition_by: vec![Expr::column("device")],
                output_field: "rn".to_string(),
            }])
            .expect("row_number is supported"),
        )
        .with_operator(ProjectOperator::from_fields(vec![
            SelectField::Column("device".to_string()),
            SelectField::Expression {
                expr: Expr::Analytic(lag),
                alias: Some("prev".to_string()),
            },
            SelectField::Column("rn".to_string()),
        ]));

    let reading = |device: &str, temp: i64| {
        make_record("sensors", vec![("device", string(device)), ("temp", FieldValue::Integer(temp))])
    };
    let mut context = ProcessorContext::new("analytic_rule");

    let first = WindowBatch::new(vec![reading("a", 1), reading("a", 2), reading("b", 7)], None);
    let output = pipeline
        .run(&mut context, StreamData::Window(first))
        .expect("output")
        .into_sink_output()
        .unwrap();
    assert_eq!(
        output,
        vec![
            row(vec![("device", string("a")), ("rn", FieldValue::Integer(1))]),
            row(vec![
                ("device", string("a")),
                ("prev", FieldValue::Integer(1)),
                ("rn", FieldValue::Integer(2)),
            ]),
            row(vec![("device", string("b")), ("rn", FieldValue::Integer(1))]),
        ]
    );

    // Positions restart per window, lag state does not
    let second = WindowBatch::new(vec![reading("b", 8), reading("a", 3)], None);
    let output = pipeline
        .run(&mut context, StreamData::Window(second))
        .expect("output")
        .into_sink_output()
        .unwrap();
    assert_eq!(
        output,
        vec![
            row(vec![
                ("device", string("b")),
                ("prev", FieldValue::Integer(7)),
                ("rn", FieldValue::Integer(1)),
            ]),
            row(vec![
                ("device", string("a")),
                ("prev", FieldValue::Integer(2)),
                ("rn", FieldValue::Integer(1)),
            ]),
        ]
    );

    context.reset_state();
    assert!(context.analytic_state.is_empty());
}
