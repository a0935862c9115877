//! Project Operator Tests
//!
//! Projection of records, join results, grouped sets and whole windows.

use crate::common::{init_logging, make_record, string};
use edgerule::edgerule::sql::ast::{BinaryOperator, Expr, JoinClause, JoinType, SelectField};
use edgerule::edgerule::sql::execution::collection::{WindowBatch, WindowRange};
use edgerule::edgerule::sql::execution::processors::project::META_FIELD;
use edgerule::edgerule::sql::execution::processors::{
    AggregateOperator, JoinOperator, Operator, ProcessorContext, ProjectOperator,
    ProjectSetOperator,
};
use edgerule::edgerule::sql::execution::{FieldValue, StreamData};
use proptest::prelude::*;
use std::collections::HashMap;

fn joined(context: &mut ProcessorContext) -> StreamData {
    let batch = WindowBatch::new(
        vec![
            make_record("src1", vec![("id1", FieldValue::Integer(1)), ("f1", string("v1"))]),
            make_record("src1", vec![("id1", FieldValue::Integer(2)), ("f1", string("v2"))]),
            make_record("src2", vec![("id2", FieldValue::Integer(1)), ("f2", string("w1"))]),
        ],
        Some(WindowRange::new(0, 1_000)),
    );
    let join = JoinOperator::new(
        "src1",
        vec![JoinClause::new(
            JoinType::Left,
            "src2",
            Some(Expr::binary(
                Expr::column("src1.id1"),
                BinaryOperator::Equal,
                Expr::column("src2.id2"),
            )),
        )],
    );
    join.apply(context, StreamData::Window(batch)).expect("join output")
}

fn row(pairs: Vec<(&str, FieldValue)>) -> HashMap<String, FieldValue> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn sink(data: Option<StreamData>) -> Vec<HashMap<String, FieldValue>> {
    data.expect("projection output").into_sink_output().expect("no error")
}

#[test]
fn test_qualified_columns_of_join() {
    init_logging();
    let mut context = ProcessorContext::new("project_rule");
    let data = joined(&mut context);
    let project = ProjectOperator::from_fields(vec![
        SelectField::Column("src1.id1".to_string()),
        SelectField::Column("src2.f2".to_string()),
    ]);
    let output = sink(project.apply(&mut context, data));
    assert_eq!(
        output,
        vec![
            row(vec![("id1", FieldValue::Integer(1)), ("f2", string("w1"))]),
            row(vec![("id1", FieldValue::Integer(2))]),
        ]
    );
}

#[test]
fn test_stream_wildcard_with_alias() {
    let mut context = ProcessorContext::new("project_rule");
    let data = joined(&mut context);
    let project = ProjectOperator::from_fields(vec![
        SelectField::QualifiedWildcard("src2".to_string()),
        SelectField::AliasedColumn {
            column: "src1.f1".to_string(),
            alias: "name".to_string(),
        },
    ]);
    let output = sink(project.apply(&mut context, data));
    assert_eq!(
        output[0],
        row(vec![
            ("id2", FieldValue::Integer(1)),
            ("f2", string("w1")),
            ("name", string("v1")),
        ])
    );
    assert_eq!(output[1], row(vec![("name", string("v2"))]));
}

#[test]
fn test_grouped_projection_emits_one_row_per_group() {
    let rows = [("red", 5), ("blue", 1), ("red", 7)]
        .into_iter()
        .map(|(color, size)| {
            make_record("demo", vec![("color", string(color)), ("size", FieldValue::Integer(size))])
        })
        .collect();
    let mut context = ProcessorContext::new("project_rule");
    let grouped = AggregateOperator::new(vec![Expr::column("color")])
        .apply(&mut context, StreamData::Window(WindowBatch::new(rows, None)))
        .expect("grouped output");

    let project = ProjectOperator::from_fields(vec![
        SelectField::Column("color".to_string()),
        SelectField::Expression {
            expr: Expr::function("sum", vec![Expr::column("size")]),
            alias: Some("total".to_string()),
        },
    ]);
    let output = sink(project.apply(&mut context, grouped));
    assert_eq!(
        output,
        vec![
            row(vec![("color", string("red")), ("total", FieldValue::Integer(12))]),
            row(vec![("color", string("blue")), ("total", FieldValue::Integer(1))]),
        ]
    );
}

#[test]
fn test_aggregate_projection_of_window() {
    let rows = (1..=3)
        .map(|i| make_record("demo", vec![("id", FieldValue::Integer(i))]))
        .collect();
    let project = ProjectOperator::from_fields(vec![
        SelectField::Expression {
            expr: Expr::function("count", vec![Expr::column("id")]),
            alias: Some("n".to_string()),
        },
        SelectField::Expression {
            expr: Expr::function("window_end", vec![]),
            alias: None,
        },
    ])
    .aggregate(true);
    let mut context = ProcessorContext::new("project_rule");
    let output = sink(project.apply(
        &mut context,
        StreamData::Window(WindowBatch::new(rows, Some(WindowRange::new(0, 5_000)))),
    ));
    assert_eq!(
        output,
        vec![row(vec![
            ("n", FieldValue::Integer(3)),
            ("window_end", FieldValue::Integer(5_000)),
        ])]
    );
}

#[test]
fn test_metadata_and_null_aliases() {
    let mut metadata = HashMap::new();
    metadata.insert("topic".to_string(), string("sensors/1"));
    let record = make_record("demo", vec![("a", FieldValue::Integer(1))]).with_metadata(metadata.clone());
    let fields = vec![
        SelectField::Column("a".to_string()),
        SelectField::AliasedColumn {
            column: "missing".to_string(),
            alias: "m".to_string(),
        },
    ];
    let mut context = ProcessorContext::new("project_rule");

    let plain = ProjectOperator::from_fields(fields.clone());
    let output = sink(plain.apply(&mut context, StreamData::Record(record.clone())));
    assert_eq!(output, vec![row(vec![("a", FieldValue::Integer(1))])]);

    let verbose = ProjectOperator::from_fields(fields)
        .with_send_meta(true)
        .with_send_nil(true);
    let output = sink(verbose.apply(&mut context, StreamData::Record(record)));
    assert_eq!(
        output,
        vec![row(vec![
            ("a", FieldValue::Integer(1)),
            ("m", FieldValue::Null),
            (META_FIELD, FieldValue::Map(metadata)),
        ])]
    );
}

#[test]
fn test_limit_truncates_window() {
    let rows = (1..=5)
        .map(|i| make_record("demo", vec![("id", FieldValue::Integer(i))]))
        .collect();
    let project = ProjectOperator::from_fields(vec![SelectField::Wildcard]).with_limit(Some(2));
    let mut context = ProcessorContext::new("project_rule");
    let output = sink(project.apply(&mut context, StreamData::Window(WindowBatch::new(rows, None))));
    assert_eq!(
        output,
        vec![
            row(vec![("id", FieldValue::Integer(1))]),
            row(vec![("id", FieldValue::Integer(2))]),
        ]
    );

    let none = ProjectOperator::from_fields(vec![SelectField::Wildcard]).with_limit(Some(0));
    let record = make_record("demo", vec![("id", FieldValue::Integer(1))]);
    assert!(none.apply(&mut context, StreamData::Record(record)).is_none());
}

#[test]
fn test_unnest_expands_projected_array() {
    let record = make_record(
        "demo",
        vec![
            ("id", FieldValue::Integer(7)),
            ("tags", FieldValue::Array(vec![string("x"), string("y"), string("z")])),
        ],
    );
    let project = ProjectOperator::from_fields(vec![
        SelectField::Column("id".to_string()),
        SelectField::Expression {
            expr: Expr::function("unnest", vec![Expr::column("tags")]),
            alias: Some("tag".to_string()),
        },
    ]);
    let project_set = ProjectSetOperator::new("tag");
    let mut context = ProcessorContext::new("project_rule");

    let projected = project
        .apply(&mut context, StreamData::Record(record))
        .expect("projection output");
    let output = sink(project_set.apply(&mut context, projected));
    assert_eq!(
        output,
        vec![
            row(vec![("id", FieldValue::Integer(7)), ("tag", string("x"))]),
            row(vec![("id", FieldValue::Integer(7)), ("tag", string("y"))]),
            row(vec![("id", FieldValue::Integer(7)), ("tag", string("z"))]),
        ]
    );
}

fn scalar_value() -> impl Strategy<Value = FieldValue> {
    prop_oneof![
        any::<i64>().prop_map(FieldValue::Integer),
        any::<bool>().prop_map(FieldValue::Boolean),
        "[a-z ]{0,8}".prop_map(FieldValue::String),
    ]
}

proptest! {
    #[test]
    fn prop_wildcard_reproduces_every_field(
        fields in prop::collection::hash_map("[a-z]{1,6}", scalar_value(), 1..8),
    ) {
        let project = ProjectOperator::from_fields(vec![SelectField::Wildcard]);
        let mut context = ProcessorContext::new("prop");

        let record = make_record("demo", fields.iter().map(|(k, v)| (k.as_str(), v.clone())).collect());
        let output = sink(project.apply(&mut context, StreamData::Record(record)));
        prop_assert_eq!(&output, &vec![fields.clone()]);

        let rows = (0..3)
            .map(|_| make_record("demo", fields.iter().map(|(k, v)| (k.as_str(), v.clone())).collect()))
            .collect();
        let output = sink(project.apply(&mut context, StreamData::Window(WindowBatch::new(rows, None))));
        prop_assert_eq!(output, vec![fields; 3]);
    }
}
