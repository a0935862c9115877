//! Preprocess Operator Tests
//!
//! Schema coercion and event-time stamping driven by YAML stream definitions.

use crate::common::{init_logging, make_record, string};
use edgerule::edgerule::config::{RuleOptions, StreamDefinition};
use edgerule::edgerule::sql::execution::processors::{Operator, PreprocessOperator, ProcessorContext};
use edgerule::edgerule::sql::execution::{FieldValue, StreamData, StreamRecord};
use edgerule::edgerule::sql::SqlError;

const SENSOR_STREAM: &str = r#"
name: sensors
fields:
  - name: id
    type: bigint
  - name: temperature
    type: float
  - name: tags
    type:
      array: string
  - name: ts
    type: bigint
options:
  timestamp: ts
  timestamp_format: epoch_millis
"#;

fn preprocess(yaml: &str, options: &RuleOptions, record: StreamRecord) -> Option<StreamData> {
    let stream = StreamDefinition::from_yaml_str(yaml).expect("valid stream definition");
    let op = PreprocessOperator::new(stream, options).expect("valid preprocessor");
    let mut context = ProcessorContext::new("preprocess_rule").with_options(options.clone());
    op.apply(&mut context, StreamData::Record(record))
}

fn raw_sensor() -> StreamRecord {
    make_record(
        "",
        vec![
            ("id", FieldValue::Float(3.0)),
            ("Temperature", string("21.5")),
            ("tags", string(r#"["a", "b"]"#)),
            ("ts", FieldValue::Integer(1_700_000_000_123)),
            ("junk", FieldValue::Boolean(true)),
        ],
    )
}

#[test]
fn test_declared_fields_are_coerced() {
    init_logging();
    let Some(StreamData::Record(record)) = preprocess(SENSOR_STREAM, &RuleOptions::default(), raw_sensor()) else {
        panic!("expected a record");
    };
    assert_eq!(record.emitter, "sensors");
    assert_eq!(record.fields.get("id"), Some(&FieldValue::Integer(3)));
    assert_eq!(record.fields.get("temperature"), Some(&FieldValue::Float(21.5)));
    assert_eq!(
        record.fields.get("tags"),
        Some(&FieldValue::Array(vec![string("a"), string("b")]))
    );
    assert!(!record.fields.contains_key("junk"));
    assert!(!record.fields.contains_key("Temperature"));
}

#[test]
fn test_event_time_is_taken_from_the_timestamp_field() {
    let options = RuleOptions {
        is_event_time: true,
        ..RuleOptions::default()
    };
    let Some(StreamData::Record(record)) = preprocess(SENSOR_STREAM, &options, raw_sensor()) else {
        panic!("expected a record");
    };
    assert_eq!(record.timestamp, 1_700_000_000_123);
}

#[test]
fn test_case_sensitive_lookup_skips_mismatched_names() {
    let options = RuleOptions {
        ignore_case: false,
        ..RuleOptions::default()
    };
    let Some(StreamData::Record(record)) = preprocess(SENSOR_STREAM, &options, raw_sensor()) else {
        panic!("expected a record");
    };
    assert!(!record.fields.contains_key("temperature"));
}

#[test]
fn test_strict_validation_rejects_missing_fields() {
    let yaml = format!("{}  strict_validation: true\n", SENSOR_STREAM);
    let record = make_record("sensors", vec![("id", FieldValue::Integer(1))]);
    let output = preprocess(&yaml, &RuleOptions::default(), record);
    assert_eq!(
        output,
        Some(StreamData::Error(SqlError::MissingField {
            field: "temperature".to_string()
        }))
    );
}

#[test]
fn test_uncoercible_value_is_schema_error() {
    let record = make_record("sensors", vec![("temperature", string("hot"))]);
    let Some(StreamData::Error(err)) = preprocess(SENSOR_STREAM, &RuleOptions::default(), record) else {
        panic!("expected an error");
    };
    assert_eq!(
        err.to_string(),
        "invalid data type for temperature, expect float but found STRING(hot)"
    );
}

#[test]
fn test_schemaless_stream_keeps_every_field() {
    let record = make_record("", vec![("anything", string("goes"))]);
    let Some(StreamData::Record(out)) = preprocess("name: free", &RuleOptions::default(), record.clone()) else {
        panic!("expected a record");
    };
    assert_eq!(out.fields, record.fields);
    assert_eq!(out.emitter, "free");
}
