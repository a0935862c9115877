//! Stream and rule definition loading tests

use edgerule::edgerule::config::{
    FieldType, RuleOptions, StreamDefinition, StreamField, StreamFormat,
};
use edgerule::edgerule::sql::{ErrorCategory, SqlError};

#[test]
fn test_nested_struct_definition() {
    let yaml = r#"
name: vehicles
fields:
  - name: position
    type:
      struct:
        - name: lat
          type: float
        - name: lon
          type: float
  - name: readings
    type:
      array:
        array: bigint
  - name: seen
    type: datetime
"#;
    let stream = StreamDefinition::from_yaml_str(yaml).unwrap();
    assert!(!stream.is_schemaless());
    assert_eq!(
        stream.fields[0].field_type,
        FieldType::structure(vec![
            StreamField::new("lat", FieldType::float()),
            StreamField::new("lon", FieldType::float()),
        ])
    );
    assert_eq!(
        stream.fields[1].field_type.type_name(),
        "array(array(bigint))"
    );
    assert_eq!(stream.fields[2].field_type, FieldType::datetime());
    assert_eq!(stream.options.format, StreamFormat::Json);
    assert!(!stream.options.strict_validation);
}

#[test]
fn test_rule_options_round_trip_through_yaml() {
    let options = RuleOptions {
        is_event_time: true,
        send_meta_to_sink: true,
        send_nil: false,
        ignore_case: false,
    };
    let yaml = serde_yaml::to_string(&options).unwrap();
    assert_eq!(RuleOptions::from_yaml_str(&yaml).unwrap(), options);
}

#[test]
fn test_unknown_field_type_is_configuration_error() {
    let yaml = "name: s\nfields:\n  - name: a\n    type: decimal\n";
    let err = StreamDefinition::from_yaml_str(yaml).unwrap_err();
    assert!(matches!(err, SqlError::ConfigurationError { .. }));
    assert_eq!(err.category(), ErrorCategory::Configuration);
}
