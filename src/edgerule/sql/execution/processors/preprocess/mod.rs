//! Preprocessing: schema coercion and event time
//!
//! The first operator of every rule. It takes a raw record from the source,
//! coerces each declared field to its declared type and, in event-time mode,
//! stamps the record with the time carried in its timestamp field.

pub mod event_time;

use self::event_time::{EventTimeConfig, TimestampFormat, extract_event_time};
use super::{Operator, ProcessorContext};
use crate::edgerule::config::{
    FieldType, RuleOptions, SimpleFieldType, StreamDefinition, StreamField, StreamFormat,
};
use crate::edgerule::sql::error::SqlError;
use crate::edgerule::sql::execution::expression::functions::parse_bool;
use crate::edgerule::sql::execution::types::{FieldValue, StreamRecord, lookup_ignore_case};
use crate::edgerule::sql::execution::utils::parse_datetime;
use crate::edgerule::sql::execution::StreamData;
use base64::Engine;
use std::collections::HashMap;

/// Field that carries the whole payload of a binary stream
pub const BINARY_PAYLOAD_FIELD: &str = "self";

/// Coerces raw records of one stream into its declared schema
pub struct PreprocessOperator {
    stream: StreamDefinition,
    ignore_case: bool,
    event_time: Option<EventTimeConfig>,
}

impl PreprocessOperator {
    /// Build the preprocessor for `stream` under the rule's options.
    ///
    /// Event-time rules require the stream to name its timestamp field.
    pub fn new(stream: StreamDefinition, options: &RuleOptions) -> Result<Self, SqlError> {
        let event_time = if options.is_event_time {
            let field = stream.options.timestamp.as_deref().ok_or_else(|| {
                SqlError::ConfigurationError {
                    message: format!(
                        "stream {} is used in event time mode but declares no timestamp field",
                        stream.name
                    ),
                }
            })?;
            let format = stream
                .options
                .timestamp_format
                .as_deref()
                .map(TimestampFormat::parse);
            Some(EventTimeConfig::new(field, format))
        } else {
            None
        };
        Ok(Self {
            stream,
            ignore_case: options.ignore_case,
            event_time,
        })
    }

    fn coercer(&self) -> SchemaCoercer {
        SchemaCoercer {
            ignore_case: self.ignore_case,
            strict: self.stream.options.strict_validation,
            datetime_format: self
                .stream
                .options
                .timestamp_format
                .as_deref()
                .map(TimestampFormat::parse)
                .and_then(|format| format.custom_pattern().map(str::to_string)),
        }
    }

    fn preprocess(&self, mut record: StreamRecord) -> Result<StreamRecord, SqlError> {
        if record.emitter.is_empty() {
            record.emitter = self.stream.name.clone();
        }

        if !self.stream.is_schemaless() {
            if self.stream.options.format == StreamFormat::Binary {
                self.move_binary_payload(&mut record)?;
            }
            record.fields = self
                .coercer()
                .coerce_fields(&record.fields, &self.stream.fields)?;
        }

        if let Some(config) = &self.event_time {
            record.timestamp = extract_event_time(&record.fields, config)?;
            log::trace!("Preprocessor calculated timestamp {}", record.timestamp);
        }
        Ok(record)
    }

    fn move_binary_payload(&self, record: &mut StreamRecord) -> Result<(), SqlError> {
        let payload = record
            .fields
            .remove(BINARY_PAYLOAD_FIELD)
            .ok_or_else(|| SqlError::MissingField {
                field: BINARY_PAYLOAD_FIELD.to_string(),
            })?;
        if let Some(first) = self.stream.fields.first() {
            record.fields.insert(first.name.clone(), payload);
        }
        Ok(())
    }
}

impl Operator for PreprocessOperator {
    fn name(&self) -> &str {
        "preprocess"
    }

    fn process(
        &self,
        _context: &mut ProcessorContext,
        data: StreamData,
    ) -> Result<Option<StreamData>, SqlError> {
        match data {
            StreamData::Record(record) => Ok(Some(StreamData::Record(self.preprocess(record)?))),
            other => Err(SqlError::structural(format!(
                "preprocess expects a record but received a {}",
                other.kind()
            ))),
        }
    }
}

/// Coercion rules for one stream
struct SchemaCoercer {
    ignore_case: bool,
    strict: bool,
    /// Chrono pattern for datetime strings; RFC3339 when unset
    datetime_format: Option<String>,
}

impl SchemaCoercer {
    fn coerce_fields(
        &self,
        raw: &HashMap<String, FieldValue>,
        declared: &[StreamField],
    ) -> Result<HashMap<String, FieldValue>, SqlError> {
        let mut result = HashMap::with_capacity(declared.len());
        for field in declared {
            let value = if self.ignore_case {
                lookup_ignore_case(raw, &field.name)
            } else {
                raw.get(&field.name)
            };
            match value {
                Some(value) => {
                    let coerced = self.coerce(value, &field.field_type, &field.name)?;
                    result.insert(field.name.clone(), coerced);
                }
                None if self.strict => {
                    return Err(SqlError::MissingField {
                        field: field.name.clone(),
                    });
                }
                None => log::trace!("Declared field {} absent, skipped", field.name),
            }
        }
        Ok(result)
    }

    fn coerce(&self, value: &FieldValue, field_type: &FieldType, name: &str) -> Result<FieldValue, SqlError> {
        if value.is_null() {
            return Ok(FieldValue::Null);
        }
        let mismatch = || SqlError::SchemaError {
            field: name.to_string(),
            expected: field_type.type_name(),
            actual: value.type_name().to_string(),
            value: value.to_string(),
        };
        match field_type {
            FieldType::Simple(simple) => self.coerce_simple(value, *simple).ok_or_else(mismatch),
            FieldType::Array { array } => {
                let items = match value {
                    FieldValue::Array(items) => items.clone(),
                    FieldValue::String(s) => match serde_json::from_str::<serde_json::Value>(s) {
                        Ok(json @ serde_json::Value::Array(_)) => match FieldValue::from_json(&json) {
                            FieldValue::Array(items) => items,
                            _ => return Err(mismatch()),
                        },
                        _ => return Err(mismatch()),
                    },
                    _ => return Err(mismatch()),
                };
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.coerce(item, array, &format!("{}[{}]", name, i)))
                    .collect::<Result<Vec<_>, _>>()
                    .map(FieldValue::Array)
            }
            FieldType::Struct { fields } => {
                let map = match value {
                    FieldValue::Map(map) => map.clone(),
                    FieldValue::String(s) => match serde_json::from_str::<serde_json::Value>(s) {
                        Ok(json @ serde_json::Value::Object(_)) => match FieldValue::from_json(&json) {
                            FieldValue::Map(map) => map,
                            _ => return Err(mismatch()),
                        },
                        _ => return Err(mismatch()),
                    },
                    _ => return Err(mismatch()),
                };
                self.coerce_fields(&map, fields).map(FieldValue::Map)
            }
        }
    }

    fn coerce_simple(&self, value: &FieldValue, simple: SimpleFieldType) -> Option<FieldValue> {
        match (simple, value) {
            (SimpleFieldType::Bigint, FieldValue::Integer(i)) => Some(FieldValue::Integer(*i)),
            (SimpleFieldType::Bigint, FieldValue::Float(f)) => {
                FieldValue::float_to_bigint(*f).map(FieldValue::Integer)
            }
            (SimpleFieldType::Bigint, FieldValue::String(s)) => s
                .parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(FieldValue::float_to_bigint))
                .map(FieldValue::Integer),
            (SimpleFieldType::Float, FieldValue::Float(f)) => Some(FieldValue::Float(*f)),
            (SimpleFieldType::Float, FieldValue::Integer(i)) => Some(FieldValue::Float(*i as f64)),
            (SimpleFieldType::Float, FieldValue::String(s)) => {
                s.parse::<f64>().ok().map(FieldValue::Float)
            }
            (SimpleFieldType::String, FieldValue::String(s)) => Some(FieldValue::String(s.clone())),
            (SimpleFieldType::Datetime, FieldValue::Integer(millis)) => {
                FieldValue::timestamp_from_millis(*millis)
            }
            (SimpleFieldType::Datetime, FieldValue::Float(millis)) => {
                FieldValue::float_to_bigint(*millis).and_then(FieldValue::timestamp_from_millis)
            }
            (SimpleFieldType::Datetime, FieldValue::Timestamp(ts)) => Some(FieldValue::Timestamp(*ts)),
            (SimpleFieldType::Datetime, FieldValue::String(s)) => {
                parse_datetime(s, self.datetime_format.as_deref())
                    .ok()
                    .map(FieldValue::Timestamp)
            }
            (SimpleFieldType::Boolean, FieldValue::Boolean(b)) => Some(FieldValue::Boolean(*b)),
            (SimpleFieldType::Boolean, FieldValue::String(s)) => parse_bool(s).map(FieldValue::Boolean),
            (SimpleFieldType::Bytea, FieldValue::Bytes(bytes)) => Some(FieldValue::Bytes(bytes.clone())),
            (SimpleFieldType::Bytea, FieldValue::String(s)) => base64::engine::general_purpose::STANDARD
                .decode(s)
                .ok()
                .map(FieldValue::Bytes),
            _ => None,
        }
    }
}
