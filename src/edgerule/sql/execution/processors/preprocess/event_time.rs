//! Event-time extraction
//!
//! Reads the stream's timestamp field from a preprocessed row and turns it into
//! epoch milliseconds, according to the stream's `timestamp_format`.

use crate::edgerule::sql::error::SqlError;
use crate::edgerule::sql::execution::types::FieldValue;
use crate::edgerule::sql::execution::utils::parse_datetime;
use chrono::DateTime;
use std::collections::HashMap;
use thiserror::Error;

/// Timestamp format enumeration
///
/// Defines the supported timestamp formats for event-time extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampFormat {
    /// Unix epoch milliseconds (e.g., 1696723200000)
    EpochMillis,
    /// Unix epoch seconds (e.g., 1696723200)
    EpochSeconds,
    /// ISO 8601 format (e.g., "2023-10-08T00:00:00Z")
    ISO8601,
    /// Custom chrono format string (e.g., "%Y-%m-%d %H:%M:%S")
    Custom(String),
}

impl TimestampFormat {
    /// Parse a timestamp format string into a TimestampFormat variant
    ///
    /// ```
    /// use edgerule::edgerule::sql::execution::processors::preprocess::event_time::TimestampFormat;
    ///
    /// assert_eq!(TimestampFormat::parse("epoch_millis"), TimestampFormat::EpochMillis);
    /// assert_eq!(
    ///     TimestampFormat::parse("%Y-%m-%d"),
    ///     TimestampFormat::Custom("%Y-%m-%d".to_string())
    /// );
    /// ```
    pub fn parse(s: &str) -> Self {
        match s {
            "epoch_millis" => TimestampFormat::EpochMillis,
            "epoch_seconds" | "epoch" => TimestampFormat::EpochSeconds,
            "iso8601" | "ISO8601" => TimestampFormat::ISO8601,
            custom => TimestampFormat::Custom(custom.to_string()),
        }
    }

    /// The chrono format string, for custom formats only
    pub fn custom_pattern(&self) -> Option<&str> {
        match self {
            TimestampFormat::Custom(pattern) => Some(pattern),
            _ => None,
        }
    }
}

/// Which field carries event time, and how it is encoded
#[derive(Debug, Clone, PartialEq)]
pub struct EventTimeConfig {
    pub field_name: String,
    /// Format of the timestamp (None = auto-detect)
    pub format: Option<TimestampFormat>,
}

impl EventTimeConfig {
    pub fn new(field_name: &str, format: Option<TimestampFormat>) -> Self {
        EventTimeConfig {
            field_name: field_name.to_string(),
            format,
        }
    }
}

/// Event-time extraction errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EventTimeError {
    #[error("cannot find timestamp field {field} in tuple")]
    MissingField { field: String },

    #[error("cannot convert timestamp field {field} to timestamp with error {error}")]
    Conversion { field: String, error: String },
}

impl From<EventTimeError> for SqlError {
    fn from(err: EventTimeError) -> Self {
        SqlError::execution(err.to_string())
    }
}

/// Extract event time, in epoch milliseconds, from preprocessed fields
pub fn extract_event_time(
    fields: &HashMap<String, FieldValue>,
    config: &EventTimeConfig,
) -> Result<i64, EventTimeError> {
    let value = fields
        .get(&config.field_name)
        .ok_or_else(|| EventTimeError::MissingField {
            field: config.field_name.clone(),
        })?;
    to_unix_millis(value, config.format.as_ref()).map_err(|error| EventTimeError::Conversion {
        field: config.field_name.clone(),
        error,
    })
}

fn to_unix_millis(value: &FieldValue, format: Option<&TimestampFormat>) -> Result<i64, String> {
    let unsupported = || format!("unsupported value {}({})", value.type_name(), value);
    match (value, format) {
        // Datetime columns are already converted by schema coercion
        (FieldValue::Timestamp(_), _) => value.timestamp_millis().ok_or_else(unsupported),
        (FieldValue::Integer(secs), Some(TimestampFormat::EpochSeconds)) => secs
            .checked_mul(1000)
            .ok_or_else(|| format!("epoch seconds {} out of range", secs)),
        (FieldValue::Integer(millis), _) => Ok(*millis),
        (FieldValue::Float(millis), _) => Ok(*millis as i64),
        (FieldValue::String(s), Some(TimestampFormat::ISO8601)) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.timestamp_millis())
            .map_err(|e| e.to_string()),
        (FieldValue::String(s), Some(TimestampFormat::Custom(pattern))) => {
            parse_datetime(s, Some(pattern)).map(|dt| dt.and_utc().timestamp_millis())
        }
        (FieldValue::String(s), _) => {
            parse_datetime(s, None).map(|dt| dt.and_utc().timestamp_millis())
        }
        _ => Err(unsupported()),
    }
}
