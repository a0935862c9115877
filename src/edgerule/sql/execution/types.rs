//! Core streaming SQL data types.
//!
//! This module contains the fundamental data types used throughout the operator pipeline:
//! - [`FieldValue`] - The value type system supporting SQL data types
//! - [`StreamRecord`] - A single row as produced by a source and mutated by operators
//! - [`AffiliateRow`] - Alias and calculated columns attached to a row during evaluation

use crate::edgerule::sql::ast::DEFAULT_STREAM;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A value in a SQL record field
///
/// This enum represents all supported SQL data types in the operator pipeline.
/// It supports both simple types (integers, strings, booleans) and complex types
/// (arrays and nested records).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point number
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Boolean value (true/false)
    Boolean(bool),
    /// SQL NULL value
    Null,
    /// Timestamp in UTC with millisecond precision
    Timestamp(NaiveDateTime),
    /// Raw binary payload
    Bytes(Vec<u8>),
    /// Array of values
    Array(Vec<FieldValue>),
    /// Nested record - keys must be strings
    Map(HashMap<String, FieldValue>),
}

/// Display implementation for FieldValue for clean string formatting
impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "NULL"),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Boolean(b) => write!(f, "{}", b),
            FieldValue::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%dT%H:%M:%S%.3fZ")),
            FieldValue::Bytes(bytes) => write!(
                f,
                "{}",
                base64::engine::general_purpose::STANDARD.encode(bytes)
            ),
            FieldValue::Array(arr) => {
                write!(f, "[")?;
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            FieldValue::Map(map) => {
                // Sorted keys keep the rendering stable for group keys
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                write!(f, "{{")?;
                for (i, k) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, map[*k])?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl FieldValue {
    /// Get the SQL type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Integer(_) => "BIGINT",
            FieldValue::Float(_) => "FLOAT",
            FieldValue::String(_) => "STRING",
            FieldValue::Boolean(_) => "BOOLEAN",
            FieldValue::Null => "NULL",
            FieldValue::Timestamp(_) => "DATETIME",
            FieldValue::Bytes(_) => "BYTEA",
            FieldValue::Array(_) => "ARRAY",
            FieldValue::Map(_) => "STRUCT",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Check if this value is numeric
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldValue::Integer(_) | FieldValue::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Truncate a float to BIGINT; `None` for NaN, infinities and values outside the i64 range
    pub fn float_to_bigint(f: f64) -> Option<i64> {
        let truncated = f.trunc();
        // i64::MAX as f64 rounds up to 2^63, which is already out of range
        if truncated.is_finite() && truncated >= i64::MIN as f64 && truncated < i64::MAX as f64 {
            Some(truncated as i64)
        } else {
            None
        }
    }

    /// Build a timestamp from unix epoch milliseconds
    pub fn timestamp_from_millis(millis: i64) -> Option<FieldValue> {
        DateTime::from_timestamp_millis(millis).map(|dt| FieldValue::Timestamp(dt.naive_utc()))
    }

    /// Unix epoch milliseconds of a timestamp value
    pub fn timestamp_millis(&self) -> Option<i64> {
        match self {
            FieldValue::Timestamp(ts) => Some(ts.and_utc().timestamp_millis()),
            _ => None,
        }
    }

    /// Convert to a JSON value for encoders at the sink boundary
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Integer(i) => serde_json::Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::String(s) => serde_json::Value::String(s.clone()),
            FieldValue::Boolean(b) => serde_json::Value::Bool(*b),
            FieldValue::Timestamp(_) | FieldValue::Bytes(_) => {
                serde_json::Value::String(self.to_string())
            }
            FieldValue::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(FieldValue::to_json).collect())
            }
            FieldValue::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Convert a decoded JSON value. Whole numbers become integers.
    pub fn from_json(value: &serde_json::Value) -> FieldValue {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => FieldValue::String(s.clone()),
            serde_json::Value::Array(arr) => {
                FieldValue::Array(arr.iter().map(FieldValue::from_json).collect())
            }
            serde_json::Value::Object(obj) => FieldValue::Map(
                obj.iter()
                    .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Alias values and calculated columns attached to a row.
///
/// Calculated columns hold results written by operators (analytic caches,
/// window-function positions, projected expressions). Both maps are consulted
/// before the row's own fields for unqualified lookups.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AffiliateRow {
    pub calc_cols: HashMap<String, FieldValue>,
    pub alias_map: HashMap<String, FieldValue>,
}

impl AffiliateRow {
    /// Look up an alias first, then a calculated column
    pub fn value(&self, key: &str, stream: Option<&str>) -> Option<FieldValue> {
        if stream.is_some_and(|s| s != DEFAULT_STREAM) {
            return None;
        }
        self.alias_map
            .get(key)
            .or_else(|| self.calc_cols.get(key))
            .cloned()
    }

    pub fn set(&mut self, col: &str, value: FieldValue) {
        self.calc_cols.insert(col.to_string(), value);
    }

    pub fn append_alias(&mut self, alias: &str, value: FieldValue) {
        self.alias_map.insert(alias.to_string(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.calc_cols.is_empty() && self.alias_map.is_empty()
    }

    /// Write calculated columns, then aliases, over `target`
    pub fn merge_into(&self, target: &mut HashMap<String, FieldValue>) {
        for (k, v) in &self.calc_cols {
            target.insert(k.clone(), v.clone());
        }
        for (k, v) in &self.alias_map {
            target.insert(k.clone(), v.clone());
        }
    }

    /// Keep only the requested alias and calculated columns.
    ///
    /// Returns the columns that must still be resolved against the row itself.
    pub fn pick(&mut self, cols: &[PickColumn]) -> Vec<PickColumn> {
        if cols.is_empty() {
            self.alias_map.clear();
            self.calc_cols.clear();
            return Vec::new();
        }
        let mut alias_map = HashMap::new();
        let mut calc_cols = HashMap::new();
        let mut remaining = Vec::new();
        for col in cols {
            if col.is_unqualified() {
                if let Some(v) = self.alias_map.remove(&col.name) {
                    alias_map.insert(col.name.clone(), v);
                    continue;
                }
                if let Some(v) = self.calc_cols.remove(&col.name) {
                    calc_cols.insert(col.name.clone(), v);
                    continue;
                }
            }
            remaining.push(col.clone());
        }
        self.alias_map = alias_map;
        self.calc_cols = calc_cols;
        remaining
    }
}

/// Column requested by a projection, optionally restricted to one stream
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PickColumn {
    pub name: String,
    pub stream: Option<String>,
}

impl PickColumn {
    pub fn new(name: &str, stream: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            stream: stream.map(|s| s.to_string()),
        }
    }

    pub fn is_unqualified(&self) -> bool {
        match &self.stream {
            None => true,
            Some(s) => s == DEFAULT_STREAM,
        }
    }

    /// Whether this column may be taken from a row emitted by `emitter`
    pub fn applies_to(&self, emitter: &str) -> bool {
        self.is_unqualified() || self.stream.as_deref() == Some(emitter)
    }
}

/// A streaming record: one logical row from a source
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamRecord {
    pub fields: HashMap<String, FieldValue>,
    /// Transport attributes such as topic or device id
    pub metadata: HashMap<String, FieldValue>,
    /// Name of the source stream this row came from
    pub emitter: String,
    /// Event or processing time in epoch milliseconds
    pub timestamp: i64,
    pub affiliate: AffiliateRow,
}

impl StreamRecord {
    /// Create a record from a field map, timestamped with the current processing time
    pub fn new(emitter: &str, fields: HashMap<String, FieldValue>) -> Self {
        Self {
            fields,
            metadata: HashMap::new(),
            emitter: emitter.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            affiliate: AffiliateRow::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, FieldValue>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Get a field value by exact name
    pub fn get_field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Check if a field exists
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Exact lookup with a case-insensitive fallback
    pub fn lookup_field(&self, name: &str) -> Option<&FieldValue> {
        lookup_ignore_case(&self.fields, name)
    }

    /// Resolve a column, honouring aliases, calculated columns and the stream qualifier
    pub fn value(&self, key: &str, stream: Option<&str>) -> Option<FieldValue> {
        if let Some(v) = self.affiliate.value(key, stream) {
            return Some(v);
        }
        match stream {
            Some(s) if s != DEFAULT_STREAM && s != self.emitter => None,
            _ => self.lookup_field(key).cloned(),
        }
    }

    pub fn meta(&self, key: &str, stream: Option<&str>) -> Option<FieldValue> {
        match stream {
            Some(s) if s != DEFAULT_STREAM && s != self.emitter => None,
            _ if key == "*" => Some(FieldValue::Map(self.metadata.clone())),
            _ => lookup_ignore_case(&self.metadata, key).cloned(),
        }
    }

    /// Store a calculated column on this row
    pub fn set(&mut self, col: &str, value: FieldValue) {
        self.affiliate.set(col, value);
    }

    /// Flatten fields, calculated columns and aliases for the sink boundary
    pub fn to_map(&self) -> HashMap<String, FieldValue> {
        let mut map = self.fields.clone();
        self.affiliate.merge_into(&mut map);
        map
    }

    /// Prune this row down to the requested projection shape
    pub fn pick(
        &mut self,
        all_wildcard: bool,
        cols: &[PickColumn],
        wildcard_emitters: &HashSet<String>,
    ) {
        let cols = self.affiliate.pick(cols);
        if all_wildcard || wildcard_emitters.contains(&self.emitter) {
            return;
        }
        let mut picked = HashMap::new();
        for col in &cols {
            if col.applies_to(&self.emitter) {
                if let Some(v) = self.lookup_field(&col.name) {
                    picked.insert(col.name.clone(), v.clone());
                }
            }
        }
        self.fields = picked;
    }
}

/// Exact key lookup, falling back to the first key that matches ignoring ASCII case
pub fn lookup_ignore_case<'a>(
    map: &'a HashMap<String, FieldValue>,
    key: &str,
) -> Option<&'a FieldValue> {
    map.get(key).or_else(|| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}
