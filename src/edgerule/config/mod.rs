//! Stream and rule definitions
//!
//! Streams declare the schema their raw records are coerced into, and rules carry
//! the options that change operator behaviour. Both load from YAML:
//!
//! ```yaml
//! name: demo
//! fields:
//!   - name: temperature
//!     type: float
//!   - name: tags
//!     type:
//!       array: string
//! options:
//!   timestamp: ts
//!   strict_validation: true
//! ```

use crate::edgerule::sql::error::SqlError;
use serde::{Deserialize, Serialize};

/// Declared schema and options of one source stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamDefinition {
    /// Stream name, used as the emitter of its rows
    pub name: String,

    /// Declared fields; empty means schemaless
    #[serde(default)]
    pub fields: Vec<StreamField>,

    #[serde(default)]
    pub options: StreamOptions,
}

impl StreamDefinition {
    /// A schemaless stream with default options
    pub fn schemaless(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
            options: StreamOptions::default(),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, SqlError> {
        serde_yaml::from_str(yaml).map_err(|e| SqlError::ConfigurationError {
            message: format!("invalid stream definition: {}", e),
        })
    }

    pub fn is_schemaless(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Definition of a single declared field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamField {
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl StreamField {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
        }
    }
}

/// Declared type of a field
///
/// Scalar types use the type name directly (`type: bigint`). Containers nest:
/// ```yaml
/// type:
///   array: float
/// type:
///   struct:
///     - name: lat
///       type: float
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldType {
    /// Array whose elements are all of one type
    Array { array: Box<FieldType> },
    /// Nested record with its own declared fields
    Struct {
        #[serde(rename = "struct")]
        fields: Vec<StreamField>,
    },
    Simple(SimpleFieldType),
}

/// Scalar field types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SimpleFieldType {
    Bigint,
    Float,
    String,
    Datetime,
    Boolean,
    Bytea,
}

// Convenience constructors for FieldType
impl FieldType {
    pub fn bigint() -> Self {
        FieldType::Simple(SimpleFieldType::Bigint)
    }

    pub fn float() -> Self {
        FieldType::Simple(SimpleFieldType::Float)
    }

    pub fn string() -> Self {
        FieldType::Simple(SimpleFieldType::String)
    }

    pub fn datetime() -> Self {
        FieldType::Simple(SimpleFieldType::Datetime)
    }

    pub fn boolean() -> Self {
        FieldType::Simple(SimpleFieldType::Boolean)
    }

    pub fn bytea() -> Self {
        FieldType::Simple(SimpleFieldType::Bytea)
    }

    pub fn array(element: FieldType) -> Self {
        FieldType::Array {
            array: Box::new(element),
        }
    }

    pub fn structure(fields: Vec<StreamField>) -> Self {
        FieldType::Struct { fields }
    }

    /// Name used in coercion error messages, e.g. `bigint` or `array(float)`
    pub fn type_name(&self) -> String {
        match self {
            FieldType::Simple(simple) => match simple {
                SimpleFieldType::Bigint => "bigint",
                SimpleFieldType::Float => "float",
                SimpleFieldType::String => "string",
                SimpleFieldType::Datetime => "datetime",
                SimpleFieldType::Boolean => "boolean",
                SimpleFieldType::Bytea => "bytea",
            }
            .to_string(),
            FieldType::Array { array } => format!("array({})", array.type_name()),
            FieldType::Struct { .. } => "struct".to_string(),
        }
    }
}

/// Wire format of a stream's payload
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StreamFormat {
    #[default]
    Json,
    /// The whole payload arrives as one bytes field named `self`
    Binary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct StreamOptions {
    pub format: StreamFormat,

    /// Field that carries event time
    pub timestamp: Option<String>,

    /// `epoch_millis`, `epoch_seconds`, `iso8601` or a chrono format string
    pub timestamp_format: Option<String>,

    /// Fail rows that lack a declared field instead of skipping the field
    pub strict_validation: bool,
}

/// Options of one rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuleOptions {
    /// Take row timestamps from the stream's `timestamp` field
    pub is_event_time: bool,

    /// Emit row metadata as `__meta` in projections
    pub send_meta_to_sink: bool,

    /// Emit alias fields whose value is NULL
    pub send_nil: bool,

    /// Resolve declared schema fields ignoring case
    pub ignore_case: bool,
}

impl Default for RuleOptions {
    fn default() -> Self {
        Self {
            is_event_time: false,
            send_meta_to_sink: false,
            send_nil: false,
            ignore_case: true,
        }
    }
}

impl RuleOptions {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SqlError> {
        serde_yaml::from_str(yaml).map_err(|e| SqlError::ConfigurationError {
            message: format!("invalid rule options: {}", e),
        })
    }
}
