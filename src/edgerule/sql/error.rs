//! Error types for operator execution.
//!
//! Every failure an operator can produce is a [`SqlError`]. Errors never abort the
//! process: operators return them as [`StreamData::Error`](crate::edgerule::sql::execution::StreamData)
//! so that the sink collaborator can report them per row or per rule.

use thiserror::Error;

/// Coarse classification of a [`SqlError`], used by sinks to route and count failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Operand, return or schema type is incompatible with the operation
    TypeMismatch,
    /// A referenced field is absent from a strictly-schemed row
    MissingField,
    /// Function or expression evaluation failed
    Evaluation,
    /// An operator received a data shape it does not support
    Structural,
    /// Rule or stream definition could not be loaded
    Configuration,
}

/// Errors produced while preprocessing or evaluating streaming data
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SqlError {
    /// A value has the wrong type for the context it is used in
    #[error("Type error: expected {expected}, got {actual}{}", .value.as_ref().map(|v| format!(" ({})", v)).unwrap_or_default())]
    TypeError {
        expected: String,
        actual: String,
        value: Option<String>,
    },

    /// A binary operator was applied to operands it cannot combine
    #[error("invalid operation {left_type}({left_value}) {operator} {right_type}({right_value})")]
    InvalidOperation {
        operator: String,
        left_type: String,
        left_value: String,
        right_type: String,
        right_value: String,
    },

    /// A raw field could not be coerced into its declared schema type
    #[error("invalid data type for {field}, expect {expected} but found {actual}({value})")]
    SchemaError {
        field: String,
        expected: String,
        actual: String,
        value: String,
    },

    /// A declared field is missing from the input
    #[error("field {field} not found")]
    MissingField { field: String },

    #[error("unknown function {name}")]
    UnknownFunction { name: String },

    /// A function was called with the wrong number or kind of arguments
    #[error("{function}: {message}")]
    ArgumentError { function: String, message: String },

    #[error("divided by zero")]
    DivisionByZero,

    /// Evaluation of a named projection field failed
    #[error("expression field {field} failed: {source}")]
    ExpressionError {
        field: String,
        #[source]
        source: Box<SqlError>,
    },

    /// Operator received a row or collection shape it cannot handle
    #[error("{message}")]
    StructuralError { message: String },

    /// Execution failure that carries its own message
    #[error("Execution error: {message}")]
    ExecutionError {
        message: String,
        query: Option<String>,
    },

    /// The scripting hook rejected a row
    #[error("script error: {message}")]
    ScriptError { message: String },

    /// Stream or rule definition could not be loaded
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },
}

impl SqlError {
    /// Create an execution error without query context
    pub fn execution(message: impl Into<String>) -> Self {
        SqlError::ExecutionError {
            message: message.into(),
            query: None,
        }
    }

    /// Create a structural error for an unsupported input shape
    pub fn structural(message: impl Into<String>) -> Self {
        SqlError::StructuralError {
            message: message.into(),
        }
    }

    /// Classify the error
    pub fn category(&self) -> ErrorCategory {
        match self {
            SqlError::TypeError { .. }
            | SqlError::InvalidOperation { .. }
            | SqlError::SchemaError { .. } => ErrorCategory::TypeMismatch,
            SqlError::MissingField { .. } => ErrorCategory::MissingField,
            SqlError::UnknownFunction { .. }
            | SqlError::ArgumentError { .. }
            | SqlError::DivisionByZero
            | SqlError::ExecutionError { .. }
            | SqlError::ScriptError { .. } => ErrorCategory::Evaluation,
            SqlError::ExpressionError { source, .. } => source.category(),
            SqlError::StructuralError { .. } => ErrorCategory::Structural,
            SqlError::ConfigurationError { .. } => ErrorCategory::Configuration,
        }
    }
}
