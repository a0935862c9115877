//! # edgerule
//!
//! The operator pipeline of an edge streaming-SQL rule engine. Records arrive from
//! logical sources, are coerced against a declared schema, and flow through a chain
//! of operators (filter, join, group-by, having, analytic and window-ranking
//! functions, projection and ordering) that together execute one compiled rule.

//!
//! ## Features
//!
//! - **Polymorphic stream data**: single records, window batches, join results and
//!   grouped sets travel through one closed [`StreamData`] variant
//! - **Composable valuers**: expressions resolve names against a priority-ordered
//!   chain of row, window-range and wildcard sources
//! - **Pluggable functions**: scalar, aggregate and analytic functions live in an
//!   explicit [`FunctionRegistry`] built per rule
//! - **Full SQL join semantics**: inner, left, right, full and cross joins across
//!   any number of streams
//!
//! ## Quick Start
//!
//! ```rust
//! use edgerule::edgerule::sql::ast::{BinaryOperator, Expr, LiteralValue};
//! use edgerule::edgerule::sql::execution::processors::{FilterOperator, Operator, ProcessorContext};
//! use edgerule::edgerule::sql::execution::{FieldValue, StreamData, StreamRecord};
//! use std::collections::HashMap;
//!
//! let mut fields = HashMap::new();
//! fields.insert("temperature".to_string(), FieldValue::Integer(31));
//! let record = StreamRecord::new("demo", fields);
//!
//! let filter = FilterOperator::new(Expr::BinaryOp {
//!     left: Box::new(Expr::Column("temperature".to_string())),
//!     op: BinaryOperator::GreaterThan,
//!     right: Box::new(Expr::Literal(LiteralValue::Integer(30))),
//! });
//!
//! let mut context = ProcessorContext::new("rule1");
//! let output = filter.apply(&mut context, StreamData::Record(record));
//! assert!(matches!(output, Some(StreamData::Record(_))));
//! ```

// Allow certain clippy warnings for development
#![allow(clippy::collapsible_if)]
#![allow(clippy::large_enum_variant)]
#![allow(clippy::result_large_err)]

pub mod edgerule;

pub use edgerule::config::{RuleOptions, StreamDefinition};
pub use edgerule::sql::SqlError;
pub use edgerule::sql::execution::expression::FunctionRegistry;
pub use edgerule::sql::execution::{FieldValue, StreamData, StreamRecord};
