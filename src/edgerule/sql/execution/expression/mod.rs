//! Expression evaluation for the operator pipeline.
//!
//! This module contains everything an operator needs to turn an [`Expr`](crate::edgerule::sql::ast::Expr)
//! into a value:
//! - Valuer composition (row, window range and wildcard sources)
//! - The expression evaluator (binary, unary, CASE, access and function calls)
//! - The function registry with builtin scalar, aggregate and analytic functions
//! - The per-rule analytic state store
//!
//! NULL handling follows the rule engine's comparison semantics, not strict
//! three-valued SQL logic: `NULL = NULL` holds.

pub mod analytic;
pub mod evaluator;
pub mod functions;
pub mod incremental;
pub mod valuer;

// Re-export the main API
pub use analytic::{AnalyticStateStore, FunctionState, StateKey};
pub use evaluator::ExpressionEvaluator;
pub use functions::{AggregateFunction, AnalyticFunction, FunctionRegistry, ScalarFunction};
pub use valuer::{AggregateData, MultiValuer, Valuer};
