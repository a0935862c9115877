//! Function registry and builtin function implementations.
//!
//! Functions are grouped by how the evaluator calls them:
//! - **Scalar functions** (ABS, ROUND, UPPER, CONCAT, CAST, ...) take the evaluated
//!   arguments of the current row
//! - **Aggregate functions** (AVG, COUNT, SUM, MIN, MAX, COLLECT) take every
//!   argument evaluated once per row of the current group
//! - **Analytic functions** (LAG, LATEST, CHANGED_COL, HAD_CHANGED, ACC_SUM, INC_COUNT, ...)
//!   take the current row's arguments together with their persisted [`FunctionState`]
//!
//! A [`FunctionRegistry`] is built once per rule and shared read-only. Names are
//! case-insensitive.

use super::analytic::{FunctionState, builtin_analytic_functions};
use crate::edgerule::sql::ast::Expr;
use crate::edgerule::sql::error::SqlError;
use crate::edgerule::sql::execution::types::FieldValue;
use crate::edgerule::sql::execution::utils::{FieldValueComparator, parse_datetime};
use base64::Engine;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// A function evaluated once per row
pub trait ScalarFunction: Send + Sync {
    fn name(&self) -> &str;

    /// Validate the argument count before evaluation
    fn check_args(&self, arg_count: usize) -> Result<(), SqlError>;

    fn invoke(&self, args: &[FieldValue]) -> Result<FieldValue, SqlError>;
}

/// A function evaluated over all rows of a group
pub trait AggregateFunction: Send + Sync {
    fn name(&self) -> &str;

    fn check_args(&self, arg_count: usize) -> Result<(), SqlError>;

    /// `args[i]` holds argument `i` evaluated for every row of the group, in row order
    fn invoke(&self, args: &[Vec<FieldValue>]) -> Result<FieldValue, SqlError>;
}

/// A function whose result depends on the rows seen before the current one
pub trait AnalyticFunction: Send + Sync {
    fn name(&self) -> &str;

    fn check_args(&self, arg_count: usize) -> Result<(), SqlError>;

    fn invoke(&self, args: &[FieldValue], state: &mut FunctionState) -> Result<FieldValue, SqlError>;
}

/// The role a registered function plays in evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Scalar,
    Aggregate,
    Analytic,
}

#[derive(Clone)]
enum RegisteredFunction {
    Scalar(Arc<dyn ScalarFunction>),
    Aggregate(Arc<dyn AggregateFunction>),
    Analytic(Arc<dyn AnalyticFunction>),
}

/// Name-keyed table of every function a rule may call
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, RegisteredFunction>,
}

impl FunctionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every builtin scalar, aggregate and analytic function
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for function in builtin_scalar_functions() {
            registry.register_scalar(function);
        }
        for function in builtin_aggregate_functions() {
            registry.register_aggregate(function);
        }
        for function in builtin_analytic_functions() {
            registry.register_analytic(function);
        }
        log::debug!("Function registry built with {} builtins", registry.len());
        registry
    }

    pub fn register_scalar(&mut self, function: impl ScalarFunction + 'static) {
        self.insert(RegisteredFunction::Scalar(Arc::new(function)));
    }

    pub fn register_aggregate(&mut self, function: impl AggregateFunction + 'static) {
        self.insert(RegisteredFunction::Aggregate(Arc::new(function)));
    }

    pub fn register_analytic(&mut self, function: impl AnalyticFunction + 'static) {
        self.insert(RegisteredFunction::Analytic(Arc::new(function)));
    }

    fn insert(&mut self, function: RegisteredFunction) {
        let name = match &function {
            RegisteredFunction::Scalar(f) => f.name().to_lowercase(),
            RegisteredFunction::Aggregate(f) => f.name().to_lowercase(),
            RegisteredFunction::Analytic(f) => f.name().to_lowercase(),
        };
        if self.functions.insert(name.clone(), function).is_some() {
            log::debug!("Function {} re-registered, previous definition replaced", name);
        }
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn kind(&self, name: &str) -> Option<FunctionKind> {
        self.functions
            .get(&name.to_lowercase())
            .map(|function| match function {
                RegisteredFunction::Scalar(_) => FunctionKind::Scalar,
                RegisteredFunction::Aggregate(_) => FunctionKind::Aggregate,
                RegisteredFunction::Analytic(_) => FunctionKind::Analytic,
            })
    }

    pub fn scalar(&self, name: &str) -> Option<&dyn ScalarFunction> {
        match self.functions.get(&name.to_lowercase()) {
            Some(RegisteredFunction::Scalar(f)) => Some(f.as_ref()),
            _ => None,
        }
    }

    pub fn aggregate(&self, name: &str) -> Option<&dyn AggregateFunction> {
        match self.functions.get(&name.to_lowercase()) {
            Some(RegisteredFunction::Aggregate(f)) => Some(f.as_ref()),
            _ => None,
        }
    }

    pub fn analytic(&self, name: &str) -> Option<&dyn AnalyticFunction> {
        match self.functions.get(&name.to_lowercase()) {
            Some(RegisteredFunction::Analytic(f)) => Some(f.as_ref()),
            _ => None,
        }
    }

    /// Whether `expr` calls an aggregate function anywhere
    pub fn contains_aggregate(&self, expr: &Expr) -> bool {
        let mut found = false;
        expr.walk(&mut |node: &Expr| {
            if let Expr::Function { name, .. } = node {
                if self.kind(name) == Some(FunctionKind::Aggregate) {
                    found = true;
                }
            }
        });
        found
    }
}

/// Reject a call whose argument count falls outside `min..=max`
pub fn check_arity(
    function: &str,
    arg_count: usize,
    min: usize,
    max: Option<usize>,
) -> Result<(), SqlError> {
    let too_many = max.is_some_and(|max| arg_count > max);
    if arg_count >= min && !too_many {
        return Ok(());
    }
    let expected = match max {
        Some(max) if max == min => format!("{}", min),
        Some(max) => format!("{} to {}", min, max),
        None => format!("at least {}", min),
    };
    Err(SqlError::ArgumentError {
        function: function.to_string(),
        message: format!("expect {} arguments but found {}", expected, arg_count),
    })
}

type ScalarFn = fn(&[FieldValue]) -> Result<FieldValue, SqlError>;
type AggregateFn = fn(&str, &[Vec<FieldValue>]) -> Result<FieldValue, SqlError>;

/// A builtin scalar function backed by a plain fn pointer
pub struct BuiltinScalar {
    name: &'static str,
    min_args: usize,
    max_args: Option<usize>,
    exec: ScalarFn,
}

impl ScalarFunction for BuiltinScalar {
    fn name(&self) -> &str {
        self.name
    }

    fn check_args(&self, arg_count: usize) -> Result<(), SqlError> {
        check_arity(self.name, arg_count, self.min_args, self.max_args)
    }

    fn invoke(&self, args: &[FieldValue]) -> Result<FieldValue, SqlError> {
        self.check_args(args.len())?;
        (self.exec)(args)
    }
}

/// A builtin aggregate function backed by a plain fn pointer
pub struct BuiltinAggregate {
    name: &'static str,
    exec: AggregateFn,
}

impl AggregateFunction for BuiltinAggregate {
    fn name(&self) -> &str {
        self.name
    }

    fn check_args(&self, arg_count: usize) -> Result<(), SqlError> {
        check_arity(self.name, arg_count, 1, Some(1))
    }

    fn invoke(&self, args: &[Vec<FieldValue>]) -> Result<FieldValue, SqlError> {
        self.check_args(args.len())?;
        (self.exec)(self.name, args)
    }
}

fn scalar(name: &'static str, min_args: usize, max_args: Option<usize>, exec: ScalarFn) -> BuiltinScalar {
    BuiltinScalar {
        name,
        min_args,
        max_args,
        exec,
    }
}

fn builtin_scalar_functions() -> Vec<BuiltinScalar> {
    vec![
        scalar("abs", 1, Some(1), abs_function),
        scalar("round", 1, Some(2), round_function),
        scalar("floor", 1, Some(1), floor_function),
        scalar("ceil", 1, Some(1), ceil_function),
        scalar("upper", 1, Some(1), upper_function),
        scalar("lower", 1, Some(1), lower_function),
        scalar("length", 1, Some(1), length_function),
        scalar("concat", 1, None, concat_function),
        scalar("coalesce", 1, None, coalesce_function),
        scalar("cast", 2, Some(2), cast_function),
        scalar("unnest", 1, Some(1), unnest_function),
    ]
}

fn builtin_aggregate_functions() -> Vec<BuiltinAggregate> {
    vec![
        BuiltinAggregate {
            name: "avg",
            exec: avg_function,
        },
        BuiltinAggregate {
            name: "count",
            exec: count_function,
        },
        BuiltinAggregate {
            name: "sum",
            exec: sum_function,
        },
        BuiltinAggregate {
            name: "min",
            exec: |name, args| extreme_function(name, args, Ordering::Less),
        },
        BuiltinAggregate {
            name: "max",
            exec: |name, args| extreme_function(name, args, Ordering::Greater),
        },
        BuiltinAggregate {
            name: "collect",
            exec: collect_function,
        },
    ]
}

fn numeric_type_error(value: &FieldValue) -> SqlError {
    SqlError::TypeError {
        expected: "numeric".to_string(),
        actual: value.type_name().to_string(),
        value: Some(value.to_string()),
    }
}

fn string_type_error(value: &FieldValue) -> SqlError {
    SqlError::TypeError {
        expected: "STRING".to_string(),
        actual: value.type_name().to_string(),
        value: Some(value.to_string()),
    }
}

// Math Functions

fn abs_function(args: &[FieldValue]) -> Result<FieldValue, SqlError> {
    match &args[0] {
        FieldValue::Integer(i) => Ok(FieldValue::Integer(i.wrapping_abs())),
        FieldValue::Float(f) => Ok(FieldValue::Float(f.abs())),
        FieldValue::Null => Ok(FieldValue::Null),
        other => Err(numeric_type_error(other)),
    }
}

fn round_function(args: &[FieldValue]) -> Result<FieldValue, SqlError> {
    let precision = match args.get(1) {
        None => 0,
        Some(FieldValue::Integer(p)) => i32::try_from(*p).map_err(|_| {
            SqlError::execution(format!("precision {} is out of range", p))
        })?,
        Some(FieldValue::Null) => return Ok(FieldValue::Null),
        Some(other) => {
            return Err(SqlError::TypeError {
                expected: "BIGINT precision".to_string(),
                actual: other.type_name().to_string(),
                value: Some(other.to_string()),
            });
        }
    };
    match &args[0] {
        FieldValue::Float(f) => {
            let multiplier = 10_f64.powi(precision);
            Ok(FieldValue::Float((f * multiplier).round() / multiplier))
        }
        FieldValue::Integer(i) => Ok(FieldValue::Integer(*i)), // Integers don't need rounding
        FieldValue::Null => Ok(FieldValue::Null),
        other => Err(numeric_type_error(other)),
    }
}

fn ceil_function(args: &[FieldValue]) -> Result<FieldValue, SqlError> {
    match &args[0] {
        FieldValue::Float(f) => Ok(FieldValue::Integer(f.ceil() as i64)),
        FieldValue::Integer(i) => Ok(FieldValue::Integer(*i)),
        FieldValue::Null => Ok(FieldValue::Null),
        other => Err(numeric_type_error(other)),
    }
}

fn floor_function(args: &[FieldValue]) -> Result<FieldValue, SqlError> {
    match &args[0] {
        FieldValue::Float(f) => Ok(FieldValue::Integer(f.floor() as i64)),
        FieldValue::Integer(i) => Ok(FieldValue::Integer(*i)),
        FieldValue::Null => Ok(FieldValue::Null),
        other => Err(numeric_type_error(other)),
    }
}

// String Functions

fn upper_function(args: &[FieldValue]) -> Result<FieldValue, SqlError> {
    match &args[0] {
        FieldValue::String(s) => Ok(FieldValue::String(s.to_uppercase())),
        FieldValue::Null => Ok(FieldValue::Null),
        other => Err(string_type_error(other)),
    }
}

fn lower_function(args: &[FieldValue]) -> Result<FieldValue, SqlError> {
    match &args[0] {
        FieldValue::String(s) => Ok(FieldValue::String(s.to_lowercase())),
        FieldValue::Null => Ok(FieldValue::Null),
        other => Err(string_type_error(other)),
    }
}

fn length_function(args: &[FieldValue]) -> Result<FieldValue, SqlError> {
    let len = match &args[0] {
        FieldValue::String(s) => s.chars().count(),
        FieldValue::Array(arr) => arr.len(),
        FieldValue::Map(map) => map.len(),
        FieldValue::Bytes(bytes) => bytes.len(),
        FieldValue::Null => return Ok(FieldValue::Null),
        other => return Err(string_type_error(other)),
    };
    Ok(FieldValue::Integer(len as i64))
}

fn concat_function(args: &[FieldValue]) -> Result<FieldValue, SqlError> {
    let mut result = String::new();
    for arg in args {
        if !arg.is_null() {
            result.push_str(&arg.to_string());
        }
    }
    Ok(FieldValue::String(result))
}

// Conversion Functions

fn coalesce_function(args: &[FieldValue]) -> Result<FieldValue, SqlError> {
    Ok(args
        .iter()
        .find(|arg| !arg.is_null())
        .cloned()
        .unwrap_or(FieldValue::Null))
}

fn cast_function(args: &[FieldValue]) -> Result<FieldValue, SqlError> {
    let target = match &args[1] {
        FieldValue::String(t) => t.to_lowercase(),
        other => return Err(string_type_error(other)),
    };
    let value = &args[0];
    if value.is_null() {
        return Ok(FieldValue::Null);
    }
    let failed = || SqlError::TypeError {
        expected: target.to_uppercase(),
        actual: value.type_name().to_string(),
        value: Some(value.to_string()),
    };
    match target.as_str() {
        "bigint" => match value {
            FieldValue::Integer(i) => Ok(FieldValue::Integer(*i)),
            FieldValue::Float(f) => FieldValue::float_to_bigint(*f)
                .map(FieldValue::Integer)
                .ok_or_else(failed),
            FieldValue::Boolean(b) => Ok(FieldValue::Integer(i64::from(*b))),
            FieldValue::String(s) => s
                .trim()
                .parse::<i64>()
                .ok()
                .or_else(|| s.trim().parse::<f64>().ok().and_then(FieldValue::float_to_bigint))
                .map(FieldValue::Integer)
                .ok_or_else(failed),
            FieldValue::Timestamp(_) => value.timestamp_millis().map(FieldValue::Integer).ok_or_else(failed),
            _ => Err(failed()),
        },
        "float" => match value {
            FieldValue::Integer(i) => Ok(FieldValue::Float(*i as f64)),
            FieldValue::Float(f) => Ok(FieldValue::Float(*f)),
            FieldValue::String(s) => s
                .trim()
                .parse::<f64>()
                .map(FieldValue::Float)
                .map_err(|_| failed()),
            _ => Err(failed()),
        },
        "string" => Ok(FieldValue::String(value.to_string())),
        "boolean" => match value {
            FieldValue::Boolean(b) => Ok(FieldValue::Boolean(*b)),
            FieldValue::Integer(i) => Ok(FieldValue::Boolean(*i != 0)),
            FieldValue::String(s) => parse_bool(s).map(FieldValue::Boolean).ok_or_else(failed),
            _ => Err(failed()),
        },
        "datetime" => match value {
            FieldValue::Timestamp(ts) => Ok(FieldValue::Timestamp(*ts)),
            FieldValue::Integer(i) => FieldValue::timestamp_from_millis(*i).ok_or_else(failed),
            FieldValue::String(s) => parse_datetime(s, None)
                .map(FieldValue::Timestamp)
                .map_err(|_| failed()),
            _ => Err(failed()),
        },
        "bytea" => match value {
            FieldValue::Bytes(b) => Ok(FieldValue::Bytes(b.clone())),
            FieldValue::String(s) => base64::engine::general_purpose::STANDARD
                .decode(s)
                .map(FieldValue::Bytes)
                .map_err(|_| failed()),
            _ => Err(failed()),
        },
        other => Err(SqlError::execution(format!("unknown cast type {}", other))),
    }
}

/// Parse the boolean spellings accepted for boolean columns
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "t" | "1" => Some(true),
        "false" | "f" | "0" => Some(false),
        _ => None,
    }
}

// Set-returning Functions

fn unnest_function(args: &[FieldValue]) -> Result<FieldValue, SqlError> {
    match &args[0] {
        FieldValue::Array(_) | FieldValue::Null => Ok(args[0].clone()),
        other => Err(SqlError::TypeError {
            expected: "ARRAY".to_string(),
            actual: other.type_name().to_string(),
            value: Some(other.to_string()),
        }),
    }
}

// Aggregate Functions

fn aggregate_error(name: &str, message: String) -> SqlError {
    SqlError::ArgumentError {
        function: name.to_string(),
        message,
    }
}

/// Integer or float total of the non-null values. Integers stay integers until a float shows up.
fn numeric_total(name: &str, values: &[&FieldValue]) -> Result<FieldValue, SqlError> {
    let mut int_total: i64 = 0;
    let mut float_total: Option<f64> = None;
    for value in values {
        match value {
            FieldValue::Integer(i) => match float_total.as_mut() {
                Some(total) => *total += *i as f64,
                None => {
                    int_total = int_total.checked_add(*i).ok_or_else(|| {
                        aggregate_error(name, "integer overflow".to_string())
                    })?;
                }
            },
            FieldValue::Float(f) => {
                let total = float_total.get_or_insert(int_total as f64);
                *total += f;
            }
            other => {
                return Err(aggregate_error(
                    name,
                    format!("found invalid arg {}({})", other.type_name(), other),
                ));
            }
        }
    }
    Ok(match float_total {
        Some(total) => FieldValue::Float(total),
        None => FieldValue::Integer(int_total),
    })
}

fn non_null(values: &[Vec<FieldValue>]) -> Vec<&FieldValue> {
    values
        .first()
        .map(|column| column.iter().filter(|v| !v.is_null()).collect())
        .unwrap_or_default()
}

fn avg_function(name: &str, args: &[Vec<FieldValue>]) -> Result<FieldValue, SqlError> {
    let values = non_null(args);
    if values.is_empty() {
        return Ok(FieldValue::Integer(0));
    }
    let count = values.len() as i64;
    match numeric_total(name, &values)? {
        FieldValue::Integer(total) => Ok(FieldValue::Integer(total / count)),
        FieldValue::Float(total) => Ok(FieldValue::Float(total / count as f64)),
        other => Err(numeric_type_error(&other)),
    }
}

fn count_function(_name: &str, args: &[Vec<FieldValue>]) -> Result<FieldValue, SqlError> {
    Ok(FieldValue::Integer(non_null(args).len() as i64))
}

fn sum_function(name: &str, args: &[Vec<FieldValue>]) -> Result<FieldValue, SqlError> {
    let column = args.first().map(Vec::as_slice).unwrap_or_default();
    let values = non_null(args);
    if values.is_empty() && !column.is_empty() {
        return Ok(FieldValue::Null);
    }
    numeric_total(name, &values)
}

fn extreme_function(
    name: &str,
    args: &[Vec<FieldValue>],
    wanted: Ordering,
) -> Result<FieldValue, SqlError> {
    let column = args.first().map(Vec::as_slice).unwrap_or_default();
    if column.is_empty() {
        return Err(aggregate_error(name, "empty data".to_string()));
    }
    let mut best: Option<&FieldValue> = None;
    for value in non_null(args) {
        best = match best {
            None => Some(value),
            Some(current) => match FieldValueComparator::ordering(value, current) {
                Some(ordering) if ordering == wanted => Some(value),
                Some(_) => Some(current),
                None => {
                    return Err(aggregate_error(
                        name,
                        format!("found invalid arg {}({})", value.type_name(), value),
                    ));
                }
            },
        };
    }
    Ok(best.cloned().unwrap_or(FieldValue::Null))
}

fn collect_function(_name: &str, args: &[Vec<FieldValue>]) -> Result<FieldValue, SqlError> {
    Ok(FieldValue::Array(args.first().cloned().unwrap_or_default()))
}
