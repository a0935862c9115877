//! Expression evaluator for SQL expressions.
//!
//! This module implements the core expression evaluation logic that processes
//! SQL expressions against rows, join tuples and groups. Names resolve through a
//! [`MultiValuer`]; calls dispatch through a [`FunctionRegistry`].

use super::functions::FunctionRegistry;
use super::valuer::{AggregateData, MultiValuer};
use crate::edgerule::sql::ast::{BinaryOperator, Expr, LiteralValue, UnaryOperator, split_column};
use crate::edgerule::sql::error::SqlError;
use crate::edgerule::sql::execution::types::FieldValue;
use crate::edgerule::sql::execution::utils::FieldValueComparator;

/// Evaluates expressions against one valuer chain
pub struct ExpressionEvaluator<'a> {
    valuer: MultiValuer<'a>,
    registry: &'a FunctionRegistry,
    aggregate: Option<&'a dyn AggregateData>,
}

impl<'a> ExpressionEvaluator<'a> {
    pub fn new(valuer: MultiValuer<'a>, registry: &'a FunctionRegistry) -> Self {
        Self {
            valuer,
            registry,
            aggregate: None,
        }
    }

    /// Make aggregate functions available, evaluated over the rows of `data`
    pub fn with_aggregate(mut self, data: &'a dyn AggregateData) -> Self {
        self.aggregate = Some(data);
        self
    }

    /// Evaluate an expression to a value
    pub fn evaluate(&self, expr: &Expr) -> Result<FieldValue, SqlError> {
        match expr {
            Expr::Literal(literal) => Ok(literal_value(literal)),
            Expr::Column(name) => Ok(self.column_value(name)),
            Expr::Meta(name) => {
                let (stream, key) = split_column(name);
                Ok(self
                    .valuer
                    .meta(key, stream)
                    .or_else(|| stream.and_then(|_| self.valuer.meta(name, None)))
                    .unwrap_or(FieldValue::Null))
            }
            Expr::Wildcard(stream) => Ok(self
                .valuer
                .wildcard(stream.as_deref())
                .map(FieldValue::Map)
                .unwrap_or(FieldValue::Null)),
            Expr::BinaryOp { left, op, right } => self.evaluate_binary(left, *op, right),
            Expr::UnaryOp { op, expr } => self.evaluate_unary(*op, expr),
            Expr::Function { name, args } => self.evaluate_call(name, args),
            Expr::Analytic(call) => self.valuer.value(&call.cache_key(), None).ok_or_else(|| {
                SqlError::structural(format!(
                    "analytic function {} was referenced before it was calculated",
                    call.name
                ))
            }),
            Expr::Case {
                operand,
                when_clauses,
                else_clause,
            } => self.evaluate_case(operand.as_deref(), when_clauses, else_clause.as_deref()),
            Expr::List(items) => items
                .iter()
                .map(|item| self.evaluate(item))
                .collect::<Result<Vec<_>, _>>()
                .map(FieldValue::Array),
            Expr::FieldAccess { expr, field } => match self.evaluate(expr)? {
                FieldValue::Map(map) => Ok(map.get(field).cloned().unwrap_or(FieldValue::Null)),
                FieldValue::Null => Ok(FieldValue::Null),
                other => Err(SqlError::TypeError {
                    expected: "STRUCT".to_string(),
                    actual: other.type_name().to_string(),
                    value: Some(other.to_string()),
                }),
            },
            Expr::Index { expr, index } => self.evaluate_index(expr, index),
            Expr::Slice { expr, start, end } => {
                self.evaluate_slice(expr, start.as_deref(), end.as_deref())
            }
        }
    }

    /// Evaluate a predicate. NULL counts as false; any other non-boolean is an error.
    pub fn evaluate_condition(&self, expr: &Expr) -> Result<bool, SqlError> {
        match self.evaluate(expr)? {
            FieldValue::Boolean(b) => Ok(b),
            FieldValue::Null => Ok(false),
            other => Err(SqlError::TypeError {
                expected: "BOOLEAN".to_string(),
                actual: other.type_name().to_string(),
                value: Some(other.to_string()),
            }),
        }
    }

    fn column_value(&self, name: &str) -> FieldValue {
        let (stream, column) = split_column(name);
        if let Some(value) = self.valuer.value(column, stream) {
            return value;
        }
        // A dotted name may be a plain column such as `a.b`
        if stream.is_some() {
            if let Some(value) = self.valuer.value(name, None) {
                return value;
            }
        }
        log::trace!("Column {} resolved to NULL", name);
        FieldValue::Null
    }

    fn evaluate_binary(
        &self,
        left: &Expr,
        op: BinaryOperator,
        right: &Expr,
    ) -> Result<FieldValue, SqlError> {
        match op {
            BinaryOperator::And | BinaryOperator::Or => {
                let l = self.evaluate(left)?;
                let l_bool = logical_operand(&l, &FieldValue::Null, op)?;
                // Short-circuit
                if (op == BinaryOperator::And && !l_bool) || (op == BinaryOperator::Or && l_bool) {
                    return Ok(FieldValue::Boolean(l_bool));
                }
                let r = self.evaluate(right)?;
                Ok(FieldValue::Boolean(logical_operand(&r, &l, op)?))
            }
            BinaryOperator::In | BinaryOperator::NotIn => {
                let l = self.evaluate(left)?;
                let r = self.evaluate(right)?;
                let items = match &r {
                    FieldValue::Array(items) => items,
                    _ => return Err(FieldValueComparator::invalid_operation(&l, &r, op)),
                };
                if l.is_null() {
                    return Ok(FieldValue::Boolean(false));
                }
                let found = items
                    .iter()
                    .any(|item| FieldValueComparator::values_equal_with_coercion(&l, item));
                Ok(FieldValue::Boolean(found == (op == BinaryOperator::In)))
            }
            _ if op.is_comparison() => {
                let l = self.evaluate(left)?;
                let r = self.evaluate(right)?;
                FieldValueComparator::compare_values_for_boolean(&l, &r, op).map(FieldValue::Boolean)
            }
            _ => {
                let l = self.evaluate(left)?;
                let r = self.evaluate(right)?;
                arithmetic(&l, &r, op)
            }
        }
    }

    fn evaluate_unary(&self, op: UnaryOperator, expr: &Expr) -> Result<FieldValue, SqlError> {
        let value = self.evaluate(expr)?;
        match (op, value) {
            (UnaryOperator::IsNull, v) => Ok(FieldValue::Boolean(v.is_null())),
            (UnaryOperator::IsNotNull, v) => Ok(FieldValue::Boolean(!v.is_null())),
            (_, FieldValue::Null) => Ok(FieldValue::Null),
            (UnaryOperator::Not, FieldValue::Boolean(b)) => Ok(FieldValue::Boolean(!b)),
            (UnaryOperator::Minus, FieldValue::Integer(i)) => i
                .checked_neg()
                .map(FieldValue::Integer)
                .ok_or_else(|| SqlError::execution(format!("integer overflow negating {}", i))),
            (UnaryOperator::Minus, FieldValue::Float(f)) => Ok(FieldValue::Float(-f)),
            (UnaryOperator::Not, other) => Err(SqlError::TypeError {
                expected: "BOOLEAN".to_string(),
                actual: other.type_name().to_string(),
                value: Some(other.to_string()),
            }),
            (UnaryOperator::Minus, other) => Err(SqlError::TypeError {
                expected: "numeric".to_string(),
                actual: other.type_name().to_string(),
                value: Some(other.to_string()),
            }),
        }
    }

    fn evaluate_case(
        &self,
        operand: Option<&Expr>,
        when_clauses: &[(Expr, Expr)],
        else_clause: Option<&Expr>,
    ) -> Result<FieldValue, SqlError> {
        let operand = operand.map(|o| self.evaluate(o)).transpose()?;
        for (condition, result) in when_clauses {
            let matched = match &operand {
                Some(value) => {
                    let candidate = self.evaluate(condition)?;
                    FieldValueComparator::compare_values_for_boolean(
                        value,
                        &candidate,
                        BinaryOperator::Equal,
                    )?
                }
                None => self.evaluate_condition(condition)?,
            };
            if matched {
                return self.evaluate(result);
            }
        }
        match else_clause {
            Some(expr) => self.evaluate(expr),
            None => Ok(FieldValue::Null),
        }
    }

    fn evaluate_index(&self, expr: &Expr, index: &Expr) -> Result<FieldValue, SqlError> {
        let target = self.evaluate(expr)?;
        let index = self.evaluate(index)?;
        match (&target, &index) {
            (FieldValue::Null, _) | (_, FieldValue::Null) => Ok(FieldValue::Null),
            (FieldValue::Array(items), FieldValue::Integer(i)) => {
                let position = resolve_position(*i, items.len());
                position
                    .filter(|p| *p < items.len())
                    .map(|p| items[p].clone())
                    .ok_or_else(|| {
                        SqlError::execution(format!("out of index: {} of {}", i, items.len()))
                    })
            }
            (FieldValue::Map(map), FieldValue::String(key)) => {
                Ok(map.get(key).cloned().unwrap_or(FieldValue::Null))
            }
            _ => Err(SqlError::TypeError {
                expected: "ARRAY".to_string(),
                actual: target.type_name().to_string(),
                value: Some(target.to_string()),
            }),
        }
    }

    fn evaluate_slice(
        &self,
        expr: &Expr,
        start: Option<&Expr>,
        end: Option<&Expr>,
    ) -> Result<FieldValue, SqlError> {
        let items = match self.evaluate(expr)? {
            FieldValue::Array(items) => items,
            FieldValue::Null => return Ok(FieldValue::Null),
            other => {
                return Err(SqlError::TypeError {
                    expected: "ARRAY".to_string(),
                    actual: other.type_name().to_string(),
                    value: Some(other.to_string()),
                });
            }
        };
        let len = items.len();
        let bound = |bound: Option<&Expr>, default: usize| -> Result<usize, SqlError> {
            match bound.map(|b| self.evaluate(b)).transpose()? {
                None => Ok(default),
                Some(FieldValue::Integer(i)) => Ok(resolve_position(i, len).unwrap_or(0).min(len)),
                Some(other) => Err(SqlError::TypeError {
                    expected: "BIGINT".to_string(),
                    actual: other.type_name().to_string(),
                    value: Some(other.to_string()),
                }),
            }
        };
        let from = bound(start, 0)?;
        let to = bound(end, len)?;
        if from > to {
            return Err(SqlError::execution(format!(
                "start index {} is larger than end index {}",
                from, to
            )));
        }
        Ok(FieldValue::Array(items[from..to].to_vec()))
    }

    fn evaluate_call(&self, name: &str, args: &[Expr]) -> Result<FieldValue, SqlError> {
        if args.is_empty() {
            if let Some(value) = self.valuer.func_value(name) {
                return Ok(value);
            }
        }

        if let Some(function) = self.registry.scalar(name) {
            function.check_args(args.len())?;
            let values = args
                .iter()
                .map(|arg| self.evaluate(arg))
                .collect::<Result<Vec<_>, _>>()?;
            return function.invoke(&values);
        }

        if let Some(function) = self.registry.aggregate(name) {
            function.check_args(args.len())?;
            let data = self.aggregate.ok_or_else(|| {
                SqlError::structural(format!(
                    "aggregate function {} is not allowed outside an aggregate context",
                    name
                ))
            })?;
            let rows = data.aggregate_rows();
            let mut columns = vec![Vec::with_capacity(rows.len()); args.len()];
            for row in rows {
                let row_evaluator = ExpressionEvaluator::new(
                    MultiValuer::for_row(row, self.valuer.window_range()),
                    self.registry,
                );
                for (column, arg) in columns.iter_mut().zip(args) {
                    column.push(row_evaluator.evaluate(arg)?);
                }
            }
            return function.invoke(&columns);
        }

        if self.registry.analytic(name).is_some() {
            return Err(SqlError::structural(format!(
                "analytic function {} must be calculated by the analytic operator",
                name
            )));
        }

        Err(SqlError::UnknownFunction {
            name: name.to_string(),
        })
    }
}

fn literal_value(literal: &LiteralValue) -> FieldValue {
    match literal {
        LiteralValue::String(s) => FieldValue::String(s.clone()),
        LiteralValue::Integer(i) => FieldValue::Integer(*i),
        LiteralValue::Float(f) => FieldValue::Float(*f),
        LiteralValue::Boolean(b) => FieldValue::Boolean(*b),
        LiteralValue::Null => FieldValue::Null,
    }
}

/// Boolean value of an AND / OR operand; NULL reads as false
fn logical_operand(
    value: &FieldValue,
    other: &FieldValue,
    op: BinaryOperator,
) -> Result<bool, SqlError> {
    match value {
        FieldValue::Boolean(b) => Ok(*b),
        FieldValue::Null => Ok(false),
        _ => Err(FieldValueComparator::invalid_operation(value, other, op)),
    }
}

/// Index from the front, or from the back when negative
fn resolve_position(index: i64, len: usize) -> Option<usize> {
    if index >= 0 {
        usize::try_from(index).ok()
    } else {
        len.checked_sub(usize::try_from(index.unsigned_abs()).ok()?)
    }
}

fn arithmetic(left: &FieldValue, right: &FieldValue, op: BinaryOperator) -> Result<FieldValue, SqlError> {
    match (left, right) {
        (FieldValue::Null, _) | (_, FieldValue::Null) => Ok(FieldValue::Null),
        (FieldValue::Integer(a), FieldValue::Integer(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                BinaryOperator::Add => a.checked_add(b),
                BinaryOperator::Subtract => a.checked_sub(b),
                BinaryOperator::Multiply => a.checked_mul(b),
                BinaryOperator::Divide | BinaryOperator::Modulo if b == 0 => {
                    return Err(SqlError::DivisionByZero);
                }
                BinaryOperator::Divide => a.checked_div(b),
                BinaryOperator::Modulo => a.checked_rem(b),
                _ => return Err(FieldValueComparator::invalid_operation(left, right, op)),
            };
            result
                .map(FieldValue::Integer)
                .ok_or_else(|| SqlError::execution(format!("integer overflow in {} {} {}", a, op, b)))
        }
        (FieldValue::Integer(_) | FieldValue::Float(_), FieldValue::Integer(_) | FieldValue::Float(_)) => {
            let a = left.as_f64().unwrap_or_default();
            let b = right.as_f64().unwrap_or_default();
            match op {
                BinaryOperator::Add => Ok(FieldValue::Float(a + b)),
                BinaryOperator::Subtract => Ok(FieldValue::Float(a - b)),
                BinaryOperator::Multiply => Ok(FieldValue::Float(a * b)),
                BinaryOperator::Divide | BinaryOperator::Modulo if b == 0.0 => Err(SqlError::DivisionByZero),
                BinaryOperator::Divide => Ok(FieldValue::Float(a / b)),
                BinaryOperator::Modulo => Ok(FieldValue::Float(a % b)),
                _ => Err(FieldValueComparator::invalid_operation(left, right, op)),
            }
        }
        _ => Err(FieldValueComparator::invalid_operation(left, right, op)),
    }
}
