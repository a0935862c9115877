//! Running aggregates over the rows seen so far.
//!
//! Two families keep a running aggregate in the call's [`FunctionState`]:
//! - `acc_*` accumulate across the whole life of the rule, usually scoped by
//!   `PARTITION BY` and gated by `WHEN`. Results are floats, except `acc_count`.
//! - `inc_*` back incremental aggregation: each row folds into the state and the
//!   current aggregate is returned, so a per-row HAVING can test it. A NULL
//!   argument yields NULL and leaves the state untouched.

use super::analytic::{AnalyticFn, BuiltinAnalytic, FunctionState};
use crate::edgerule::sql::error::SqlError;
use crate::edgerule::sql::execution::types::FieldValue;
use crate::edgerule::sql::execution::utils::FieldValueComparator;
use std::cmp::Ordering;

pub(crate) fn builtin_accumulating_functions() -> Vec<BuiltinAnalytic> {
    let one: fn(&'static str, AnalyticFn) -> BuiltinAnalytic =
        |name, exec| BuiltinAnalytic::new(name, 1, Some(1), exec);
    vec![
        one("acc_sum", acc_sum_function),
        one("acc_avg", acc_avg_function),
        one("acc_max", |args, state| acc_extreme_function("acc_max", args, state, f64::max)),
        one("acc_min", |args, state| acc_extreme_function("acc_min", args, state, f64::min)),
        BuiltinAnalytic::new("acc_count", 1, Some(3), acc_count_function),
    ]
}

pub(crate) fn builtin_incremental_functions() -> Vec<BuiltinAnalytic> {
    let one: fn(&'static str, AnalyticFn) -> BuiltinAnalytic =
        |name, exec| BuiltinAnalytic::new(name, 1, Some(1), exec);
    vec![
        one("inc_count", inc_count_function),
        one("inc_sum", inc_sum_function),
        one("inc_avg", inc_avg_function),
        one("inc_max", |args, state| inc_extreme_function("inc_max", args, state, Ordering::Greater)),
        one("inc_min", |args, state| inc_extreme_function("inc_min", args, state, Ordering::Less)),
        one("inc_collect", inc_collect_function),
        one("inc_merge_agg", inc_merge_agg_function),
        BuiltinAnalytic::new("inc_last_value", 2, Some(2), inc_last_value_function),
    ]
}

fn argument_error(function: &str, message: String) -> SqlError {
    SqlError::ArgumentError {
        function: function.to_string(),
        message,
    }
}

fn number(function: &str, value: &FieldValue) -> Result<f64, SqlError> {
    value.as_f64().ok_or_else(|| {
        argument_error(
            function,
            format!("the value should be number, found {}({})", value.type_name(), value),
        )
    })
}

fn flag(function: &str, value: &FieldValue, name: &str) -> Result<bool, SqlError> {
    match value {
        FieldValue::Boolean(b) => Ok(*b),
        other => Err(argument_error(
            function,
            format!("{} should be BOOLEAN, found {}({})", name, other.type_name(), other),
        )),
    }
}

fn float_slot(state: &FunctionState, key: &str) -> f64 {
    state.slot(key).as_f64().unwrap_or(0.0)
}

fn count_slot(state: &FunctionState, key: &str) -> i64 {
    match state.slot(key) {
        FieldValue::Integer(count) => *count,
        _ => 0,
    }
}

// Accumulating functions

fn acc_sum_function(args: &[FieldValue], state: &mut FunctionState) -> Result<FieldValue, SqlError> {
    let mut total = float_slot(state, "sum");
    if !args[0].is_null() {
        total += number("acc_sum", &args[0])?;
        state.slots.insert("sum".to_string(), FieldValue::Float(total));
    }
    Ok(FieldValue::Float(total))
}

fn acc_avg_function(args: &[FieldValue], state: &mut FunctionState) -> Result<FieldValue, SqlError> {
    if !args[0].is_null() {
        let value = number("acc_avg", &args[0])?;
        let count = count_slot(state, "count") + 1;
        let total = float_slot(state, "sum") + value;
        state.slots.insert("count".to_string(), FieldValue::Integer(count));
        state.slots.insert("sum".to_string(), FieldValue::Float(total));
    }
    let count = count_slot(state, "count");
    if count == 0 {
        return Ok(FieldValue::Float(0.0));
    }
    Ok(FieldValue::Float(float_slot(state, "sum") / count as f64))
}

fn acc_extreme_function(
    function: &str,
    args: &[FieldValue],
    state: &mut FunctionState,
    pick: fn(f64, f64) -> f64,
) -> Result<FieldValue, SqlError> {
    if args[0].is_null() {
        return Ok(state.slot("extreme").clone());
    }
    let value = number(function, &args[0])?;
    let extreme = match state.slot("extreme").as_f64() {
        Some(current) => pick(current, value),
        None => value,
    };
    state.slots.insert("extreme".to_string(), FieldValue::Float(extreme));
    Ok(FieldValue::Float(extreme))
}

/// `acc_count(expr[, on_begin, on_reset])`
///
/// With conditions, counting only happens between a row where `on_begin` holds
/// and the next row where `on_reset` holds; the count restarts at every begin.
fn acc_count_function(args: &[FieldValue], state: &mut FunctionState) -> Result<FieldValue, SqlError> {
    let counted = !args[0].is_null();
    let mut count = count_slot(state, "count");
    match args.len() {
        1 => {
            if counted {
                count += 1;
            }
        }
        3 => {
            let on_begin = flag("acc_count", &args[1], "on_begin")?;
            let on_reset = flag("acc_count", &args[2], "on_reset")?;
            let mut begun = matches!(state.slot("begun"), FieldValue::Boolean(true));
            if !begun {
                count = 0;
                if on_begin {
                    begun = true;
                }
            }
            if begun && counted {
                count += 1;
            }
            if on_reset {
                begun = false;
            }
            state.slots.insert("begun".to_string(), FieldValue::Boolean(begun));
        }
        other => {
            return Err(argument_error(
                "acc_count",
                format!("expect 1 or 3 arguments but found {}", other),
            ));
        }
    }
    state.slots.insert("count".to_string(), FieldValue::Integer(count));
    Ok(FieldValue::Integer(count))
}

// Incremental aggregate functions

fn inc_count_function(args: &[FieldValue], state: &mut FunctionState) -> Result<FieldValue, SqlError> {
    if args[0].is_null() {
        return Ok(FieldValue::Null);
    }
    let count = count_slot(state, "count") + 1;
    state.slots.insert("count".to_string(), FieldValue::Integer(count));
    Ok(FieldValue::Integer(count))
}

/// Numeric value of an `inc_sum`/`inc_avg` argument; numeric strings are accepted
fn to_float(function: &str, value: &FieldValue) -> Result<f64, SqlError> {
    match value {
        FieldValue::String(s) => s.trim().parse::<f64>().map_err(|_| {
            argument_error(function, format!("cannot convert STRING({}) to float", s))
        }),
        other => number(function, other),
    }
}

fn inc_sum_function(args: &[FieldValue], state: &mut FunctionState) -> Result<FieldValue, SqlError> {
    if args[0].is_null() {
        return Ok(FieldValue::Null);
    }
    let total = float_slot(state, "sum") + to_float("inc_sum", &args[0])?;
    state.slots.insert("sum".to_string(), FieldValue::Float(total));
    Ok(FieldValue::Float(total))
}

fn inc_avg_function(args: &[FieldValue], state: &mut FunctionState) -> Result<FieldValue, SqlError> {
    if args[0].is_null() {
        return Ok(FieldValue::Null);
    }
    let value = to_float("inc_avg", &args[0])?;
    let count = count_slot(state, "count") + 1;
    let total = float_slot(state, "sum") + value;
    state.slots.insert("count".to_string(), FieldValue::Integer(count));
    state.slots.insert("sum".to_string(), FieldValue::Float(total));
    Ok(FieldValue::Float(total / count as f64))
}

fn inc_extreme_function(
    function: &str,
    args: &[FieldValue],
    state: &mut FunctionState,
    wanted: Ordering,
) -> Result<FieldValue, SqlError> {
    let value = &args[0];
    if value.is_null() {
        return Ok(FieldValue::Null);
    }
    let current = state.slot("extreme");
    let replace = if current.is_null() {
        true
    } else {
        match FieldValueComparator::ordering(value, current) {
            Some(ordering) => ordering == wanted,
            None => {
                return Err(argument_error(
                    function,
                    format!("found invalid arg {}({})", value.type_name(), value),
                ));
            }
        }
    };
    if replace {
        state.slots.insert("extreme".to_string(), value.clone());
    }
    Ok(state.slot("extreme").clone())
}

fn inc_collect_function(args: &[FieldValue], state: &mut FunctionState) -> Result<FieldValue, SqlError> {
    if args[0].is_null() {
        return Ok(FieldValue::Null);
    }
    let entry = state
        .slots
        .entry("items".to_string())
        .or_insert_with(|| FieldValue::Array(Vec::new()));
    if let FieldValue::Array(items) = &mut *entry {
        items.push(args[0].clone());
    }
    Ok(entry.clone())
}

fn inc_merge_agg_function(args: &[FieldValue], state: &mut FunctionState) -> Result<FieldValue, SqlError> {
    let incoming = match &args[0] {
        FieldValue::Null => return Ok(FieldValue::Null),
        FieldValue::Map(map) => map,
        other => {
            return Err(argument_error(
                "inc_merge_agg",
                format!("argument should be STRUCT, found {}({})", other.type_name(), other),
            ));
        }
    };
    let entry = state
        .slots
        .entry("merged".to_string())
        .or_insert_with(|| FieldValue::Map(Default::default()));
    if let FieldValue::Map(merged) = &mut *entry {
        merged.extend(incoming.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    Ok(entry.clone())
}

/// `inc_last_value(expr, ignore_null)`: the latest value, or the latest non-null one when ignoring nulls
fn inc_last_value_function(
    args: &[FieldValue],
    state: &mut FunctionState,
) -> Result<FieldValue, SqlError> {
    let ignore_null = flag("inc_last_value", &args[1], "ignore_null")?;
    if args[0].is_null() {
        return Ok(if ignore_null {
            state.slot("last").clone()
        } else {
            FieldValue::Null
        });
    }
    state.slots.insert("last".to_string(), args[0].clone());
    Ok(args[0].clone())
}
