//! Analytic functions and their per-rule state.
//!
//! Analytic functions (LAG, LATEST, CHANGED_COL, HAD_CHANGED, and the `acc_*` and
//! `inc_*` running aggregates) remember values across rows. Their memory lives in an [`AnalyticStateStore`] owned by the rule's
//! processor context, so two rules never share state and a rule can be reset by
//! clearing its store.

use super::functions::{AnalyticFunction, check_arity};
use super::incremental::{builtin_accumulating_functions, builtin_incremental_functions};
use crate::edgerule::sql::error::SqlError;
use crate::edgerule::sql::execution::types::FieldValue;
use crate::edgerule::sql::execution::utils::FieldValueComparator;
use std::collections::{HashMap, VecDeque};

/// Memory of one analytic call for one partition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionState {
    /// Ring of past values, used by `lag`
    pub history: VecDeque<FieldValue>,
    /// Whether `history` has been pre-filled
    pub initialised: bool,
    /// Named remembered values, used by `latest` and the change detectors
    pub slots: HashMap<String, FieldValue>,
    /// Result of the last evaluation that advanced the state
    pub last_result: Option<FieldValue>,
}

impl FunctionState {
    pub(crate) fn slot(&self, key: &str) -> &FieldValue {
        self.slots.get(key).unwrap_or(&FieldValue::Null)
    }
}

/// Identity of one analytic state: the call plus the evaluated partition values
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateKey {
    pub call_id: u32,
    pub partition: Option<Vec<String>>,
}

impl StateKey {
    pub fn new(call_id: u32, partition: Option<Vec<String>>) -> Self {
        Self { call_id, partition }
    }
}

/// State of every analytic call of one rule, keyed by call id and partition
#[derive(Debug, Clone, Default)]
pub struct AnalyticStateStore {
    states: HashMap<StateKey, FunctionState>,
}

impl AnalyticStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for `key`, created empty on first use
    pub fn state_mut(&mut self, key: &StateKey) -> &mut FunctionState {
        self.states.entry(key.clone()).or_default()
    }

    pub fn get(&self, key: &StateKey) -> Option<&FunctionState> {
        self.states.get(key)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn clear(&mut self) {
        log::debug!("Clearing {} analytic states", self.states.len());
        self.states.clear();
    }
}

pub(crate) type AnalyticFn = fn(&[FieldValue], &mut FunctionState) -> Result<FieldValue, SqlError>;

/// A builtin analytic function backed by a plain fn pointer
pub struct BuiltinAnalytic {
    name: &'static str,
    min_args: usize,
    max_args: Option<usize>,
    exec: AnalyticFn,
}

impl AnalyticFunction for BuiltinAnalytic {
    fn name(&self) -> &str {
        self.name
    }

    fn check_args(&self, arg_count: usize) -> Result<(), SqlError> {
        check_arity(self.name, arg_count, self.min_args, self.max_args)
    }

    fn invoke(&self, args: &[FieldValue], state: &mut FunctionState) -> Result<FieldValue, SqlError> {
        self.check_args(args.len())?;
        (self.exec)(args, state)
    }
}

impl BuiltinAnalytic {
    pub(crate) fn new(
        name: &'static str,
        min_args: usize,
        max_args: Option<usize>,
        exec: AnalyticFn,
    ) -> Self {
        Self {
            name,
            min_args,
            max_args,
            exec,
        }
    }
}

pub(crate) fn builtin_analytic_functions() -> Vec<BuiltinAnalytic> {
    let mut functions = vec![
        BuiltinAnalytic::new("lag", 1, Some(3), lag_function),
        BuiltinAnalytic::new("latest", 1, Some(2), latest_function),
        BuiltinAnalytic::new("changed_col", 2, Some(2), changed_col_function),
        BuiltinAnalytic::new("had_changed", 2, None, had_changed_function),
    ];
    functions.extend(builtin_accumulating_functions());
    functions.extend(builtin_incremental_functions());
    functions
}

fn ignore_null_flag(function: &str, value: &FieldValue) -> Result<bool, SqlError> {
    match value {
        FieldValue::Boolean(b) => Ok(*b),
        other => Err(SqlError::ArgumentError {
            function: function.to_string(),
            message: format!(
                "first argument must be a BOOLEAN ignore_null flag, found {}({})",
                other.type_name(),
                other
            ),
        }),
    }
}

/// `lag(expr[, offset[, default]])`: the value `offset` rows back, or `default`
/// until that many rows have been seen
fn lag_function(args: &[FieldValue], state: &mut FunctionState) -> Result<FieldValue, SqlError> {
    if !state.initialised {
        let offset = match args.get(1) {
            None => 1,
            Some(FieldValue::Integer(n)) if *n >= 0 => *n as usize,
            Some(other) => {
                return Err(SqlError::ArgumentError {
                    function: "lag".to_string(),
                    message: format!(
                        "offset must be a non-negative BIGINT, found {}({})",
                        other.type_name(),
                        other
                    ),
                });
            }
        };
        let default = args.get(2).cloned().unwrap_or(FieldValue::Null);
        state.history = std::iter::repeat_n(default, offset).collect();
        state.initialised = true;
    }
    state.history.push_back(args[0].clone());
    Ok(state.history.pop_front().unwrap_or(FieldValue::Null))
}

/// `latest(expr[, default])`: the last non-null value seen
fn latest_function(args: &[FieldValue], state: &mut FunctionState) -> Result<FieldValue, SqlError> {
    if args[0].is_null() {
        return Ok(state
            .slots
            .get("latest")
            .or(args.get(1))
            .cloned()
            .unwrap_or(FieldValue::Null));
    }
    state.slots.insert("latest".to_string(), args[0].clone());
    Ok(args[0].clone())
}

/// `changed_col(ignore_null, expr)`: the value when it differs from the previous one, else null
fn changed_col_function(
    args: &[FieldValue],
    state: &mut FunctionState,
) -> Result<FieldValue, SqlError> {
    let ignore_null = ignore_null_flag("changed_col", &args[0])?;
    let value = &args[1];
    if ignore_null && value.is_null() {
        return Ok(FieldValue::Null);
    }
    if FieldValueComparator::values_equal(state.slot("last"), value) {
        return Ok(FieldValue::Null);
    }
    state.slots.insert("last".to_string(), value.clone());
    Ok(value.clone())
}

/// `had_changed(ignore_null, expr...)`: whether any argument differs from its previous value
fn had_changed_function(
    args: &[FieldValue],
    state: &mut FunctionState,
) -> Result<FieldValue, SqlError> {
    let ignore_null = ignore_null_flag("had_changed", &args[0])?;
    let mut changed = false;
    for (index, value) in args.iter().enumerate().skip(1) {
        if ignore_null && value.is_null() {
            continue;
        }
        let key = index.to_string();
        if !FieldValueComparator::values_equal(state.slot(&key), value) {
            state.slots.insert(key, value.clone());
            changed = true;
        }
    }
    Ok(FieldValue::Boolean(changed))
}
