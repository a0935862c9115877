//! Analytic function calculation
//!
//! Analytic calls are calculated once per row, before any operator that reads
//! them. Each result is cached on the row as a calculated column, so later
//! evaluation of the same call is a plain lookup.

use super::{Operator, ProcessorContext};
use crate::edgerule::sql::SqlError;
use crate::edgerule::sql::ast::AnalyticCall;
use crate::edgerule::sql::execution::collection::{Collection, TupleRow, WindowRange};
use crate::edgerule::sql::execution::expression::{
    AnalyticStateStore, ExpressionEvaluator, FunctionRegistry, MultiValuer, StateKey,
};
use crate::edgerule::sql::execution::{FieldValue, StreamData};

/// Calculates the analytic calls of a rule on every row
pub struct AnalyticFuncsOperator {
    /// Calls found in the SELECT list, calculated first
    field_funcs: Vec<AnalyticCall>,
    /// Calls found in other clauses
    funcs: Vec<AnalyticCall>,
}

impl AnalyticFuncsOperator {
    /// Create the operator from the calls of the SELECT list and of the other clauses
    pub fn new(field_funcs: Vec<AnalyticCall>, funcs: Vec<AnalyticCall>) -> Self {
        Self { field_funcs, funcs }
    }

    /// Calculate every call on one row and cache each result on it
    fn calculate_row(
        &self,
        registry: &FunctionRegistry,
        store: &mut AnalyticStateStore,
        row: &mut dyn TupleRow,
        window_range: Option<&WindowRange>,
    ) -> Result<(), SqlError> {
        for call in self.field_funcs.iter().chain(&self.funcs) {
            let result = calculate_call(call, registry, store, &*row, window_range)?;
            log::trace!("Analytic {} = {}", call.cache_key(), result);
            row.set(&call.cache_key(), result);
        }
        Ok(())
    }

    fn calculate_collection(
        &self,
        registry: &FunctionRegistry,
        store: &mut AnalyticStateStore,
        collection: &mut dyn Collection,
    ) -> Result<(), SqlError> {
        let window_range = collection.window_range().copied();
        collection.range_mut(&mut |_, row| {
            self.calculate_row(registry, store, row, window_range.as_ref())?;
            Ok(true)
        })
    }
}

/// Calculate one call against its partition's state
///
/// # Arguments
///
/// * `call` - The analytic call with its partition and WHEN clause
/// * `registry` - Registry resolving the call's function
/// * `store` - Per-rule state, keyed by call id and partition values
/// * `row` - Row the arguments are evaluated against
/// * `window_range` - Bounds of the enclosing window, if any
///
/// # Returns
///
/// The new result, or the partition's previous result when the WHEN
/// clause is false
fn calculate_call(
    call: &AnalyticCall,
    registry: &FunctionRegistry,
    store: &mut AnalyticStateStore,
    row: &dyn TupleRow,
    window_range: Option<&WindowRange>,
) -> Result<FieldValue, SqlError> {
    let evaluator = ExpressionEvaluator::new(MultiValuer::for_row(row.as_valuer(), window_range), registry);

    let partition = if call.partition_by.is_empty() {
        None
    } else {
        let values = call
            .partition_by
            .iter()
            .map(|expr| evaluator.evaluate(expr).map(|value| value.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        Some(values)
    };
    let state_key = StateKey::new(call.id, partition);

    if let Some(when) = &call.when {
        if !evaluator.evaluate_condition(when)? {
            return Ok(store
                .get(&state_key)
                .and_then(|state| state.last_result.clone())
                .unwrap_or(FieldValue::Null));
        }
    }

    let function = registry
        .analytic(&call.name)
        .ok_or_else(|| SqlError::UnknownFunction {
            name: call.name.clone(),
        })?;
    function.check_args(call.args.len())?;
    let args = call
        .args
        .iter()
        .map(|arg| evaluator.evaluate(arg))
        .collect::<Result<Vec<_>, _>>()?;

    let state = store.state_mut(&state_key);
    let result = function.invoke(&args, state)?;
    state.last_result = Some(result.clone());
    Ok(result)
}

impl Operator for AnalyticFuncsOperator {
    fn name(&self) -> &str {
        "analytic"
    }

    fn process(
        &self,
        context: &mut ProcessorContext,
        mut data: StreamData,
    ) -> Result<Option<StreamData>, SqlError> {
        let ProcessorContext {
            registry,
            analytic_state,
            ..
        } = context;
        let registry = registry.as_ref();
        match &mut data {
            StreamData::Record(record) => {
                self.calculate_row(registry, analytic_state, record, None)?;
            }
            StreamData::Window(batch) => self.calculate_collection(registry, analytic_state, batch)?,
            StreamData::Join(result) => self.calculate_collection(registry, analytic_state, result)?,
            other => {
                return Err(SqlError::structural(format!(
                    "analytic functions cannot be calculated on a {}",
                    other.kind()
                )));
            }
        }
        Ok(Some(data))
    }
}
