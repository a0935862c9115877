//! Rank-style window functions such as `row_number()`
//!
//! Numbering restarts for every window batch, join result and group. Inside
//! one collection each call keeps its own counter per partition.

use super::{Operator, ProcessorContext};
use crate::edgerule::sql::SqlError;
use crate::edgerule::sql::ast::WindowRankCall;
use crate::edgerule::sql::execution::collection::{Collection, TupleRow, WindowRange};
use crate::edgerule::sql::execution::expression::{ExpressionEvaluator, FunctionRegistry, MultiValuer};
use crate::edgerule::sql::execution::{FieldValue, StreamData};
use std::collections::HashMap;

/// Writes each row's position within its partition to the call's output field
pub struct WindowRankOperator {
    calls: Vec<WindowRankCall>,
}

impl WindowRankOperator {
    /// Create the operator, rejecting any call other than `row_number`
    pub fn new(calls: Vec<WindowRankCall>) -> Result<Self, SqlError> {
        for call in &calls {
            if !call.name.eq_ignore_ascii_case("row_number") {
                return Err(SqlError::UnknownFunction {
                    name: call.name.clone(),
                });
            }
        }
        Ok(Self { calls })
    }

    fn number_collection(&self, registry: &FunctionRegistry, collection: &mut dyn Collection) -> Result<(), SqlError> {
        let window_range = collection.window_range().copied();
        let mut numbering = Numbering::new(self, registry, window_range.as_ref());
        collection.range_mut(&mut |_, row| {
            numbering.number(row)?;
            Ok(true)
        })
    }
}

/// Running positions of every call, one counter per partition key
struct Numbering<'a> {
    calls: &'a [WindowRankCall],
    registry: &'a FunctionRegistry,
    window_range: Option<&'a WindowRange>,
    positions: Vec<HashMap<Vec<String>, i64>>,
}

impl<'a> Numbering<'a> {
    fn new(
        operator: &'a WindowRankOperator,
        registry: &'a FunctionRegistry,
        window_range: Option<&'a WindowRange>,
    ) -> Self {
        Self {
            calls: &operator.calls,
            registry,
            window_range,
            positions: vec![HashMap::new(); operator.calls.len()],
        }
    }

    /// Assign the next position of the row's partition for every call
    fn number(&mut self, row: &mut dyn TupleRow) -> Result<(), SqlError> {
        for (call, counters) in self.calls.iter().zip(self.positions.iter_mut()) {
            let key = partition_key(self.registry, call, &*row, self.window_range)?;
            let position = counters.entry(key).or_insert(0);
            *position += 1;
            row.set(&call.output_field, FieldValue::Integer(*position));
        }
        Ok(())
    }
}

/// String forms of the call's PARTITION BY values, empty when unpartitioned
fn partition_key(
    registry: &FunctionRegistry,
    call: &WindowRankCall,
    row: &dyn TupleRow,
    window_range: Option<&WindowRange>,
) -> Result<Vec<String>, SqlError> {
    if call.partition_by.is_empty() {
        return Ok(Vec::new());
    }
    let evaluator = ExpressionEvaluator::new(MultiValuer::for_row(row.as_valuer(), window_range), registry);
    call.partition_by
        .iter()
        .map(|expr| evaluator.evaluate(expr).map(|value| value.to_string()))
        .collect()
}

impl Operator for WindowRankOperator {
    fn name(&self) -> &str {
        "window_rank"
    }

    /// Number the rows of any input in place; errors pass through
    fn process(
        &self,
        context: &mut ProcessorContext,
        mut data: StreamData,
    ) -> Result<Option<StreamData>, SqlError> {
        let registry = context.registry.as_ref();
        match &mut data {
            StreamData::Record(record) => Numbering::new(self, registry, None).number(record)?,
            StreamData::Window(batch) => self.number_collection(registry, batch)?,
            StreamData::Join(result) => self.number_collection(registry, result)?,
            StreamData::Grouped(set) => {
                for group in set.groups.iter_mut() {
                    let window_range = group.window_range.or(set.window_range);
                    let mut numbering = Numbering::new(self, registry, window_range.as_ref());
                    for row in group.rows.iter_mut() {
                        numbering.number(row)?;
                    }
                }
            }
            StreamData::Error(_) => {}
        }
        Ok(Some(data))
    }
}
